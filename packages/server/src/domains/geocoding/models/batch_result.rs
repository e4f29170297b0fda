use serde::{Deserialize, Serialize};

/// Cap on diagnostic strings kept per batch
pub const MAX_BATCH_ERRORS: usize = 10;

/// Cap on the length of a single diagnostic string
pub const MAX_ERROR_LEN: usize = 200;

/// Outcome of geocoding one page of records.
///
/// Ephemeral: only its counts (and the last one as a whole) end up in the
/// job's progress snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub processed: i64,
    pub successful: i64,
    pub failed: i64,
    pub errors: Vec<String>,
}

impl BatchResult {
    pub fn record_success(&mut self) {
        self.processed += 1;
        self.successful += 1;
    }

    /// Count a failure and keep a truncated diagnostic while under the cap
    pub fn record_failure(&mut self, message: impl AsRef<str>) {
        self.processed += 1;
        self.failed += 1;

        if self.errors.len() < MAX_BATCH_ERRORS {
            self.errors.push(truncate(message.as_ref(), MAX_ERROR_LEN));
        }
    }

    /// Every record failed: likely a provider-side problem (quota, outage)
    pub fn is_systemic_failure(&self) -> bool {
        self.successful == 0 && self.failed > 0
    }
}

fn truncate(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    let mut truncated: String = message.chars().take(max_chars.saturating_sub(3)).collect();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_list_is_capped() {
        let mut result = BatchResult::default();
        for i in 0..25 {
            result.record_failure(format!("record {} failed", i));
        }

        assert_eq!(result.processed, 25);
        assert_eq!(result.failed, 25);
        assert_eq!(result.errors.len(), MAX_BATCH_ERRORS);
        assert_eq!(result.errors[0], "record 0 failed");
    }

    #[test]
    fn test_long_messages_are_truncated() {
        let mut result = BatchResult::default();
        result.record_failure("x".repeat(1000));

        assert_eq!(result.errors[0].chars().count(), MAX_ERROR_LEN);
        assert!(result.errors[0].ends_with("..."));
    }

    #[test]
    fn test_systemic_failure() {
        let mut result = BatchResult::default();
        assert!(!result.is_systemic_failure());

        result.record_failure("miss");
        assert!(result.is_systemic_failure());

        result.record_success();
        assert!(!result.is_systemic_failure());
    }
}
