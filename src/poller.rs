//! Polling of asynchronous server-side jobs (save-to-drive, create-share).

use std::time::Duration;

use rand::Rng;
use tracing::{error, info, warn};

use crate::client::QuarkClient;
use crate::error::Result;
use crate::models::{ApiEnvelope, TaskData, TaskResult, ROOT_NAME};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 50;

/// Job status meaning "finished".
const TASK_DONE: i64 = 2;

const CODE_QUOTA_EXCEEDED: i64 = 32003;
const CODE_FOLDER_MISSING: i64 = 41013;

/// Attempt budget and the flat jitter slept between attempts.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub max_attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(1000),
        }
    }
}

impl PollConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn without_delay(mut self) -> Self {
        self.min_delay = Duration::ZERO;
        self.max_delay = Duration::ZERO;
        self
    }

    /// Uniformly random pause within the configured range.
    pub fn jitter(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        let min = self.min_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// Interpret one status response. `None` means the job is still running.
pub fn classify(envelope: ApiEnvelope) -> Option<TaskResult> {
    if envelope.message == "ok" {
        let data: TaskData = match serde_json::from_value(envelope.data) {
            Ok(data) => data,
            Err(e) => {
                warn!("Unreadable task status payload, treating as pending: {}", e);
                TaskData::default()
            }
        };
        if data.status != TASK_DONE {
            return None;
        }
        let destination_folder_name = data
            .save_as
            .and_then(|s| s.to_pdir_name)
            .unwrap_or_else(|| ROOT_NAME.to_string());
        return Some(TaskResult::Completed {
            destination_folder_name,
            share_id: data.share_id,
        });
    }

    let message = envelope.message;
    Some(match envelope.code {
        CODE_QUOTA_EXCEEDED => TaskResult::QuotaExceeded { message },
        CODE_FOLDER_MISSING => TaskResult::DestinationFolderMissing { message },
        code => TaskResult::OtherFatal { code, message },
    })
}

/// Poll a job until it finishes, fails fatally, or the attempt budget runs out.
///
/// Attempts are strictly sequential. Fatal outcomes are returned on first
/// sight; running out of attempts yields `RetriesExhausted`.
pub async fn poll_until_done(
    client: &QuarkClient,
    task_id: &str,
    config: &PollConfig,
) -> Result<TaskResult> {
    for attempt in 0..config.max_attempts {
        if attempt > 0 {
            tokio::time::sleep(config.jitter()).await;
        }
        info!(
            "Checking task {} (attempt {}/{})",
            task_id,
            attempt + 1,
            config.max_attempts
        );

        let envelope = client.query_task(task_id, attempt).await?;
        if let Some(result) = classify(envelope) {
            if result.is_fatal() {
                error!("Task {} failed: {}", task_id, result);
            } else {
                info!("Task {} finished: {}", task_id, result);
            }
            return Ok(result);
        }
    }

    warn!(
        "Task {} still running after {} attempts",
        task_id, config.max_attempts
    );
    Ok(TaskResult::RetriesExhausted {
        attempts: config.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(json: &str) -> ApiEnvelope {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_pending_keeps_polling() {
        let e = envelope(r#"{"status": 200, "code": 0, "message": "ok", "data": {"status": 1}}"#);
        assert_eq!(classify(e), None);
    }

    #[test]
    fn test_unreadable_ok_payload_is_pending() {
        let e = envelope(r#"{"status": 200, "code": 0, "message": "ok", "data": {"status": "two"}}"#);
        assert_eq!(classify(e), None);
    }

    #[test]
    fn test_done_with_folder_name() {
        let e = envelope(
            r#"{"status": 200, "code": 0, "message": "ok",
                "data": {"status": 2, "task_title": "share-save", "save_as": {"to_pdir_name": "Movies"}}}"#,
        );
        assert_eq!(
            classify(e),
            Some(TaskResult::Completed {
                destination_folder_name: "Movies".to_string(),
                share_id: None,
            })
        );
    }

    #[test]
    fn test_done_without_folder_defaults_to_root() {
        let e = envelope(
            r#"{"message": "ok", "data": {"status": 2, "save_as": {}, "share_id": "s1"}}"#,
        );
        assert_eq!(
            classify(e),
            Some(TaskResult::Completed {
                destination_folder_name: ROOT_NAME.to_string(),
                share_id: Some("s1".to_string()),
            })
        );
    }

    #[test]
    fn test_fatal_codes() {
        let quota = envelope(r#"{"status": 400, "code": 32003, "message": "capacity limit"}"#);
        assert!(matches!(classify(quota), Some(TaskResult::QuotaExceeded { .. })));

        let missing = envelope(r#"{"status": 400, "code": 41013, "message": "dir not found"}"#);
        assert!(matches!(
            classify(missing),
            Some(TaskResult::DestinationFolderMissing { .. })
        ));

        let other = envelope(r#"{"status": 400, "code": 12345, "message": "boom"}"#);
        let result = classify(other).unwrap();
        assert!(result.is_fatal());
        assert_eq!(
            result,
            TaskResult::OtherFatal {
                code: 12345,
                message: "boom".to_string()
            }
        );
    }

    #[test]
    fn test_jitter_within_range() {
        let config = PollConfig::default();
        for _ in 0..100 {
            let d = config.jitter();
            assert!(d >= Duration::from_millis(500) && d <= Duration::from_millis(1000));
        }
        assert_eq!(PollConfig::default().without_delay().jitter(), Duration::ZERO);
    }
}
