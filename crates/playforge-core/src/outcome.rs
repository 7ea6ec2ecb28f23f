use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a streamed generation step ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StreamOutcome {
    /// The end-of-stream marker arrived and the text was committed to the session
    Completed {
        chunks: usize,
        bytes: usize,
        duration_secs: f64,
    },
    /// The consumer cancelled; partial text was dropped and the session is unchanged
    Abandoned {
        chunks: usize,
        discarded_bytes: usize,
    },
}

impl StreamOutcome {
    pub fn completed(chunks: usize, bytes: usize, duration: Duration) -> Self {
        Self::Completed {
            chunks,
            bytes,
            duration_secs: duration.as_secs_f64(),
        }
    }

    pub fn abandoned(chunks: usize, discarded_bytes: usize) -> Self {
        Self::Abandoned {
            chunks,
            discarded_bytes,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, StreamOutcome::Completed { .. })
    }

    pub fn is_abandoned(&self) -> bool {
        matches!(self, StreamOutcome::Abandoned { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serialization() {
        let outcome = StreamOutcome::abandoned(3, 42);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "abandoned");
        assert_eq!(json["discarded_bytes"], 42);
        assert!(outcome.is_abandoned());

        let outcome = StreamOutcome::completed(10, 2048, Duration::from_millis(1500));
        assert!(outcome.is_completed());
        match outcome {
            StreamOutcome::Completed { duration_secs, .. } => assert_eq!(duration_secs, 1.5),
            _ => panic!("Expected Completed"),
        }
    }
}
