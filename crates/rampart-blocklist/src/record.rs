//! Block record types shared by the in-memory cache and the durable log.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why an IP was blocked.
///
/// The set of reasons is fixed and closed: each maps to one rate-limited
/// resource class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// The IP exceeded the plain visit-frequency threshold.
    HighFrequencyVisit,
    /// The IP exceeded the detected-attack frequency threshold.
    HighFrequencyAttack,
    /// The IP exceeded the error-response frequency threshold.
    HighFrequencyError,
}

impl BlockReason {
    /// Stable string form used in the durable log.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HighFrequencyVisit => "high_frequency_visit",
            Self::HighFrequencyAttack => "high_frequency_attack",
            Self::HighFrequencyError => "high_frequency_error",
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimal in-memory view of an active block.
///
/// Only the fields the hot lookup path needs; the durable log keeps the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    /// The blocked source address.
    pub ip: IpAddr,
    /// When the block lapses.
    pub blocked_until: DateTime<Utc>,
}

impl BlockRecord {
    /// Check whether the block has already lapsed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.blocked_until
    }
}

/// Full block event as appended to the durable log.
///
/// Immutable after creation. Repeated blocks of the same IP produce multiple
/// rows; the log is an event history, not a mirror of current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRecordFull {
    /// The blocked source address.
    pub ip: IpAddr,
    /// Which resource class triggered the block.
    pub reason: BlockReason,
    /// The request URI that crossed the threshold.
    pub request_uri: String,
    /// When the block was created.
    pub blocked_at: DateTime<Utc>,
    /// When the block lapses.
    pub blocked_until: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_stable_strings() {
        assert_eq!(BlockReason::HighFrequencyVisit.as_str(), "high_frequency_visit");
        assert_eq!(BlockReason::HighFrequencyAttack.as_str(), "high_frequency_attack");
        assert_eq!(BlockReason::HighFrequencyError.as_str(), "high_frequency_error");
        assert_eq!(BlockReason::HighFrequencyVisit.to_string(), "high_frequency_visit");
    }

    #[test]
    fn test_reason_serde_snake_case() {
        let json = serde_json::to_string(&BlockReason::HighFrequencyAttack).unwrap();
        assert_eq!(json, "\"high_frequency_attack\"");

        let back: BlockReason = serde_json::from_str("\"high_frequency_error\"").unwrap();
        assert_eq!(back, BlockReason::HighFrequencyError);
    }

    #[test]
    fn test_block_record_expiry() {
        let ip: IpAddr = "1.2.3.4".parse().unwrap();

        let active = BlockRecord {
            ip,
            blocked_until: Utc::now() + chrono::Duration::seconds(60),
        };
        assert!(!active.is_expired());

        let lapsed = BlockRecord {
            ip,
            blocked_until: Utc::now() - chrono::Duration::seconds(1),
        };
        assert!(lapsed.is_expired());
    }

    #[test]
    fn test_full_record_json_field_names() {
        let record = BlockRecordFull {
            ip: "10.0.0.9".parse().unwrap(),
            reason: BlockReason::HighFrequencyVisit,
            request_uri: "/login".into(),
            blocked_at: Utc::now(),
            blocked_until: Utc::now() + chrono::Duration::seconds(600),
        };

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"ip\":\"10.0.0.9\""));
        assert!(json.contains("\"requestUri\":\"/login\""));
        assert!(json.contains("\"blockedAt\""));
        assert!(json.contains("\"blockedUntil\""));
        assert!(json.contains("\"reason\":\"high_frequency_visit\""));

        let back: BlockRecordFull = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
