//! Per-call dispatch policy.
//!
//! Out-of-range values are corrected, never rejected: unknown priorities
//! become `normal`, negative windows become zero and debounce windows are
//! clamped to [`MAX_DEBOUNCE_MS`].

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

pub const MAX_DEBOUNCE_MS: u64 = 3_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
}

impl Priority {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            _ => Err(format!("unsupported priority: {value}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchPolicy {
    #[serde(deserialize_with = "lenient_priority")]
    pub priority: Priority,
    #[serde(deserialize_with = "lenient_millis")]
    pub debounce_ms: u64,
    #[serde(deserialize_with = "lenient_millis")]
    pub throttle_ms: u64,
    pub retry: bool,
    pub silent: bool,
}

impl DispatchPolicy {
    pub fn high() -> Self {
        Self {
            priority: Priority::High,
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_debounce(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }

    pub fn with_throttle(mut self, ms: u64) -> Self {
        self.throttle_ms = ms;
        self
    }

    pub fn with_retry(mut self) -> Self {
        self.retry = true;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Clamp into the supported ranges.
    pub fn normalized(self) -> Self {
        let mut policy = self;
        if policy.debounce_ms > MAX_DEBOUNCE_MS {
            tracing::warn!(
                requested = policy.debounce_ms,
                max = MAX_DEBOUNCE_MS,
                "debounce window clamped"
            );
            policy.debounce_ms = MAX_DEBOUNCE_MS;
        }
        policy
    }
}

fn lenient_priority<'de, D>(deserializer: D) -> Result<Priority, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value
        .as_str()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or_default())
}

fn lenient_millis<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let millis = match value.as_u64() {
        Some(ms) => ms,
        None => match value.as_f64() {
            Some(ms) if ms.is_finite() && ms > 0.0 => ms as u64,
            _ => 0,
        },
    };
    Ok(millis)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn defaults_are_normal_and_immediate() {
        let policy = DispatchPolicy::default();
        assert_eq!(policy.priority, Priority::Normal);
        assert_eq!(policy.debounce_ms, 0);
        assert_eq!(policy.throttle_ms, 0);
        assert!(!policy.retry && !policy.silent);
    }

    #[test]
    fn debounce_is_clamped() {
        let policy = DispatchPolicy::default().with_debounce(10_000).normalized();
        assert_eq!(policy.debounce_ms, MAX_DEBOUNCE_MS);
    }

    #[test]
    fn malformed_json_values_are_corrected() {
        let policy: DispatchPolicy = serde_json::from_value(json!({
            "priority": "urgent",
            "debounce_ms": -25,
            "throttle_ms": "fast",
            "retry": true
        }))
        .unwrap();
        assert_eq!(policy.priority, Priority::Normal);
        assert_eq!(policy.debounce_ms, 0);
        assert_eq!(policy.throttle_ms, 0);
        assert!(policy.retry);

        let policy: DispatchPolicy =
            serde_json::from_value(json!({ "priority": "HIGH", "debounce_ms": 12.7 })).unwrap();
        assert_eq!(policy.priority, Priority::High);
        assert_eq!(policy.debounce_ms, 12);
    }
}
