use serde::{Deserialize, Serialize};

use crate::storage::retention::RetentionPolicy;

/// Configuration for a capture session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Length of the trailing clip exported by the clip trigger (default: 10).
    pub clip_duration_secs: u32,

    /// Minimum look-back kept in the buffer regardless of clip duration (default: 30).
    pub retention_floor_secs: u32,

    /// Interval of the elapsed-time ticker in milliseconds (default: 250).
    pub tick_interval_ms: u64,

    /// Prefix for suggested export file names (default: "clip").
    pub file_prefix: String,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.clip_duration_secs == 0 {
            return Err("clip duration must be positive".into());
        }
        if self.tick_interval_ms == 0 {
            return Err("tick interval must be positive".into());
        }
        if self.file_prefix.is_empty() {
            return Err("file prefix must not be empty".into());
        }
        if self
            .file_prefix
            .chars()
            .any(|c| matches!(c, '/' | '\\' | ':' | '\0'))
        {
            return Err(format!("file prefix contains a path separator: {}", self.file_prefix));
        }
        Ok(())
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy::new(self.retention_floor_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            clip_duration_secs: 10,
            retention_floor_secs: RetentionPolicy::DEFAULT_FLOOR_SECS,
            tick_interval_ms: 250,
            file_prefix: "clip".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_clip_duration() {
        let config = SessionConfig {
            clip_duration_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_prefix_with_separator() {
        let config = SessionConfig {
            file_prefix: "../clip".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: SessionConfig = serde_json::from_str(r#"{"clip_duration_secs": 45}"#).unwrap();
        assert_eq!(config.clip_duration_secs, 45);
        assert_eq!(config.retention_floor_secs, 30);
        assert_eq!(config.file_prefix, "clip");
    }
}
