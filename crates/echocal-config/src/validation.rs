// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation of configuration values.

use echocal_core::EchocalError;

use crate::model::EchocalConfig;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate constraints that the type system cannot express.
pub fn validate_config(config: &EchocalConfig) -> Result<(), EchocalError> {
    if !VALID_LOG_LEVELS.contains(&config.agent.log_level.as_str()) {
        return Err(EchocalError::Config(format!(
            "agent.log_level must be one of {VALID_LOG_LEVELS:?}, got {:?}",
            config.agent.log_level
        )));
    }
    if config.queue.max_attempts < 1 {
        return Err(EchocalError::Config(format!(
            "queue.max_attempts must be at least 1, got {}",
            config.queue.max_attempts
        )));
    }
    if config.queue.backoff_base_secs == 0 {
        return Err(EchocalError::Config(
            "queue.backoff_base_secs must be non-zero".into(),
        ));
    }
    if config.clarify.expiry_minutes < 1 {
        return Err(EchocalError::Config(format!(
            "clarify.expiry_minutes must be at least 1, got {}",
            config.clarify.expiry_minutes
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&EchocalConfig::default()).is_ok());
    }

    #[test]
    fn rejects_bad_log_level() {
        let mut config = EchocalConfig::default();
        config.agent.log_level = "loud".into();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_zero_attempts() {
        let mut config = EchocalConfig::default();
        config.queue.max_attempts = 0;
        assert!(validate_config(&config).is_err());
    }
}
