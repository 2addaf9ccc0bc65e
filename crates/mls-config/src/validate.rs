use crate::config::{Config, LogConfig, ServerSection};
use crate::error::ConfigError;

/// Allowed range for `handshakeTimeoutSecs`.
pub const HANDSHAKE_TIMEOUT_RANGE: std::ops::RangeInclusive<u64> = 1..=300;

/// Check a merged [`Config`], collecting every violation.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let timeout = config.server.handshake_timeout_secs;
    if !HANDSHAKE_TIMEOUT_RANGE.contains(&timeout) {
        errors.push(ConfigError::Validation {
            key: "multiLanguageServer.handshakeTimeoutSecs".to_string(),
            message: format!(
                "must be between {} and {}, got {}",
                HANDSHAKE_TIMEOUT_RANGE.start(),
                HANDSHAKE_TIMEOUT_RANGE.end(),
                timeout
            ),
        });
    }

    let interpreters = [
        ("multiLanguageServer.pythonPath", &config.server.python_path),
        ("python.pythonPath", &config.python.python_path),
    ];
    for (key, value) in interpreters {
        if value.as_deref().is_some_and(|path| path.contains('\0')) {
            errors.push(ConfigError::Validation {
                key: key.to_string(),
                message: "must not contain NUL characters".to_string(),
            });
        }
    }

    if config
        .log
        .file
        .as_ref()
        .is_some_and(|file| file.as_os_str().is_empty())
    {
        errors.push(ConfigError::Validation {
            key: "log.file".to_string(),
            message: "must not be empty".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Reset every invalid key of `config` to its default, leaving valid
/// keys untouched. Returns the violations that were repaired.
pub fn repair(config: &mut Config) -> Vec<ConfigError> {
    let errors = match validate(config) {
        Ok(()) => return Vec::new(),
        Err(errors) => errors,
    };

    if !HANDSHAKE_TIMEOUT_RANGE.contains(&config.server.handshake_timeout_secs) {
        config.server.handshake_timeout_secs = ServerSection::default().handshake_timeout_secs;
    }
    for path in [&mut config.server.python_path, &mut config.python.python_path] {
        if path.as_deref().is_some_and(|p| p.contains('\0')) {
            *path = None;
        }
    }
    if config
        .log
        .file
        .as_ref()
        .is_some_and(|file| file.as_os_str().is_empty())
    {
        config.log.file = LogConfig::default().file;
    }
    errors
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut cfg = Config::default();
        cfg.server.handshake_timeout_secs = 0;
        let errs = validate(&cfg).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert!(errs[0].to_string().contains("handshakeTimeoutSecs"));
    }

    #[test]
    fn timeout_bounds_are_inclusive() {
        let mut cfg = Config::default();
        cfg.server.handshake_timeout_secs = 1;
        assert!(validate(&cfg).is_ok());
        cfg.server.handshake_timeout_secs = 300;
        assert!(validate(&cfg).is_ok());
        cfg.server.handshake_timeout_secs = 301;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn empty_python_path_is_allowed() {
        let mut cfg = Config::default();
        cfg.server.python_path = Some(String::new());
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn nul_in_interpreter_rejected() {
        let mut cfg = Config::default();
        cfg.python.python_path = Some("py\0thon".into());
        let errs = validate(&cfg).unwrap_err();
        assert!(errs[0].to_string().contains("python.pythonPath"));
    }

    #[test]
    fn every_violation_is_reported() {
        let mut cfg = Config::default();
        cfg.server.handshake_timeout_secs = 0;
        cfg.server.python_path = Some("\0".into());
        cfg.log.file = Some(PathBuf::new());
        let errs = validate(&cfg).unwrap_err();
        assert_eq!(errs.len(), 3);
    }

    #[test]
    fn repair_resets_only_invalid_keys() {
        let mut cfg = Config::default();
        cfg.server.enable = false;
        cfg.server.notifications = false;
        cfg.server.handshake_timeout_secs = 0;
        cfg.python.python_path = Some("python3".into());
        cfg.server.python_path = Some("bad\0path".into());

        let repaired = repair(&mut cfg);
        assert_eq!(repaired.len(), 2);
        assert!(validate(&cfg).is_ok());
        assert_eq!(cfg.server.handshake_timeout_secs, 10);
        assert_eq!(cfg.server.python_path, None);
        assert_eq!(cfg.python.python_path.as_deref(), Some("python3"));
        assert!(!cfg.server.enable);
        assert!(!cfg.server.notifications);
    }

    #[test]
    fn repair_leaves_valid_config_alone() {
        let mut cfg = Config::default();
        cfg.log.file = Some(PathBuf::from("/tmp/mls.log"));
        assert!(repair(&mut cfg).is_empty());
        assert_eq!(cfg.log.file, Some(PathBuf::from("/tmp/mls.log")));
    }
}
