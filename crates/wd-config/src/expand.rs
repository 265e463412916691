//! `${VAR}` and `${VAR:-default}` expansion for string settings.

use crate::ConfigError;

/// Expand environment variable references in a config value.
///
/// Only the braced form is recognised. A value without `${` is returned
/// as-is, so bare `$` characters in paths survive untouched.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value.to_owned());
    }

    shellexpand::env_with_context(value, |name| -> Result<Option<String>, UnsetVar> {
        std::env::var(name)
            .map(Some)
            .map_err(|_| UnsetVar(name.to_owned()))
    })
    .map(std::borrow::Cow::into_owned)
    .map_err(|e| ConfigError::EnvVar {
        field: field.to_owned(),
        message: format!("${{{}}} not set", e.cause.0),
    })
}

/// Name of a variable that was referenced without a default but is not set.
struct UnsetVar(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_set_var() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::set_var("WD_EXPAND_HOST", "0.0.0.0");
        }
        assert_eq!(
            expand_env("${WD_EXPAND_HOST}", "server.host").unwrap(),
            "0.0.0.0"
        );
        unsafe {
            std::env::remove_var("WD_EXPAND_HOST");
        }
    }

    #[test]
    fn test_expand_default_when_unset() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("WD_EXPAND_UNSET");
        }
        assert_eq!(
            expand_env("/${WD_EXPAND_UNSET:-reload}", "live_reload.path").unwrap(),
            "/reload"
        );
    }

    #[test]
    fn test_expand_missing_var_names_field() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("WD_EXPAND_MISSING");
        }
        let err = expand_env("${WD_EXPAND_MISSING}", "server.host").unwrap_err();
        assert!(matches!(err, ConfigError::EnvVar { .. }));
        let msg = err.to_string();
        assert!(msg.contains("WD_EXPAND_MISSING"));
        assert!(msg.contains("server.host"));
    }

    #[test]
    fn test_bare_dollar_left_alone() {
        assert_eq!(expand_env("/ws/$live", "live_reload.path").unwrap(), "/ws/$live");
    }
}
