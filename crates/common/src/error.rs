//! Configuration and startup errors shared across crates

use thiserror::Error;

/// Errors raised while assembling broker configuration
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("missing required setting {0} (set the environment variable or the config file entry)")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_names_the_setting() {
        let err = Error::Missing("SNOWFLAKE_TOKEN_URL");
        assert!(
            err.to_string().contains("SNOWFLAKE_TOKEN_URL"),
            "got: {err}"
        );
    }

    #[test]
    fn invalid_carries_reason() {
        let err = Error::Invalid {
            name: "PORT",
            reason: "not a number".into(),
        };
        assert_eq!(err.to_string(), "invalid value for PORT: not a number");
    }

    #[test]
    fn io_error_converts() {
        let err: Error =
            std::io::Error::new(std::io::ErrorKind::NotFound, "file not found").into();
        assert!(err.to_string().starts_with("I/O error:"), "got: {err}");
    }
}
