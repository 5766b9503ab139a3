//! Builds an [`AcquireConfig`] from the environment.
//!
//! # Environment Variables
//!
//! | Variable | Required | Description |
//! |---|---|---|
//! | `NEXTCLOUD_PUBLIC_TOKEN` | Yes | Public share token, used as the Basic auth user |
//! | `DATA_DIR` | No | Data root, archives go to `<DATA_DIR>/raw` (default `./data`) |
//! | `CNPJ_WEBDAV_URL` | No | WebDAV endpoint of the share |
//! | `CNPJ_WORKERS` | No | Concurrent transfers per round (default 2) |
//! | `CNPJ_WINDOW_DAYS` | No | Recency window for month discovery (default 15) |
//! | `CNPJ_MAX_ROUNDS` | No | Download rounds per month (default 5) |

use std::path::PathBuf;
use std::str::FromStr;

use cnpj_getter_acquire_models::AcquireConfig;

const TOKEN_VAR: &str = "NEXTCLOUD_PUBLIC_TOKEN";
const DATA_DIR_VAR: &str = "DATA_DIR";
const WEBDAV_URL_VAR: &str = "CNPJ_WEBDAV_URL";
const WORKERS_VAR: &str = "CNPJ_WORKERS";
const WINDOW_DAYS_VAR: &str = "CNPJ_WINDOW_DAYS";
const MAX_ROUNDS_VAR: &str = "CNPJ_MAX_ROUNDS";

const DEFAULT_DATA_DIR: &str = "./data";

/// Errors building the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Missing required environment variable.
    #[error("Missing environment variable: {name}")]
    MissingEnv {
        /// Name of the missing environment variable.
        name: &'static str,
    },

    /// A variable is set but cannot be used.
    #[error("Invalid value {value:?} for {name}: {reason}")]
    Invalid {
        /// Name of the environment variable.
        name: &'static str,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Loads `.env` if present, then reads the process environment.
///
/// # Errors
///
/// See [`from_lookup`].
pub fn from_env() -> Result<AcquireConfig, ConfigError> {
    dotenvy::dotenv().ok();
    from_lookup(|name| std::env::var(name).ok())
}

/// Builds the configuration from `lookup`, which maps a variable name to
/// its value. Empty values count as unset.
///
/// # Errors
///
/// Returns [`ConfigError::MissingEnv`] without a share token, and
/// [`ConfigError::Invalid`] for numbers that do not parse or are zero.
pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<AcquireConfig, ConfigError> {
    let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

    let token = get(TOKEN_VAR).ok_or(ConfigError::MissingEnv { name: TOKEN_VAR })?;
    let data_dir = get(DATA_DIR_VAR).map_or_else(|| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from);

    let mut config = AcquireConfig::new(token.trim(), data_dir.join("raw"));

    if let Some(url) = get(WEBDAV_URL_VAR) {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                name: WEBDAV_URL_VAR,
                value: url,
                reason: "expected an http(s) URL".to_string(),
            });
        }
        config.base_url = url;
    }
    if let Some(value) = get(WORKERS_VAR) {
        config.workers = positive(WORKERS_VAR, &value)?;
    }
    if let Some(value) = get(WINDOW_DAYS_VAR) {
        config.window_days = positive(WINDOW_DAYS_VAR, &value)?;
    }
    if let Some(value) = get(MAX_ROUNDS_VAR) {
        config.max_rounds = positive(MAX_ROUNDS_VAR, &value)?;
    }

    Ok(config)
}

fn positive<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr + Default + PartialEq,
    T::Err: std::fmt::Display,
{
    let invalid = |reason: String| ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason,
    };

    let parsed = value.trim().parse::<T>().map_err(|e| invalid(e.to_string()))?;
    if parsed == T::default() {
        return Err(invalid("must be greater than zero".to_string()));
    }
    Ok(parsed)
}

/// Hides all but the first four characters of a token.
#[must_use]
pub fn mask_token(token: &str) -> String {
    let visible: String = token.chars().take(4).collect();
    if visible.len() == token.len() {
        "****".to_string()
    } else {
        format!("{visible}****")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use cnpj_getter_acquire_models::{DEFAULT_MAX_ROUNDS, DEFAULT_WEBDAV_BASE, DEFAULT_WORKERS};

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: BTreeMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn token_is_required() {
        let err = from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingEnv {
                name: "NEXTCLOUD_PUBLIC_TOKEN"
            }
        ));

        let err = from_lookup(lookup(&[(TOKEN_VAR, "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv { .. }));
    }

    #[test]
    fn defaults_apply() {
        let config = from_lookup(lookup(&[(TOKEN_VAR, "abc123")])).unwrap();
        assert_eq!(config.token, "abc123");
        assert_eq!(config.raw_dir, PathBuf::from("./data/raw"));
        assert_eq!(config.base_url, DEFAULT_WEBDAV_BASE);
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert_eq!(config.max_rounds, DEFAULT_MAX_ROUNDS);
    }

    #[test]
    fn overrides_apply() {
        let config = from_lookup(lookup(&[
            (TOKEN_VAR, "abc123"),
            (DATA_DIR_VAR, "/srv/cnpj"),
            (WEBDAV_URL_VAR, "http://localhost:8080/webdav"),
            (WORKERS_VAR, "4"),
            (WINDOW_DAYS_VAR, "30"),
            (MAX_ROUNDS_VAR, " 7 "),
        ]))
        .unwrap();

        assert_eq!(config.raw_dir, PathBuf::from("/srv/cnpj/raw"));
        assert_eq!(config.base_url, "http://localhost:8080/webdav");
        assert_eq!(config.workers, 4);
        assert_eq!(config.window_days, 30);
        assert_eq!(config.max_rounds, 7);
    }

    #[test]
    fn rejects_bad_numbers() {
        let err = from_lookup(lookup(&[(TOKEN_VAR, "t"), (WORKERS_VAR, "two")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "CNPJ_WORKERS", .. }));

        let err = from_lookup(lookup(&[(TOKEN_VAR, "t"), (MAX_ROUNDS_VAR, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "CNPJ_MAX_ROUNDS", .. }));
    }

    #[test]
    fn rejects_non_http_url() {
        let err =
            from_lookup(lookup(&[(TOKEN_VAR, "t"), (WEBDAV_URL_VAR, "ftp://x")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "CNPJ_WEBDAV_URL", .. }));
    }

    #[test]
    fn masks_token() {
        assert_eq!(mask_token("abcdefgh"), "abcd****");
        assert_eq!(mask_token("abc"), "****");
    }
}
