//! Environment-driven engine configuration.
//!
//! Configuration is read once at startup from the process environment
//! (optionally seeded from a `.env` file via `dotenvy`). Every knob has a
//! sensible default so an [`EngineConfig`] can always be constructed; bad
//! values are logged and replaced by the default rather than aborting.
//!
//! Recognized variables:
//!
//! | Variable                     | Default                                |
//! |------------------------------|----------------------------------------|
//! | `CREDVET_NPI_REGISTRY_URL`   | `https://npiregistry.cms.hhs.gov/api`  |
//! | `CREDVET_NOTIFY_ENDPOINT`    | unset (notifications disabled)         |
//! | `CREDVET_EMBEDDINGS_ENDPOINT`| unset (deterministic local embedder)   |
//! | `CREDVET_EMBEDDINGS_MODEL`   | `all-minilm`                           |
//! | `CREDVET_DB_PATH`            | `credvet.db`                           |
//! | `CREDVET_HTTP_TIMEOUT_MS`    | `10000`                                |
//! | `CREDVET_PERSIST_ATTEMPTS`   | `3`                                    |
//! | `CREDVET_PERSIST_BACKOFF_MS` | `200`                                  |

use std::path::PathBuf;
use std::time::Duration;

/// All tunables the [`Engine`](crate::pipeline::Engine) needs at
/// construction time.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Base URL of the CMS NPI registry API.
    pub npi_registry_url: String,
    /// Progress-notification endpoint. `None` disables notifications.
    pub notify_endpoint: Option<String>,
    /// Remote embeddings endpoint. `None` selects the deterministic
    /// local embedder.
    pub embeddings_endpoint: Option<String>,
    /// Model name forwarded to the embeddings endpoint.
    pub embeddings_model: String,
    /// SQLite database path for the result store.
    pub db_path: PathBuf,
    /// Per-call timeout applied to every outbound HTTP request.
    pub http_timeout: Duration,
    /// How many times a failed result-store write is attempted.
    pub persist_attempts: u32,
    /// Base backoff between persistence attempts (linear: `backoff × n`).
    pub persist_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            npi_registry_url: "https://npiregistry.cms.hhs.gov/api".to_string(),
            notify_endpoint: None,
            embeddings_endpoint: None,
            embeddings_model: "all-minilm".to_string(),
            db_path: PathBuf::from("credvet.db"),
            http_timeout: Duration::from_millis(10_000),
            persist_attempts: 3,
            persist_backoff: Duration::from_millis(200),
        }
    }
}

impl EngineConfig {
    /// Build a configuration from the process environment, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Self {
            npi_registry_url: env_string("CREDVET_NPI_REGISTRY_URL")
                .unwrap_or(defaults.npi_registry_url),
            notify_endpoint: env_string("CREDVET_NOTIFY_ENDPOINT"),
            embeddings_endpoint: env_string("CREDVET_EMBEDDINGS_ENDPOINT"),
            embeddings_model: env_string("CREDVET_EMBEDDINGS_MODEL")
                .unwrap_or(defaults.embeddings_model),
            db_path: env_string("CREDVET_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            http_timeout: env_millis("CREDVET_HTTP_TIMEOUT_MS")
                .unwrap_or(defaults.http_timeout),
            persist_attempts: env_parse("CREDVET_PERSIST_ATTEMPTS")
                .unwrap_or(defaults.persist_attempts),
            persist_backoff: env_millis("CREDVET_PERSIST_BACKOFF_MS")
                .unwrap_or(defaults.persist_backoff),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env_string(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "unparseable config value, using default");
            None
        }
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
    use std::sync::Mutex;

    /// Environment variables are process-global; tests run on parallel
    /// threads, so mutations are serialized and always rolled back.
    fn with_env_var(key: &str, value: &str, f: impl FnOnce()) {
        static ENV_LOCK: Mutex<()> = Mutex::new(());
        let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let previous = std::env::var(key).ok();
        std::env::set_var(key, value);
        let outcome = catch_unwind(AssertUnwindSafe(f));
        match previous {
            Some(old) => std::env::set_var(key, old),
            None => std::env::remove_var(key),
        }
        if let Err(panic) = outcome {
            resume_unwind(panic);
        }
    }

    #[test]
    fn defaults_are_sane() {
        let cfg = EngineConfig::default();
        assert!(cfg.npi_registry_url.starts_with("https://"));
        assert!(cfg.notify_endpoint.is_none());
        assert_eq!(cfg.persist_attempts, 3);
        assert_eq!(cfg.http_timeout, Duration::from_secs(10));
    }

    #[test]
    fn bad_numeric_falls_back() {
        with_env_var("CREDVET_PERSIST_ATTEMPTS", "not-a-number", || {
            let cfg = EngineConfig::from_env();
            assert_eq!(cfg.persist_attempts, 3);
        });
    }

    #[test]
    fn numeric_override_is_honored() {
        with_env_var("CREDVET_PERSIST_ATTEMPTS", "7", || {
            let cfg = EngineConfig::from_env();
            assert_eq!(cfg.persist_attempts, 7);
        });
    }
}
