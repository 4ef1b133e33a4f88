//! Configuration and environment selection.
use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};
use thiserror::Error;

/// SIFEN environment selection.
/// This determines the base of the QR verification URL and the default
/// web service endpoints.
/// - Test: the "ambiente de pruebas" (`sifen-test`, `consultas-test`).
/// - Production: the live environment.
/// # Examples
/// ```rust
/// use std::str::FromStr;
/// use sifen_core::config::EnvironmentType;
///
/// let env = EnvironmentType::from_str("prod")?;
/// assert_eq!(env, EnvironmentType::Production);
/// # Ok::<(), sifen_core::config::EnvironmentParseError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EnvironmentType {
    #[default]
    Test,
    Production,
}

/// Error returned when parsing an [`EnvironmentType`] from a string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvironmentParseError {
    #[error("invalid environment type: {input}")]
    Invalid { input: String },
}

impl FromStr for EnvironmentType {
    type Err = EnvironmentParseError;
    fn from_str(env: &str) -> Result<EnvironmentType, EnvironmentParseError> {
        match env.to_ascii_lowercase().as_str() {
            "test" => Ok(EnvironmentType::Test),
            "prod" | "production" => Ok(EnvironmentType::Production),
            _ => Err(EnvironmentParseError::Invalid {
                input: env.to_string(),
            }),
        }
    }
}

impl EnvironmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentType::Test => "test",
            EnvironmentType::Production => "prod",
        }
    }

    pub fn qr_base_url(&self) -> &'static str {
        match self {
            EnvironmentType::Test => "https://ekuatia.set.gov.py/consultas-test/qr?",
            EnvironmentType::Production => "https://ekuatia.set.gov.py/consultas/qr?",
        }
    }

    pub fn endpoint_url(&self) -> &'static str {
        match self {
            EnvironmentType::Test => "https://sifen-test.set.gov.py",
            EnvironmentType::Production => "https://sifen.set.gov.py",
        }
    }

    /// Synchronous single-document reception service.
    pub fn receive_document_url(&self) -> String {
        format!("{}/de/ws/sync/recibe-de", self.endpoint_url())
    }
}

/// Configuration shared by the pipeline and the submission client.
///
/// # Examples
/// ```rust
/// use std::time::Duration;
/// use sifen_core::config::{Config, EnvironmentType};
///
/// let config = Config::new(EnvironmentType::Test).with_timeout(Duration::from_secs(30));
/// assert_eq!(config.env(), EnvironmentType::Test);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Config {
    env: EnvironmentType,
    accept_invalid_server_certs: bool,
    timeout: Option<Duration>,
}

impl Config {
    pub fn new(env: EnvironmentType) -> Self {
        Self {
            env,
            ..Self::default()
        }
    }

    /// Skip validation of the remote server's certificate chain.
    pub fn with_accept_invalid_server_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_server_certs = accept;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn env(&self) -> EnvironmentType {
        self.env
    }

    pub fn accept_invalid_server_certs(&self) -> bool {
        self.accept_invalid_server_certs
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// QR base URL, honouring the `SIFEN_QR_BASE_URL` override.
    pub fn qr_base_url(&self) -> String {
        std::env::var("SIFEN_QR_BASE_URL")
            .ok()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| self.env.qr_base_url().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    fn qr_base_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    struct QrBaseGuard {
        _lock: MutexGuard<'static, ()>,
        previous: Option<String>,
    }

    impl QrBaseGuard {
        fn new(value: Option<&str>) -> Self {
            let lock = qr_base_lock().lock().unwrap_or_else(|e| e.into_inner());
            let previous = std::env::var("SIFEN_QR_BASE_URL").ok();
            match value {
                Some(value) => std::env::set_var("SIFEN_QR_BASE_URL", value),
                None => std::env::remove_var("SIFEN_QR_BASE_URL"),
            }
            Self {
                _lock: lock,
                previous,
            }
        }
    }

    impl Drop for QrBaseGuard {
        fn drop(&mut self) {
            match self.previous.as_ref() {
                Some(value) => std::env::set_var("SIFEN_QR_BASE_URL", value),
                None => std::env::remove_var("SIFEN_QR_BASE_URL"),
            }
        }
    }

    #[test]
    fn environment_parses_aliases() {
        assert_eq!(EnvironmentType::from_str("TEST").unwrap(), EnvironmentType::Test);
        assert_eq!(
            EnvironmentType::from_str("production").unwrap(),
            EnvironmentType::Production
        );
        assert!(matches!(
            EnvironmentType::from_str("staging"),
            Err(EnvironmentParseError::Invalid { input }) if input == "staging"
        ));
    }

    #[test]
    fn endpoints_follow_environment() {
        assert_eq!(
            EnvironmentType::Test.receive_document_url(),
            "https://sifen-test.set.gov.py/de/ws/sync/recibe-de"
        );
        assert_eq!(
            EnvironmentType::Production.qr_base_url(),
            "https://ekuatia.set.gov.py/consultas/qr?"
        );
    }

    #[test]
    fn default_config_is_strict_test_environment() {
        let config = Config::default();
        assert_eq!(config.env(), EnvironmentType::Test);
        assert!(!config.accept_invalid_server_certs());
        assert!(config.timeout().is_none());
    }

    #[test]
    fn builder_setters_apply() {
        let config = Config::new(EnvironmentType::Production)
            .with_accept_invalid_server_certs(true)
            .with_timeout(Duration::from_secs(5));
        assert_eq!(config.env(), EnvironmentType::Production);
        assert!(config.accept_invalid_server_certs());
        assert_eq!(config.timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn qr_base_url_honours_override() {
        let _guard = QrBaseGuard::new(Some("http://127.0.0.1:8080/qr?"));
        assert_eq!(Config::default().qr_base_url(), "http://127.0.0.1:8080/qr?");
        assert_eq!(
            Config::new(EnvironmentType::Production).qr_base_url(),
            "http://127.0.0.1:8080/qr?"
        );
    }

    #[test]
    fn empty_override_falls_back_to_environment() {
        let guard = QrBaseGuard::new(Some(""));
        assert_eq!(
            Config::new(EnvironmentType::Production).qr_base_url(),
            "https://ekuatia.set.gov.py/consultas/qr?"
        );
        drop(guard);

        let _guard = QrBaseGuard::new(None);
        assert_eq!(
            Config::default().qr_base_url(),
            "https://ekuatia.set.gov.py/consultas-test/qr?"
        );
    }
}
