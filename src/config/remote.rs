//! Remote key/value and secret stores.
//!
//! The crate does not ship any network client. Applications implement
//! [`RemoteStore`] for their secret vault or config service and register it
//! with a timeout; the fetch runs on a worker thread so a hung store surfaces
//! as [`ConfigError::SourceTimeout`] instead of blocking the resolution pass.

use std::fmt;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use super::key::Key;
use super::source::RawConfigEntry;
use super::ConfigError;

/// Default time allowed for a remote fetch.
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Error type returned by remote store implementations.
pub type RemoteError = Box<dyn std::error::Error + Send + Sync>;

/// A read-only remote store of named values.
pub trait RemoteStore: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Fetches every (name, value) pair the store exposes.
    fn fetch(&self) -> Result<Vec<(String, String)>, RemoteError>;
}

/// A [`RemoteStore`] registered as a configuration source.
#[derive(Clone)]
pub struct RemoteSource {
    store: Arc<dyn RemoteStore>,
    timeout: Duration,
    secret_prefix: Option<String>,
}

impl RemoteSource {
    pub fn new(store: impl RemoteStore + 'static) -> Self {
        Self::from_arc(Arc::new(store))
    }

    pub fn from_arc(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            timeout: DEFAULT_REMOTE_TIMEOUT,
            secret_prefix: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Maps secret names the way vaults without `:` in names store them.
    ///
    /// Only names starting with `<prefix>-` are kept, the prefix is removed
    /// and `--` separates sections: `Test-MySecretSection--MySecretString`
    /// becomes `mysecretsection:mysecretstring`.
    pub fn with_secret_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.secret_prefix = Some(prefix.into());
        self
    }

    pub fn name(&self) -> &str {
        self.store.name()
    }

    pub(crate) fn entries(&self, rank: usize) -> Result<Vec<RawConfigEntry>, ConfigError> {
        let pairs = self.fetch_with_timeout()?;
        let origin = format!("remote {}", self.name());

        Ok(pairs
            .into_iter()
            .filter_map(|(name, value)| {
                let key = self.map_name(&name)?;
                (!key.is_empty()).then(|| RawConfigEntry::new(key, value, rank, origin.as_str()))
            })
            .collect())
    }

    fn map_name(&self, name: &str) -> Option<Key> {
        match &self.secret_prefix {
            None => Some(Key::parse(name)),
            Some(prefix) => {
                let marker = format!("{prefix}-");
                let head = name.get(..marker.len())?;
                if !head.eq_ignore_ascii_case(&marker) {
                    return None;
                }
                let rest = name.get(marker.len()..)?;
                Some(Key::from_segments(rest.split("--")))
            }
        }
    }

    fn fetch_with_timeout(&self) -> Result<Vec<(String, String)>, ConfigError> {
        let (tx, rx) = mpsc::channel();
        let store = Arc::clone(&self.store);

        std::thread::Builder::new()
            .name(format!("remote-fetch-{}", self.name()))
            .spawn(move || {
                let result = store.fetch().map_err(|e| e.to_string());
                // The receiver is gone if the fetch timed out.
                let _ = tx.send(result);
            })
            .map_err(|e| ConfigError::Remote {
                name: self.name().to_string(),
                reason: e.to_string(),
            })?;

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(pairs)) => {
                log::debug!("fetched {} values from remote {}", pairs.len(), self.name());
                Ok(pairs)
            }
            Ok(Err(reason)) => Err(ConfigError::Remote {
                name: self.name().to_string(),
                reason,
            }),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(ConfigError::SourceTimeout {
                name: self.name().to_string(),
                timeout: self.timeout,
            }),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(ConfigError::Remote {
                name: self.name().to_string(),
                reason: "fetch worker exited without a result".to_string(),
            }),
        }
    }
}

impl fmt::Debug for RemoteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSource")
            .field("name", &self.name())
            .field("timeout", &self.timeout)
            .field("secret_prefix", &self.secret_prefix)
            .finish()
    }
}
