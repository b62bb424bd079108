use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::config::{Config, ConfigError, Options, Resolver};
use crate::sync::{MutexExt, RwLockExt};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Where an accessor's latest resolution attempt stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    Unresolved,
    Resolving,
    /// The current instance passed every rule.
    Valid,
    /// The latest attempt failed; the previous valid instance is still served.
    Invalid,
}

/// Outcome of the most recent completed reload, shared with coalesced callers.
#[derive(Default)]
struct LastReload {
    failure: Option<Arc<ConfigError>>,
}

/// Serves the current validated settings and swaps them on reload.
///
/// Readers get an `Arc<T>` and never observe a partially built instance. A
/// reload that fails leaves the previous instance in place and does not
/// notify listeners. Only one reload runs at a time; callers that queue up
/// behind a running reload receive its outcome instead of starting another.
///
/// ```no_run
/// # use options_fnd::{Config, FieldSpec, Options, Schema, SettingsAccessor};
/// # #[derive(serde::Deserialize)]
/// # struct AppSettings { name: String }
/// # impl Options for AppSettings {
/// #     fn schema() -> Schema { Schema::new().field(FieldSpec::string("name")) }
/// # }
/// let settings = SettingsAccessor::<AppSettings>::from_config(
///     Config::builder().with_file("app.toml", true),
/// )?;
///
/// settings.on_change(|s| log::info!("name is now {}", s.name));
/// let current = settings.current();
/// # Ok::<(), options_fnd::ConfigError>(())
/// ```
pub struct SettingsAccessor<T: Options> {
    resolver: Resolver<T>,
    current: RwLock<Arc<T>>,
    state: RwLock<ResolutionState>,
    reload: Mutex<LastReload>,
    completed: AtomicU64,
    listeners: RwLock<Vec<Listener<T>>>,
    shutdown: AtomicBool,
}

impl<T: Options> SettingsAccessor<T> {
    /// Resolves eagerly; a failure here means there is nothing to serve.
    pub fn resolve(resolver: Resolver<T>) -> Result<Self, ConfigError> {
        let initial = resolver.resolve()?;
        log::info!("resolved {} settings", T::type_name());

        Ok(Self {
            resolver,
            current: RwLock::new(Arc::new(initial)),
            state: RwLock::new(ResolutionState::Valid),
            reload: Mutex::new(LastReload::default()),
            completed: AtomicU64::new(0),
            listeners: RwLock::new(Vec::new()),
            shutdown: AtomicBool::new(false),
        })
    }

    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        Self::resolve(config.options())
    }

    /// The latest valid instance.
    pub fn current(&self) -> Arc<T> {
        self.current.read_recovered().clone()
    }

    pub fn state(&self) -> ResolutionState {
        *self.state.read_recovered()
    }

    pub fn resolver(&self) -> &Resolver<T> {
        &self.resolver
    }

    /// Registers a callback run with each newly published instance.
    ///
    /// Callbacks run on the reloading thread after the reload has finished,
    /// so they may call [`reload`](Self::reload) themselves.
    pub fn on_change<F>(&self, listener: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.listeners.write_recovered().push(Arc::new(listener));
    }

    /// Re-runs resolution and publishes the result if it is valid.
    ///
    /// Failures are returned as [`ConfigError::ReloadFailed`] to every caller
    /// that shared the attempt. Once [`shutdown`](Self::shutdown) has been
    /// called this returns [`ConfigError::Cancelled`].
    pub fn reload(&self) -> Result<Arc<T>, ConfigError> {
        let observed = self.completed.load(Ordering::Acquire);
        let mut last = self.reload.lock_recovered();

        if self.completed.load(Ordering::Acquire) != observed {
            log::debug!("joined in-flight reload of {}", T::type_name());
            return match &last.failure {
                None => Ok(self.current()),
                Some(failure) => Err(ConfigError::ReloadFailed(Arc::clone(failure))),
            };
        }

        if self.is_shut_down() {
            return Err(ConfigError::Cancelled);
        }

        *self.state.write_recovered() = ResolutionState::Resolving;
        let outcome = self.resolver.resolve_until(&self.shutdown);

        let result = match outcome {
            Ok(_) | Err(ConfigError::Cancelled) if self.is_shut_down() => {
                log::debug!("reload of {} cancelled by shutdown", T::type_name());
                *self.state.write_recovered() = ResolutionState::Valid;
                return Err(ConfigError::Cancelled);
            }
            Ok(instance) => {
                let instance = Arc::new(instance);
                *self.current.write_recovered() = Arc::clone(&instance);
                *self.state.write_recovered() = ResolutionState::Valid;
                log::info!("reloaded {} settings", T::type_name());
                last.failure = None;
                Ok(instance)
            }
            Err(e) => {
                log::warn!("reload of {} failed, keeping previous settings: {e}", T::type_name());
                *self.state.write_recovered() = ResolutionState::Invalid;
                let failure = Arc::new(e);
                last.failure = Some(Arc::clone(&failure));
                Err(ConfigError::ReloadFailed(failure))
            }
        };

        self.completed.fetch_add(1, Ordering::AcqRel);
        drop(last);

        // Listeners may reload or panic; the outcome is already recorded.
        if let Ok(instance) = &result {
            self.notify(instance);
        }
        result
    }

    /// Cancels any running reload and refuses new ones.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn notify(&self, instance: &T) {
        let listeners = self.listeners.read_recovered().clone();
        for listener in listeners {
            listener(instance);
        }
    }
}

impl<T: Options> fmt::Debug for SettingsAccessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsAccessor")
            .field("type", &T::type_name())
            .field("state", &self.state())
            .field("reloads", &self.completed.load(Ordering::Relaxed))
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
