use std::fmt;
use std::sync::{Arc, Mutex, RwLock, TryLockError};

use crate::config::{ConfigError, Options, Resolver};
use crate::sync::{MutexExt, RwLockExt};

use super::accessor::{ResolutionState, SettingsAccessor};

/// Process-wide settings, resolved the first time they are used.
///
/// ```no_run
/// use options_fnd::{Config, FieldSpec, GlobalSettings, Options, Resolver, Schema};
/// # #[derive(serde::Deserialize)]
/// # struct AppSettings { name: String }
/// # impl Options for AppSettings {
/// #     fn schema() -> Schema { Schema::new().field(FieldSpec::string("name")) }
/// # }
///
/// fn app_settings() -> Resolver<AppSettings> {
///     Config::builder().with_file("app.toml", true).options()
/// }
///
/// static SETTINGS: GlobalSettings<AppSettings> = GlobalSettings::new(app_settings);
///
/// let name = SETTINGS.current()?.name.clone();
/// # Ok::<(), options_fnd::ConfigError>(())
/// ```
pub struct GlobalSettings<T: Options> {
    factory: fn() -> Resolver<T>,
    accessor: RwLock<Option<Arc<SettingsAccessor<T>>>>,
    init: Mutex<()>,
}

impl<T: Options> GlobalSettings<T> {
    pub const fn new(factory: fn() -> Resolver<T>) -> Self {
        Self {
            factory,
            accessor: RwLock::new(None),
            init: Mutex::new(()),
        }
    }

    /// The shared accessor, resolving it on first use.
    ///
    /// A failed first resolution is returned and retried on the next call.
    pub fn get(&self) -> Result<Arc<SettingsAccessor<T>>, ConfigError> {
        if let Some(accessor) = self.installed() {
            return Ok(accessor);
        }

        let _init = self.init.lock_recovered();
        if let Some(accessor) = self.installed() {
            return Ok(accessor);
        }

        let accessor = Arc::new(SettingsAccessor::resolve((self.factory)())?);
        *self.accessor.write_recovered() = Some(Arc::clone(&accessor));
        Ok(accessor)
    }

    pub fn current(&self) -> Result<Arc<T>, ConfigError> {
        Ok(self.get()?.current())
    }

    /// Reloads the installed accessor, or resolves it if there is none yet.
    pub fn reload(&self) -> Result<Arc<T>, ConfigError> {
        match self.installed() {
            Some(accessor) => accessor.reload(),
            None => self.current(),
        }
    }

    /// Drops the installed accessor so the next use resolves from scratch.
    ///
    /// Holders of the previous accessor keep it working.
    pub fn reset(&self) {
        let _init = self.init.lock_recovered();
        if self.accessor.write_recovered().take().is_some() {
            log::debug!("reset global {} settings", T::type_name());
        }
    }

    pub fn state(&self) -> ResolutionState {
        if let Some(accessor) = self.installed() {
            return accessor.state();
        }
        match self.init.try_lock() {
            Err(TryLockError::WouldBlock) => ResolutionState::Resolving,
            _ => ResolutionState::Unresolved,
        }
    }

    fn installed(&self) -> Option<Arc<SettingsAccessor<T>>> {
        self.accessor.read_recovered().clone()
    }
}

impl<T: Options> fmt::Debug for GlobalSettings<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalSettings")
            .field("type", &T::type_name())
            .field("state", &self.state())
            .finish()
    }
}
