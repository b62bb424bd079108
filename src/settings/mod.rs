//! Runtime access to resolved settings.

mod accessor;
mod global;
#[cfg(feature = "watch")]
mod watch;

pub use accessor::{ResolutionState, SettingsAccessor};
pub use global::GlobalSettings;
#[cfg(feature = "watch")]
pub use watch::ConfigWatcher;
