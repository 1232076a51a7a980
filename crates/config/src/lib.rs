//! Configuration for debrix.
//!
//! Two kinds of configuration exist side by side:
//! - [`Settings`]: process-wide, loaded once at startup from defaults, a
//!   TOML file and the environment.
//! - [`UserConfig`]: per request, decoded from the URL the media client
//!   calls. Holds the user's provider keys and filter preferences.

pub mod error;
mod settings;
mod user;

pub use crate::settings::{
    CacheSettings, DatabaseSettings, DebridSettings, ENV_PREFIX, HttpSettings, LockSettings, MetadataSettings,
    ProviderSettings, ServerSettings, Settings, SourceSettings,
};
pub use crate::user::{ProviderCredential, SERVICES, UserConfig};
