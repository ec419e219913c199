//! `kiln-settings`: cached access to the persisted settings table.
//!
//! [`SettingsCache`] is a plain process-wide key/value map with no expiry.
//! [`Settings`] layers the typed getters on top: read the cache, fall
//! through to the store on a miss, resolve the compiled-in default, and
//! populate the cache. Writers go through [`Settings::update`], which
//! flushes the cache once the rows are committed.

pub mod cache;
pub mod error;
pub mod settings;

pub use cache::SettingsCache;
pub use error::{Result, SettingsError};
pub use settings::{keys, Settings, SettingsDefaults, SettingsUpdate};
