use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    /// The backing store failed.
    #[error("settings store error: {0}")]
    Store(#[from] kiln_store::StoreError),
}

pub type Result<T> = std::result::Result<T, SettingsError>;
