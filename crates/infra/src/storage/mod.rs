//! Credential and preference storage adapters

pub mod keychain;
pub mod preferences;

pub use keychain::KeychainSecureStore;
pub use preferences::FilePreferenceStore;
