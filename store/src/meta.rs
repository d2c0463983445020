//! Metadata storage trait.

use crate::StoreError;

/// Meta key under which the payment token's decimal count is persisted.
pub const TOKEN_DECIMALS_KEY: &str = "token_decimals";

/// Generic key-value store for internal bookkeeping that doesn't belong in
/// any domain-specific store (schema version, token decimals).
pub trait MetaStore {
    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Retrieve a metadata value, `None` if absent.
    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    fn get_schema_version(&self) -> Result<u32, StoreError>;

    fn set_schema_version(&self, version: u32) -> Result<(), StoreError>;

    fn token_decimals(&self) -> Result<Option<u8>, StoreError> {
        Ok(self
            .get_meta(TOKEN_DECIMALS_KEY)?
            .and_then(|bytes| bytes.first().copied()))
    }

    fn set_token_decimals(&self, decimals: u8) -> Result<(), StoreError> {
        self.put_meta(TOKEN_DECIMALS_KEY, &[decimals])
    }
}
