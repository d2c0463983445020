//! LMDB implementation of MetaStore.

use typhoon_store::meta::MetaStore;
use typhoon_store::StoreError;

use crate::{LmdbError, LmdbStore};

const SCHEMA_VERSION_KEY: &[u8] = b"schema_version";

impl MetaStore for LmdbStore {
    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.dbs
            .meta
            .put(&mut wtxn, key.as_bytes(), value)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let val = self
            .dbs
            .meta
            .get(&rtxn, key.as_bytes())
            .map_err(LmdbError::from)?;
        Ok(val.map(|v| v.to_vec()))
    }

    fn get_schema_version(&self) -> Result<u32, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let val = self
            .dbs
            .meta
            .get(&rtxn, SCHEMA_VERSION_KEY)
            .map_err(LmdbError::from)?;
        match val {
            Some(bytes) => {
                let arr: [u8; 4] = bytes.try_into().map_err(|_| {
                    LmdbError::Corruption("schema_version has unexpected byte length".into())
                })?;
                Ok(u32::from_le_bytes(arr))
            }
            None => Ok(0),
        }
    }

    fn set_schema_version(&self, version: u32) -> Result<(), StoreError> {
        let bytes = version.to_le_bytes();
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.dbs
            .meta
            .put(&mut wtxn, SCHEMA_VERSION_KEY, &bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_decimals_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LmdbStore::open(dir.path(), 16 * 1024 * 1024).unwrap();
        assert_eq!(store.token_decimals().unwrap(), None);
        store.set_token_decimals(6).unwrap();
        assert_eq!(store.token_decimals().unwrap(), Some(6));
    }

    #[test]
    fn missing_meta_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = LmdbStore::open(dir.path(), 16 * 1024 * 1024).unwrap();
        assert_eq!(store.get_meta("nope").unwrap(), None);
    }
}
