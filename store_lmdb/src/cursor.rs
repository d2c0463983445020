//! LMDB implementation of CursorStore.

use typhoon_store::cursor::CursorStore;
use typhoon_store::StoreError;

use crate::{LmdbError, LmdbStore};

const CURSOR_KEY: &[u8] = b"last_processed_block";

fn decode(bytes: &[u8]) -> Result<u64, LmdbError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| LmdbError::Corruption("cursor has unexpected byte length".into()))?;
    Ok(u64::from_be_bytes(arr))
}

impl CursorStore for LmdbStore {
    fn cursor(&self) -> Result<Option<u64>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        match self.dbs.meta.get(&rtxn, CURSOR_KEY).map_err(LmdbError::from)? {
            Some(bytes) => Ok(Some(decode(bytes)?)),
            None => Ok(None),
        }
    }

    fn init_cursor(&self, initial: u64) -> Result<u64, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        if let Some(bytes) = self.dbs.meta.get(&wtxn, CURSOR_KEY).map_err(LmdbError::from)? {
            return Ok(decode(bytes)?);
        }
        self.dbs
            .meta
            .put(&mut wtxn, CURSOR_KEY, &initial.to_be_bytes())
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        tracing::info!(cursor = initial, "cursor initialized");
        Ok(initial)
    }

    fn advance_cursor(&self, height: u64) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        if let Some(bytes) = self.dbs.meta.get(&wtxn, CURSOR_KEY).map_err(LmdbError::from)? {
            let current = decode(bytes)?;
            if height < current {
                return Err(StoreError::CursorRegression {
                    current,
                    requested: height,
                });
            }
            if height == current {
                return Ok(());
            }
        }
        self.dbs
            .meta
            .put(&mut wtxn, CURSOR_KEY, &height.to_be_bytes())
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}
