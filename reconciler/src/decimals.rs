//! Payment token decimals: needed only to format raw amounts for display.

use typhoon_chain::ChainReader;
use typhoon_store::MetaStore;

use crate::{ConfigError, ReconcilerConfig};

/// Decide the decimal count once at startup and persist it.
///
/// An explicit `token_decimals` wins, but must agree with any value already
/// stored. Otherwise the stored value is reused, and only a fresh mirror asks
/// the payment token's `decimals()`.
pub async fn resolve_token_decimals<S: MetaStore + ?Sized>(
    config: &ReconcilerConfig,
    store: &S,
    chain: &dyn ChainReader,
) -> Result<u8, ConfigError> {
    let stored = store.token_decimals()?;

    if let Some(configured) = config.token_decimals {
        if let Some(stored) = stored.filter(|s| *s != configured) {
            return Err(ConfigError::DecimalsConflict { configured, stored });
        }
        if stored.is_none() {
            store.set_token_decimals(configured)?;
        }
        return Ok(configured);
    }

    if let Some(stored) = stored {
        tracing::debug!(decimals = stored, "using stored token decimals");
        return Ok(stored);
    }

    let token = config.payment_token()?.ok_or(ConfigError::MissingDecimals)?;
    let decimals = chain
        .token_decimals(&token)
        .await
        .map_err(|e| ConfigError::DecimalsUnavailable(e.to_string()))?;
    store.set_token_decimals(decimals)?;
    tracing::info!(%token, decimals, "read payment token decimals");
    Ok(decimals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use typhoon_nullables::{NullMirrorStore, ScriptedChain};
    use typhoon_types::EvmAddress;

    const TOKEN: &str = "0x2222222222222222222222222222222222222222";

    fn chain() -> ScriptedChain {
        let chain = ScriptedChain::new(EvmAddress::new([0x11; 20]));
        chain.set_decimals(EvmAddress::parse(TOKEN).unwrap(), 6);
        chain
    }

    #[tokio::test]
    async fn reads_token_once_then_reuses_store() {
        let store = NullMirrorStore::new();
        let config = ReconcilerConfig {
            payment_token_address: Some(TOKEN.into()),
            ..ReconcilerConfig::default()
        };
        assert_eq!(resolve_token_decimals(&config, &store, &chain()).await.unwrap(), 6);

        // A chain that no longer answers is not consulted again.
        let silent = ScriptedChain::new(EvmAddress::new([0x11; 20]));
        assert_eq!(resolve_token_decimals(&config, &store, &silent).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn configured_value_must_match_store() {
        let store = NullMirrorStore::new();
        store.set_token_decimals(18).unwrap();
        let config = ReconcilerConfig {
            token_decimals: Some(6),
            ..ReconcilerConfig::default()
        };
        assert!(matches!(
            resolve_token_decimals(&config, &store, &chain()).await,
            Err(ConfigError::DecimalsConflict {
                configured: 6,
                stored: 18
            })
        ));
    }

    #[tokio::test]
    async fn unreadable_token_is_fatal() {
        let store = NullMirrorStore::new();
        let config = ReconcilerConfig {
            payment_token_address: Some("0x3333333333333333333333333333333333333333".into()),
            ..ReconcilerConfig::default()
        };
        assert!(matches!(
            resolve_token_decimals(&config, &store, &chain()).await,
            Err(ConfigError::DecimalsUnavailable(_))
        ));
        assert_eq!(store.token_decimals().unwrap(), None);
    }
}
