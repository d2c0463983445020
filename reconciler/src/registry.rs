//! Account registration: the only writer besides the projector, and only
//! ever for fresh rows with zeroed aggregates.

use rand::Rng;

use typhoon_store::{Account, AccountStore};
use typhoon_types::{EvmAddress, Timestamp};

use crate::RegistrationError;

pub const REFERRAL_ID_LEN: usize = 8;
pub const MAX_USERNAME_LEN: usize = 32;

const REFERRAL_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const REFERRAL_ID_ATTEMPTS: usize = 8;

/// A fresh `[a-z0-9]{8}` referral code.
pub fn generate_referral_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..REFERRAL_ID_LEN)
        .map(|_| REFERRAL_ALPHABET[rng.gen_range(0..REFERRAL_ALPHABET.len())] as char)
        .collect()
}

/// Trimmed username, or why it is unacceptable.
pub fn validate_username(raw: &str) -> Result<String, RegistrationError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(RegistrationError::InvalidUsername("empty".into()));
    }
    if name.chars().count() > MAX_USERNAME_LEN {
        return Err(RegistrationError::InvalidUsername(format!(
            "longer than {MAX_USERNAME_LEN} characters"
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
    {
        return Err(RegistrationError::InvalidUsername(format!(
            "character '{bad}' not allowed"
        )));
    }
    Ok(name.to_string())
}

/// Register `wallet` under `username` with a random referral id from the
/// thread-local CSPRNG.
pub fn register<S: AccountStore + ?Sized>(
    store: &S,
    wallet: &str,
    username: &str,
) -> Result<Account, RegistrationError> {
    register_with_rng(store, wallet, username, Timestamp::now(), &mut rand::thread_rng())
}

pub fn register_with_rng<S: AccountStore + ?Sized, R: Rng + ?Sized>(
    store: &S,
    wallet: &str,
    username: &str,
    now: Timestamp,
    rng: &mut R,
) -> Result<Account, RegistrationError> {
    let wallet =
        EvmAddress::parse(wallet).map_err(|_| RegistrationError::InvalidWallet(wallet.into()))?;
    if wallet.is_zero() {
        return Err(RegistrationError::InvalidWallet(wallet.to_string()));
    }
    let username = validate_username(username)?;
    if store.account_by_wallet(&wallet)?.is_some() {
        return Err(RegistrationError::Taken(format!("wallet {wallet}")));
    }

    for _ in 0..REFERRAL_ID_ATTEMPTS {
        let referral_id = generate_referral_id(rng);
        if store.account_by_referral_id(&referral_id)?.is_some() {
            tracing::debug!(%referral_id, "referral id collision, drawing again");
            continue;
        }
        let account = store.register_account(&wallet, &username, &referral_id, now)?;
        tracing::info!(
            id = account.id,
            %wallet,
            username = %account.username,
            referral_id = %account.referral_id,
            "account registered"
        );
        return Ok(account);
    }
    Err(RegistrationError::ReferralIdExhausted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use typhoon_nullables::NullMirrorStore;

    const WALLET: &str = "0x00000000000000000000000000000000000000aa";

    #[test]
    fn referral_ids_use_lowercase_alphanumerics() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let id = generate_referral_id(&mut rng);
            assert_eq!(id.len(), REFERRAL_ID_LEN);
            assert!(id.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
        }
    }

    #[test]
    fn usernames_are_trimmed_and_checked() {
        assert_eq!(validate_username("  alice_1 ").unwrap(), "alice_1");
        assert!(validate_username("   ").is_err());
        assert!(validate_username("bob smith").is_err());
        assert!(validate_username(&"x".repeat(MAX_USERNAME_LEN + 1)).is_err());
    }

    #[test]
    fn registration_creates_zeroed_row() {
        let store = NullMirrorStore::new();
        let account = register(&store, WALLET, "alice").unwrap();
        assert_eq!(account.username, "alice");
        assert_eq!(account.sponsor_referral_id, None);
        assert_eq!(account.team_size, 0);
        assert_eq!(
            store.account_by_referral_id(&account.referral_id).unwrap().unwrap().wallet,
            account.wallet
        );
    }

    #[test]
    fn wallet_and_username_are_unique() {
        let store = NullMirrorStore::new();
        register(&store, WALLET, "alice").unwrap();
        assert!(matches!(
            register(&store, WALLET, "other"),
            Err(RegistrationError::Taken(_))
        ));
        assert!(matches!(
            register(&store, "0x00000000000000000000000000000000000000bb", "ALICE"),
            Err(RegistrationError::Taken(_))
        ));
        assert!(matches!(
            register(&store, "0x1234", "carol"),
            Err(RegistrationError::InvalidWallet(_))
        ));
    }

    #[test]
    fn colliding_referral_ids_are_redrawn() {
        let store = NullMirrorStore::new();
        let first = register_with_rng(
            &store,
            WALLET,
            "alice",
            Timestamp::EPOCH,
            &mut StdRng::seed_from_u64(1),
        )
        .unwrap();
        // Same seed: the first draw collides, the second does not.
        let second = register_with_rng(
            &store,
            "0x00000000000000000000000000000000000000bb",
            "bob",
            Timestamp::EPOCH,
            &mut StdRng::seed_from_u64(1),
        )
        .unwrap();
        assert_ne!(first.referral_id, second.referral_id);
    }
}
