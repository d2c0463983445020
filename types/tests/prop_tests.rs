use proptest::prelude::*;

use typhoon_types::{
    format_quantity, parse_quantity, BlockRange, EventKey, EvmAddress, TokenAmount, TxHash,
};

proptest! {
    /// The next range always starts right after the cursor, never passes the
    /// head and never exceeds the configured width.
    #[test]
    fn following_range_is_bounded(
        cursor in 0u64..1_000_000,
        ahead in 0u64..10_000,
        behind in 0u64..10_000,
        max_len in 1u64..5_000,
    ) {
        let head = cursor + ahead;
        match BlockRange::following(cursor, head, max_len) {
            Some(range) => {
                prop_assert_eq!(range.from, cursor + 1);
                prop_assert!(range.to <= head);
                prop_assert!(range.len() <= max_len);
                prop_assert!(range.from <= range.to);
            }
            None => prop_assert_eq!(ahead, 0),
        }
        // A head behind the cursor never yields a range.
        prop_assert!(BlockRange::following(cursor, cursor.saturating_sub(behind), max_len).is_none());
    }

    /// Bisection halves cover the parent exactly with no overlap.
    #[test]
    fn bisect_partitions_range(from in 0u64..1_000_000, extra in 1u64..10_000) {
        let range = BlockRange::new(from, from + extra).unwrap();
        let (lower, upper) = range.bisect().unwrap();
        prop_assert_eq!(lower.from, range.from);
        prop_assert_eq!(upper.to, range.to);
        prop_assert_eq!(lower.to + 1, upper.from);
        prop_assert_eq!(lower.len() + upper.len(), range.len());
    }

    /// Byte order of encoded event keys matches key order, so LMDB iteration
    /// follows `(tx_hash, log_index)`.
    #[test]
    fn event_key_bytes_sort_like_keys(
        a in prop::array::uniform32(0u8..), ia in 0u64..u64::MAX,
        b in prop::array::uniform32(0u8..), ib in 0u64..u64::MAX,
    ) {
        let ka = EventKey::new(TxHash::new(a), ia);
        let kb = EventKey::new(TxHash::new(b), ib);
        prop_assert_eq!(ka.cmp(&kb), ka.to_bytes().cmp(&kb.to_bytes()));
        prop_assert_eq!(EventKey::from_bytes(&ka.to_bytes()), Some(ka));
    }

    /// Checksummed and lower-case spellings parse to the same address.
    #[test]
    fn address_parse_ignores_case(bytes in prop::array::uniform20(0u8..)) {
        let addr = EvmAddress::new(bytes);
        let upper = format!("0x{}", addr.to_hex()[2..].to_uppercase());
        prop_assert_eq!(EvmAddress::parse(&upper).unwrap(), addr);
        prop_assert_eq!(EvmAddress::from_word(&addr.to_word()), Some(addr));
    }

    #[test]
    fn quantities_parse_what_they_format(n in 0u64..u64::MAX) {
        prop_assert_eq!(parse_quantity(&format_quantity(n)).unwrap(), n);
    }

    /// Formatting never loses the integer part and has at most `decimals`
    /// fractional digits.
    #[test]
    fn format_units_keeps_integer_part(raw in 0u128..u128::MAX, decimals in 0u8..30) {
        let text = TokenAmount::new(raw).format_units(decimals);
        let scale = 10u128.pow(decimals as u32);
        let (int_part, frac) = match text.split_once('.') {
            Some((i, f)) => (i.to_string(), f.to_string()),
            None => (text.clone(), String::new()),
        };
        prop_assert_eq!(int_part, (raw / scale).to_string());
        prop_assert!(frac.len() <= decimals as usize);
        prop_assert!(!frac.ends_with('0'));
    }
}
