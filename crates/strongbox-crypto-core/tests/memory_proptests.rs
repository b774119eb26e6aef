#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Property-based tests for secret memory wrappers.

use proptest::prelude::*;
use strongbox_crypto_core::memory::{constant_time_eq, SecretBuffer, SecretBytes};

proptest! {
    /// SecretBuffer roundtrip: new(data).expose() == data
    #[test]
    fn secret_buffer_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..1024)) {
        let buf = SecretBuffer::new(&data);
        prop_assert_eq!(buf.expose(), data.as_slice());
        prop_assert_eq!(buf.len(), data.len());
        prop_assert_eq!(buf.is_empty(), data.is_empty());
    }

    /// Debug and Display are always the masked string.
    #[test]
    fn secret_buffer_formatting_never_leaks(data in proptest::collection::vec(any::<u8>(), 1..256)) {
        let buf = SecretBuffer::from_vec(data);
        prop_assert_eq!(format!("{buf:?}"), "SecretBuffer(***)");
        prop_assert_eq!(format!("{buf}"), "SecretBuffer(***)");
    }

    /// constant_time_eq agrees with ordinary equality.
    #[test]
    fn constant_time_eq_matches_eq(
        a in proptest::collection::vec(any::<u8>(), 0..64),
        b in proptest::collection::vec(any::<u8>(), 0..64),
    ) {
        prop_assert_eq!(constant_time_eq(&a, &b), a == b);
        prop_assert!(constant_time_eq(&a, &a));
    }
}

#[test]
fn secret_bytes_random_differ() {
    let a = SecretBytes::<32>::random().unwrap();
    let b = SecretBytes::<32>::random().unwrap();
    assert_ne!(a.expose(), b.expose());
    assert!(!a.is_zeroed());
}
