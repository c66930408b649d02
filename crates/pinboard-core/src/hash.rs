///
/// FNV-1a 64-bit hash (compile-time safe).
///
/// Used for **card identity fingerprints**: a stable, deterministic digest
/// over a card's persisted identifier (or creation nonce) and its collection
/// membership. Identity equality is how reconciliation matches cards across
/// authoritative batches, so the digest must be stable across platforms and
/// process restarts.
///
/// - Deterministic across compilers and platforms
/// - `const fn`-compatible, so fixture identities can be computed at compile time
/// - Not cryptographically secure; never use for authentication or signatures
///
/// Reference: Fowler–Noll–Vo hash, FNV-1a variant (64-bit, prime = 0x100000001b3)
///
#[must_use]
#[allow(clippy::unreadable_literal)]
pub const fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf29ce484222325u64;
    let mut i = 0;

    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(0x100000001b3);
        i += 1;
    }

    hash
}

/// Continue an FNV-1a digest with more bytes.
///
/// Lets identity fingerprints fold several fields into one digest without an
/// intermediate buffer.
#[must_use]
#[allow(clippy::unreadable_literal)]
pub const fn fnv1a_64_continue(mut hash: u64, bytes: &[u8]) -> u64 {
    let mut i = 0;

    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(0x100000001b3);
        i += 1;
    }

    hash
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::{fnv1a_64, fnv1a_64_continue};

    // Compile-time hash should match the runtime calculation for stability across platforms.
    const CARD_HASH: u64 = fnv1a_64(b"card");

    #[test]
    fn produces_expected_reference_values() {
        assert_eq!(CARD_HASH, fnv1a_64(b"card"));
        assert_eq!(fnv1a_64(b""), 0xcbf29ce484222325);
        assert_ne!(fnv1a_64(b"pinboard"), fnv1a_64(b"Pinboard"));
    }

    #[test]
    fn continuation_matches_single_pass() {
        let one_pass = fnv1a_64(b"recordcollection");
        let continued = fnv1a_64_continue(fnv1a_64(b"record"), b"collection");

        assert_eq!(one_pass, continued);
    }
}
