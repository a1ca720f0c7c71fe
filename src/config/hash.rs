//! Stack fingerprinting for change detection.
//!
//! A fingerprint is a SHA-256 digest over the exact template bytes and the
//! parameter mapping with its keys sorted. It is stored on the live stack as
//! the `STAX_HASH` tag so an unchanged stack can be recognised without
//! staging a changeset.

use sha2::{Digest, Sha256};

/// Tag under which the fingerprint is stored on the live stack.
pub const FINGERPRINT_TAG: &str = "STAX_HASH";

/// Hasher for computing stack fingerprints.
#[derive(Debug, Default, Clone, Copy)]
pub struct Fingerprinter;

impl Fingerprinter {
    /// Creates a new fingerprinter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the fingerprint of a template and its parameters.
    ///
    /// Parameter order does not matter. Every field is length-prefixed so
    /// that moving bytes between a key and its value changes the digest.
    #[must_use]
    pub fn fingerprint<'a, I>(&self, template: &[u8], parameters: I) -> String
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut sorted: Vec<(&str, &str)> = parameters.into_iter().collect();
        sorted.sort_unstable();

        let mut hasher = Sha256::new();
        update_field(&mut hasher, template);
        hasher.update((sorted.len() as u64).to_be_bytes());
        for (key, value) in sorted {
            update_field(&mut hasher, key.as_bytes());
            update_field(&mut hasher, value.as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Hashes raw template content, used to name uploaded template objects.
    #[must_use]
    pub fn template_hash(&self, template: &[u8]) -> String {
        hex::encode(Sha256::digest(template))
    }

    /// Returns true if the stored marker is absent or differs from the computed digest.
    #[must_use]
    pub fn needs_update(stored: Option<&str>, computed: &str) -> bool {
        stored.is_none_or(|marker| !Self::hashes_match(marker, computed))
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(hash: &str) -> String {
        hash.chars().take(8).collect()
    }

    /// Compares two hashes to determine if they are equal.
    #[must_use]
    pub fn hashes_match(hash1: &str, hash2: &str) -> bool {
        if hash1.len() != hash2.len() {
            return false;
        }

        hash1
            .bytes()
            .zip(hash2.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}
