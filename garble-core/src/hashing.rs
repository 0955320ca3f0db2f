//! Salted, export-preserving name hashing

use crate::syntax::SourceUnit;
use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest, Sha256};

/// Number of digest characters kept after the sentinel.
pub const HASH_LENGTH: usize = 8;

/// Sentinel for names that were exported.
pub const EXPORTED_SENTINEL: char = 'Z';

/// Sentinel for names that were not exported.
pub const UNEXPORTED_SENTINEL: char = 'z';

/// Whether `name` is exported under Go's convention (leading upper-case letter).
pub fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// Hash `value` with `salt` into a valid Go identifier of `1 + HASH_LENGTH` characters.
///
/// The first character keeps the export status of `value`; the rest is a slice of
/// `sha256(salt || value)` in an identifier-safe base64 alphabet, where `+` becomes `_`
/// and `/` becomes `z`.
pub fn hash_with(salt: &str, value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(value.as_bytes());
    let digest = hasher.finalize();

    let encoded = general_purpose::STANDARD_NO_PAD.encode(digest);
    let sentinel = if is_exported(value) {
        EXPORTED_SENTINEL
    } else {
        UNEXPORTED_SENTINEL
    };

    let mut hashed = String::with_capacity(HASH_LENGTH + 1);
    hashed.push(sentinel);
    hashed.extend(encoded.chars().take(HASH_LENGTH).map(|c| match c {
        '+' => '_',
        '/' => 'z',
        c => c,
    }));
    hashed
}

/// Hash a file name together with the package it declares, so equally named
/// files in different packages do not collide.
pub fn hash_file_name(salt: &str, original_name: &str, unit: &SourceUnit) -> String {
    hash_file_name_in(salt, unit.package_name().unwrap_or_default(), original_name)
}

/// [`hash_file_name`] for callers that already know the package name.
pub fn hash_file_name_in(salt: &str, package_name: &str, original_name: &str) -> String {
    let combined = format!("{}{}", package_name, original_name);
    hash_with(salt, &combined)
}

/// Whether `token` has the shape of a value produced by [`hash_with`].
pub fn looks_hashed(token: &str) -> bool {
    token.len() == HASH_LENGTH + 1
        && token.starts_with([EXPORTED_SENTINEL, UNEXPORTED_SENTINEL])
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}
