//! Prefixed unique id strings for persisted entities.

use uuid::Uuid;

/// Length of a generated uid: one prefix letter plus a simple uuid.
pub const UID_LEN: usize = 33;

/// Returns a new unique id with a one-letter type prefix, e.g. `m…` for
/// markers, `j…` for subjects, `f…` for files, `p…` for photos.
pub fn new_uid(prefix: char) -> String {
    format!("{}{}", prefix, Uuid::new_v4().simple())
}

/// Reports whether `s` looks like a uid generated for the given prefix.
pub fn is_uid(s: &str, prefix: char) -> bool {
    s.len() == UID_LEN
        && s.starts_with(prefix)
        && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}
