pub mod asset;
pub mod permissions;
pub mod tags;
pub mod user;

/// Lowercases `s` the Unicode way.
///
/// SQLite's `LOWER` and `LIKE` only fold ASCII, so anything compared without
/// case is stored (and searched) in this form instead.
pub(crate) fn fold_case(s: &str) -> String {
    s.trim().to_lowercase()
}
