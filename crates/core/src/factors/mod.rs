//! Emission factor table: versioned, read-only mapping from category key to
//! factor value, unit and source citation.
//!
//! Tables are loaded whole (embedded default or a TOML file) and never edited
//! in place. A new factor year means a new table with a new `version`.

pub mod loader;
pub mod table;

pub use loader::TableError;
pub use table::{EmissionFactorEntry, FactorTable, FactorUnit};

/// Normalizes free-text category input to a table key.
///
/// Trims, lowercases, and collapses every run of whitespace, `-` or `_` into a
/// single `_`, so `" Truk  Diesel-Kecil "` and `truk_diesel_kecil` are the same key.
pub fn normalize_key(raw: &str) -> String {
    let mut key = String::with_capacity(raw.len());
    let mut pending_separator = false;

    for ch in raw.trim().chars() {
        if ch.is_whitespace() || ch == '-' || ch == '_' {
            pending_separator = true;
            continue;
        }
        if pending_separator && !key.is_empty() {
            key.push('_');
        }
        pending_separator = false;
        key.extend(ch.to_lowercase());
    }

    key
}

#[cfg(test)]
mod tests {
    use super::normalize_key;

    #[test]
    fn normalize_collapses_separators_and_case() {
        assert_eq!(normalize_key(" Truk  Diesel-Kecil "), "truk_diesel_kecil");
        assert_eq!(normalize_key("listrik__jawa_bali"), "listrik_jawa_bali");
        assert_eq!(normalize_key("PESAWAT"), "pesawat");
    }

    #[test]
    fn normalize_drops_leading_and_trailing_separators() {
        assert_eq!(normalize_key("_lpg_"), "lpg");
        assert_eq!(normalize_key("   "), "");
    }
}
