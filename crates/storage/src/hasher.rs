//! Order-independent row fingerprints for deduplication.
//!
//! Values must already be coerced to their stored column types; the hasher
//! does no normalisation of its own.

use sha2::{Digest, Sha256};

use crate::cell::Cell;

/// SHA-256 (hex) over the row's non-null fields, sorted by column name.
///
/// Each field is framed as `len(name) name tag len(value) value` so no two
/// distinct rows share an encoding. Nulls are skipped: a column back-filled
/// with NULL and a column that was never present hash the same.
pub fn fingerprint<'a, I>(fields: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a Cell)>,
{
    let mut present: Vec<(&str, &Cell)> = fields
        .into_iter()
        .filter(|(_, c)| !c.is_null())
        .collect();
    present.sort_by(|a, b| a.0.cmp(b.0));

    let mut hasher = Sha256::new();
    for (name, cell) in present {
        let (tag, text) = match cell {
            Cell::Null => continue,
            Cell::Integer(n) => (b'i', n.to_string()),
            Cell::Real(d) => (b'r', d.normalize().to_string()),
            Cell::Text(s) => (b't', s.clone()),
        };
        hasher.update((name.len() as u64).to_be_bytes());
        hasher.update(name.as_bytes());
        hasher.update([tag]);
        hasher.update((text.len() as u64).to_be_bytes());
        hasher.update(text.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn row(pairs: &[(&'static str, Cell)]) -> Vec<(&'static str, Cell)> {
        pairs.to_vec()
    }

    fn hash(pairs: &[(&'static str, Cell)]) -> String {
        fingerprint(pairs.iter().map(|(k, v)| (*k, v)))
    }

    #[test]
    fn key_order_does_not_matter() {
        let a = row(&[("name", Cell::Text("Bob".into())), ("amount", Cell::Integer(20))]);
        let b = row(&[("amount", Cell::Integer(20)), ("name", Cell::Text("Bob".into()))]);
        assert_eq!(hash(&a), hash(&b));
    }

    #[test]
    fn types_are_distinguished() {
        let int = row(&[("v", Cell::Integer(1))]);
        let text = row(&[("v", Cell::Text("1".into()))]);
        assert_ne!(hash(&int), hash(&text));
    }

    #[test]
    fn null_and_absent_columns_hash_alike() {
        let with_null = row(&[("a", Cell::Integer(1)), ("b", Cell::Null)]);
        let without = row(&[("a", Cell::Integer(1))]);
        assert_eq!(hash(&with_null), hash(&without));
    }

    #[test]
    fn framing_prevents_concatenation_collisions() {
        let a = row(&[("ab", Cell::Text("c".into()))]);
        let b = row(&[("a", Cell::Text("bc".into()))]);
        assert_ne!(hash(&a), hash(&b));
    }

    #[test]
    fn equal_decimals_hash_alike() {
        let a = row(&[("v", Cell::Real(Decimal::new(250, 2)))]);
        let b = row(&[("v", Cell::Real(Decimal::new(25, 1)))]);
        assert_eq!(hash(&a), hash(&b));
    }

    #[test]
    fn digest_is_hex_sha256() {
        let h = hash(&[]);
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
