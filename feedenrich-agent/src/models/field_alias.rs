//! Field alias table
//!
//! Feeds name the same attribute in several ways (French/English synonyms,
//! camelCase, capitalized headers). Every lookup of a canonical field goes
//! through [`lookup_field`] so the variants live in exactly one place.

use feedenrich_common::{FieldMap, FieldValue};

/// Canonical field → accepted variant names
pub const FIELD_ALIASES: &[(&str, &[&str])] = &[
    ("title", &["titre", "Title", "nom"]),
    ("description", &["Description"]),
    ("brand", &["marque"]),
    ("gtin", &["ean", "upc"]),
    ("link", &["url"]),
    ("image_link", &["image link", "imageLink", "image"]),
    ("color", &["couleur"]),
    ("material", &["matière", "matiere"]),
    ("pattern", &["motif"]),
    ("gender", &["genre"]),
];

/// Variant names for a canonical field (empty if it has none)
pub fn variants(canonical: &str) -> &'static [&'static str] {
    FIELD_ALIASES
        .iter()
        .find(|(c, _)| *c == canonical)
        .map(|(_, v)| *v)
        .unwrap_or(&[])
}

/// Map a feed field name to its canonical name
///
/// Unknown names are returned lowercased.
pub fn canonical_name(name: &str) -> String {
    let lower = name.to_lowercase();
    for (canonical, variants) in FIELD_ALIASES {
        if *canonical == lower || variants.iter().any(|v| v.to_lowercase() == lower) {
            return canonical.to_string();
        }
    }
    lower
}

/// Look up a canonical field in a record's field map
///
/// Tries, in order: the canonical name, each variant exactly, then a
/// case-insensitive match against all of them. Blank values are skipped so a
/// `"N/A"` under the canonical name does not hide a real value under a variant.
///
/// # Returns
/// The matching key as written in the map, and its value
pub fn lookup_field<'a>(map: &'a FieldMap, canonical: &str) -> Option<(&'a str, &'a FieldValue)> {
    let names: Vec<&str> = std::iter::once(canonical)
        .chain(variants(canonical).iter().copied())
        .collect();

    for name in &names {
        if let Some((key, value)) = map.get_key_value(*name) {
            if !value.is_blank() {
                return Some((key.as_str(), value));
            }
        }
    }

    for name in &names {
        let wanted = name.to_lowercase();
        if let Some((key, value)) = map
            .iter()
            .find(|(k, v)| k.to_lowercase() == wanted && !v.is_blank())
        {
            return Some((key.as_str(), value));
        }
    }

    None
}

/// Display text of a canonical field, or `""` if absent/blank
pub fn field_text(map: &FieldMap, canonical: &str) -> String {
    lookup_field(map, canonical)
        .map(|(_, v)| v.to_display_string().trim().to_string())
        .unwrap_or_default()
}
