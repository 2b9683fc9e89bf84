use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::ElementSymbol;

/// How element symbols are folded into a composition key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyMode {
    /// Every atom's symbol, sorted and concatenated (`CCHHHHO`).
    #[default]
    Multiset,
    /// Unique symbols only, sorted and concatenated (`CHO`).
    ElementSet,
}

/// Canonical identifier of a structure's chemical composition.
///
/// Ordering is lexicographic on the rendered key, so maps keyed by
/// `CompositionKey` iterate deterministically.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    bitcode::Encode,
    bitcode::Decode,
)]
pub struct CompositionKey(String);

impl CompositionKey {
    /// Build a key from per-atom symbols.
    pub fn from_symbols<S: AsRef<str>>(symbols: &[S], mode: KeyMode) -> Self {
        let mut sorted: Vec<&str> = symbols.iter().map(AsRef::as_ref).collect();
        sorted.sort_unstable();
        if mode == KeyMode::ElementSet {
            sorted.dedup();
        }
        Self(sorted.concat())
    }

    /// Wrap an already rendered key (for example one read back from a report).
    pub fn from_rendered(rendered: impl Into<String>) -> Self {
        Self(rendered.into())
    }

    /// Rendered key, e.g. `HHO`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CompositionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Sorted unique element symbols present in `symbols`.
pub fn species_of<S: AsRef<str>>(symbols: &[S]) -> Vec<ElementSymbol> {
    let mut species: Vec<ElementSymbol> = symbols.iter().map(|s| s.as_ref().to_string()).collect();
    species.sort_unstable();
    species.dedup();
    species
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiset_key_keeps_every_atom() {
        let key = CompositionKey::from_symbols(&["O", "H", "C", "H"], KeyMode::Multiset);
        assert_eq!(key.as_str(), "CHHO");
    }

    #[test]
    fn element_set_key_drops_repeats() {
        let key = CompositionKey::from_symbols(&["O", "H", "C", "H"], KeyMode::ElementSet);
        assert_eq!(key.as_str(), "CHO");
        assert_eq!(key.to_string(), "CHO");
    }

    #[test]
    fn two_letter_symbols_sort_bytewise() {
        let key = CompositionKey::from_symbols(&["H", "Cu", "C"], KeyMode::ElementSet);
        assert_eq!(key.as_str(), "CCuH");
        assert_eq!(species_of(&["H", "Cu", "C", "H"]), vec!["C", "Cu", "H"]);
    }

    #[test]
    fn empty_structure_has_empty_key() {
        let symbols: [&str; 0] = [];
        assert_eq!(CompositionKey::from_symbols(&symbols, KeyMode::Multiset).as_str(), "");
    }
}
