//! Deterministic heading anchors.
//!
//! Anchors follow the GitHub convention so links written by hand in a note
//! (`[see below](#whats-new)`) keep working: text is lowercased, characters
//! other than letters, digits, `-` and `_` are dropped and whitespace becomes
//! `-`. Duplicates within one document receive a monotonic counter suffix
//! (`intro`, `intro-1`, `intro-2`).

use std::collections::HashMap;

/// Derive the base anchor for a heading without any uniqueness suffix.
///
/// Returns `None` when nothing representable is left, for example a heading
/// made only of punctuation or emoji.
pub fn derive_anchor(heading: &str) -> Option<String> {
    let mut anchor = String::with_capacity(heading.len());

    for ch in heading.trim().chars() {
        if ch.is_whitespace() {
            anchor.push('-');
        } else if ch.is_alphanumeric() || ch == '-' || ch == '_' {
            anchor.extend(ch.to_lowercase());
        }
    }

    (!anchor.is_empty()).then_some(anchor)
}

/// Generates unique anchors for the headings of a single document, in order.
#[derive(Default, Debug)]
pub struct AnchorSlugger {
    occurrences: HashMap<String, usize>,
}

impl AnchorSlugger {
    /// Create a new slugger instance.
    pub fn new() -> Self {
        Self {
            occurrences: HashMap::new(),
        }
    }

    /// Generate an anchor for the provided heading text, unique within this
    /// slugger. Headings that cannot produce an anchor return `None` and do
    /// not consume a counter.
    pub fn anchor_for(&mut self, heading: &str) -> Option<String> {
        let base = derive_anchor(heading)?;
        let mut candidate = base.clone();

        while self.occurrences.contains_key(&candidate) {
            let count = self.occurrences.entry(base.clone()).or_insert(0);
            *count += 1;
            candidate = format!("{base}-{count}");
        }

        self.occurrences.insert(candidate.clone(), 0);
        Some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_anchor_lowercases_and_hyphenates() {
        assert_eq!(derive_anchor("Hello World").as_deref(), Some("hello-world"));
        assert_eq!(derive_anchor("What's new?").as_deref(), Some("whats-new"));
        assert_eq!(derive_anchor("snake_case-ok").as_deref(), Some("snake_case-ok"));
    }

    #[test]
    fn derive_anchor_keeps_non_ascii_letters() {
        assert_eq!(derive_anchor("Über Größe").as_deref(), Some("über-größe"));
        assert_eq!(derive_anchor("基线 对齐").as_deref(), Some("基线-对齐"));
    }

    #[test]
    fn derive_anchor_rejects_symbol_only_headings() {
        assert_eq!(derive_anchor("?!"), None);
        assert_eq!(derive_anchor("   "), None);
    }

    #[test]
    fn anchor_slugger_produces_unique_slugs() {
        let mut slugger = AnchorSlugger::new();

        let first = slugger.anchor_for("Intro").expect("slug");
        let second = slugger.anchor_for("Intro").expect("slug");
        let third = slugger.anchor_for("Intro").expect("slug");

        assert_eq!(first, "intro");
        assert_eq!(second, "intro-1");
        assert_eq!(third, "intro-2");
    }

    #[test]
    fn anchor_slugger_skips_collisions_with_literal_suffixes() {
        let mut slugger = AnchorSlugger::new();

        assert_eq!(slugger.anchor_for("Intro").as_deref(), Some("intro"));
        assert_eq!(slugger.anchor_for("Intro 1").as_deref(), Some("intro-1"));
        assert_eq!(slugger.anchor_for("Intro").as_deref(), Some("intro-2"));
    }

    #[test]
    fn anchor_slugger_ignores_empty_headings() {
        let mut slugger = AnchorSlugger::new();

        assert_eq!(slugger.anchor_for("***"), None);
        assert_eq!(slugger.anchor_for("Notes").as_deref(), Some("notes"));
    }
}
