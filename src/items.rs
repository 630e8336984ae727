// 🎒 Item Normalizer - Canonical item lists
// Turns free-text, comma-separated item blobs into one counted entry per item
//
// "sword of the cliche, Sword Of The Cliche x2" → "Sword of the Cliche x3"
//
// Pure text transform: no store access, never fails.

use std::collections::HashMap;
use std::fmt;

/// Words kept lowercase inside an item name (never the first word)
pub const CONNECTOR_WORDS: [&str; 5] = ["a", "an", "of", "the", "is"];

// ============================================================================
// ITEM ENTRY
// ============================================================================

/// One canonical item with its accumulated multiplicity.
///
/// Built fresh on every normalization pass; two entries are the same item
/// when their lowercased, whitespace-collapsed names match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemEntry {
    /// Title-cased name without any count marker
    pub name: String,

    /// Total multiplicity (always >= 1)
    pub count: u64,
}

impl ItemEntry {
    pub fn new(name: impl Into<String>, count: u64) -> Self {
        ItemEntry {
            name: name.into(),
            count: count.max(1),
        }
    }
}

impl fmt::Display for ItemEntry {
    /// `Name` for a single item, `Name xN` otherwise.
    ///
    /// A single item whose own name ends in something that looks like a
    /// count marker ("Sword X3") is written as "Sword X3 x1", otherwise the
    /// next pass would read its tail as a count.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ambiguous = split_count_marker(&self.name.to_lowercase()).1.is_some();
        if self.count == 1 && !ambiguous {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} x{}", self.name, self.count)
        }
    }
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Normalize a raw item blob into its canonical comma-separated form.
///
/// Entries keep the order in which each item first appeared.
pub fn normalize(raw: &str) -> String {
    render_items(&parse_items(raw))
}

/// Merge a new fragment into an existing (canonical) item string.
pub fn merge_items(existing: &str, fragment: &str) -> String {
    if existing.trim().is_empty() {
        normalize(fragment)
    } else {
        normalize(&format!("{}, {}", existing, fragment))
    }
}

/// Parse and accumulate a raw blob into canonical entries.
///
/// Empty fragments (",,", trailing commas, whitespace) are skipped.
pub fn parse_items(raw: &str) -> Vec<ItemEntry> {
    let mut entries: Vec<ItemEntry> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for fragment in raw.split(',') {
        let lowered = fragment.trim().to_lowercase();
        let (name, count) = match split_count_marker(&lowered) {
            (name, Some(count)) => (name, count),
            (name, None) => (name, 1),
        };

        let name = proper_case(name);
        if name.is_empty() {
            continue;
        }

        match positions.get(&name) {
            Some(&idx) => {
                entries[idx].count = entries[idx].count.saturating_add(count);
            }
            None => {
                positions.insert(name.clone(), entries.len());
                entries.push(ItemEntry::new(name, count));
            }
        }
    }

    entries
}

/// Render entries joined by ", "
pub fn render_items(entries: &[ItemEntry]) -> String {
    entries
        .iter()
        .map(|entry| entry.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Split a trailing " x<digits>" marker off a fragment.
///
/// Returns the remaining name and the parsed count. A marker of zero or one
/// too large for u64 still gets stripped but counts as 1.
fn split_count_marker(fragment: &str) -> (&str, Option<u64>) {
    let digits_start = fragment
        .trim_end_matches(|c: char| c.is_ascii_digit())
        .len();
    if digits_start == fragment.len() {
        return (fragment, None);
    }

    match fragment[..digits_start].strip_suffix(" x") {
        Some(name) => {
            let count = fragment[digits_start..]
                .parse::<u64>()
                .ok()
                .filter(|n| *n > 0)
                .unwrap_or(1);
            (name, Some(count))
        }
        None => (fragment, None),
    }
}

/// Title-case a lowercased name word by word.
///
/// The first word is always title-cased, even when it is a connector
/// ("the sword" → "The Sword"); later connectors stay lowercase.
fn proper_case(name: &str) -> String {
    name.split_whitespace()
        .enumerate()
        .map(|(i, word)| {
            if i > 0 && CONNECTOR_WORDS.contains(&word) {
                word.to_string()
            } else {
                title_word(word)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Uppercase every letter that follows a non-letter: "o'neil" → "O'Neil".
fn title_word(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut prev_is_letter = false;

    for c in word.chars() {
        if c.is_alphabetic() && !prev_is_letter {
            out.push(single_uppercase(c));
        } else {
            out.push(c);
        }
        prev_is_letter = c.is_alphabetic();
    }

    out
}

/// Uppercase only when it maps to one char and lowercases back to `c`
fn single_uppercase(c: char) -> char {
    let mut upper = c.to_uppercase();
    match (upper.next(), upper.next()) {
        (Some(u), None) if u.to_lowercase().eq(std::iter::once(c)) => u,
        _ => c,
    }
}

// ============================================================================
// TESTS
// ============================================================================
