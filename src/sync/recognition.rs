//! Number recognition for item names.
//!
//! Turns "Vol.2 Ch. 14.5 - Title" into `14.5`. A number supplied by the
//! backend always wins over anything parsed from the name.

use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::media::ItemNumber;

pub trait NumberRecognizer: Send + Sync {
    fn recognize(&self, parent_title: &str, name: &str, hint: ItemNumber) -> ItemNumber;
}

static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]+)(\.[0-9]+)?(\.?[a-z]+)?").expect("valid number regex")
});

static CHAPTER_PREFIXED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"ch\. *([0-9]+)(\.[0-9]+)?(\.?[a-z]+)?").expect("valid chapter regex")
});

/// Volume and season markers whose numbers are never the item number.
static UNWANTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:v|ver|vol|version|volume|season|s)[^a-z]?[0-9]+")
        .expect("valid unwanted regex")
});

/// Glues suffix words onto the preceding number ("12 extra" -> "12extra").
static SUFFIX_GAP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s(extra|special|omake)").expect("valid suffix regex")
});

/// Regex-based recognizer for chapter/episode/track names.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternRecognizer;

impl NumberRecognizer for PatternRecognizer {
    fn recognize(&self, parent_title: &str, name: &str, hint: ItemNumber) -> ItemNumber {
        if hint.is_recognized() {
            return hint;
        }

        let mut cleaned = name.to_lowercase();
        let title = parent_title.to_lowercase();
        if !title.is_empty() {
            cleaned = cleaned.replace(&title, "");
        }
        let cleaned = cleaned.trim().replace([',', '-'], ".");
        let cleaned = SUFFIX_GAP.replace_all(&cleaned, "$1");

        let mut matches = NUMBER.captures_iter(&cleaned);
        let Some(first) = matches.next() else {
            return ItemNumber::Unrecognized;
        };
        if matches.next().is_none() {
            return ItemNumber::Recognized(number_from(&first));
        }

        let stripped = UNWANTED.replace_all(&cleaned, "");
        let chosen = CHAPTER_PREFIXED
            .captures(&stripped)
            .or_else(|| NUMBER.captures(&stripped))
            .map(|caps| number_from(&caps));
        ItemNumber::Recognized(chosen.unwrap_or_else(|| number_from(&first)))
    }
}

fn number_from(caps: &Captures<'_>) -> f64 {
    let whole = caps
        .get(1)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(0.0);
    whole + fraction(caps.get(2).map(|m| m.as_str()), caps.get(3).map(|m| m.as_str()))
}

fn fraction(decimal: Option<&str>, alpha: Option<&str>) -> f64 {
    if let Some(decimal) = decimal.filter(|d| !d.is_empty()) {
        return decimal.parse().unwrap_or(0.0);
    }
    let Some(alpha) = alpha.filter(|a| !a.is_empty()) else {
        return 0.0;
    };
    if alpha.contains("extra") {
        return 0.99;
    }
    if alpha.contains("omake") {
        return 0.98;
    }
    if alpha.contains("special") {
        return 0.97;
    }
    let mut letters = alpha.trim_start_matches('.').chars();
    match (letters.next(), letters.next()) {
        (Some(letter), None) => {
            // a -> .1 ... i -> .9; later letters carry no fraction
            match (letter as u32).checked_sub('a' as u32 - 1) {
                Some(n) if (1..10).contains(&n) => f64::from(n) / 10.0,
                _ => 0.0,
            }
        }
        _ => 0.0,
    }
}
