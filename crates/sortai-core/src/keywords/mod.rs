//! Keyword Extractor (C1, spec §4.1)
//!
//! Pure, deterministic tokenization of filenames. No I/O, no shared state — this is
//! the one component in the pipeline that is a plain function rather than an
//! owned-state actor (spec §9's sum-type/actor guidance does not apply here).

use std::collections::BTreeSet;

use crate::model::CoarseType;

const STOP_WORDS: &[&str] = &[
    "the", "and", "copy", "final", "v1", "v2", "v3", "a", "an", "of", "to", "for", "new",
    "draft", "untitled", "img", "dsc", "document",
];

/// Result of extracting keywords from a single filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedKeywords {
    /// Lowercased tokens, in filename order, including duplicates.
    pub tokens: Vec<String>,
    /// Deduplicated keyword set (stop words and noise already removed).
    pub keywords: BTreeSet<String>,
    pub coarse_type: CoarseType,
}

/// Split on delimiters, letter↔digit transitions, and camelCase boundaries.
fn split_tokens(stem: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = stem.chars().collect();

    let is_delim = |c: char| matches!(c, ' ' | '_' | '-' | '.' | '+' | '(' | ')' | '[' | ']');

    for i in 0..chars.len() {
        let c = chars[i];
        if is_delim(c) {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            continue;
        }

        if !current.is_empty() {
            let prev = chars[i - 1];
            let letter_digit_transition =
                (prev.is_ascii_digit() && c.is_alphabetic()) || (prev.is_alphabetic() && c.is_ascii_digit());
            let camel_boundary = prev.is_lowercase() && c.is_uppercase();
            if letter_digit_transition || camel_boundary {
                tokens.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn looks_like_year(token: &str) -> bool {
    token.len() == 4
        && token
            .parse::<u32>()
            .map(|n| (1900..=2099).contains(&n))
            .unwrap_or(false)
}

fn looks_like_iso_date(token: &str) -> bool {
    // YYYYMMDD, all digits, plausible month/day.
    if token.len() == 8 && token.chars().all(|c| c.is_ascii_digit()) {
        if let (Ok(month), Ok(day)) = (token[4..6].parse::<u32>(), token[6..8].parse::<u32>()) {
            return (1..=12).contains(&month) && (1..=31).contains(&day) && looks_like_year(&token[0..4]);
        }
    }
    false
}

fn is_noise_numeric(token: &str) -> bool {
    token.chars().all(|c| c.is_ascii_digit()) && token.len() < 4
}

fn keep_token(token: &str) -> bool {
    let lower = token.to_ascii_lowercase();
    if lower.len() < 2 {
        return false;
    }
    if STOP_WORDS.contains(&lower.as_str()) {
        return false;
    }
    if is_noise_numeric(&lower) && !looks_like_year(&lower) && !looks_like_iso_date(&lower) {
        return false;
    }
    true
}

/// Extract keywords from a filename. Referentially transparent: the same input
/// always yields the same output (spec §8 "keyword extraction is referentially
/// transparent").
pub fn extract(filename: &str) -> ExtractedKeywords {
    let path = std::path::Path::new(filename);
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let coarse_type = CoarseType::from_extension(extension);

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);

    let raw_tokens = split_tokens(stem);
    let tokens: Vec<String> = raw_tokens
        .iter()
        .map(|t| t.to_ascii_lowercase())
        .filter(|t| keep_token(t))
        .collect();

    let keywords: BTreeSet<String> = tokens.iter().cloned().collect();

    ExtractedKeywords {
        tokens,
        keywords,
        coarse_type,
    }
}
