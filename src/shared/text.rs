//! Text normalization helpers for display names and slugs.

/// Default clip length for display names.
pub const CLIP_DEFAULT: usize = 160;

/// Maximum slug length.
pub const CLIP_SLUG: usize = 80;

/// Shortens a string to the given number of characters and trims
/// surrounding whitespace.
pub fn clip(s: &str, size: usize) -> String {
    let s = s.trim();

    if s.is_empty() || size == 0 {
        return String::new();
    }

    let runes: Vec<char> = s.chars().collect();

    if runes.len() > size {
        runes[..size - 1].iter().collect::<String>().trim_end().to_string()
    } else {
        s.to_string()
    }
}

/// Capitalizes the first letter of every word, leaving the rest untouched.
pub fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Returns the normalized form used for uniqueness checks: lowercase,
/// alphanumeric runs joined by single dashes, at most [`CLIP_SLUG`] chars.
pub fn slug(s: &str) -> String {
    let mut out = String::new();

    for ch in s.trim().to_lowercase().chars() {
        if ch.is_alphanumeric() {
            out.push(ch);
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }

    let out = out.trim_matches('-').to_string();

    clip(&out, CLIP_SLUG)
}
