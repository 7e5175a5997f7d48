//! Ingest-time shaping of client-supplied text.

use crate::{MAX_INTEREST_CHARS, MAX_INTERESTS, MAX_MESSAGE_CHARS};

/// Sanitize a chat message: trim, strip control characters, collapse runs of
/// whitespace, cap at [`MAX_MESSAGE_CHARS`]. Returns `None` when nothing
/// printable survives.
#[must_use]
pub fn sanitize_message(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len().min(MAX_MESSAGE_CHARS));
    let mut chars = 0;
    let mut pending_space = false;
    for c in raw.trim().chars() {
        if c.is_control() {
            continue;
        }
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            if chars + 1 >= MAX_MESSAGE_CHARS {
                break;
            }
            out.push(' ');
            chars += 1;
            pending_space = false;
        }
        out.push(c);
        chars += 1;
        if chars >= MAX_MESSAGE_CHARS {
            break;
        }
    }
    if out.is_empty() { None } else { Some(out) }
}

/// Normalize an interest list: trim, lowercase-preserving dedupe, drop
/// entries that are empty or over-long, cap the list at [`MAX_INTERESTS`].
#[must_use]
pub fn normalize_interests(raw: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for entry in raw {
        let trimmed = entry.trim();
        if trimmed.is_empty() || trimmed.chars().count() > MAX_INTEREST_CHARS {
            continue;
        }
        let key = trimmed.to_ascii_lowercase();
        if seen.insert(key) {
            out.push(trimmed.to_string());
        }
        if out.len() == MAX_INTERESTS {
            break;
        }
    }
    out
}

/// Case-insensitive intersection of two interest lists, preserving the first
/// list's casing and order.
#[must_use]
pub fn common_interests(a: &[String], b: &[String]) -> Vec<String> {
    let b_keys: std::collections::HashSet<String> =
        b.iter().map(|s| s.to_ascii_lowercase()).collect();
    a.iter()
        .filter(|s| b_keys.contains(&s.to_ascii_lowercase()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_controls_and_collapses_whitespace() {
        assert_eq!(
            sanitize_message("  hi\u{0007}\t there \n friend  ").as_deref(),
            Some("hi there friend")
        );
    }

    #[test]
    fn empty_after_sanitize_is_none() {
        assert_eq!(sanitize_message("  \u{0000}\t\n "), None);
    }

    #[test]
    fn caps_message_length() {
        let long = "x".repeat(5000);
        let out = sanitize_message(&long).unwrap();
        assert_eq!(out.chars().count(), MAX_MESSAGE_CHARS);
    }

    #[test]
    fn interests_dedupe_case_insensitive() {
        let raw = vec!["Music".into(), "music ".into(), "games".into()];
        assert_eq!(normalize_interests(&raw), vec!["Music", "games"]);
    }

    #[test]
    fn interests_capped_at_ten() {
        let raw: Vec<String> = (0..20).map(|i| format!("topic{i}")).collect();
        assert_eq!(normalize_interests(&raw).len(), MAX_INTERESTS);
    }

    #[test]
    fn common_interests_case_insensitive() {
        let a = vec!["Music".to_string(), "games".to_string()];
        let b = vec!["music".to_string(), "films".to_string()];
        assert_eq!(common_interests(&a, &b), vec!["Music"]);
    }
}
