//! Sort key normalisation for requirement clause identifiers.
//!
//! Converts requirement ids (e.g., "4.1", "7.3.2", "A.2", "ISO14971-4.1")
//! into lexicographically-sortable strings so that sorting by key recovers
//! the standard's document order.
//!
//! # Clause numbering conventions
//!
//! - Numbered clauses: 4, 4.1, 4.1.2, ..., 10.1
//! - Annex clauses: A.1, B.2.3 (after every numbered clause)
//! - Prefixed ids: "ISO14971-4.1", "Clause 4.1" (prefix before the last
//!   separator is ignored)
//! - Anything else ("R12", "REQ-A") sorts after annexes, with embedded
//!   numbers compared numerically

const SEPARATORS: &[char] = &[' ', '-', '_', ':', '/'];

/// Normalise a requirement id into a lexicographically-sortable string.
///
/// Input: "4.1", "4.1.2", "10.1", "A.2", "R12"
/// Output: "0|004.001", "0|004.001.002", "0|010.001", "1|A.002", "2|R012"
///
/// # Algorithm
///
/// 1. Trim, uppercase, keep only the token after the last separator
/// 2. Split on '.' into segments; zero-pad every digit run to 3 digits
/// 3. Group: numbered clause = 0, single-letter annex = 1, other = 2
/// 4. Join as `{group}|{segments joined with '.'}`
pub fn normalize_clause(id: &str) -> String {
    let upper = id.trim().to_ascii_uppercase();
    let token = upper
        .rsplit(SEPARATORS)
        .find(|t| !t.is_empty())
        .unwrap_or("");
    if token.is_empty() {
        return "3|".to_string();
    }

    let segments: Vec<String> = token
        .split('.')
        .filter(|s| !s.is_empty())
        .map(pad_digit_runs)
        .collect();

    let first = token.split('.').next().unwrap_or("");
    let group = if first.starts_with(|c: char| c.is_ascii_digit()) {
        0
    } else if first.len() == 1 && first.chars().all(|c| c.is_ascii_uppercase()) {
        1
    } else {
        2
    };

    format!("{group}|{}", segments.join("."))
}

/// Zero-pad every run of ASCII digits in a segment to 3 digits.
///
/// "4" → "004", "4A" → "004A", "R12" → "R012"
fn pad_digit_runs(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len() + 4);
    let mut digits = String::new();
    for c in segment.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        flush_digits(&mut out, &mut digits);
        out.push(c);
    }
    flush_digits(&mut out, &mut digits);
    out
}

fn flush_digits(out: &mut String, digits: &mut String) {
    if digits.is_empty() {
        return;
    }
    let trimmed = digits.trim_start_matches('0');
    let trimmed = if trimmed.is_empty() { "0" } else { trimmed };
    out.push_str(&format!("{trimmed:0>3}"));
    digits.clear();
}
