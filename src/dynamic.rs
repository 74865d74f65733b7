//! Parses the suffix of a dynamic `where_<Column>[And|Or]<Column>...` method
//! name into a sequence of `(snake_case_column, conjunction)` pairs.
//!
//! Any unknown method whose name starts with `where` is interpreted this
//! way. The suffix is split around the boolean connectors `And`/`Or`,
//! matching only when the connector is immediately followed by an uppercase
//! letter — so a column name that merely contains the substring "and" or
//! "or" (e.g. `AndroidVersion`, `OrderTotal`) is never mistaken for a
//! connector.

use crate::error::{QueryBuilderError, Result};
use crate::ir::Conjunction;
use heck::ToSnakeCase;

/// Splits `suffix` on `And`/`Or` connectors (lookahead-gated on the next
/// character being uppercase) and converts each resulting segment from
/// camel case to `snake_case`.
///
/// The first returned conjunction is always [`Conjunction::And`] and is
/// ignored by callers, since the first predicate's connector never matters.
pub fn parse_dynamic_where(suffix: &str) -> Result<Vec<(String, Conjunction)>> {
    if suffix.is_empty() {
        return Err(QueryBuilderError::UnknownMethod(format!("where{suffix}")));
    }

    let chars: Vec<char> = suffix.chars().collect();
    let mut segments: Vec<(String, Conjunction)> = Vec::new();
    let mut current = String::new();
    let mut pending_conjunction = Conjunction::And;
    let mut i = 0;

    while i < chars.len() {
        if let Some((connector, len)) = connector_at(&chars, i) {
            current_segment_flush(&mut segments, &mut current, pending_conjunction)?;
            pending_conjunction = connector;
            i += len;
            continue;
        }
        current.push(chars[i]);
        i += 1;
    }
    current_segment_flush(&mut segments, &mut current, pending_conjunction)?;

    if segments.is_empty() {
        return Err(QueryBuilderError::UnknownMethod(format!("where{suffix}")));
    }
    Ok(segments)
}

fn current_segment_flush(segments: &mut Vec<(String, Conjunction)>, current: &mut String, conjunction: Conjunction) -> Result<()> {
    if current.is_empty() {
        return Ok(());
    }
    segments.push((current.to_snake_case(), conjunction));
    current.clear();
    Ok(())
}

/// Returns `Some((connector, char_len))` when `chars[i..]` starts with
/// `And`/`Or` immediately followed by an uppercase letter.
fn connector_at(chars: &[char], i: usize) -> Option<(Conjunction, usize)> {
    if matches_word(chars, i, "And") && chars.get(i + 3).is_some_and(|c| c.is_uppercase()) {
        return Some((Conjunction::And, 3));
    }
    if matches_word(chars, i, "Or") && chars.get(i + 2).is_some_and(|c| c.is_uppercase()) {
        return Some((Conjunction::Or, 2));
    }
    None
}

fn matches_word(chars: &[char], i: usize, word: &str) -> bool {
    let word_chars: Vec<char> = word.chars().collect();
    if i + word_chars.len() > chars.len() {
        return false;
    }
    chars[i..i + word_chars.len()] == word_chars[..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_column() {
        let segs = parse_dynamic_where("FirstName").unwrap();
        assert_eq!(segs, vec![("first_name".to_string(), Conjunction::And)]);
    }

    #[test]
    fn and_connector_splits() {
        let segs = parse_dynamic_where("FirstNameAndLastName").unwrap();
        assert_eq!(
            segs,
            vec![("first_name".to_string(), Conjunction::And), ("last_name".to_string(), Conjunction::And)]
        );
    }

    #[test]
    fn or_connector_splits() {
        let segs = parse_dynamic_where("StatusOrPriority").unwrap();
        assert_eq!(
            segs,
            vec![("status".to_string(), Conjunction::And), ("priority".to_string(), Conjunction::Or)]
        );
    }

    #[test]
    fn preserves_column_names_containing_and_or() {
        let segs = parse_dynamic_where("AndroidVersion").unwrap();
        assert_eq!(segs, vec![("android_version".to_string(), Conjunction::And)]);

        let segs = parse_dynamic_where("OrderTotal").unwrap();
        assert_eq!(segs, vec![("order_total".to_string(), Conjunction::And)]);
    }

    #[test]
    fn empty_suffix_is_unknown_method() {
        assert!(parse_dynamic_where("").is_err());
    }
}
