//! Brace expansion
//!
//! Runs before everything else, on the unexpanded word: each brace group
//! multiplies the word into one variant per member, ranges generate their
//! sequences, and nested groups expand through recursion.

use crate::parser::ast::{BraceRange, Word, WordPart};

/// Expand every brace group/range in `word`, producing the variant words
/// in left-to-right, element order.
pub fn expand_braces(word: &Word) -> Vec<Word> {
    let Some(position) = word
        .parts
        .iter()
        .position(|p| matches!(p, WordPart::BraceGroup(_) | WordPart::BraceRange(_)))
    else {
        return vec![word.clone()];
    };

    let prefix = &word.parts[..position];
    let suffix = &word.parts[position + 1..];

    let alternatives: Vec<Vec<WordPart>> = match &word.parts[position] {
        WordPart::BraceGroup(members) => members.iter().map(|m| m.parts.clone()).collect(),
        WordPart::BraceRange(range) => range_items(range)
            .into_iter()
            .map(|text| vec![WordPart::Literal(text)])
            .collect(),
        _ => unreachable!(),
    };

    let mut out = Vec::new();
    for alt in alternatives {
        let mut parts = prefix.to_vec();
        parts.extend(alt);
        parts.extend(suffix.to_vec());
        // The member may itself contain groups, and so may the suffix.
        out.extend(expand_braces(&Word { parts }));
    }
    out
}

/// Render a word with its brace parts as literal text (for contexts where
/// brace expansion does not apply, like assignment values).
pub fn brace_part_literal(part: &WordPart) -> Option<String> {
    match part {
        WordPart::BraceGroup(members) => {
            let mut out = String::from("{");
            for (i, member) in members.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&member.to_string());
            }
            out.push('}');
            Some(out)
        }
        WordPart::BraceRange(range) => {
            let fmt = |v: i64| {
                if range.alpha {
                    char::from_u32(v as u32).map(String::from).unwrap_or_default()
                } else {
                    v.to_string()
                }
            };
            let mut out = format!("{{{}..{}", fmt(range.start), fmt(range.end));
            if range.step != 1 {
                out.push_str(&format!("..{}", range.step));
            }
            out.push('}');
            Some(out)
        }
        _ => None,
    }
}

/// The items of `{a..z..step}` / `{1..9..step}`.
fn range_items(range: &BraceRange) -> Vec<String> {
    let step = if range.step == 0 { 1 } else { range.step.abs() };
    let descending = range.start > range.end;

    let mut items = Vec::new();
    let mut current = range.start;
    loop {
        let in_range = if descending {
            current >= range.end
        } else {
            current <= range.end
        };
        if !in_range {
            break;
        }
        if range.alpha {
            if let Some(c) = char::from_u32(current as u32) {
                items.push(c.to_string());
            }
        } else if range.width > 0 {
            let digits = current.unsigned_abs().to_string();
            let sign = if current < 0 { "-" } else { "" };
            let pad = range.width.saturating_sub(digits.len());
            items.push(format!("{sign}{}{digits}", "0".repeat(pad)));
        } else {
            items.push(current.to_string());
        }
        current = if descending {
            current - step
        } else {
            current + step
        };
    }
    items
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::parser::word::parse_word;
    use crate::parser::Lexer;

    fn word(text: &str) -> Word {
        let raw = Lexer::lex_unbroken(text).unwrap();
        parse_word(&raw, 1).unwrap()
    }

    fn expand_to_text(text: &str) -> Vec<String> {
        expand_braces(&word(text))
            .iter()
            .map(|w| w.to_string())
            .collect()
    }

    #[test]
    fn simple_group_with_affixes() {
        assert_eq!(expand_to_text("a{b,c}d"), vec!["abd", "acd"]);
    }

    #[test]
    fn empty_member() {
        assert_eq!(expand_to_text("x{,y}"), vec!["x", "xy"]);
    }

    #[test]
    fn two_groups_cross_product() {
        assert_eq!(
            expand_to_text("{a,b}{1,2}"),
            vec!["a1", "a2", "b1", "b2"]
        );
    }

    #[test]
    fn nested_groups() {
        assert_eq!(expand_to_text("{a,b{c,d}}"), vec!["a", "bc", "bd"]);
    }

    #[test]
    fn numeric_ranges() {
        assert_eq!(expand_to_text("{1..4}"), vec!["1", "2", "3", "4"]);
        assert_eq!(expand_to_text("{4..1}"), vec!["4", "3", "2", "1"]);
        assert_eq!(expand_to_text("{1..9..3}"), vec!["1", "4", "7"]);
        assert_eq!(expand_to_text("{-2..2..2}"), vec!["-2", "0", "2"]);
    }

    #[test]
    fn zero_padded_range() {
        assert_eq!(expand_to_text("{01..03}"), vec!["01", "02", "03"]);
        assert_eq!(expand_to_text("{08..10}"), vec!["08", "09", "10"]);
    }

    #[test]
    fn alpha_range() {
        assert_eq!(expand_to_text("{a..d}"), vec!["a", "b", "c", "d"]);
        assert_eq!(expand_to_text("{c..a}"), vec!["c", "b", "a"]);
    }

    #[test]
    fn no_braces_is_identity() {
        assert_eq!(expand_to_text("plain"), vec!["plain"]);
    }
}
