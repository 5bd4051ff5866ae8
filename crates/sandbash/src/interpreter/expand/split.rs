//! IFS field splitting
//!
//! Only the results of parameter, command, and arithmetic expansion are
//! split. IFS whitespace runs collapse into one separator and are trimmed
//! at the ends; every non-whitespace IFS character is a hard separator that
//! can produce empty fields.

/// The split of one expansion result, shaped for stitching into
/// neighboring word text: `leading`/`trailing` record whether the text
/// began or ended with a separator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SplitParts {
    pub leading_sep: bool,
    pub tokens: Vec<String>,
    pub trailing_sep: bool,
}

/// Split `text` on the current IFS. An empty IFS disables splitting.
pub fn split_ifs(text: &str, ifs: &str) -> SplitParts {
    if ifs.is_empty() {
        return SplitParts {
            leading_sep: false,
            tokens: if text.is_empty() {
                Vec::new()
            } else {
                vec![text.to_string()]
            },
            trailing_sep: false,
        };
    }

    let is_ws = |c: char| ifs.contains(c) && c.is_whitespace();
    let is_hard = |c: char| ifs.contains(c) && !c.is_whitespace();

    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut leading_sep = false;
    let mut trailing_sep = false;
    let mut in_token = false;
    let mut seen_any = false;

    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if is_ws(c) {
            // Collapse the whitespace run, folding in at most one hard
            // separator.
            let mut j = i;
            let mut hard = false;
            while j < chars.len() && (is_ws(chars[j]) || (!hard && is_hard(chars[j]))) {
                if is_hard(chars[j]) {
                    hard = true;
                }
                j += 1;
            }
            if in_token {
                tokens.push(std::mem::take(&mut current));
                in_token = false;
            } else if !seen_any {
                leading_sep = true;
            } else if hard {
                // Separator directly after a previous separator: the hard
                // char delimits an empty field.
                tokens.push(String::new());
            }
            if !seen_any && hard {
                // A hard separator at the very start delimits a leading
                // empty field.
                tokens.push(String::new());
                leading_sep = false;
            }
            seen_any = true;
            trailing_sep = true;
            i = j;
        } else if is_hard(c) {
            if in_token {
                tokens.push(std::mem::take(&mut current));
                in_token = false;
            } else {
                // Empty field between hard separators (or at the start).
                tokens.push(String::new());
                leading_sep = false;
            }
            seen_any = true;
            trailing_sep = true;
            i += 1;
            // Trailing whitespace after a hard separator is part of it.
            while i < chars.len() && is_ws(chars[i]) {
                i += 1;
            }
        } else {
            current.push(c);
            in_token = true;
            seen_any = true;
            trailing_sep = false;
            i += 1;
        }
    }
    if in_token {
        tokens.push(current);
    }

    SplitParts {
        leading_sep,
        tokens,
        trailing_sep,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WS: &str = " \t\n";

    fn fields(text: &str, ifs: &str) -> Vec<String> {
        split_ifs(text, ifs).tokens
    }

    #[test]
    fn default_ifs_collapses_whitespace() {
        assert_eq!(fields("a b  c", WS), vec!["a", "b", "c"]);
        let split = split_ifs("  a b ", WS);
        assert_eq!(split.tokens, vec!["a", "b"]);
        assert!(split.leading_sep);
        assert!(split.trailing_sep);
    }

    #[test]
    fn empty_text_has_no_fields() {
        assert_eq!(fields("", WS), Vec::<String>::new());
        assert_eq!(fields("   ", WS), Vec::<String>::new());
    }

    #[test]
    fn empty_ifs_disables_splitting() {
        assert_eq!(fields("a b c", ""), vec!["a b c"]);
    }

    #[test]
    fn hard_separators_make_empty_fields() {
        assert_eq!(fields("a::b", ":"), vec!["a", "", "b"]);
        assert_eq!(fields(":a", ":"), vec!["", "a"]);
        assert_eq!(fields(":", ":"), vec![""]);
        assert_eq!(fields("::", ":"), vec!["", ""]);
        // A trailing hard separator does not add a trailing empty field.
        assert_eq!(fields("a:", ":"), vec!["a"]);
    }

    #[test]
    fn mixed_whitespace_and_hard() {
        // Whitespace around a hard separator is a single delimiter.
        assert_eq!(fields("a : b", ": "), vec!["a", "b"]);
        assert_eq!(fields("a :: b", ": "), vec!["a", "", "b"]);
    }

    #[test]
    fn no_separators_single_token() {
        let split = split_ifs("abc", WS);
        assert_eq!(split.tokens, vec!["abc"]);
        assert!(!split.leading_sep);
        assert!(!split.trailing_sep);
    }

    #[test]
    fn custom_non_whitespace_ifs_keeps_spaces() {
        assert_eq!(fields("a b:c d", ":"), vec!["a b", "c d"]);
    }
}
