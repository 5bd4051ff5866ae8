//! Shell pattern matching
//!
//! One matcher backs pathname expansion, `case` arms, `[[ == ]]`, and the
//! pattern-based parameter operators, so all of them agree on semantics.
//! A small backtracking engine is used rather than a regex translation:
//! `!(...)` has no equivalent in a lookaround-free regex dialect.

/// Options affecting pattern interpretation.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchOptions {
    /// Enable `?( ) *( ) +( ) @( ) !( )` extended patterns.
    pub extglob: bool,
    /// Case-insensitive matching (`nocasematch` / `nocaseglob`).
    pub casefold: bool,
}

/// Does `pattern` match all of `text`?
pub fn pattern_matches(pattern: &str, text: &str, opts: MatchOptions) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    match_here(&p, &t, opts)
}

/// Does the text contain unquoted glob metacharacters?
///
/// Backslash-escaped characters are not metacharacters; the caller is
/// expected to have quoted literal segments with backslashes.
pub fn has_glob_chars(text: &str, extglob: bool) -> bool {
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '*' | '?' | '[' => return true,
            '+' | '@' | '!' if extglob && chars.get(i + 1) == Some(&'(') => return true,
            _ => {}
        }
        i += 1;
    }
    false
}

/// Escape pattern metacharacters so the text matches literally.
pub fn escape_pattern(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\' | '(' | ')' | '|' | '+' | '@' | '!') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn chars_eq(a: char, b: char, opts: MatchOptions) -> bool {
    if opts.casefold {
        a.eq_ignore_ascii_case(&b) || a.to_lowercase().eq(b.to_lowercase())
    } else {
        a == b
    }
}

fn match_here(p: &[char], t: &[char], opts: MatchOptions) -> bool {
    if p.is_empty() {
        return t.is_empty();
    }

    // Extended pattern group?
    if opts.extglob && p.len() >= 2 && p[1] == '(' && matches!(p[0], '?' | '*' | '+' | '@' | '!')
    {
        if let Some(close) = find_group_close(p, 1) {
            let alts = split_alternatives(&p[2..close]);
            let rest = &p[close + 1..];
            return match_group(p[0], &alts, rest, t, opts);
        }
    }

    match p[0] {
        '\\' if p.len() > 1 => {
            !t.is_empty() && chars_eq(p[1], t[0], opts) && match_here(&p[2..], &t[1..], opts)
        }
        '?' => !t.is_empty() && match_here(&p[1..], &t[1..], opts),
        '*' => {
            // Consume any run of stars, then try every split.
            let mut rest = &p[1..];
            while rest.first() == Some(&'*') {
                rest = &rest[1..];
            }
            for k in 0..=t.len() {
                if match_here(rest, &t[k..], opts) {
                    return true;
                }
            }
            false
        }
        '[' => match parse_class(p) {
            Some((class, consumed)) => {
                !t.is_empty()
                    && class.matches(t[0], opts)
                    && match_here(&p[consumed..], &t[1..], opts)
            }
            // Unterminated class: the bracket is literal.
            None => !t.is_empty() && t[0] == '[' && match_here(&p[1..], &t[1..], opts),
        },
        c => !t.is_empty() && chars_eq(c, t[0], opts) && match_here(&p[1..], &t[1..], opts),
    }
}

/// Match an extended group `K(alt|alt)rest` against `t`.
fn match_group(
    kind: char,
    alts: &[Vec<char>],
    rest: &[char],
    t: &[char],
    opts: MatchOptions,
) -> bool {
    let alt_matches = |piece: &[char]| alts.iter().any(|alt| match_here(alt, piece, opts));

    match kind {
        '@' => {
            for k in 0..=t.len() {
                if alt_matches(&t[..k]) && match_here(rest, &t[k..], opts) {
                    return true;
                }
            }
            false
        }
        '?' => {
            if match_here(rest, t, opts) {
                return true;
            }
            for k in 0..=t.len() {
                if alt_matches(&t[..k]) && match_here(rest, &t[k..], opts) {
                    return true;
                }
            }
            false
        }
        '*' | '+' => {
            let min_reps = if kind == '+' { 1 } else { 0 };
            match_group_star(alts, rest, t, min_reps, opts)
        }
        '!' => {
            // Any prefix that none of the alternatives match, with the rest
            // of the pattern matching what remains.
            for k in 0..=t.len() {
                if !alt_matches(&t[..k]) && match_here(rest, &t[k..], opts) {
                    return true;
                }
            }
            false
        }
        _ => false,
    }
}

fn match_group_star(
    alts: &[Vec<char>],
    rest: &[char],
    t: &[char],
    min_reps: usize,
    opts: MatchOptions,
) -> bool {
    if min_reps == 0 && match_here(rest, t, opts) {
        return true;
    }
    for k in 1..=t.len() {
        if alts.iter().any(|alt| match_here(alt, &t[..k], opts))
            && match_group_star(alts, rest, &t[k..], min_reps.saturating_sub(1), opts)
        {
            return true;
        }
    }
    false
}

/// Index of the `)` closing the `(` at `open`, honoring nesting.
fn find_group_close(p: &[char], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = open;
    while i < p.len() {
        match p[i] {
            '\\' => i += 1,
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Split group innards on top-level `|`.
fn split_alternatives(inner: &[char]) -> Vec<Vec<char>> {
    let mut alts = Vec::new();
    let mut current = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;
    while i < inner.len() {
        match inner[i] {
            '\\' if i + 1 < inner.len() => {
                current.push(inner[i]);
                current.push(inner[i + 1]);
                i += 2;
                continue;
            }
            '(' => {
                depth += 1;
                current.push('(');
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(')');
            }
            '|' if depth == 0 => {
                alts.push(std::mem::take(&mut current));
                i += 1;
                continue;
            }
            c => current.push(c),
        }
        i += 1;
    }
    alts.push(current);
    alts
}

/// A parsed `[...]` class.
struct CharClass {
    negated: bool,
    singles: Vec<char>,
    ranges: Vec<(char, char)>,
    posix: Vec<String>,
}

impl CharClass {
    fn matches(&self, c: char, opts: MatchOptions) -> bool {
        let mut hit = self.singles.iter().any(|&s| chars_eq(s, c, opts))
            || self.ranges.iter().any(|&(lo, hi)| {
                (lo..=hi).contains(&c)
                    || (opts.casefold
                        && (lo..=hi).contains(&c.to_ascii_lowercase())
                        || opts.casefold && (lo..=hi).contains(&c.to_ascii_uppercase()))
            });
        if !hit {
            hit = self.posix.iter().any(|name| match name.as_str() {
                "alpha" => c.is_alphabetic(),
                "digit" => c.is_ascii_digit(),
                "alnum" => c.is_alphanumeric(),
                "upper" => c.is_uppercase(),
                "lower" => c.is_lowercase(),
                "space" => c.is_whitespace(),
                "blank" => c == ' ' || c == '\t',
                "punct" => c.is_ascii_punctuation(),
                "cntrl" => c.is_control(),
                "graph" => c.is_ascii_graphic(),
                "print" => c.is_ascii_graphic() || c == ' ',
                "xdigit" => c.is_ascii_hexdigit(),
                "word" => c.is_alphanumeric() || c == '_',
                _ => false,
            });
        }
        hit != self.negated
    }
}

/// Parse a class starting at `p[0] == '['`; returns it plus the number of
/// pattern characters consumed, or `None` when unterminated.
fn parse_class(p: &[char]) -> Option<(CharClass, usize)> {
    let mut i = 1;
    let mut class = CharClass {
        negated: false,
        singles: Vec::new(),
        ranges: Vec::new(),
        posix: Vec::new(),
    };

    if matches!(p.get(i), Some('!') | Some('^')) {
        class.negated = true;
        i += 1;
    }
    // A `]` right after the opening (or negation) is literal.
    if p.get(i) == Some(&']') {
        class.singles.push(']');
        i += 1;
    }

    while i < p.len() {
        match p[i] {
            ']' => return Some((class, i + 1)),
            '[' if p.get(i + 1) == Some(&':') => {
                let mut j = i + 2;
                let mut name = String::new();
                while j < p.len() && p[j] != ':' {
                    name.push(p[j]);
                    j += 1;
                }
                if p.get(j) == Some(&':') && p.get(j + 1) == Some(&']') {
                    class.posix.push(name);
                    i = j + 2;
                } else {
                    class.singles.push('[');
                    i += 1;
                }
            }
            c => {
                if p.get(i + 1) == Some(&'-') && p.get(i + 2).map(|&e| e != ']').unwrap_or(false) {
                    class.ranges.push((c, p[i + 2]));
                    i += 3;
                } else {
                    class.singles.push(c);
                    i += 1;
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(pattern: &str, text: &str) -> bool {
        pattern_matches(pattern, text, MatchOptions::default())
    }

    fn mx(pattern: &str, text: &str) -> bool {
        pattern_matches(
            pattern,
            text,
            MatchOptions {
                extglob: true,
                casefold: false,
            },
        )
    }

    #[test]
    fn literal_and_basic_wildcards() {
        assert!(m("abc", "abc"));
        assert!(!m("abc", "abd"));
        assert!(m("a*c", "abbbc"));
        assert!(m("*", ""));
        assert!(m("a?c", "abc"));
        assert!(!m("a?c", "ac"));
    }

    #[test]
    fn star_runs_collapse() {
        assert!(m("a**b", "ab"));
        assert!(m("a***b", "axyzb"));
    }

    #[test]
    fn character_classes() {
        assert!(m("[abc]", "b"));
        assert!(!m("[abc]", "d"));
        assert!(m("[a-z]x", "mx"));
        assert!(m("[!a-z]", "5"));
        assert!(!m("[!a-z]", "m"));
        assert!(m("[]x]", "]"));
        assert!(m("[]x]", "x"));
    }

    #[test]
    fn posix_classes() {
        assert!(m("[[:alpha:]]*", "hello"));
        assert!(m("[[:digit:]][[:digit:]]", "42"));
        assert!(!m("[[:digit:]]", "x"));
        assert!(m("[[:space:]]", "\t"));
    }

    #[test]
    fn escaped_metacharacters() {
        assert!(m("a\\*b", "a*b"));
        assert!(!m("a\\*b", "axb"));
        assert!(m("\\?", "?"));
    }

    #[test]
    fn extglob_optional_and_repeats() {
        assert!(mx("a?(x)b", "ab"));
        assert!(mx("a?(x)b", "axb"));
        assert!(!mx("a?(x)b", "axxb"));

        assert!(mx("a*(x|y)b", "ab"));
        assert!(mx("a*(x|y)b", "axyxb"));

        assert!(!mx("a+(x)b", "ab"));
        assert!(mx("a+(x)b", "axxb"));

        assert!(mx("@(foo|bar)", "bar"));
        assert!(!mx("@(foo|bar)", "baz"));
    }

    #[test]
    fn extglob_negation() {
        assert!(mx("!(foo)", "bar"));
        assert!(!mx("!(foo)", "foo"));
        assert!(mx("!(foo)", ""));
        assert!(mx("!(foo|bar).txt", "baz.txt"));
        assert!(!mx("!(foo|bar).txt", "foo.txt"));
    }

    #[test]
    fn extglob_disabled_is_literal() {
        assert!(!m("@(foo)", "foo"));
        assert!(m("@(foo)", "@(foo)"));
    }

    #[test]
    fn casefold_matching() {
        let opts = MatchOptions {
            extglob: false,
            casefold: true,
        };
        assert!(pattern_matches("AB*", "abcd", opts));
        assert!(pattern_matches("[a-z]", "Q", opts));
    }

    #[test]
    fn glob_char_detection() {
        assert!(has_glob_chars("*.txt", false));
        assert!(has_glob_chars("a?b", false));
        assert!(has_glob_chars("[ab]", false));
        assert!(!has_glob_chars("plain", false));
        assert!(!has_glob_chars("\\*literal", false));
        assert!(has_glob_chars("@(x)", true));
        assert!(!has_glob_chars("@(x)", false));
    }

    #[test]
    fn escape_round_trip() {
        let text = "a*b?c[d]";
        assert!(m(&escape_pattern(text), text));
        assert!(!m(&escape_pattern("a*"), "ab"));
    }
}
