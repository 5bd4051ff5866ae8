//! Parameter expansion
//!
//! Implements `$name`, `${name}`, and the whole `${...}` operator family
//! over scalars, indexed arrays, associative arrays, positional parameters,
//! and the special parameters.

use super::{ExpandError, ExpandResult};
use crate::interpreter::state::{ArrayKey, AssignMode, Value};
use crate::interpreter::{BoxFuture, Interpreter};
use crate::parser::ast::{ParamExp, ParamOp, ReplaceMode, Word};
use crate::parser::word::decode_ansi_c;
use crate::pattern::{pattern_matches, MatchOptions};

/// The synthetic process id reported by `$$`: there is no real process, and
/// determinism matters more than realism.
const SHELL_PID: &str = "4242";

/// Result of a parameter expansion: one string, or pre-split fields from
/// `"$@"`-style expansions (never re-split, never re-globbed when quoted).
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ParamValue {
    Single(String),
    Fields(Vec<String>),
}

/// What the parameter itself held, before operators.
#[derive(Debug, Clone)]
enum Subject {
    Unset,
    Scalar(String),
    /// `$@`, `$*`, `${a[@]}`, `${a[*]}`; `star` selects joining semantics.
    List { fields: Vec<String>, star: bool },
}

pub(crate) fn expand_param<'a>(
    interp: &'a mut Interpreter,
    exp: &'a ParamExp,
    quoted: bool,
) -> BoxFuture<'a, ExpandResult<ParamValue>> {
    Box::pin(async move { expand_param_inner(interp, exp, quoted).await })
}

async fn expand_param_inner(
    interp: &mut Interpreter,
    exp: &ParamExp,
    quoted: bool,
) -> ExpandResult<ParamValue> {
    match &exp.op {
        ParamOp::BadSubstitution(text) => {
            return Err(ExpandError::soft(
                format!("${{{text}}}: bad substitution"),
                1,
            ));
        }
        ParamOp::NamePrefix { star } => {
            let names = interp.state.names_with_prefix(&exp.name);
            return Ok(join_or_fields(interp, names, *star, quoted));
        }
        ParamOp::ArrayKeys { star } => {
            let keys = match interp.state.get(&exp.name) {
                Some(value) => value.keys(),
                None => Vec::new(),
            };
            return Ok(join_or_fields(interp, keys, *star, quoted));
        }
        _ => {}
    }

    // ${!ref}: the subject variable is named by ref's value.
    let (name, index) = if exp.indirect {
        let base = read_subject(interp, &exp.name, exp.index.as_deref()).await?;
        let target = match base {
            Subject::Scalar(s) if !s.is_empty() => s,
            _ => {
                if interp.state.options.set.nounset {
                    return Err(ExpandError::aborting(
                        format!("{}: unbound variable", exp.name),
                        1,
                    ));
                }
                return Ok(ParamValue::Single(String::new()));
            }
        };
        split_target(&target)
    } else {
        (exp.name.clone(), exp.index.clone())
    };

    let subject = read_subject(interp, &name, index.as_deref()).await?;

    // `$@`-shaped access never faults and renders as zero fields.
    let list_access = matches!(name.as_str(), "@" | "*")
        || matches!(index.as_deref(), Some("@") | Some("*"));

    // set -u: reading an unset parameter is fatal, except under the
    // operators that exist to handle unset values.
    let forgiving = matches!(
        exp.op,
        ParamOp::Default { .. }
            | ParamOp::Assign { .. }
            | ParamOp::Error { .. }
            | ParamOp::Alternate { .. }
    );
    if matches!(subject, Subject::Unset)
        && interp.state.options.set.nounset
        && !forgiving
        && !list_access
    {
        return Err(ExpandError::aborting(format!("{name}: unbound variable"), 1));
    }

    match &exp.op {
        ParamOp::Plain => {
            if list_access && matches!(subject, Subject::Unset) {
                return Ok(ParamValue::Fields(Vec::new()));
            }
            Ok(render(interp, subject, quoted))
        }

        ParamOp::Length => {
            let len = match &subject {
                Subject::Unset => 0,
                Subject::Scalar(s) => s.chars().count(),
                Subject::List { fields, .. } => fields.len(),
            };
            Ok(ParamValue::Single(len.to_string()))
        }

        ParamOp::Default { word, colon } => {
            if subject_missing(&subject, *colon) {
                Ok(ParamValue::Single(interp.expand_word_single(word).await?))
            } else {
                Ok(render(interp, subject, quoted))
            }
        }

        ParamOp::Assign { word, colon } => {
            if subject_missing(&subject, *colon) {
                let value = interp.expand_word_single(word).await?;
                let mode = AssignMode::default();
                let outcome = match &index {
                    Some(raw) => {
                        let key = interp.eval_subscript(&name, raw).await?;
                        interp.state.set_element(&name, key, value.clone(), mode)
                    }
                    None => interp.state.set_scalar(&name, value.clone(), mode),
                };
                if let Err(err) = outcome {
                    return Err(ExpandError::soft(err.message(), 1));
                }
                Ok(ParamValue::Single(value))
            } else {
                Ok(render(interp, subject, quoted))
            }
        }

        ParamOp::Error { word, colon } => {
            if subject_missing(&subject, *colon) {
                let message = match word {
                    Some(w) => interp.expand_word_single(w).await?,
                    None => "parameter null or not set".to_string(),
                };
                Err(ExpandError::aborting(format!("{name}: {message}"), 1))
            } else {
                Ok(render(interp, subject, quoted))
            }
        }

        ParamOp::Alternate { word, colon } => {
            if subject_missing(&subject, *colon) {
                Ok(ParamValue::Single(String::new()))
            } else {
                Ok(ParamValue::Single(interp.expand_word_single(word).await?))
            }
        }

        ParamOp::Substring { offset, length } => {
            let off = interp.eval_arith_text(offset).await?;
            let len = match length {
                Some(text) => Some(interp.eval_arith_text(text).await?),
                None => None,
            };
            apply_substring(interp, &name, subject, off, len, quoted)
        }

        ParamOp::RemovePrefix { pattern, greedy } => {
            let pat = interp.expand_word_pattern(pattern).await?;
            let opts = interp.match_options();
            Ok(map_subject(interp, subject, quoted, |s| {
                remove_prefix(&s, &pat, *greedy, opts)
            }))
        }

        ParamOp::RemoveSuffix { pattern, greedy } => {
            let pat = interp.expand_word_pattern(pattern).await?;
            let opts = interp.match_options();
            Ok(map_subject(interp, subject, quoted, |s| {
                remove_suffix(&s, &pat, *greedy, opts)
            }))
        }

        ParamOp::Replace {
            pattern,
            replacement,
            mode,
        } => {
            let pat = interp.expand_word_pattern(pattern).await?;
            let repl = match replacement {
                Some(word) => interp.expand_word_single(word).await?,
                None => String::new(),
            };
            let opts = interp.match_options();
            Ok(map_subject(interp, subject, quoted, |s| {
                replace_pattern(&s, &pat, &repl, *mode, opts)
            }))
        }

        ParamOp::CaseMod {
            upper,
            all,
            pattern,
        } => {
            let pat = match pattern {
                Some(word) => Some(interp.expand_word_pattern(word).await?),
                None => None,
            };
            let opts = interp.match_options();
            let upper = *upper;
            let all = *all;
            Ok(map_subject(interp, subject, quoted, |s| {
                case_modify(&s, pat.as_deref(), upper, all, opts)
            }))
        }

        ParamOp::Transform(op) => apply_transform(interp, &name, subject, *op, quoted),

        // Handled before subject resolution.
        ParamOp::BadSubstitution(_) | ParamOp::NamePrefix { .. } | ParamOp::ArrayKeys { .. } => {
            Ok(ParamValue::Single(String::new()))
        }
    }
}

/// `${!ref}` targets may themselves carry a subscript (`ref='a[2]'`).
fn split_target(target: &str) -> (String, Option<String>) {
    if let Some(open) = target.find('[') {
        if let Some(inner) = target[open..].strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            return (target[..open].to_string(), Some(inner.to_string()));
        }
    }
    (target.to_string(), None)
}

/// Resolve a parameter (with optional subscript) to its subject value.
async fn read_subject(
    interp: &mut Interpreter,
    name: &str,
    index: Option<&str>,
) -> ExpandResult<Subject> {
    // Array-style access first.
    if let Some(raw) = index {
        if raw == "@" || raw == "*" {
            let fields = match interp.state.get(name) {
                Some(value) => value.elements(),
                None => Vec::new(),
            };
            if fields.is_empty() && !interp.state.is_set(name) {
                return Ok(Subject::Unset);
            }
            return Ok(Subject::List {
                fields,
                star: raw == "*",
            });
        }
        let key = interp.eval_subscript(name, raw).await?;
        return Ok(match read_element(interp, name, &key) {
            Some(value) => Subject::Scalar(value),
            None => Subject::Unset,
        });
    }

    let state = &interp.state;
    Ok(match name {
        "@" => Subject::List {
            fields: state.positional.clone(),
            star: false,
        },
        "*" => Subject::List {
            fields: state.positional.clone(),
            star: true,
        },
        "#" => Subject::Scalar(state.positional.len().to_string()),
        "?" => Subject::Scalar(state.last_status.to_string()),
        "$" => Subject::Scalar(SHELL_PID.to_string()),
        "!" => {
            if state.last_background_id == 0 {
                Subject::Unset
            } else {
                Subject::Scalar(state.last_background_id.to_string())
            }
        }
        "-" => Subject::Scalar(state.options.flag_letters()),
        "_" => Subject::Scalar(state.last_arg.clone()),
        "0" => Subject::Scalar(state.script_name.clone()),
        "LINENO" => Subject::Scalar(state.line.to_string()),
        digits if digits.chars().all(|c| c.is_ascii_digit()) => {
            let n: usize = digits.parse().unwrap_or(0);
            match state.positional.get(n.saturating_sub(1)) {
                Some(value) if n >= 1 => Subject::Scalar(value.clone()),
                _ => Subject::Unset,
            }
        }
        _ => match state.get(name) {
            Some(value) => Subject::Scalar(value.to_field()),
            None => Subject::Unset,
        },
    })
}

/// Read one array element (or a scalar treated as element 0).
pub(crate) fn read_element(interp: &Interpreter, name: &str, key: &ArrayKey) -> Option<String> {
    let value = interp.state.get(name)?;
    match (value, key) {
        (Value::Scalar(s), ArrayKey::Index(0)) => Some(s.clone()),
        (Value::Scalar(_), _) => None,
        (Value::Indexed(map), ArrayKey::Index(i)) => {
            let idx = if *i < 0 {
                // Negative subscripts count back from the highest index.
                map.keys().next_back().map(|max| max + 1 + i)?
            } else {
                *i
            };
            map.get(&idx).cloned()
        }
        (Value::Indexed(_), ArrayKey::Key(_)) => None,
        (Value::Assoc(map), ArrayKey::Key(k)) => map.get(k).cloned(),
        (Value::Assoc(map), ArrayKey::Index(i)) => map.get(&i.to_string()).cloned(),
    }
}

/// Is the subject missing for `:`-style (unset-or-empty) or plain (unset
/// only) operators?
fn subject_missing(subject: &Subject, colon: bool) -> bool {
    match subject {
        Subject::Unset => true,
        Subject::Scalar(s) => colon && s.is_empty(),
        Subject::List { fields, .. } => {
            if colon {
                fields.is_empty() || (fields.len() == 1 && fields[0].is_empty())
            } else {
                false
            }
        }
    }
}

/// Render a subject with `$@`/`$*` joining semantics.
fn render(interp: &Interpreter, subject: Subject, quoted: bool) -> ParamValue {
    match subject {
        Subject::Unset => ParamValue::Single(String::new()),
        Subject::Scalar(s) => ParamValue::Single(s),
        Subject::List { fields, star } => {
            if star && quoted {
                ParamValue::Single(fields.join(&join_char(interp)))
            } else {
                ParamValue::Fields(fields)
            }
        }
    }
}

fn join_or_fields(
    interp: &Interpreter,
    items: Vec<String>,
    star: bool,
    quoted: bool,
) -> ParamValue {
    if star && quoted {
        ParamValue::Single(items.join(&join_char(interp)))
    } else {
        ParamValue::Fields(items)
    }
}

/// `"$*"` joins with the first character of IFS (empty IFS joins with
/// nothing).
fn join_char(interp: &Interpreter) -> String {
    interp
        .state
        .ifs()
        .chars()
        .next()
        .map(String::from)
        .unwrap_or_default()
}

/// Apply a per-string transform across the subject.
fn map_subject(
    interp: &Interpreter,
    subject: Subject,
    quoted: bool,
    f: impl Fn(String) -> String,
) -> ParamValue {
    match subject {
        Subject::Unset => ParamValue::Single(String::new()),
        Subject::Scalar(s) => ParamValue::Single(f(s)),
        Subject::List { fields, star } => render(
            interp,
            Subject::List {
                fields: fields.into_iter().map(f).collect(),
                star,
            },
            quoted,
        ),
    }
}

fn apply_substring(
    interp: &Interpreter,
    name: &str,
    subject: Subject,
    offset: i64,
    length: Option<i64>,
    quoted: bool,
) -> ExpandResult<ParamValue> {
    match subject {
        Subject::Unset => Ok(ParamValue::Single(String::new())),
        Subject::Scalar(s) => {
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len() as i64;
            let start = if offset < 0 { len + offset } else { offset };
            if start < 0 || start > len {
                return Ok(ParamValue::Single(String::new()));
            }
            let end = match length {
                None => len,
                Some(l) if l >= 0 => (start + l).min(len),
                Some(l) => {
                    let e = len + l;
                    if e < start {
                        return Err(ExpandError::soft(
                            format!("{name}: substring expression < 0"),
                            1,
                        ));
                    }
                    e
                }
            };
            Ok(ParamValue::Single(
                chars[start as usize..end as usize].iter().collect(),
            ))
        }
        Subject::List { fields, star } => {
            // ${@:off:len} counts $0 at offset 0.
            let mut all = Vec::with_capacity(fields.len() + 1);
            let positional_form = name == "@" || name == "*";
            if positional_form {
                all.push(interp.state.script_name.clone());
            }
            all.extend(fields);
            let len = all.len() as i64;
            let start = if offset < 0 { len + offset } else { offset };
            if start < 0 || start > len {
                return Ok(render(interp, Subject::List { fields: vec![], star }, quoted));
            }
            let end = match length {
                None => len,
                Some(l) if l >= 0 => (start + l).min(len),
                Some(_) => {
                    return Err(ExpandError::soft(
                        format!("{name}: substring expression < 0"),
                        1,
                    ))
                }
            };
            let slice = all[start as usize..end as usize].to_vec();
            Ok(render(
                interp,
                Subject::List {
                    fields: slice,
                    star,
                },
                quoted,
            ))
        }
    }
}

fn apply_transform(
    interp: &Interpreter,
    name: &str,
    subject: Subject,
    op: char,
    quoted: bool,
) -> ExpandResult<ParamValue> {
    let attrs = interp.state.attrs(name);
    let transform_one = |s: &str| -> ExpandResult<String> {
        Ok(match op {
            'U' => s.to_uppercase(),
            'u' => {
                let mut chars = s.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            }
            'L' => s.to_lowercase(),
            'Q' => quote_single(s),
            'E' => decode_ansi_c(s),
            'P' => s.to_string(),
            'A' => format!("{name}={}", quote_single(s)),
            'a' => attr_letters(attrs),
            'K' | 'k' => s.to_string(),
            other => {
                return Err(ExpandError::soft(
                    format!("${{{name}@{other}}}: bad substitution"),
                    1,
                ))
            }
        })
    };

    match subject {
        Subject::Unset => {
            // Operator validity is still checked for unset subjects.
            transform_one("")?;
            Ok(ParamValue::Single(String::new()))
        }
        Subject::Scalar(s) => Ok(ParamValue::Single(transform_one(&s)?)),
        Subject::List { fields, star } => {
            if op == 'K' || op == 'k' {
                let keys = interp
                    .state
                    .get(name)
                    .map(|v| v.keys())
                    .unwrap_or_default();
                let mut pairs = Vec::new();
                for (key, value) in keys.iter().zip(fields.iter()) {
                    if op == 'K' {
                        pairs.push(format!("{key} {}", quote_double(value)));
                    } else {
                        pairs.push(key.clone());
                        pairs.push(value.clone());
                    }
                }
                if op == 'K' {
                    return Ok(ParamValue::Single(pairs.join(" ")));
                }
                return Ok(ParamValue::Fields(pairs));
            }
            let mut out = Vec::new();
            for field in fields {
                out.push(transform_one(&field)?);
            }
            Ok(render(
                interp,
                Subject::List {
                    fields: out,
                    star,
                },
                quoted,
            ))
        }
    }
}

/// `${x@Q}`-style single quoting.
fn quote_single(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    format!("'{}'", s.replace('\'', "'\\''"))
}

fn quote_double(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn attr_letters(attrs: crate::interpreter::state::VarAttrs) -> String {
    let mut out = String::new();
    if attrs.readonly {
        out.push('r');
    }
    if attrs.exported {
        out.push('x');
    }
    if attrs.integer {
        out.push('i');
    }
    if attrs.lowercase {
        out.push('l');
    }
    if attrs.uppercase {
        out.push('u');
    }
    if attrs.nameref {
        out.push('n');
    }
    out
}

// --- pattern helpers (shared with `case` via the pattern module) ---

/// `${x#pat}` / `${x##pat}`.
pub(crate) fn remove_prefix(s: &str, pattern: &str, greedy: bool, opts: MatchOptions) -> String {
    let chars: Vec<char> = s.chars().collect();
    let range: Vec<usize> = if greedy {
        (0..=chars.len()).rev().collect()
    } else {
        (0..=chars.len()).collect()
    };
    for k in range {
        let prefix: String = chars[..k].iter().collect();
        if pattern_matches(pattern, &prefix, opts) {
            return chars[k..].iter().collect();
        }
    }
    s.to_string()
}

/// `${x%pat}` / `${x%%pat}`.
pub(crate) fn remove_suffix(s: &str, pattern: &str, greedy: bool, opts: MatchOptions) -> String {
    let chars: Vec<char> = s.chars().collect();
    let range: Vec<usize> = if greedy {
        (0..=chars.len()).collect()
    } else {
        (0..=chars.len()).rev().collect()
    };
    for k in range {
        let suffix: String = chars[k..].iter().collect();
        if pattern_matches(pattern, &suffix, opts) {
            return chars[..k].iter().collect();
        }
    }
    s.to_string()
}

/// `${x/pat/repl}` family. Matches are longest-at-leftmost.
pub(crate) fn replace_pattern(
    s: &str,
    pattern: &str,
    replacement: &str,
    mode: ReplaceMode,
    opts: MatchOptions,
) -> String {
    let chars: Vec<char> = s.chars().collect();

    match mode {
        ReplaceMode::Prefix => {
            for k in (0..=chars.len()).rev() {
                let prefix: String = chars[..k].iter().collect();
                if pattern_matches(pattern, &prefix, opts) {
                    let rest: String = chars[k..].iter().collect();
                    return format!("{replacement}{rest}");
                }
            }
            s.to_string()
        }
        ReplaceMode::Suffix => {
            for k in 0..=chars.len() {
                let suffix: String = chars[k..].iter().collect();
                if pattern_matches(pattern, &suffix, opts) {
                    let head: String = chars[..k].iter().collect();
                    return format!("{head}{replacement}");
                }
            }
            s.to_string()
        }
        ReplaceMode::First | ReplaceMode::All => {
            let all = mode == ReplaceMode::All;
            let mut out = String::new();
            let mut i = 0;
            let mut replaced = false;
            while i < chars.len() {
                let mut matched = None;
                if !replaced || all {
                    for k in (i..=chars.len()).rev() {
                        let piece: String = chars[i..k].iter().collect();
                        if pattern_matches(pattern, &piece, opts) {
                            matched = Some(k);
                            break;
                        }
                    }
                }
                match matched {
                    // Skip empty matches to guarantee progress.
                    Some(k) if k > i => {
                        out.push_str(replacement);
                        replaced = true;
                        i = k;
                    }
                    _ => {
                        out.push(chars[i]);
                        i += 1;
                    }
                }
            }
            // An empty match still replaces once on an empty string.
            if chars.is_empty() && pattern_matches(pattern, "", opts) {
                return replacement.to_string();
            }
            out
        }
    }
}

/// `${x^pat}` / `${x,,pat}` and friends.
pub(crate) fn case_modify(
    s: &str,
    pattern: Option<&str>,
    upper: bool,
    all: bool,
    opts: MatchOptions,
) -> String {
    let convert = |c: char| -> String {
        if upper {
            c.to_uppercase().collect()
        } else {
            c.to_lowercase().collect()
        }
    };
    let matches = |c: char| -> bool {
        match pattern {
            None => true,
            Some(p) => pattern_matches(p, &c.to_string(), opts),
        }
    };

    let mut out = String::new();
    for (i, c) in s.chars().enumerate() {
        if (all || i == 0) && matches(c) {
            out.push_str(&convert(c));
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> MatchOptions {
        MatchOptions::default()
    }

    // --- pattern helpers ---

    #[test]
    fn prefix_removal_shortest_and_longest() {
        assert_eq!(remove_prefix("a.b.c", "*.", false, opts()), "b.c");
        assert_eq!(remove_prefix("a.b.c", "*.", true, opts()), "c");
        assert_eq!(remove_prefix("abc", "x", false, opts()), "abc");
    }

    #[test]
    fn suffix_removal_shortest_and_longest() {
        assert_eq!(remove_suffix("a.b.c", ".*", false, opts()), "a.b");
        assert_eq!(remove_suffix("a.b.c", ".*", true, opts()), "a");
    }

    #[test]
    fn replace_first_and_all() {
        assert_eq!(
            replace_pattern("aaa", "a", "b", ReplaceMode::First, opts()),
            "baa"
        );
        assert_eq!(
            replace_pattern("aaa", "a", "b", ReplaceMode::All, opts()),
            "bbb"
        );
        assert_eq!(
            replace_pattern("hello", "l*o", "!", ReplaceMode::First, opts()),
            "he!"
        );
    }

    #[test]
    fn replace_anchored() {
        assert_eq!(
            replace_pattern("aba", "a", "X", ReplaceMode::Prefix, opts()),
            "Xba"
        );
        assert_eq!(
            replace_pattern("aba", "a", "X", ReplaceMode::Suffix, opts()),
            "abX"
        );
        assert_eq!(
            replace_pattern("aba", "b", "X", ReplaceMode::Prefix, opts()),
            "aba"
        );
    }

    #[test]
    fn star_replaces_whole_string_once() {
        assert_eq!(
            replace_pattern("abc", "*", "X", ReplaceMode::All, opts()),
            "X"
        );
    }

    #[test]
    fn case_modification() {
        assert_eq!(case_modify("hello", None, true, false, opts()), "Hello");
        assert_eq!(case_modify("hello", None, true, true, opts()), "HELLO");
        assert_eq!(case_modify("HELLO", None, false, true, opts()), "hello");
        assert_eq!(
            case_modify("hello", Some("[aeiou]"), true, true, opts()),
            "hEllO"
        );
        // First char does not match: nothing happens.
        assert_eq!(case_modify("hello", Some("l"), true, false, opts()), "hello");
    }

    #[test]
    fn quoting_helpers() {
        assert_eq!(quote_single("abc"), "'abc'");
        assert_eq!(quote_single(""), "''");
        assert_eq!(quote_single("a'b"), "'a'\\''b'");
        assert_eq!(quote_double("a\"b"), "\"a\\\"b\"");
    }

    #[test]
    fn indirect_target_subscript() {
        assert_eq!(split_target("plain"), ("plain".to_string(), None));
        assert_eq!(
            split_target("a[2]"),
            ("a".to_string(), Some("2".to_string()))
        );
    }
}
