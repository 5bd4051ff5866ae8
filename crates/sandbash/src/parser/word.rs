//! Word subparser
//!
//! Turns the lexer's raw word parts into the typed [`Word`] tree: `${...}`
//! text becomes an operator triple, substitution bodies get nested parses,
//! unquoted braces become brace-expansion items, and a leading `~` becomes a
//! tilde part. Quoting classification is preserved throughout.

use super::arith::parse_arith_source;
use super::ast::{BraceRange, ParamExp, ParamOp, ReplaceMode, Word, WordPart};
use super::lexer::Lexer;
use super::tokens::RawPart;
use super::Parser;
use crate::error::{Error, Result};

/// Convert a lexed word into its AST form.
pub fn parse_word(parts: &[RawPart], line: usize) -> Result<Word> {
    let items = to_items(parts, line)?;
    let parts = scan_braces(&items, line)?;
    Ok(Word {
        parts: detect_tilde(parts),
    })
}

/// Lex and parse free-form expansion text (heredoc bodies, deferred
/// arithmetic): `$` forms are live, everything else is literal, quotes are
/// ordinary characters.
pub fn parse_expansion_text(text: &str, line: usize) -> Result<Word> {
    let raw = Lexer::lex_expansion_text(text)?;
    let mut parts = Vec::new();
    for part in &raw {
        parts.push(convert_part(part, line)?);
    }
    Ok(Word { parts })
}

/// An intermediate item: either one unquoted literal character (visible to
/// the brace scanner) or an opaque, already-converted part.
enum Item {
    Ch(char),
    Part(WordPart),
}

fn to_items(parts: &[RawPart], line: usize) -> Result<Vec<Item>> {
    let mut items = Vec::new();
    for part in parts {
        match part {
            RawPart::Literal(text) => {
                for c in text.chars() {
                    items.push(Item::Ch(c));
                }
            }
            other => items.push(Item::Part(convert_part(other, line)?)),
        }
    }
    Ok(items)
}

/// Convert one non-literal raw part.
fn convert_part(part: &RawPart, line: usize) -> Result<WordPart> {
    Ok(match part {
        RawPart::Literal(text) => WordPart::Literal(text.clone()),
        RawPart::SingleQuoted(text) => WordPart::SingleQuoted(text.clone()),
        RawPart::AnsiQuoted(text) => WordPart::SingleQuoted(decode_ansi_c(text)),
        RawPart::Escaped(c) => WordPart::Escaped(c.to_string()),
        RawPart::DoubleQuoted(inner) => {
            let mut converted = Vec::new();
            for p in inner {
                converted.push(convert_part(p, line)?);
            }
            WordPart::DoubleQuoted(converted)
        }
        RawPart::Var(name) => WordPart::Param(Box::new(ParamExp::plain(name.clone()))),
        RawPart::Param(inner) => WordPart::Param(Box::new(parse_param(inner, line)?)),
        RawPart::CmdSub(body) => WordPart::CmdSub {
            script: Parser::new(body).parse()?,
            legacy: false,
        },
        RawPart::Backquote(body) => WordPart::CmdSub {
            script: Parser::new(body).parse()?,
            legacy: true,
        },
        RawPart::ArithSub(body) => WordPart::ArithSub(parse_arith_source(body, line)?),
        RawPart::ProcSub { output, body } => WordPart::ProcSub {
            output: *output,
            script: Parser::new(body).parse()?,
        },
    })
}

/// Replace a leading unquoted `~[user]` run with a tilde part.
fn detect_tilde(parts: Vec<WordPart>) -> Vec<WordPart> {
    let Some(WordPart::Literal(first)) = parts.first() else {
        return parts;
    };
    let Some(rest) = first.strip_prefix('~') else {
        return parts;
    };

    let (user, remainder) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => {
            // The tilde prefix must end the word to count when no slash
            // follows; a later part would extend the "user name".
            if parts.len() > 1 {
                return parts;
            }
            (rest, "")
        }
    };

    let valid = user.is_empty()
        || user == "+"
        || user == "-"
        || user
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-');
    if !valid {
        return parts;
    }

    let mut out = vec![WordPart::Tilde(user.to_string())];
    if !remainder.is_empty() {
        out.push(WordPart::Literal(remainder.to_string()));
    }
    out.extend(parts.into_iter().skip(1));
    out
}

/// Find unquoted `{...}` groups and ranges; anything unbalanced or without
/// a `,`/`..` stays literal.
fn scan_braces(items: &[Item], line: usize) -> Result<Vec<WordPart>> {
    let mut out: Vec<WordPart> = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    macro_rules! flush {
        () => {
            if !literal.is_empty() {
                out.push(WordPart::Literal(std::mem::take(&mut literal)));
            }
        };
    }

    while i < items.len() {
        match &items[i] {
            Item::Ch('{') => {
                if let Some((end, commas)) = find_brace_end(items, i) {
                    let inner = &items[i + 1..end];
                    if commas > 0 {
                        flush!();
                        out.push(WordPart::BraceGroup(split_brace_members(inner, line)?));
                        i = end + 1;
                        continue;
                    }
                    if let Some(range) = parse_brace_range(inner) {
                        flush!();
                        out.push(WordPart::BraceRange(range));
                        i = end + 1;
                        continue;
                    }
                }
                literal.push('{');
                i += 1;
            }
            Item::Ch(c) => {
                literal.push(*c);
                i += 1;
            }
            Item::Part(p) => {
                flush!();
                out.push(p.clone());
                i += 1;
            }
        }
    }
    flush!();
    Ok(out)
}

/// Locate the `}` matching the `{` at `start`; returns its index and the
/// count of top-level commas.
fn find_brace_end(items: &[Item], start: usize) -> Option<(usize, usize)> {
    let mut depth = 0usize;
    let mut commas = 0usize;
    for (i, item) in items.iter().enumerate().skip(start) {
        if let Item::Ch(c) = item {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some((i, commas));
                    }
                }
                ',' if depth == 1 => commas += 1,
                _ => {}
            }
        }
    }
    None
}

/// Split `{a,b,c}` innards on top-level commas into member words.
fn split_brace_members(items: &[Item], line: usize) -> Result<Vec<Word>> {
    let mut members = Vec::new();
    let mut current: Vec<&Item> = Vec::new();
    let mut depth = 0i32;

    for item in items {
        match item {
            Item::Ch('{') => {
                depth += 1;
                current.push(item);
            }
            Item::Ch('}') => {
                depth -= 1;
                current.push(item);
            }
            Item::Ch(',') if depth == 0 => {
                members.push(items_to_word(&current, line)?);
                current.clear();
            }
            _ => current.push(item),
        }
    }
    members.push(items_to_word(&current, line)?);
    Ok(members)
}

fn items_to_word(items: &[&Item], line: usize) -> Result<Word> {
    // Re-own the borrowed items, then reuse the brace scanner so nested
    // groups expand too.
    let owned: Vec<Item> = items
        .iter()
        .map(|item| match item {
            Item::Ch(c) => Item::Ch(*c),
            Item::Part(p) => Item::Part(p.clone()),
        })
        .collect();
    Ok(Word {
        parts: scan_braces(&owned, line)?,
    })
}

/// Parse `1..5`, `a..f`, `01..10`, `1..9..2` sequence expressions.
fn parse_brace_range(items: &[Item]) -> Option<BraceRange> {
    let mut text = String::new();
    for item in items {
        match item {
            Item::Ch(c) => text.push(*c),
            Item::Part(_) => return None,
        }
    }

    let pieces: Vec<&str> = text.split("..").collect();
    if pieces.len() != 2 && pieces.len() != 3 {
        return None;
    }
    let step: i64 = match pieces.get(2) {
        Some(s) => s.parse().ok()?,
        None => 1,
    };

    let is_alpha =
        |s: &str| s.len() == 1 && s.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
    if is_alpha(pieces[0]) && is_alpha(pieces[1]) {
        let start = pieces[0].chars().next()? as i64;
        let end = pieces[1].chars().next()? as i64;
        return Some(BraceRange {
            start,
            end,
            step,
            alpha: true,
            width: 0,
        });
    }

    let start: i64 = pieces[0].parse().ok()?;
    let end: i64 = pieces[1].parse().ok()?;
    let padded = |s: &str| {
        let digits = s.strip_prefix('-').unwrap_or(s);
        digits.len() > 1 && digits.starts_with('0')
    };
    let width = if padded(pieces[0]) || padded(pieces[1]) {
        pieces[0]
            .trim_start_matches('-')
            .len()
            .max(pieces[1].trim_start_matches('-').len())
    } else {
        0
    };
    Some(BraceRange {
        start,
        end,
        step,
        alpha: false,
        width,
    })
}

/// Parse the inside of `${ ... }` into a parameter expansion.
pub fn parse_param(inner: &str, line: usize) -> Result<ParamExp> {
    let bad = |text: &str| ParamExp {
        name: String::new(),
        index: None,
        indirect: false,
        op: ParamOp::BadSubstitution(text.to_string()),
    };

    if inner.is_empty() {
        return Ok(bad(inner));
    }

    // ${#param} length, but ${#} and ${#-...} are the parameter `#`.
    if let Some(rest) = inner.strip_prefix('#') {
        if !rest.is_empty() && !rest.starts_with(|c: char| "-=?+:".contains(c)) {
            let (name, index, tail) = match split_name(rest) {
                Some(v) => v,
                None => return Ok(bad(inner)),
            };
            if !tail.is_empty() {
                return Ok(bad(inner));
            }
            return Ok(ParamExp {
                name,
                index,
                indirect: false,
                op: ParamOp::Length,
            });
        }
    }

    // ${!prefix*}, ${!a[@]}, ${!name} indirection.
    if let Some(rest) = inner.strip_prefix('!') {
        if !rest.is_empty() {
            if let Some(prefix) = rest.strip_suffix('*') {
                if is_name(prefix) {
                    return Ok(ParamExp {
                        name: prefix.to_string(),
                        index: None,
                        indirect: false,
                        op: ParamOp::NamePrefix { star: true },
                    });
                }
            }
            if let Some(prefix) = rest.strip_suffix('@') {
                if is_name(prefix) {
                    return Ok(ParamExp {
                        name: prefix.to_string(),
                        index: None,
                        indirect: false,
                        op: ParamOp::NamePrefix { star: false },
                    });
                }
            }
            if let Some((name, index, tail)) = split_name(rest) {
                if tail.is_empty() {
                    if let Some(ref idx) = index {
                        if idx == "@" || idx == "*" {
                            return Ok(ParamExp {
                                name,
                                index: None,
                                indirect: false,
                                op: ParamOp::ArrayKeys { star: idx == "*" },
                            });
                        }
                    }
                }
                let mut exp = parse_after_name(inner, name, index, tail, line)?;
                exp.indirect = true;
                return Ok(exp);
            }
            return Ok(bad(inner));
        }
    }

    let Some((name, index, tail)) = split_name(inner) else {
        return Ok(bad(inner));
    };
    parse_after_name(inner, name, index, tail, line)
}

/// Parse the operator suffix after the parameter name.
fn parse_after_name(
    full: &str,
    name: String,
    index: Option<String>,
    tail: &str,
    line: usize,
) -> Result<ParamExp> {
    let make = |op: ParamOp| ParamExp {
        name: name.clone(),
        index: index.clone(),
        indirect: false,
        op,
    };
    let bad = || {
        Ok(ParamExp {
            name: String::new(),
            index: None,
            indirect: false,
            op: ParamOp::BadSubstitution(full.to_string()),
        })
    };

    if tail.is_empty() {
        return Ok(make(ParamOp::Plain));
    }

    let mut chars = tail.chars();
    let Some(first) = chars.next() else {
        return Ok(make(ParamOp::Plain));
    };
    let rest = chars.as_str();

    match first {
        ':' => {
            if let Some(op_char) = rest.chars().next() {
                if "-=?+".contains(op_char) {
                    let word_text = &rest[op_char.len_utf8()..];
                    let word = parse_operand_word(word_text, line)?;
                    return Ok(make(match op_char {
                        '-' => ParamOp::Default { word, colon: true },
                        '=' => ParamOp::Assign { word, colon: true },
                        '+' => ParamOp::Alternate { word, colon: true },
                        _ => ParamOp::Error {
                            word: if word_text.is_empty() { None } else { Some(word) },
                            colon: true,
                        },
                    }));
                }
            }
            // ${x:offset[:length]}
            let (offset, length) = match split_top_level_colon(rest) {
                Some((off, len)) => (off.to_string(), Some(len.to_string())),
                None => (rest.to_string(), None),
            };
            Ok(make(ParamOp::Substring { offset, length }))
        }
        '-' => Ok(make(ParamOp::Default {
            word: parse_operand_word(rest, line)?,
            colon: false,
        })),
        '=' => Ok(make(ParamOp::Assign {
            word: parse_operand_word(rest, line)?,
            colon: false,
        })),
        '+' => Ok(make(ParamOp::Alternate {
            word: parse_operand_word(rest, line)?,
            colon: false,
        })),
        '?' => Ok(make(ParamOp::Error {
            word: if rest.is_empty() {
                None
            } else {
                Some(parse_operand_word(rest, line)?)
            },
            colon: false,
        })),
        '#' => {
            let (greedy, pat) = match rest.strip_prefix('#') {
                Some(p) => (true, p),
                None => (false, rest),
            };
            Ok(make(ParamOp::RemovePrefix {
                pattern: parse_operand_word(pat, line)?,
                greedy,
            }))
        }
        '%' => {
            let (greedy, pat) = match rest.strip_prefix('%') {
                Some(p) => (true, p),
                None => (false, rest),
            };
            Ok(make(ParamOp::RemoveSuffix {
                pattern: parse_operand_word(pat, line)?,
                greedy,
            }))
        }
        '/' => {
            let (mode, pat_text) = if let Some(p) = rest.strip_prefix('/') {
                (ReplaceMode::All, p)
            } else if let Some(p) = rest.strip_prefix('#') {
                (ReplaceMode::Prefix, p)
            } else if let Some(p) = rest.strip_prefix('%') {
                (ReplaceMode::Suffix, p)
            } else {
                (ReplaceMode::First, rest)
            };
            let (pattern, replacement) = match split_unquoted_slash(pat_text) {
                Some((p, r)) => (p, Some(r)),
                None => (pat_text.to_string(), None),
            };
            Ok(make(ParamOp::Replace {
                pattern: parse_operand_word(&pattern, line)?,
                replacement: match replacement {
                    Some(r) => Some(parse_operand_word(&r, line)?),
                    None => None,
                },
                mode,
            }))
        }
        '^' => {
            let (all, pat) = match rest.strip_prefix('^') {
                Some(p) => (true, p),
                None => (false, rest),
            };
            Ok(make(ParamOp::CaseMod {
                upper: true,
                all,
                pattern: if pat.is_empty() {
                    None
                } else {
                    Some(parse_operand_word(pat, line)?)
                },
            }))
        }
        ',' => {
            let (all, pat) = match rest.strip_prefix(',') {
                Some(p) => (true, p),
                None => (false, rest),
            };
            Ok(make(ParamOp::CaseMod {
                upper: false,
                all,
                pattern: if pat.is_empty() {
                    None
                } else {
                    Some(parse_operand_word(pat, line)?)
                },
            }))
        }
        '@' => {
            let mut ops = rest.chars();
            match (ops.next(), ops.next()) {
                (Some(op), None) => Ok(make(ParamOp::Transform(op))),
                _ => bad(),
            }
        }
        _ => bad(),
    }
}

/// Lex operand text (the `w` of `${x:-w}`) as a full word.
fn parse_operand_word(text: &str, line: usize) -> Result<Word> {
    let raw = Lexer::lex_unbroken(text)?;
    parse_word(&raw, line)
}

/// Split a parameter name (and optional `[subscript]`) off the front;
/// returns the remaining operator text.
fn split_name(text: &str) -> Option<(String, Option<String>, &str)> {
    let mut chars = text.char_indices();
    let (_, first) = chars.next()?;

    // Special single-character parameters.
    if matches!(first, '@' | '*' | '#' | '?' | '-' | '$' | '!') {
        return Some((first.to_string(), None, &text[first.len_utf8()..]));
    }

    let mut end = 0;
    if first.is_ascii_digit() {
        end = first.len_utf8();
        for (i, c) in chars {
            if c.is_ascii_digit() {
                end = i + c.len_utf8();
            } else {
                break;
            }
        }
    } else if first == '_' || first.is_ascii_alphabetic() {
        end = first.len_utf8();
        for (i, c) in chars {
            if c == '_' || c.is_ascii_alphanumeric() {
                end = i + c.len_utf8();
            } else {
                break;
            }
        }
    } else {
        return None;
    }

    let name = text[..end].to_string();
    let mut rest = &text[end..];
    let mut index = None;

    if let Some(stripped) = rest.strip_prefix('[') {
        let mut depth = 1usize;
        for (i, c) in stripped.char_indices() {
            match c {
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        index = Some(stripped[..i].to_string());
                        rest = &stripped[i + 1..];
                        break;
                    }
                }
                _ => {}
            }
        }
        index.as_ref()?;
    }

    Some((name, index, rest))
}

fn is_name(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .enumerate()
            .all(|(i, c)| c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()))
}

/// Split `off:len` on the first colon not nested in parens or brackets.
fn split_top_level_colon(text: &str) -> Option<(&str, &str)> {
    let mut depth = 0i32;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            ':' if depth == 0 => return Some((&text[..i], &text[i + 1..])),
            '?' => return None, // ternary; the colon belongs to it
            _ => {}
        }
    }
    None
}

/// Split `pattern/replacement` on the first unquoted, unescaped slash.
fn split_unquoted_slash(text: &str) -> Option<(String, String)> {
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    let mut in_single = false;
    let mut in_double = false;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '/' if !in_single && !in_double => {
                return Some((
                    chars[..i].iter().collect(),
                    chars[i + 1..].iter().collect(),
                ));
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Decode `$'...'` ANSI-C escapes.
pub fn decode_ansi_c(text: &str) -> String {
    let mut out = String::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '\\' || i + 1 >= chars.len() {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        i += 1;
        let c = chars[i];
        i += 1;
        match c {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'e' | 'E' => out.push('\x1b'),
            'f' => out.push('\x0c'),
            'v' => out.push('\x0b'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            '?' => out.push('?'),
            '0'..='7' => {
                let mut value = c.to_digit(8).unwrap_or(0);
                let mut n = 1;
                while n < 3 && i < chars.len() {
                    if let Some(d) = chars[i].to_digit(8) {
                        value = value * 8 + d;
                        i += 1;
                        n += 1;
                    } else {
                        break;
                    }
                }
                out.push((value & 0xff) as u8 as char);
            }
            'x' => {
                let mut value = 0u32;
                let mut n = 0;
                while n < 2 && i < chars.len() {
                    if let Some(d) = chars[i].to_digit(16) {
                        value = value * 16 + d;
                        i += 1;
                        n += 1;
                    } else {
                        break;
                    }
                }
                if n == 0 {
                    out.push('\\');
                    out.push('x');
                } else {
                    out.push((value & 0xff) as u8 as char);
                }
            }
            'u' | 'U' => {
                let max = if c == 'u' { 4 } else { 8 };
                let mut value = 0u32;
                let mut n = 0;
                while n < max && i < chars.len() {
                    if let Some(d) = chars[i].to_digit(16) {
                        value = value * 16 + d;
                        i += 1;
                        n += 1;
                    } else {
                        break;
                    }
                }
                match char::from_u32(value) {
                    Some(ch) if n > 0 => out.push(ch),
                    _ => {
                        out.push('\\');
                        out.push(c);
                    }
                }
            }
            'c' => {
                if i < chars.len() {
                    let ctrl = chars[i].to_ascii_uppercase() as u32 ^ 0x40;
                    if let Some(ch) = char::from_u32(ctrl) {
                        out.push(ch);
                    }
                    i += 1;
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}
