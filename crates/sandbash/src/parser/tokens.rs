//! Token types for the lexer
//!
//! A word token is not a flat string: it carries the sequence of quoted and
//! unquoted pieces it was built from, because field splitting and globbing
//! later depend on which pieces were quoted.

use super::span::Position;

/// One token from the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Position of the token's first character.
    pub pos: Position,
}

/// Token kinds produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// A word: command name, argument, assignment, reserved word.
    Word(Vec<RawPart>),

    /// A control or redirection operator.
    Op(Op),

    /// A redirection with an explicit fd prefix, e.g. `2>` or `2>&`.
    FdRedirect(i32, Op),

    /// `(( ... ))` with its raw inner text, recognized as a unit so that
    /// shell operators inside the expression are not mis-lexed.
    Arith(String),

    /// End of a line.
    Newline,

    /// End of input.
    Eof,
}

/// Operators, recognized by maximal munch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Pipe,      // |
    PipeAnd,   // |&
    AndIf,     // &&
    OrIf,      // ||
    Amp,       // &
    Semi,      // ;
    DSemi,     // ;;
    SemiAnd,   // ;&
    DSemiAnd,  // ;;&
    LParen,    // (
    RParen,    // )
    Less,      // <
    Great,     // >
    DGreat,    // >>
    DLess,     // <<
    DLessDash, // <<-
    TLess,     // <<<
    LessAnd,   // <&
    GreatAnd,  // >&
    LessGreat, // <>
    Clobber,   // >|
    AndGreat,  // &>
    AndDGreat, // &>>
}

impl Op {
    /// The operator's source spelling, for diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Pipe => "|",
            Op::PipeAnd => "|&",
            Op::AndIf => "&&",
            Op::OrIf => "||",
            Op::Amp => "&",
            Op::Semi => ";",
            Op::DSemi => ";;",
            Op::SemiAnd => ";&",
            Op::DSemiAnd => ";;&",
            Op::LParen => "(",
            Op::RParen => ")",
            Op::Less => "<",
            Op::Great => ">",
            Op::DGreat => ">>",
            Op::DLess => "<<",
            Op::DLessDash => "<<-",
            Op::TLess => "<<<",
            Op::LessAnd => "<&",
            Op::GreatAnd => ">&",
            Op::LessGreat => "<>",
            Op::Clobber => ">|",
            Op::AndGreat => "&>",
            Op::AndDGreat => "&>>",
        }
    }

    /// True for the redirection operators (as opposed to control operators).
    pub fn is_redirection(&self) -> bool {
        matches!(
            self,
            Op::Less
                | Op::Great
                | Op::DGreat
                | Op::DLess
                | Op::DLessDash
                | Op::TLess
                | Op::LessAnd
                | Op::GreatAnd
                | Op::LessGreat
                | Op::Clobber
                | Op::AndGreat
                | Op::AndDGreat
        )
    }
}

/// A piece of a word as scanned, before the word subparser runs.
///
/// Substitution bodies are kept as raw text here; the parser re-enters the
/// grammar for them (`$(...)` gets a nested script parse, `$((...))` the
/// arithmetic subparser, `${...}` the expansion subparser).
#[derive(Debug, Clone, PartialEq)]
pub enum RawPart {
    /// Unquoted literal run.
    Literal(String),
    /// `'...'` content.
    SingleQuoted(String),
    /// `$'...'` content, escapes not yet processed.
    AnsiQuoted(String),
    /// `"..."` content, itself a part sequence.
    DoubleQuoted(Vec<RawPart>),
    /// Backslash-escaped character outside quotes.
    Escaped(char),
    /// `$NAME` or a special parameter (`$?`, `$#`, `$@`, ...).
    Var(String),
    /// `${...}` inner text.
    Param(String),
    /// `$(...)` inner text.
    CmdSub(String),
    /// `` `...` `` inner text, backslash escapes unprocessed.
    Backquote(String),
    /// `$((...))` inner text.
    ArithSub(String),
    /// `<(...)` or `>(...)` inner text.
    ProcSub { output: bool, body: String },
}

/// Helpers for inspecting word tokens without expanding them.
pub fn word_literal(parts: &[RawPart]) -> Option<&str> {
    match parts {
        [RawPart::Literal(text)] => Some(text),
        _ => None,
    }
}

/// Flatten a word's raw parts back to displayable text for diagnostics.
pub fn word_text(parts: &[RawPart]) -> String {
    let mut out = String::new();
    for part in parts {
        match part {
            RawPart::Literal(s) => out.push_str(s),
            RawPart::SingleQuoted(s) => {
                out.push('\'');
                out.push_str(s);
                out.push('\'');
            }
            RawPart::AnsiQuoted(s) => {
                out.push_str("$'");
                out.push_str(s);
                out.push('\'');
            }
            RawPart::DoubleQuoted(inner) => {
                out.push('"');
                out.push_str(&word_text(inner));
                out.push('"');
            }
            RawPart::Escaped(c) => {
                out.push('\\');
                out.push(*c);
            }
            RawPart::Var(name) => {
                out.push('$');
                out.push_str(name);
            }
            RawPart::Param(inner) => {
                out.push_str("${");
                out.push_str(inner);
                out.push('}');
            }
            RawPart::CmdSub(inner) => {
                out.push_str("$(");
                out.push_str(inner);
                out.push(')');
            }
            RawPart::Backquote(inner) => {
                out.push('`');
                out.push_str(inner);
                out.push('`');
            }
            RawPart::ArithSub(inner) => {
                out.push_str("$((");
                out.push_str(inner);
                out.push_str("))");
            }
            RawPart::ProcSub { output, body } => {
                out.push(if *output { '>' } else { '<' });
                out.push('(');
                out.push_str(body);
                out.push(')');
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_literal_only_for_single_unquoted_part() {
        let bare = vec![RawPart::Literal("if".into())];
        assert_eq!(word_literal(&bare), Some("if"));

        let quoted = vec![RawPart::SingleQuoted("if".into())];
        assert_eq!(word_literal(&quoted), None);

        let mixed = vec![
            RawPart::Literal("a".into()),
            RawPart::Var("x".into()),
        ];
        assert_eq!(word_literal(&mixed), None);
    }

    #[test]
    fn word_text_round_trips_shapes() {
        let parts = vec![
            RawPart::Literal("a".into()),
            RawPart::DoubleQuoted(vec![RawPart::Var("x".into())]),
            RawPart::CmdSub("pwd".into()),
        ];
        assert_eq!(word_text(&parts), "a\"$x\"$(pwd)");
    }

    #[test]
    fn redirection_operators_classified() {
        assert!(Op::DGreat.is_redirection());
        assert!(Op::TLess.is_redirection());
        assert!(!Op::AndIf.is_redirection());
        assert!(!Op::Semi.is_redirection());
    }
}
