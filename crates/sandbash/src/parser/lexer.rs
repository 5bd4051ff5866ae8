//! Lexer for shell scripts
//!
//! Single left-to-right scan producing operator and word tokens. Words keep
//! their internal structure (quoted runs, `$` substitutions) as [`RawPart`]s;
//! nothing is expanded here. The scanner owns the two jobs that need raw
//! input access: heredoc body capture and `(( ... ))` recognition.

use super::span::Position;
use super::tokens::{Op, RawPart, Token, TokenKind};
use crate::error::{Error, Result};

/// A heredoc the parser has announced but whose body has not been reached
/// yet. Bodies begin after the next unquoted newline.
#[derive(Debug, Clone)]
struct HeredocRequest {
    delimiter: String,
    strip_tabs: bool,
}

/// Lexer over script source.
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    loc: Position,
    /// Heredocs awaiting their bodies, in declaration order.
    pending_heredocs: Vec<HeredocRequest>,
    /// Captured heredoc bodies, in declaration order.
    captured_heredocs: Vec<String>,
    /// Inside `[[ ... ]]`: parens don't open subshells and the right side
    /// of `=~` is scanned as a regex word.
    in_cond: bool,
    /// The previous token was `=~`.
    regex_next: bool,
    /// Treat metacharacters as ordinary word characters (operand lexing).
    no_breaks: bool,
}

impl Lexer {
    /// Create a new lexer for the given input.
    pub fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            loc: Position::new(),
            pending_heredocs: Vec::new(),
            captured_heredocs: Vec::new(),
            in_cond: false,
            regex_next: false,
            no_breaks: false,
        }
    }

    /// Lex standalone text as one word with no break characters. Used for
    /// `${x:-...}` operand words, where blanks and operators are ordinary.
    pub(crate) fn lex_unbroken(text: &str) -> Result<Vec<RawPart>> {
        let mut lexer = Lexer::new(text);
        lexer.no_breaks = true;
        if lexer.peek().is_none() {
            return Ok(Vec::new());
        }
        lexer.read_word()
    }

    /// Lex free-form expansion text (heredoc bodies, deferred arithmetic):
    /// `$` forms and backquotes are live, backslash protects only `$`,
    /// backquote, backslash, and line breaks; everything else is literal.
    pub(crate) fn lex_expansion_text(text: &str) -> Result<Vec<RawPart>> {
        let mut lexer = Lexer::new(text);
        let mut parts: Vec<RawPart> = Vec::new();
        let mut literal = String::new();

        while let Some(ch) = lexer.peek() {
            match ch {
                '\\' => {
                    match lexer.peek_at(1) {
                        Some(c @ ('$' | '`' | '\\')) => {
                            lexer.advance();
                            lexer.advance();
                            literal.push(c);
                        }
                        Some('\n') => {
                            lexer.advance();
                            lexer.advance();
                        }
                        _ => {
                            lexer.advance();
                            literal.push('\\');
                        }
                    }
                }
                '`' => {
                    lexer.advance();
                    if !literal.is_empty() {
                        parts.push(RawPart::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(RawPart::Backquote(lexer.read_backquote()?));
                }
                '$' => {
                    // Quotes are not special in this mode, so `$'` and `$"`
                    // are a literal dollar followed by a quote character.
                    if matches!(lexer.peek_at(1), Some('\'') | Some('"')) {
                        literal.push('$');
                        lexer.advance();
                        continue;
                    }
                    if !literal.is_empty() {
                        parts.push(RawPart::Literal(std::mem::take(&mut literal)));
                    }
                    match lexer.read_dollar()? {
                        Some(part) => parts.push(part),
                        None => literal.push('$'),
                    }
                }
                c => {
                    literal.push(c);
                    lexer.advance();
                }
            }
        }
        if !literal.is_empty() {
            parts.push(RawPart::Literal(literal));
        }
        Ok(parts)
    }

    /// Current source line (for error reporting).
    pub fn line(&self) -> usize {
        self.loc.line
    }

    /// Announce a heredoc whose body starts after the next newline.
    pub fn request_heredoc(&mut self, delimiter: &str, strip_tabs: bool) {
        self.pending_heredocs.push(HeredocRequest {
            delimiter: delimiter.to_string(),
            strip_tabs,
        });
    }

    /// Take the next captured heredoc body, in declaration order.
    pub fn take_heredoc_body(&mut self) -> Option<String> {
        if self.captured_heredocs.is_empty() {
            None
        } else {
            Some(self.captured_heredocs.remove(0))
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.get(self.pos).copied();
        if let Some(c) = ch {
            self.pos += 1;
            self.loc.advance(c);
        }
        ch
    }

    /// Skip blanks, comments, and `\`-newline continuations.
    fn skip_blanks(&mut self) {
        loop {
            match self.peek() {
                Some(' ') | Some('\t') => {
                    self.advance();
                }
                Some('\\') if self.peek_at(1) == Some('\n') => {
                    self.advance();
                    self.advance();
                }
                Some('#') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    /// Get the next token from the input.
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_blanks();
        let pos = self.loc;

        let Some(ch) = self.peek() else {
            // Unterminated heredocs at end of input get empty bodies, the
            // same forgiving treatment bash gives them.
            for _ in 0..self.pending_heredocs.len() {
                self.captured_heredocs.push(String::new());
            }
            self.pending_heredocs.clear();
            return Ok(Token {
                kind: TokenKind::Eof,
                pos,
            });
        };

        if self.regex_next && !matches!(ch, '\n' | ')') {
            self.regex_next = false;
            let parts = self.read_regex_word()?;
            return Ok(Token {
                kind: TokenKind::Word(parts),
                pos,
            });
        }

        match ch {
            '\n' => {
                self.advance();
                if !self.pending_heredocs.is_empty() {
                    self.capture_heredocs();
                }
                Ok(Token {
                    kind: TokenKind::Newline,
                    pos,
                })
            }
            ';' => {
                self.advance();
                let op = if self.peek() == Some(';') {
                    self.advance();
                    if self.peek() == Some('&') {
                        self.advance();
                        Op::DSemiAnd
                    } else {
                        Op::DSemi
                    }
                } else if self.peek() == Some('&') {
                    self.advance();
                    Op::SemiAnd
                } else {
                    Op::Semi
                };
                Ok(self.op_token(op, pos))
            }
            '|' => {
                self.advance();
                let op = match self.peek() {
                    Some('|') => {
                        self.advance();
                        Op::OrIf
                    }
                    Some('&') => {
                        self.advance();
                        Op::PipeAnd
                    }
                    _ => Op::Pipe,
                };
                Ok(self.op_token(op, pos))
            }
            '&' => {
                self.advance();
                let op = match self.peek() {
                    Some('&') => {
                        self.advance();
                        Op::AndIf
                    }
                    Some('>') => {
                        self.advance();
                        if self.peek() == Some('>') {
                            self.advance();
                            Op::AndDGreat
                        } else {
                            Op::AndGreat
                        }
                    }
                    _ => Op::Amp,
                };
                Ok(self.op_token(op, pos))
            }
            '>' => {
                if self.peek_at(1) == Some('(') {
                    let parts = self.read_word()?;
                    return Ok(Token {
                        kind: TokenKind::Word(parts),
                        pos,
                    });
                }
                self.advance();
                let op = match self.peek() {
                    Some('>') => {
                        self.advance();
                        Op::DGreat
                    }
                    Some('&') => {
                        self.advance();
                        Op::GreatAnd
                    }
                    Some('|') => {
                        self.advance();
                        Op::Clobber
                    }
                    _ => Op::Great,
                };
                Ok(self.op_token(op, pos))
            }
            '<' => {
                if self.peek_at(1) == Some('(') {
                    let parts = self.read_word()?;
                    return Ok(Token {
                        kind: TokenKind::Word(parts),
                        pos,
                    });
                }
                self.advance();
                let op = match self.peek() {
                    Some('<') => {
                        self.advance();
                        match self.peek() {
                            Some('<') => {
                                self.advance();
                                Op::TLess
                            }
                            Some('-') => {
                                self.advance();
                                Op::DLessDash
                            }
                            _ => Op::DLess,
                        }
                    }
                    Some('&') => {
                        self.advance();
                        Op::LessAnd
                    }
                    Some('>') => {
                        self.advance();
                        Op::LessGreat
                    }
                    _ => Op::Less,
                };
                Ok(self.op_token(op, pos))
            }
            '(' => {
                if !self.in_cond && self.peek_at(1) == Some('(') {
                    if let Some(inner) = self.try_read_arith_command() {
                        return Ok(Token {
                            kind: TokenKind::Arith(inner),
                            pos,
                        });
                    }
                }
                self.advance();
                Ok(self.op_token(Op::LParen, pos))
            }
            ')' => {
                self.advance();
                Ok(self.op_token(Op::RParen, pos))
            }
            '0'..='9' => {
                // A digit run glued to < or > is an fd prefix: `2>`, `10<&`.
                let mut ahead = 0;
                while matches!(self.peek_at(ahead), Some(c) if c.is_ascii_digit()) {
                    ahead += 1;
                }
                if matches!(self.peek_at(ahead), Some('<') | Some('>')) {
                    let mut fd_text = String::new();
                    for _ in 0..ahead {
                        if let Some(c) = self.advance() {
                            fd_text.push(c);
                        }
                    }
                    let fd: i32 = fd_text.parse().unwrap_or(1);
                    let op_token = self.next_token()?;
                    let TokenKind::Op(op) = op_token.kind else {
                        return Err(Error::parse("expected redirection operator", pos.line));
                    };
                    return Ok(Token {
                        kind: TokenKind::FdRedirect(fd, op),
                        pos,
                    });
                }
                let parts = self.read_word()?;
                Ok(Token {
                    kind: TokenKind::Word(parts),
                    pos,
                })
            }
            _ => {
                let parts = self.read_word()?;
                if let [RawPart::Literal(text)] = parts.as_slice() {
                    match text.as_str() {
                        "[[" => self.in_cond = true,
                        "]]" => self.in_cond = false,
                        "=~" if self.in_cond => self.regex_next = true,
                        _ => {}
                    }
                }
                Ok(Token {
                    kind: TokenKind::Word(parts),
                    pos,
                })
            }
        }
    }

    fn op_token(&self, op: Op, pos: Position) -> Token {
        Token {
            kind: TokenKind::Op(op),
            pos,
        }
    }

    /// Try to read `(( ... ))` as a unit; restores position on failure so
    /// the paren can be re-read as a subshell opener.
    fn try_read_arith_command(&mut self) -> Option<String> {
        let save_pos = self.pos;
        let save_loc = self.loc;

        self.advance(); // (
        self.advance(); // (

        let mut inner = String::new();
        let mut depth = 0usize;
        loop {
            let Some(c) = self.peek() else {
                // Unterminated: not an arithmetic command.
                self.pos = save_pos;
                self.loc = save_loc;
                return None;
            };
            match c {
                '(' => {
                    depth += 1;
                    inner.push(c);
                    self.advance();
                }
                ')' if depth == 0 => {
                    if self.peek_at(1) == Some(')') {
                        self.advance();
                        self.advance();
                        return Some(inner);
                    }
                    self.pos = save_pos;
                    self.loc = save_loc;
                    return None;
                }
                ')' => {
                    depth -= 1;
                    inner.push(c);
                    self.advance();
                }
                '\'' | '"' => {
                    inner.push(c);
                    self.advance();
                    while let Some(q) = self.peek() {
                        inner.push(q);
                        self.advance();
                        if q == c {
                            break;
                        }
                    }
                }
                _ => {
                    inner.push(c);
                    self.advance();
                }
            }
        }
    }

    /// Characters that end an unquoted word.
    fn is_word_break(&self, ch: char) -> bool {
        match ch {
            ' ' | '\t' | '\n' | ';' | '&' | '|' => true,
            '<' | '>' => true,
            '(' | ')' => true,
            _ => false,
        }
    }

    /// Read a word: a run of parts ended by an unquoted metacharacter.
    fn read_word(&mut self) -> Result<Vec<RawPart>> {
        let mut parts: Vec<RawPart> = Vec::new();
        let mut literal = String::new();

        macro_rules! flush {
            () => {
                if !literal.is_empty() {
                    parts.push(RawPart::Literal(std::mem::take(&mut literal)));
                }
            };
        }

        while let Some(ch) = self.peek() {
            match ch {
                '\\' => {
                    self.advance();
                    match self.advance() {
                        Some('\n') => {} // line continuation
                        Some(c) => {
                            flush!();
                            parts.push(RawPart::Escaped(c));
                        }
                        None => literal.push('\\'),
                    }
                }
                '\'' => {
                    self.advance();
                    flush!();
                    parts.push(RawPart::SingleQuoted(self.read_until_quote('\'')?));
                }
                '"' => {
                    self.advance();
                    flush!();
                    parts.push(RawPart::DoubleQuoted(self.read_double_quoted()?));
                }
                '`' => {
                    self.advance();
                    flush!();
                    parts.push(RawPart::Backquote(self.read_backquote()?));
                }
                '$' => {
                    flush!();
                    if let Some(part) = self.read_dollar()? {
                        parts.push(part);
                    } else {
                        literal.push('$');
                    }
                }
                '<' | '>' if self.peek_at(1) == Some('(') => {
                    // Process substitution is a word part; a bare < or >
                    // would instead have broken the word as a redirection.
                    flush!();
                    let output = ch == '>';
                    self.advance();
                    self.advance();
                    let body = self.read_matched_parens()?;
                    parts.push(RawPart::ProcSub { output, body });
                }
                '(' if !self.no_breaks && self.at_array_assign_start(&literal, &parts) => break,
                c if self.is_word_break(c) => {
                    if self.no_breaks {
                        literal.push(c);
                        self.advance();
                    } else {
                        break;
                    }
                }
                c => {
                    literal.push(c);
                    self.advance();
                }
            }
        }

        if !literal.is_empty() {
            parts.push(RawPart::Literal(literal));
        }
        if parts.is_empty() {
            return Err(Error::parse("empty word", self.loc.line));
        }
        Ok(parts)
    }

    /// `NAME=(` and `NAME+=(` start an array literal; the paren must reach
    /// the parser as an operator token.
    fn at_array_assign_start(&self, literal: &str, parts: &[RawPart]) -> bool {
        if !parts.is_empty() {
            return false;
        }
        let text = literal.strip_suffix('+').unwrap_or(literal);
        let Some(name) = text.strip_suffix('=') else {
            return false;
        };
        let name = match name.find('[') {
            Some(i) => &name[..i],
            None => name,
        };
        !name.is_empty()
            && name
                .chars()
                .enumerate()
                .all(|(i, c)| c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()))
    }

    /// Read the right side of `=~`: whitespace-delimited at paren depth 0,
    /// quotes and `$` forms allowed.
    fn read_regex_word(&mut self) -> Result<Vec<RawPart>> {
        let mut parts: Vec<RawPart> = Vec::new();
        let mut literal = String::new();
        let mut depth = 0usize;

        while let Some(ch) = self.peek() {
            match ch {
                ' ' | '\t' | '\n' if depth == 0 => break,
                '\\' => {
                    self.advance();
                    match self.advance() {
                        Some('\n') => {}
                        Some(c) => {
                            if !literal.is_empty() {
                                parts.push(RawPart::Literal(std::mem::take(&mut literal)));
                            }
                            parts.push(RawPart::Escaped(c));
                        }
                        None => literal.push('\\'),
                    }
                }
                '\'' => {
                    self.advance();
                    if !literal.is_empty() {
                        parts.push(RawPart::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(RawPart::SingleQuoted(self.read_until_quote('\'')?));
                }
                '"' => {
                    self.advance();
                    if !literal.is_empty() {
                        parts.push(RawPart::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(RawPart::DoubleQuoted(self.read_double_quoted()?));
                }
                '$' => {
                    if !literal.is_empty() {
                        parts.push(RawPart::Literal(std::mem::take(&mut literal)));
                    }
                    if let Some(part) = self.read_dollar()? {
                        parts.push(part);
                    } else {
                        literal.push('$');
                    }
                }
                '(' => {
                    depth += 1;
                    literal.push(ch);
                    self.advance();
                }
                ')' => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                    literal.push(ch);
                    self.advance();
                }
                c => {
                    literal.push(c);
                    self.advance();
                }
            }
        }

        if !literal.is_empty() {
            parts.push(RawPart::Literal(literal));
        }
        if parts.is_empty() {
            return Err(Error::parse("missing regex after =~", self.loc.line));
        }
        Ok(parts)
    }

    /// Read to an unescaped closing quote character.
    fn read_until_quote(&mut self, quote: char) -> Result<String> {
        let mut content = String::new();
        loop {
            match self.advance() {
                Some(c) if c == quote => return Ok(content),
                Some(c) => content.push(c),
                None => {
                    return Err(Error::parse(
                        format!("unterminated {quote} quote"),
                        self.loc.line,
                    ))
                }
            }
        }
    }

    /// Read the inside of a double-quoted string as parts. Also used to lex
    /// heredoc bodies and deferred arithmetic text, which expand under the
    /// same rules.
    pub(crate) fn read_double_quoted(&mut self) -> Result<Vec<RawPart>> {
        let mut parts: Vec<RawPart> = Vec::new();
        let mut literal = String::new();

        loop {
            let Some(ch) = self.peek() else {
                return Err(Error::parse("unterminated \" quote", self.loc.line));
            };
            match ch {
                '"' => {
                    self.advance();
                    break;
                }
                '\\' => {
                    self.advance();
                    match self.peek() {
                        Some(c @ ('"' | '\\' | '$' | '`')) => {
                            literal.push(c);
                            self.advance();
                        }
                        Some('\n') => {
                            self.advance();
                        }
                        _ => literal.push('\\'),
                    }
                }
                '`' => {
                    self.advance();
                    if !literal.is_empty() {
                        parts.push(RawPart::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(RawPart::Backquote(self.read_backquote()?));
                }
                '$' => {
                    if !literal.is_empty() {
                        parts.push(RawPart::Literal(std::mem::take(&mut literal)));
                    }
                    if let Some(part) = self.read_dollar()? {
                        parts.push(part);
                    } else {
                        literal.push('$');
                    }
                }
                c => {
                    literal.push(c);
                    self.advance();
                }
            }
        }

        if !literal.is_empty() {
            parts.push(RawPart::Literal(literal));
        }
        Ok(parts)
    }

    /// Read backtick command substitution content.
    fn read_backquote(&mut self) -> Result<String> {
        let mut content = String::new();
        loop {
            match self.advance() {
                Some('`') => return Ok(content),
                Some('\\') => match self.advance() {
                    Some(c @ ('`' | '\\' | '$')) => content.push(c),
                    Some(c) => {
                        content.push('\\');
                        content.push(c);
                    }
                    None => {
                        return Err(Error::parse("unterminated ` substitution", self.loc.line))
                    }
                },
                Some(c) => content.push(c),
                None => return Err(Error::parse("unterminated ` substitution", self.loc.line)),
            }
        }
    }

    /// Dispatch on the character after `$`. Returns `None` when the dollar
    /// is literal (end of word, `$` before a delimiter).
    fn read_dollar(&mut self) -> Result<Option<RawPart>> {
        match self.peek_at(1) {
            Some('\'') => {
                self.advance();
                self.advance();
                let content = self.read_ansi_quoted()?;
                Ok(Some(RawPart::AnsiQuoted(content)))
            }
            Some('"') => {
                // $"..." is locale translation; it behaves as plain quotes.
                self.advance();
                self.advance();
                Ok(Some(RawPart::DoubleQuoted(self.read_double_quoted()?)))
            }
            Some('{') => {
                self.advance();
                self.advance();
                let inner = self.read_param_braces()?;
                Ok(Some(RawPart::Param(inner)))
            }
            Some('(') => {
                self.advance();
                self.advance();
                if self.peek() == Some('(') {
                    if let Some(inner) = self.try_read_arith_sub() {
                        return Ok(Some(RawPart::ArithSub(inner)));
                    }
                }
                let body = self.read_matched_parens()?;
                Ok(Some(RawPart::CmdSub(body)))
            }
            Some(c) if c == '_' || c.is_ascii_alphabetic() => {
                self.advance();
                let mut name = String::new();
                while let Some(c) = self.peek() {
                    if c == '_' || c.is_ascii_alphanumeric() {
                        name.push(c);
                        self.advance();
                    } else {
                        break;
                    }
                }
                Ok(Some(RawPart::Var(name)))
            }
            Some(c) if c.is_ascii_digit() => {
                self.advance();
                self.advance();
                Ok(Some(RawPart::Var(c.to_string())))
            }
            Some(c @ ('?' | '#' | '@' | '*' | '!' | '$' | '-')) => {
                self.advance();
                self.advance();
                Ok(Some(RawPart::Var(c.to_string())))
            }
            _ => {
                self.advance();
                Ok(None)
            }
        }
    }

    /// Read `$'...'` content, leaving escape decoding to the word parser.
    fn read_ansi_quoted(&mut self) -> Result<String> {
        let mut content = String::new();
        loop {
            match self.advance() {
                Some('\\') => {
                    content.push('\\');
                    if let Some(c) = self.advance() {
                        content.push(c);
                    }
                }
                Some('\'') => return Ok(content),
                Some(c) => content.push(c),
                None => return Err(Error::parse("unterminated $' quote", self.loc.line)),
            }
        }
    }

    /// Read `${ ... }` inner text, balancing braces and honoring quotes.
    fn read_param_braces(&mut self) -> Result<String> {
        let mut inner = String::new();
        let mut depth = 0usize;
        loop {
            let Some(c) = self.peek() else {
                return Err(Error::parse("unterminated ${ expansion", self.loc.line));
            };
            match c {
                '}' if depth == 0 => {
                    self.advance();
                    return Ok(inner);
                }
                '{' => {
                    depth += 1;
                    inner.push(c);
                    self.advance();
                }
                '}' => {
                    depth -= 1;
                    inner.push(c);
                    self.advance();
                }
                '\'' => {
                    inner.push(c);
                    self.advance();
                    loop {
                        match self.advance() {
                            Some(q) => {
                                inner.push(q);
                                if q == '\'' {
                                    break;
                                }
                            }
                            None => {
                                return Err(Error::parse(
                                    "unterminated ${ expansion",
                                    self.loc.line,
                                ))
                            }
                        }
                    }
                }
                '"' => {
                    inner.push(c);
                    self.advance();
                    loop {
                        match self.advance() {
                            Some('\\') => {
                                inner.push('\\');
                                if let Some(e) = self.advance() {
                                    inner.push(e);
                                }
                            }
                            Some(q) => {
                                inner.push(q);
                                if q == '"' {
                                    break;
                                }
                            }
                            None => {
                                return Err(Error::parse(
                                    "unterminated ${ expansion",
                                    self.loc.line,
                                ))
                            }
                        }
                    }
                }
                '\\' => {
                    inner.push(c);
                    self.advance();
                    if let Some(e) = self.advance() {
                        inner.push(e);
                    }
                }
                '$' if self.peek_at(1) == Some('(') => {
                    inner.push('$');
                    inner.push('(');
                    self.advance();
                    self.advance();
                    let nested = self.read_matched_parens()?;
                    inner.push_str(&nested);
                    inner.push(')');
                }
                _ => {
                    inner.push(c);
                    self.advance();
                }
            }
        }
    }

    /// Try `$(( ... ))`; rewinds and returns `None` when there is no
    /// matching `))` so `$( (...)` parses as command substitution.
    fn try_read_arith_sub(&mut self) -> Option<String> {
        let save_pos = self.pos;
        let save_loc = self.loc;
        self.advance(); // second (

        let mut inner = String::new();
        let mut depth = 0usize;
        loop {
            let Some(c) = self.peek() else {
                self.pos = save_pos;
                self.loc = save_loc;
                return None;
            };
            match c {
                '(' => {
                    depth += 1;
                    inner.push(c);
                    self.advance();
                }
                ')' if depth == 0 => {
                    if self.peek_at(1) == Some(')') {
                        self.advance();
                        self.advance();
                        return Some(inner);
                    }
                    self.pos = save_pos;
                    self.loc = save_loc;
                    return None;
                }
                ')' => {
                    depth -= 1;
                    inner.push(c);
                    self.advance();
                }
                _ => {
                    inner.push(c);
                    self.advance();
                }
            }
        }
    }

    /// Read to the `)` matching an already-consumed `(`, honoring nesting,
    /// quotes, comments, and backslashes. Used for `$(...)` and `<(...)`.
    fn read_matched_parens(&mut self) -> Result<String> {
        let mut body = String::new();
        let mut depth = 0usize;
        loop {
            let Some(c) = self.peek() else {
                return Err(Error::parse("unterminated command substitution", self.loc.line));
            };
            match c {
                ')' if depth == 0 => {
                    self.advance();
                    return Ok(body);
                }
                '(' => {
                    depth += 1;
                    body.push(c);
                    self.advance();
                }
                ')' => {
                    depth -= 1;
                    body.push(c);
                    self.advance();
                }
                '\\' => {
                    body.push(c);
                    self.advance();
                    if let Some(e) = self.advance() {
                        body.push(e);
                    }
                }
                '\'' => {
                    body.push(c);
                    self.advance();
                    loop {
                        match self.advance() {
                            Some(q) => {
                                body.push(q);
                                if q == '\'' {
                                    break;
                                }
                            }
                            None => {
                                return Err(Error::parse(
                                    "unterminated command substitution",
                                    self.loc.line,
                                ))
                            }
                        }
                    }
                }
                '"' => {
                    body.push(c);
                    self.advance();
                    loop {
                        match self.advance() {
                            Some('\\') => {
                                body.push('\\');
                                if let Some(e) = self.advance() {
                                    body.push(e);
                                }
                            }
                            Some(q) => {
                                body.push(q);
                                if q == '"' {
                                    break;
                                }
                            }
                            None => {
                                return Err(Error::parse(
                                    "unterminated command substitution",
                                    self.loc.line,
                                ))
                            }
                        }
                    }
                }
                '#' if body
                    .chars()
                    .last()
                    .map(|p| p.is_whitespace())
                    .unwrap_or(true) =>
                {
                    // Comments inside $(...) run to end of line.
                    while let Some(cc) = self.peek() {
                        if cc == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => {
                    body.push(c);
                    self.advance();
                }
            }
        }
    }

    /// Consume heredoc bodies for every pending request. Called right after
    /// the newline that ends the line the operators appeared on.
    fn capture_heredocs(&mut self) {
        let requests = std::mem::take(&mut self.pending_heredocs);
        for req in requests {
            let mut body = String::new();
            loop {
                if self.peek().is_none() {
                    break; // delimited by end of file
                }
                let mut line = String::new();
                while let Some(c) = self.peek() {
                    self.advance();
                    if c == '\n' {
                        break;
                    }
                    line.push(c);
                }
                let candidate = if req.strip_tabs {
                    line.trim_start_matches('\t')
                } else {
                    line.as_str()
                };
                if candidate == req.delimiter {
                    break;
                }
                if req.strip_tabs {
                    body.push_str(line.trim_start_matches('\t'));
                } else {
                    body.push_str(&line);
                }
                body.push('\n');
            }
            self.captured_heredocs.push(body);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(input);
        let mut out = Vec::new();
        loop {
            let tok = lexer.next_token().unwrap();
            let done = tok.kind == TokenKind::Eof;
            out.push(tok.kind);
            if done {
                break;
            }
        }
        out
    }

    fn lit(s: &str) -> TokenKind {
        TokenKind::Word(vec![RawPart::Literal(s.to_string())])
    }

    #[test]
    fn words_and_operators() {
        assert_eq!(
            kinds("a | b && c || d; e &"),
            vec![
                lit("a"),
                TokenKind::Op(Op::Pipe),
                lit("b"),
                TokenKind::Op(Op::AndIf),
                lit("c"),
                TokenKind::Op(Op::OrIf),
                lit("d"),
                TokenKind::Op(Op::Semi),
                lit("e"),
                TokenKind::Op(Op::Amp),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn maximal_munch_on_redirections() {
        assert_eq!(
            kinds("a >> b <<< c |& d"),
            vec![
                lit("a"),
                TokenKind::Op(Op::DGreat),
                lit("b"),
                TokenKind::Op(Op::TLess),
                lit("c"),
                TokenKind::Op(Op::PipeAnd),
                lit("d"),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn case_terminators() {
        assert_eq!(
            kinds(";; ;& ;;&"),
            vec![
                TokenKind::Op(Op::DSemi),
                TokenKind::Op(Op::SemiAnd),
                TokenKind::Op(Op::DSemiAnd),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn quotes_keep_structure() {
        let toks = kinds("echo 'a b' \"c $d\"");
        assert_eq!(toks[0], lit("echo"));
        assert_eq!(
            toks[1],
            TokenKind::Word(vec![RawPart::SingleQuoted("a b".into())])
        );
        assert_eq!(
            toks[2],
            TokenKind::Word(vec![RawPart::DoubleQuoted(vec![
                RawPart::Literal("c ".into()),
                RawPart::Var("d".into()),
            ])])
        );
    }

    #[test]
    fn comment_skipped_outside_quotes() {
        assert_eq!(
            kinds("echo hi # rest\nnext"),
            vec![
                lit("echo"),
                lit("hi"),
                TokenKind::Newline,
                lit("next"),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn hash_inside_word_is_literal() {
        assert_eq!(kinds("a#b"), vec![lit("a#b"), TokenKind::Eof]);
    }

    #[test]
    fn line_continuation_joins_words() {
        assert_eq!(kinds("ec\\\nho"), vec![lit("echo"), TokenKind::Eof]);
    }

    #[test]
    fn dollar_forms() {
        let toks = kinds("$x ${x:-y} $(pwd) $((1+2)) `id`");
        assert_eq!(toks[0], TokenKind::Word(vec![RawPart::Var("x".into())]));
        assert_eq!(toks[1], TokenKind::Word(vec![RawPart::Param("x:-y".into())]));
        assert_eq!(toks[2], TokenKind::Word(vec![RawPart::CmdSub("pwd".into())]));
        assert_eq!(
            toks[3],
            TokenKind::Word(vec![RawPart::ArithSub("1+2".into())])
        );
        assert_eq!(
            toks[4],
            TokenKind::Word(vec![RawPart::Backquote("id".into())])
        );
    }

    #[test]
    fn nested_command_substitution() {
        let toks = kinds("$(echo $(pwd))");
        assert_eq!(
            toks[0],
            TokenKind::Word(vec![RawPart::CmdSub("echo $(pwd)".into())])
        );
    }

    #[test]
    fn arith_command_recognized() {
        let toks = kinds("((x = 1 + 2))");
        assert_eq!(toks[0], TokenKind::Arith("x = 1 + 2".into()));
    }

    #[test]
    fn nested_subshell_not_arith() {
        // `(( ... ) )` has no matching `))`, so it is two subshell opens.
        let toks = kinds("( (a) )");
        assert_eq!(toks[0], TokenKind::Op(Op::LParen));
        assert_eq!(toks[1], TokenKind::Op(Op::LParen));
    }

    #[test]
    fn unterminated_quote_is_fatal() {
        let mut lexer = Lexer::new("echo 'oops");
        lexer.next_token().unwrap();
        let err = lexer.next_token().unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn heredoc_body_capture() {
        let mut lexer = Lexer::new("cat <<EOF\nhello\nworld\nEOF\necho done");
        assert_eq!(lexer.next_token().unwrap().kind, lit("cat"));
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Op(Op::DLess));
        assert_eq!(lexer.next_token().unwrap().kind, lit("EOF"));
        lexer.request_heredoc("EOF", false);
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Newline);
        assert_eq!(lexer.take_heredoc_body().unwrap(), "hello\nworld\n");
        assert_eq!(lexer.next_token().unwrap().kind, lit("echo"));
    }

    #[test]
    fn heredoc_dash_strips_tabs() {
        let mut lexer = Lexer::new("cat <<-EOF\n\thello\n\tEOF\n");
        lexer.next_token().unwrap();
        lexer.next_token().unwrap();
        lexer.next_token().unwrap();
        lexer.request_heredoc("EOF", true);
        lexer.next_token().unwrap();
        assert_eq!(lexer.take_heredoc_body().unwrap(), "hello\n");
    }

    #[test]
    fn two_heredocs_in_declaration_order() {
        let mut lexer = Lexer::new("cat <<A <<B\none\nA\ntwo\nB\n");
        for _ in 0..5 {
            lexer.next_token().unwrap();
        }
        lexer.request_heredoc("A", false);
        lexer.request_heredoc("B", false);
        lexer.next_token().unwrap(); // newline triggers capture
        assert_eq!(lexer.take_heredoc_body().unwrap(), "one\n");
        assert_eq!(lexer.take_heredoc_body().unwrap(), "two\n");
    }

    #[test]
    fn array_assign_breaks_word_at_paren() {
        let toks = kinds("a=(1 2)");
        assert_eq!(toks[0], lit("a="));
        assert_eq!(toks[1], TokenKind::Op(Op::LParen));
        assert_eq!(toks[2], lit("1"));
        assert_eq!(toks[3], lit("2"));
        assert_eq!(toks[4], TokenKind::Op(Op::RParen));
    }

    #[test]
    fn regex_word_after_match_operator() {
        let toks = kinds("[[ $x =~ ^(a|b)+$ ]]");
        assert_eq!(toks[0], lit("[["));
        assert_eq!(toks[1], TokenKind::Word(vec![RawPart::Var("x".into())]));
        assert_eq!(toks[2], lit("=~"));
        assert_eq!(toks[3], lit("^(a|b)+$"));
        assert_eq!(toks[4], lit("]]"));
    }

    #[test]
    fn process_substitution_is_a_word() {
        let toks = kinds("diff <(sort a) <(sort b)");
        assert_eq!(toks[0], lit("diff"));
        assert_eq!(
            toks[1],
            TokenKind::Word(vec![RawPart::ProcSub {
                output: false,
                body: "sort a".into()
            }])
        );
    }

    #[test]
    fn ansi_c_quoting() {
        let toks = kinds("echo $'a\\tb'");
        assert_eq!(
            toks[1],
            TokenKind::Word(vec![RawPart::AnsiQuoted("a\\tb".into())])
        );
    }
}
