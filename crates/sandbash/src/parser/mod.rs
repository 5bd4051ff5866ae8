//! Parser module
//!
//! Recursive descent over the token stream: script → statement list →
//! `&&`/`||` chain → pipeline → command. Subgrammars live in sibling
//! modules: words ([`word`]), arithmetic ([`arith`]), conditionals
//! ([`cond`]), compound commands ([`compound`]).

pub mod arith;
pub mod ast;
mod compound;
pub mod cond;
mod lexer;
mod span;
pub mod tokens;
pub mod word;

pub use lexer::Lexer;
pub use span::Position;

use std::collections::{HashMap, VecDeque};

use self::ast::{
    AndOr, ArrayElement, AssignValue, Assignment, Command, CompoundCommand, HereDoc, Pipeline,
    Redirect, RedirOp, RedirTarget, Script, SimpleCommand, Statement,
};
use self::tokens::{word_literal, word_text, Op, RawPart, Token, TokenKind};
use crate::error::{Error, Result};

/// Reserved words that never begin a command; seeing one there means a
/// construct is missing its opener.
const ILLEGAL_COMMAND_START: &[&str] = &[
    "then", "elif", "else", "fi", "do", "done", "esac", "in", "}", "]]",
];

/// Parser for shell scripts.
pub struct Parser {
    lexer: Lexer,
    /// Pushback buffer; alias expansion splices tokens in here.
    lookahead: VecDeque<Token>,
    aliases: HashMap<String, String>,
    /// Aliases already expanded on the current path (recursion guard).
    alias_guard: Vec<String>,
    /// An alias value ended in a blank: the following word is eligible too.
    alias_blank: bool,
    /// Captured heredoc bodies not yet attached to their redirections.
    heredoc_bodies: VecDeque<String>,
}

impl Parser {
    /// Create a new parser for the given input.
    pub fn new(input: &str) -> Self {
        Self::with_aliases(input, HashMap::new())
    }

    /// Create a parser with an alias table; aliases expand at lex level in
    /// command position, each at most once per expansion path.
    pub fn with_aliases(input: &str, aliases: HashMap<String, String>) -> Self {
        Self {
            lexer: Lexer::new(input),
            lookahead: VecDeque::new(),
            aliases,
            alias_guard: Vec::new(),
            alias_blank: false,
            heredoc_bodies: VecDeque::new(),
        }
    }

    /// Parse the input and return the AST.
    pub fn parse(mut self) -> Result<Script> {
        let mut script = self.parse_statement_list(&[], false)?;
        let tok = self.peek()?.clone();
        if tok.kind != TokenKind::Eof {
            return Err(self.unexpected(&tok));
        }
        let mut bodies = std::mem::take(&mut self.heredoc_bodies);
        fill_heredocs_script(&mut script, &mut bodies);
        Ok(script)
    }

    // --- token plumbing ---

    fn pull(&mut self) -> Result<Token> {
        let tok = match self.lookahead.pop_front() {
            Some(tok) => tok,
            None => self.lexer.next_token()?,
        };
        while let Some(body) = self.lexer.take_heredoc_body() {
            self.heredoc_bodies.push_back(body);
        }
        Ok(tok)
    }

    fn peek(&mut self) -> Result<&Token> {
        if self.lookahead.is_empty() {
            let tok = self.pull()?;
            self.lookahead.push_front(tok);
        }
        Ok(&self.lookahead[0])
    }

    fn peek_n(&mut self, n: usize) -> Result<&Token> {
        while self.lookahead.len() <= n {
            let tok = self.lexer.next_token()?;
            while let Some(body) = self.lexer.take_heredoc_body() {
                self.heredoc_bodies.push_back(body);
            }
            self.lookahead.push_back(tok);
        }
        Ok(&self.lookahead[n])
    }

    fn advance(&mut self) -> Result<Token> {
        if self.lookahead.is_empty() {
            self.pull()
        } else {
            Ok(self.lookahead.pop_front().unwrap_or(Token {
                kind: TokenKind::Eof,
                pos: Position::new(),
            }))
        }
    }

    fn line(&mut self) -> usize {
        match self.peek() {
            Ok(tok) => tok.pos.line,
            Err(_) => self.lexer.line(),
        }
    }

    fn unexpected(&self, tok: &Token) -> Error {
        let what = match &tok.kind {
            TokenKind::Word(parts) => format!("`{}`", word_text(parts)),
            TokenKind::Op(op) => format!("`{}`", op.as_str()),
            TokenKind::FdRedirect(fd, op) => format!("`{fd}{}`", op.as_str()),
            TokenKind::Arith(_) => "`((`".to_string(),
            TokenKind::Newline => "newline".to_string(),
            TokenKind::Eof => "end of input".to_string(),
        };
        Error::parse(format!("unexpected token {what}"), tok.pos.line)
    }

    /// The bare (single unquoted literal) text of the next word, if any.
    pub(crate) fn peek_bare(&mut self) -> Option<String> {
        match self.peek() {
            Ok(Token {
                kind: TokenKind::Word(parts),
                ..
            }) => word_literal(parts).map(|s| s.to_string()),
            _ => None,
        }
    }

    pub(crate) fn at_bare(&mut self, text: &str) -> bool {
        self.peek_bare().as_deref() == Some(text)
    }

    /// Consume an expected bare word, like `fi` or `done`.
    pub(crate) fn expect_bare(&mut self, text: &str) -> Result<()> {
        if self.at_bare(text) {
            self.advance()?;
            Ok(())
        } else {
            let line = self.line();
            Err(Error::parse(format!("expected `{text}`"), line))
        }
    }

    pub(crate) fn skip_newlines(&mut self) -> Result<()> {
        while matches!(self.peek()?.kind, TokenKind::Newline) {
            self.advance()?;
        }
        Ok(())
    }

    // --- statements ---

    /// Parse statements until a stop word, `)`, a case terminator, or EOF.
    pub(crate) fn parse_statement_list(
        &mut self,
        stops: &[&str],
        stop_rparen: bool,
    ) -> Result<Script> {
        let mut statements = Vec::new();
        loop {
            self.skip_newlines()?;
            match &self.peek()?.kind {
                TokenKind::Eof => break,
                TokenKind::Op(Op::RParen) if stop_rparen => break,
                TokenKind::Op(Op::DSemi | Op::SemiAnd | Op::DSemiAnd) => break,
                TokenKind::Word(parts) => {
                    if let Some(text) = word_literal(parts) {
                        if stops.contains(&text) {
                            break;
                        }
                    }
                }
                _ => {}
            }

            let stmt = self.parse_statement()?;
            let background = stmt.background;
            statements.push(stmt);

            match self.peek()?.kind {
                TokenKind::Op(Op::Semi) | TokenKind::Newline => {
                    self.advance()?;
                }
                // `a & b`: the ampersand is itself a separator.
                _ if background => continue,
                _ => break,
            }
        }
        Ok(Script { statements })
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        self.alias_guard.clear();
        let mut pipelines = vec![self.parse_pipeline()?];
        let mut ops = Vec::new();

        loop {
            match self.peek()?.kind {
                TokenKind::Op(Op::AndIf) => {
                    self.advance()?;
                    self.skip_newlines()?;
                    ops.push(AndOr::And);
                    pipelines.push(self.parse_pipeline()?);
                }
                TokenKind::Op(Op::OrIf) => {
                    self.advance()?;
                    self.skip_newlines()?;
                    ops.push(AndOr::Or);
                    pipelines.push(self.parse_pipeline()?);
                }
                _ => break,
            }
        }

        let background = if matches!(self.peek()?.kind, TokenKind::Op(Op::Amp)) {
            self.advance()?;
            true
        } else {
            false
        };

        Ok(Statement {
            pipelines,
            ops,
            background,
        })
    }

    fn parse_pipeline(&mut self) -> Result<Pipeline> {
        let mut negated = false;
        while self.at_bare("!") {
            self.advance()?;
            negated = !negated;
        }

        let mut commands = vec![self.parse_command()?];
        let mut stderr_pipes = Vec::new();
        loop {
            let pipe_stderr = match self.peek()?.kind {
                TokenKind::Op(Op::Pipe) => false,
                TokenKind::Op(Op::PipeAnd) => true,
                _ => break,
            };
            self.advance()?;
            self.skip_newlines()?;
            stderr_pipes.push(pipe_stderr);
            commands.push(self.parse_command()?);
        }

        Ok(Pipeline {
            negated,
            commands,
            stderr_pipes,
        })
    }

    // --- commands ---

    pub(crate) fn parse_command(&mut self) -> Result<Command> {
        self.expand_alias_at_command()?;

        let tok = self.peek()?.clone();
        match &tok.kind {
            TokenKind::Arith(text) => {
                let line = tok.pos.line;
                self.advance()?;
                let src = arith::parse_arith_source(text, line)?;
                let redirects = self.parse_trailing_redirects()?;
                Ok(Command::Compound(CompoundCommand::Arith(src), redirects))
            }
            TokenKind::Op(Op::LParen) => {
                self.advance()?;
                let body = self.parse_statement_list(&[], true)?;
                match self.advance()?.kind {
                    TokenKind::Op(Op::RParen) => {}
                    _ => {
                        let line = self.line();
                        return Err(Error::parse("expected `)`", line));
                    }
                }
                let redirects = self.parse_trailing_redirects()?;
                Ok(Command::Compound(CompoundCommand::Subshell(body), redirects))
            }
            TokenKind::Word(parts) => {
                if let Some(text) = word_literal(parts) {
                    if ILLEGAL_COMMAND_START.contains(&text) {
                        return Err(self.unexpected(&tok));
                    }
                    match text {
                        "if" | "while" | "until" | "for" | "case" | "select" | "{" | "[["
                        | "function" => return self.parse_compound(text.to_string()),
                        _ => {}
                    }
                    // NAME () compound
                    if is_name(text)
                        && matches!(self.peek_n(1)?.kind, TokenKind::Op(Op::LParen))
                        && matches!(self.peek_n(2)?.kind, TokenKind::Op(Op::RParen))
                    {
                        let name = text.to_string();
                        self.advance()?;
                        self.advance()?;
                        self.advance()?;
                        return self.parse_function_body(name);
                    }
                }
                self.parse_simple_command()
            }
            TokenKind::Op(op) if op.is_redirection() => self.parse_simple_command(),
            TokenKind::FdRedirect(..) => self.parse_simple_command(),
            _ => Err(self.unexpected(&tok)),
        }
    }

    /// Expand aliases at command position, guarding against recursion.
    fn expand_alias_at_command(&mut self) -> Result<()> {
        if self.aliases.is_empty() {
            return Ok(());
        }
        loop {
            let Some(name) = self.peek_bare() else {
                return Ok(());
            };
            if self.alias_guard.iter().any(|g| g == &name) {
                return Ok(());
            }
            let Some(value) = self.aliases.get(&name).cloned() else {
                return Ok(());
            };
            self.advance()?;
            self.alias_guard.push(name);
            self.alias_blank = value.ends_with(' ') || value.ends_with('\t');
            self.splice_tokens(&value)?;
        }
    }

    /// An alias value ending in a blank makes the next word eligible for
    /// alias expansion as well; called while reading arguments.
    fn expand_alias_blank_follow(&mut self) -> Result<()> {
        if !self.alias_blank {
            return Ok(());
        }
        self.alias_blank = false;
        let Some(name) = self.peek_bare() else {
            return Ok(());
        };
        if self.alias_guard.iter().any(|g| g == &name) {
            return Ok(());
        }
        let Some(value) = self.aliases.get(&name).cloned() else {
            return Ok(());
        };
        self.advance()?;
        self.alias_guard.push(name);
        self.alias_blank = value.ends_with(' ') || value.ends_with('\t');
        self.splice_tokens(&value)?;
        Ok(())
    }

    /// Re-tokenize replacement text and push it in front of the stream.
    fn splice_tokens(&mut self, text: &str) -> Result<()> {
        let mut sub = Lexer::new(text);
        let mut spliced = Vec::new();
        loop {
            let tok = sub.next_token()?;
            if tok.kind == TokenKind::Eof {
                break;
            }
            spliced.push(tok);
        }
        for tok in spliced.into_iter().rev() {
            self.lookahead.push_front(tok);
        }
        Ok(())
    }

    fn parse_function_body(&mut self, name: String) -> Result<Command> {
        self.skip_newlines()?;
        let body_cmd = self.parse_command()?;
        match body_cmd {
            Command::Compound(body, redirects) => Ok(Command::FunctionDef(ast::FunctionDef {
                name,
                body: Box::new(body),
                redirects,
            })),
            _ => {
                let line = self.line();
                Err(Error::parse(
                    "function body must be a compound command",
                    line,
                ))
            }
        }
    }

    fn parse_simple_command(&mut self) -> Result<Command> {
        let line = self.peek()?.pos.line;
        let mut assignments = Vec::new();
        let mut words = Vec::new();
        let mut redirects = Vec::new();
        let mut seen_word = false;
        // Declaration builtins accept array-literal operands after the
        // command word; nothing else does.
        let mut decl_context = false;

        loop {
            let tok = self.peek()?.clone();
            match tok.kind {
                TokenKind::Word(ref parts) => {
                    if let Some((name, index, append, value_raw)) = split_assignment(parts) {
                        let array_follows = value_raw.is_empty()
                            && matches!(self.peek_n(1)?.kind, TokenKind::Op(Op::LParen));
                        if !seen_word || (decl_context && array_follows) {
                            self.advance()?;
                            let value = if array_follows {
                                AssignValue::Array(self.parse_array_literal()?)
                            } else {
                                AssignValue::Scalar(word::parse_word(&value_raw, line)?)
                            };
                            assignments.push(Assignment {
                                name,
                                index,
                                append,
                                value,
                            });
                            continue;
                        }
                    }
                    self.advance()?;
                    words.push(word::parse_word(parts, line)?);
                    if !seen_word {
                        seen_word = true;
                        if let Some(text) = word_literal(parts) {
                            decl_context = matches!(
                                text,
                                "declare" | "typeset" | "local" | "readonly" | "export"
                            );
                        }
                        self.expand_alias_blank_follow()?;
                    }
                }
                TokenKind::Op(op) if op.is_redirection() => {
                    self.advance()?;
                    redirects.push(self.parse_redirect(None, op)?);
                }
                TokenKind::FdRedirect(fd, op) => {
                    self.advance()?;
                    redirects.push(self.parse_redirect(Some(fd), op)?);
                }
                _ => break,
            }
        }

        if assignments.is_empty() && words.is_empty() && redirects.is_empty() {
            let tok = self.peek()?.clone();
            return Err(self.unexpected(&tok));
        }

        Ok(Command::Simple(SimpleCommand {
            assignments,
            words,
            redirects,
            line,
        }))
    }

    /// Parse `( elem... )` after `NAME=`.
    fn parse_array_literal(&mut self) -> Result<Vec<ArrayElement>> {
        self.advance()?; // (
        let mut elements = Vec::new();
        loop {
            self.skip_newlines()?;
            let tok = self.peek()?.clone();
            match tok.kind {
                TokenKind::Op(Op::RParen) => {
                    self.advance()?;
                    break;
                }
                TokenKind::Word(ref parts) => {
                    self.advance()?;
                    let line = tok.pos.line;
                    if let Some((index, value_raw)) = split_array_element(parts) {
                        elements.push(ArrayElement {
                            index: Some(index),
                            value: word::parse_word(&value_raw, line)?,
                        });
                    } else {
                        elements.push(ArrayElement {
                            index: None,
                            value: word::parse_word(parts, line)?,
                        });
                    }
                }
                _ => return Err(self.unexpected(&tok)),
            }
        }
        Ok(elements)
    }

    /// Redirections after a compound command's closing keyword.
    pub(crate) fn parse_trailing_redirects(&mut self) -> Result<Vec<Redirect>> {
        let mut redirects = Vec::new();
        loop {
            let tok = self.peek()?.clone();
            match tok.kind {
                TokenKind::Op(op) if op.is_redirection() => {
                    self.advance()?;
                    redirects.push(self.parse_redirect(None, op)?);
                }
                TokenKind::FdRedirect(fd, op) => {
                    self.advance()?;
                    redirects.push(self.parse_redirect(Some(fd), op)?);
                }
                _ => break,
            }
        }
        Ok(redirects)
    }

    fn parse_redirect(&mut self, fd: Option<i32>, op: Op) -> Result<Redirect> {
        let tok = self.advance()?;
        let line = tok.pos.line;
        let TokenKind::Word(parts) = tok.kind else {
            return Err(Error::parse("expected redirection target", line));
        };

        match op {
            Op::DLess | Op::DLessDash => {
                let (delimiter, quoted) = heredoc_delimiter(&parts);
                self.lexer
                    .request_heredoc(&delimiter, op == Op::DLessDash);
                Ok(Redirect {
                    fd,
                    op: RedirOp::HereDoc,
                    target: RedirTarget::HereDoc(HereDoc {
                        body: String::new(),
                        expand: !quoted,
                    }),
                })
            }
            _ => {
                let target = word::parse_word(&parts, line)?;
                let kind = match op {
                    Op::Less => RedirOp::In,
                    Op::Great => RedirOp::Out,
                    Op::DGreat => RedirOp::Append,
                    Op::Clobber => RedirOp::Clobber,
                    Op::LessGreat => RedirOp::ReadWrite,
                    Op::LessAnd => RedirOp::DupIn,
                    Op::GreatAnd => RedirOp::DupOut,
                    Op::AndGreat => RedirOp::BothOut,
                    Op::AndDGreat => RedirOp::BothAppend,
                    Op::TLess => RedirOp::HereString,
                    _ => {
                        return Err(Error::parse(
                            format!("unsupported redirection `{}`", op.as_str()),
                            line,
                        ))
                    }
                };
                Ok(Redirect {
                    fd,
                    op: kind,
                    target: RedirTarget::Word(target),
                })
            }
        }
    }
}

/// True for a valid shell identifier.
pub(crate) fn is_name(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .enumerate()
            .all(|(i, c)| c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()))
}

/// Heredoc delimiters: quote removal applies, and any quoting disables
/// body expansion.
fn heredoc_delimiter(parts: &[RawPart]) -> (String, bool) {
    let mut text = String::new();
    let mut quoted = false;
    for part in parts {
        match part {
            RawPart::Literal(s) => text.push_str(s),
            RawPart::SingleQuoted(s) | RawPart::AnsiQuoted(s) => {
                text.push_str(s);
                quoted = true;
            }
            RawPart::Escaped(c) => {
                text.push(*c);
                quoted = true;
            }
            RawPart::DoubleQuoted(inner) => {
                quoted = true;
                for p in inner {
                    if let RawPart::Literal(s) = p {
                        text.push_str(s);
                    }
                }
            }
            other => text.push_str(&word_text(std::slice::from_ref(other))),
        }
    }
    (text, quoted)
}

/// Recognize `NAME=`, `NAME+=`, `NAME[IDX]=` prefixes in a word's first
/// literal part. Returns the raw parts of the value.
fn split_assignment(parts: &[RawPart]) -> Option<(String, Option<String>, bool, Vec<RawPart>)> {
    let RawPart::Literal(first) = parts.first()? else {
        return None;
    };

    let eq = first.find('=')?;
    let (head, mut rest) = first.split_at(eq);
    rest = &rest[1..];
    let (head, append) = match head.strip_suffix('+') {
        Some(h) => (h, true),
        None => (head, false),
    };

    let (name, index) = match head.find('[') {
        Some(open) => {
            if !head.ends_with(']') {
                return None;
            }
            let name = &head[..open];
            let idx = &head[open + 1..head.len() - 1];
            (name, Some(idx.to_string()))
        }
        None => (head, None),
    };

    if !is_name(name) {
        return None;
    }

    let mut value_raw = Vec::new();
    if !rest.is_empty() {
        value_raw.push(RawPart::Literal(rest.to_string()));
    }
    value_raw.extend(parts.iter().skip(1).cloned());
    Some((name.to_string(), index, append, value_raw))
}

/// Recognize `[IDX]=value` array elements.
fn split_array_element(parts: &[RawPart]) -> Option<(String, Vec<RawPart>)> {
    let RawPart::Literal(first) = parts.first()? else {
        return None;
    };
    let rest = first.strip_prefix('[')?;
    let close = rest.find("]=")?;
    let index = rest[..close].to_string();
    let value_text = &rest[close + 2..];

    let mut value_raw = Vec::new();
    if !value_text.is_empty() {
        value_raw.push(RawPart::Literal(value_text.to_string()));
    }
    value_raw.extend(parts.iter().skip(1).cloned());
    Some((index, value_raw))
}

// --- heredoc body attachment ---

fn fill_heredocs_script(script: &mut Script, bodies: &mut VecDeque<String>) {
    for stmt in &mut script.statements {
        for pipeline in &mut stmt.pipelines {
            for command in &mut pipeline.commands {
                fill_heredocs_command(command, bodies);
            }
        }
    }
}

fn fill_heredocs_command(command: &mut Command, bodies: &mut VecDeque<String>) {
    match command {
        Command::Simple(simple) => fill_heredocs_redirects(&mut simple.redirects, bodies),
        Command::Compound(compound, redirects) => {
            fill_heredocs_compound(compound, bodies);
            fill_heredocs_redirects(redirects, bodies);
        }
        Command::FunctionDef(def) => {
            fill_heredocs_compound(&mut def.body, bodies);
            fill_heredocs_redirects(&mut def.redirects, bodies);
        }
    }
}

fn fill_heredocs_compound(compound: &mut CompoundCommand, bodies: &mut VecDeque<String>) {
    match compound {
        CompoundCommand::If(if_cmd) => {
            for (cond, body) in &mut if_cmd.clauses {
                fill_heredocs_script(cond, bodies);
                fill_heredocs_script(body, bodies);
            }
            if let Some(else_body) = &mut if_cmd.else_body {
                fill_heredocs_script(else_body, bodies);
            }
        }
        CompoundCommand::For(for_cmd) => fill_heredocs_script(&mut for_cmd.body, bodies),
        CompoundCommand::CStyleFor(for_cmd) => fill_heredocs_script(&mut for_cmd.body, bodies),
        CompoundCommand::While(loop_cmd) | CompoundCommand::Until(loop_cmd) => {
            fill_heredocs_script(&mut loop_cmd.condition, bodies);
            fill_heredocs_script(&mut loop_cmd.body, bodies);
        }
        CompoundCommand::Case(case_cmd) => {
            for item in &mut case_cmd.items {
                fill_heredocs_script(&mut item.body, bodies);
            }
        }
        CompoundCommand::Select(select_cmd) => fill_heredocs_script(&mut select_cmd.body, bodies),
        CompoundCommand::Subshell(script) | CompoundCommand::Group(script) => {
            fill_heredocs_script(script, bodies)
        }
        CompoundCommand::Arith(_) | CompoundCommand::Cond(_) => {}
    }
}

fn fill_heredocs_redirects(redirects: &mut [Redirect], bodies: &mut VecDeque<String>) {
    for redirect in redirects {
        if let RedirTarget::HereDoc(heredoc) = &mut redirect.target {
            if heredoc.body.is_empty() {
                if let Some(body) = bodies.pop_front() {
                    heredoc.body = body;
                }
            }
        }
    }
}
