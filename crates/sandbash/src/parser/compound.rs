//! Compound command parsing: control structures, groups, `[[ ]]`
//!
//! Each parser here is entered with its introducing word still unconsumed
//! and leaves having consumed the closing keyword plus any trailing
//! redirections.

use super::arith::parse_arith_source;
use super::ast::{
    ArithSource, CaseCommand, CaseItem, CaseTerminator, Command, CompoundCommand,
    CStyleForCommand, ForCommand, IfCommand, LoopCommand, SelectCommand, Word,
};
use super::cond::{parse_cond, CondToken};
use super::tokens::{word_literal, Op, TokenKind};
use super::{is_name, word, Parser};
use crate::error::{Error, Result};

impl Parser {
    /// Dispatch on the introducing reserved word.
    pub(crate) fn parse_compound(&mut self, keyword: String) -> Result<Command> {
        let compound = match keyword.as_str() {
            "if" => self.parse_if()?,
            "while" => self.parse_while(false)?,
            "until" => self.parse_while(true)?,
            "for" => self.parse_for()?,
            "case" => self.parse_case()?,
            "select" => self.parse_select()?,
            "{" => self.parse_group()?,
            "[[" => self.parse_cond_command()?,
            "function" => return self.parse_function_keyword(),
            _ => {
                let line = self.line();
                return Err(Error::parse(
                    format!("unexpected reserved word `{keyword}`"),
                    line,
                ));
            }
        };
        let redirects = self.parse_trailing_redirects()?;
        Ok(Command::Compound(compound, redirects))
    }

    fn parse_if(&mut self) -> Result<CompoundCommand> {
        self.expect_bare("if")?;
        let mut clauses = Vec::new();
        let mut else_body = None;

        loop {
            let condition = self.parse_statement_list(&["then"], false)?;
            self.expect_bare("then")?;
            let body = self.parse_statement_list(&["elif", "else", "fi"], false)?;
            clauses.push((condition, body));

            if self.at_bare("elif") {
                self.advance()?;
                continue;
            }
            if self.at_bare("else") {
                self.advance()?;
                else_body = Some(self.parse_statement_list(&["fi"], false)?);
            }
            self.expect_bare("fi")?;
            break;
        }

        Ok(CompoundCommand::If(IfCommand { clauses, else_body }))
    }

    fn parse_while(&mut self, until: bool) -> Result<CompoundCommand> {
        self.advance()?; // while / until
        let condition = self.parse_statement_list(&["do"], false)?;
        self.expect_bare("do")?;
        let body = self.parse_statement_list(&["done"], false)?;
        self.expect_bare("done")?;

        let loop_cmd = LoopCommand { condition, body };
        Ok(if until {
            CompoundCommand::Until(loop_cmd)
        } else {
            CompoundCommand::While(loop_cmd)
        })
    }

    fn parse_for(&mut self) -> Result<CompoundCommand> {
        self.expect_bare("for")?;

        // for (( init; cond; update ))
        if let TokenKind::Arith(text) = &self.peek()?.kind {
            let text = text.clone();
            let line = self.peek()?.pos.line;
            self.advance()?;
            let pieces: Vec<&str> = text.split(';').collect();
            if pieces.len() != 3 {
                return Err(Error::parse(
                    "expected `init; cond; update` in for (( ))",
                    line,
                ));
            }
            let parse_piece = |piece: &str| -> Result<Option<ArithSource>> {
                if piece.trim().is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(parse_arith_source(piece, line)?))
                }
            };
            let init = parse_piece(pieces[0])?;
            let cond = parse_piece(pieces[1])?;
            let update = parse_piece(pieces[2])?;

            if matches!(self.peek()?.kind, TokenKind::Op(Op::Semi)) {
                self.advance()?;
            }
            let body = self.parse_loop_body()?;
            return Ok(CompoundCommand::CStyleFor(CStyleForCommand {
                init,
                cond,
                update,
                body,
            }));
        }

        let (variable, words) = self.parse_iteration_head()?;
        let body = self.parse_loop_body()?;
        Ok(CompoundCommand::For(ForCommand {
            variable,
            words,
            body,
        }))
    }

    fn parse_select(&mut self) -> Result<CompoundCommand> {
        self.expect_bare("select")?;
        let (variable, words) = self.parse_iteration_head()?;
        let body = self.parse_loop_body()?;
        Ok(CompoundCommand::Select(SelectCommand {
            variable,
            words,
            body,
        }))
    }

    /// `NAME [in WORDS...]` plus the separator before `do`.
    fn parse_iteration_head(&mut self) -> Result<(String, Option<Vec<Word>>)> {
        let line = self.line();
        let Some(variable) = self.peek_bare() else {
            return Err(Error::parse("expected variable name", line));
        };
        if !is_name(&variable) {
            return Err(Error::parse(
                format!("`{variable}` is not a valid identifier"),
                line,
            ));
        }
        self.advance()?;

        let mut words = None;
        if self.at_bare("in") {
            self.advance()?;
            let mut list = Vec::new();
            loop {
                let tok = self.peek()?.clone();
                match tok.kind {
                    TokenKind::Word(ref parts) => {
                        self.advance()?;
                        list.push(word::parse_word(parts, tok.pos.line)?);
                    }
                    _ => break,
                }
            }
            words = Some(list);
        }

        if matches!(self.peek()?.kind, TokenKind::Op(Op::Semi)) {
            self.advance()?;
        }
        Ok((variable, words))
    }

    /// `do ... done`, with optional leading newlines.
    fn parse_loop_body(&mut self) -> Result<super::ast::Script> {
        self.skip_newlines()?;
        self.expect_bare("do")?;
        let body = self.parse_statement_list(&["done"], false)?;
        self.expect_bare("done")?;
        Ok(body)
    }

    fn parse_case(&mut self) -> Result<CompoundCommand> {
        self.expect_bare("case")?;
        let tok = self.advance()?;
        let word = match &tok.kind {
            TokenKind::Word(parts) => word::parse_word(parts, tok.pos.line)?,
            _ => return Err(self.unexpected(&tok)),
        };
        self.skip_newlines()?;
        self.expect_bare("in")?;

        let mut items = Vec::new();
        loop {
            self.skip_newlines()?;
            if self.at_bare("esac") {
                self.advance()?;
                break;
            }
            if matches!(self.peek()?.kind, TokenKind::Eof) {
                let line = self.line();
                return Err(Error::parse("expected `esac`", line));
            }

            if matches!(self.peek()?.kind, TokenKind::Op(Op::LParen)) {
                self.advance()?;
            }

            let mut patterns = Vec::new();
            loop {
                let tok = self.advance()?;
                match &tok.kind {
                    TokenKind::Word(parts) => {
                        patterns.push(word::parse_word(parts, tok.pos.line)?)
                    }
                    _ => return Err(self.unexpected(&tok)),
                }
                if matches!(self.peek()?.kind, TokenKind::Op(Op::Pipe)) {
                    self.advance()?;
                } else {
                    break;
                }
            }
            let close = self.advance()?;
            if !matches!(close.kind, TokenKind::Op(Op::RParen)) {
                return Err(self.unexpected(&close));
            }

            let body = self.parse_statement_list(&["esac"], false)?;

            let terminator = match self.peek()?.kind {
                TokenKind::Op(Op::DSemi) => {
                    self.advance()?;
                    CaseTerminator::Break
                }
                TokenKind::Op(Op::SemiAnd) => {
                    self.advance()?;
                    CaseTerminator::FallThrough
                }
                TokenKind::Op(Op::DSemiAnd) => {
                    self.advance()?;
                    CaseTerminator::Continue
                }
                // Last arm may omit its terminator before `esac`.
                _ => CaseTerminator::Break,
            };
            items.push(CaseItem {
                patterns,
                body,
                terminator,
            });
        }

        Ok(CompoundCommand::Case(CaseCommand { word, items }))
    }

    fn parse_group(&mut self) -> Result<CompoundCommand> {
        self.expect_bare("{")?;
        let body = self.parse_statement_list(&["}"], false)?;
        self.expect_bare("}")?;
        Ok(CompoundCommand::Group(body))
    }

    /// Collect tokens up to `]]`, then run the conditional subparser.
    fn parse_cond_command(&mut self) -> Result<CompoundCommand> {
        let line = self.line();
        self.expect_bare("[[")?;

        let mut tokens = Vec::new();
        loop {
            let tok = self.advance()?;
            match &tok.kind {
                TokenKind::Word(parts) => {
                    if word_literal(parts) == Some("]]") {
                        break;
                    }
                    let bare = word_literal(parts).map(|s| s.to_string());
                    tokens.push(CondToken::Word(word::parse_word(parts, tok.pos.line)?, bare));
                }
                TokenKind::Op(Op::AndIf) => tokens.push(CondToken::And),
                TokenKind::Op(Op::OrIf) => tokens.push(CondToken::Or),
                TokenKind::Op(Op::LParen) => tokens.push(CondToken::LParen),
                TokenKind::Op(Op::RParen) => tokens.push(CondToken::RParen),
                TokenKind::Op(Op::Less) => tokens.push(CondToken::StrLt),
                TokenKind::Op(Op::Great) => tokens.push(CondToken::StrGt),
                TokenKind::Newline => continue,
                TokenKind::Eof => {
                    return Err(Error::parse("unterminated `[[`", line));
                }
                _ => return Err(self.unexpected(&tok)),
            }
        }

        Ok(CompoundCommand::Cond(parse_cond(tokens, line)?))
    }

    /// `function NAME [()] compound-body`
    fn parse_function_keyword(&mut self) -> Result<Command> {
        self.expect_bare("function")?;
        let line = self.line();
        let Some(name) = self.peek_bare() else {
            return Err(Error::parse("expected function name", line));
        };
        self.advance()?;

        if matches!(self.peek()?.kind, TokenKind::Op(Op::LParen)) {
            self.advance()?;
            let close = self.advance()?;
            if !matches!(close.kind, TokenKind::Op(Op::RParen)) {
                return Err(self.unexpected(&close));
            }
        }
        self.parse_function_body(name)
    }
}
