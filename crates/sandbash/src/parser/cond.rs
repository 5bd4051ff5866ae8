//! Conditional (`[[ ]]`) expression parser
//!
//! Operates on a pre-collected token list: the main parser gathers
//! everything between `[[` and `]]`, mapping shell operators (`&&`, `||`,
//! parens, `<`, `>`) onto conditional tokens, then this module applies the
//! precedence `!` > `&&` > `||`.

use super::ast::{CondExpr, CondOp, Word};
use crate::error::{Error, Result};

/// A token inside `[[ ... ]]`.
#[derive(Debug, Clone)]
pub enum CondToken {
    /// An operand or operator word; the bare literal text is kept when the
    /// word was a single unquoted literal so operators can be recognized.
    Word(Word, Option<String>),
    And,
    Or,
    LParen,
    RParen,
    /// `<` / `>` arrive as shell operators but mean string comparison here.
    StrLt,
    StrGt,
}

/// Unary operators accepted inside `[[ ]]`.
const UNARY_OPS: &str = "abcdefghkprstuwxzGLNOSnov";

fn binary_op(text: &str) -> Option<CondOp> {
    Some(match text {
        "=" | "==" => CondOp::Eq,
        "!=" => CondOp::Ne,
        "=~" => CondOp::Match,
        "<" => CondOp::StrLt,
        ">" => CondOp::StrGt,
        "-eq" => CondOp::NumEq,
        "-ne" => CondOp::NumNe,
        "-lt" => CondOp::NumLt,
        "-le" => CondOp::NumLe,
        "-gt" => CondOp::NumGt,
        "-ge" => CondOp::NumGe,
        "-nt" => CondOp::NewerThan,
        "-ot" => CondOp::OlderThan,
        "-ef" => CondOp::SameFile,
        _ => return None,
    })
}

/// Parse a collected conditional token list into an expression tree.
pub fn parse_cond(tokens: Vec<CondToken>, line: usize) -> Result<CondExpr> {
    let mut parser = CondParser {
        tokens,
        pos: 0,
        line,
    };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(Error::parse("malformed conditional expression", line));
    }
    Ok(expr)
}

struct CondParser {
    tokens: Vec<CondToken>,
    pos: usize,
    line: usize,
}

impl CondParser {
    fn peek(&self) -> Option<&CondToken> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<CondToken> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn err(&self, message: &str) -> Error {
        Error::parse(format!("conditional expression: {message}"), self.line)
    }

    fn parse_or(&mut self) -> Result<CondExpr> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(CondToken::Or)) {
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = CondExpr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<CondExpr> {
        let mut lhs = self.parse_not()?;
        while matches!(self.peek(), Some(CondToken::And)) {
            self.pos += 1;
            let rhs = self.parse_not()?;
            lhs = CondExpr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<CondExpr> {
        match self.peek() {
            Some(CondToken::Word(_, Some(text))) if text == "!" => {
                self.pos += 1;
                Ok(CondExpr::Not(Box::new(self.parse_not()?)))
            }
            Some(CondToken::LParen) => {
                self.pos += 1;
                let inner = self.parse_or()?;
                match self.bump() {
                    Some(CondToken::RParen) => Ok(inner),
                    _ => Err(self.err("expected `)`")),
                }
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<CondExpr> {
        let Some(tok) = self.bump() else {
            return Err(self.err("unexpected end"));
        };

        match tok {
            CondToken::Word(word, bare) => {
                // Unary test: `-X operand`.
                if let Some(text) = &bare {
                    let mut chars = text.chars();
                    if chars.next() == Some('-') {
                        if let (Some(op), None) = (chars.next(), chars.next()) {
                            if UNARY_OPS.contains(op) {
                                let operand = match self.bump() {
                                    Some(CondToken::Word(w, _)) => w,
                                    _ => return Err(self.err("expected operand")),
                                };
                                return Ok(CondExpr::Unary { op, operand });
                            }
                        }
                    }
                }

                // Binary test: `lhs OP rhs`.
                let op = match self.peek() {
                    Some(CondToken::Word(_, Some(text))) => binary_op(text),
                    Some(CondToken::StrLt) => Some(CondOp::StrLt),
                    Some(CondToken::StrGt) => Some(CondOp::StrGt),
                    _ => None,
                };
                if let Some(op) = op {
                    self.pos += 1;
                    let rhs = match self.bump() {
                        Some(CondToken::Word(w, _)) => w,
                        _ => return Err(self.err("expected right operand")),
                    };
                    return Ok(CondExpr::Binary { op, lhs: word, rhs });
                }

                Ok(CondExpr::Word(word))
            }
            _ => Err(self.err("unexpected token")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::parser::ast::Word;

    fn w(text: &str) -> CondToken {
        CondToken::Word(Word::literal(text), Some(text.to_string()))
    }

    #[test]
    fn unary_test() {
        let expr = parse_cond(vec![w("-f"), w("/etc/passwd")], 1).unwrap();
        assert!(matches!(expr, CondExpr::Unary { op: 'f', .. }));
    }

    #[test]
    fn binary_string_and_numeric() {
        let expr = parse_cond(vec![w("a"), w("=="), w("b")], 1).unwrap();
        assert!(matches!(expr, CondExpr::Binary { op: CondOp::Eq, .. }));

        let expr = parse_cond(vec![w("1"), w("-lt"), w("2")], 1).unwrap();
        assert!(matches!(expr, CondExpr::Binary { op: CondOp::NumLt, .. }));
    }

    #[test]
    fn precedence_not_over_and_over_or() {
        // ! a && b || c  =>  Or(And(Not(a), b), c)
        let expr = parse_cond(
            vec![w("!"), w("a"), CondToken::And, w("b"), CondToken::Or, w("c")],
            1,
        )
        .unwrap();
        let CondExpr::Or(lhs, _) = expr else {
            panic!("expected Or at top");
        };
        let CondExpr::And(not, _) = *lhs else {
            panic!("expected And under Or");
        };
        assert!(matches!(*not, CondExpr::Not(_)));
    }

    #[test]
    fn parens_group() {
        // a && ( b || c )
        let expr = parse_cond(
            vec![
                w("a"),
                CondToken::And,
                CondToken::LParen,
                w("b"),
                CondToken::Or,
                w("c"),
                CondToken::RParen,
            ],
            1,
        )
        .unwrap();
        let CondExpr::And(_, rhs) = expr else {
            panic!("expected And at top");
        };
        assert!(matches!(*rhs, CondExpr::Or(..)));
    }

    #[test]
    fn bare_word_is_nonempty_test() {
        let expr = parse_cond(vec![w("hello")], 1).unwrap();
        assert!(matches!(expr, CondExpr::Word(_)));
    }

    #[test]
    fn angle_ops_are_string_compares() {
        let expr = parse_cond(vec![w("a"), CondToken::StrLt, w("b")], 1).unwrap();
        assert!(matches!(
            expr,
            CondExpr::Binary {
                op: CondOp::StrLt,
                ..
            }
        ));
    }

    #[test]
    fn trailing_garbage_is_an_error() {
        assert!(parse_cond(vec![w("a"), w("b")], 1).is_err());
        assert!(parse_cond(vec![CondToken::RParen], 1).is_err());
    }
}
