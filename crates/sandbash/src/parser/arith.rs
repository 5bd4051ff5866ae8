//! Arithmetic expression parser
//!
//! C-like grammar for `$(( ... ))`, `(( ... ))`, and `${x:off:len}` offsets.
//! Parsing is separate from evaluation: the evaluator in the interpreter
//! resolves variables against the store at run time.
//!
//! Text containing `$(`, backticks, or `${` must undergo substitution before
//! it can be parsed; such sources are kept raw and re-parsed at run time.

use super::ast::{ArithAssignOp, ArithBinaryOp, ArithExpr, ArithSource, ArithUnaryOp};
use crate::error::{Error, Result};

/// Build an [`ArithSource`] from raw expression text.
///
/// Static text is parsed eagerly so shape errors surface at parse time;
/// dynamic text (text needing substitution first) is deferred.
pub fn parse_arith_source(text: &str, line: usize) -> Result<ArithSource> {
    if is_dynamic(text) {
        return Ok(ArithSource {
            text: text.to_string(),
            parsed: None,
        });
    }
    let parsed = parse_arith(text, line)?;
    Ok(ArithSource {
        text: text.to_string(),
        parsed: Some(parsed),
    })
}

/// True when the text needs parameter/command substitution before parsing.
fn is_dynamic(text: &str) -> bool {
    text.contains("$(") || text.contains("${") || text.contains('`') || text.contains('"')
}

/// Parse arithmetic text into an expression tree.
///
/// An empty (or all-blank) expression evaluates to 0, matching `(( ))`.
pub fn parse_arith(text: &str, line: usize) -> Result<ArithExpr> {
    let mut parser = ArithParser::new(text, line)?;
    if parser.peek().is_none() {
        return Ok(ArithExpr::Number(0));
    }
    let expr = parser.parse_comma()?;
    match parser.peek() {
        None => Ok(expr),
        Some(tok) => Err(parser.unexpected(&tok)),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ArithToken {
    Number(i64),
    /// Variable or array element; subscript text stays raw.
    Name(String, Option<String>),
    Op(&'static str),
}

struct ArithParser {
    tokens: Vec<ArithToken>,
    pos: usize,
    line: usize,
}

impl ArithParser {
    fn new(text: &str, line: usize) -> Result<Self> {
        let tokens = tokenize(text, line)?;
        Ok(Self {
            tokens,
            pos: 0,
            line,
        })
    }

    fn peek(&self) -> Option<ArithToken> {
        self.tokens.get(self.pos).cloned()
    }

    fn bump(&mut self) -> Option<ArithToken> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(ArithToken::Op(o)) if o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(&self, tok: &ArithToken) -> Error {
        let what = match tok {
            ArithToken::Number(n) => n.to_string(),
            ArithToken::Name(n, _) => n.clone(),
            ArithToken::Op(o) => (*o).to_string(),
        };
        Error::parse(format!("arithmetic syntax error near `{what}`"), self.line)
    }

    fn parse_comma(&mut self) -> Result<ArithExpr> {
        let mut expr = self.parse_assignment()?;
        while self.eat_op(",") {
            let rhs = self.parse_assignment()?;
            expr = ArithExpr::Comma(Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_assignment(&mut self) -> Result<ArithExpr> {
        let lhs = self.parse_ternary()?;

        let assign_op = match self.peek() {
            Some(ArithToken::Op(op)) => match op {
                "=" => Some(ArithAssignOp::Assign),
                "+=" => Some(ArithAssignOp::Add),
                "-=" => Some(ArithAssignOp::Sub),
                "*=" => Some(ArithAssignOp::Mul),
                "/=" => Some(ArithAssignOp::Div),
                "%=" => Some(ArithAssignOp::Mod),
                "**=" => Some(ArithAssignOp::Pow),
                "<<=" => Some(ArithAssignOp::Shl),
                ">>=" => Some(ArithAssignOp::Shr),
                "&=" => Some(ArithAssignOp::And),
                "^=" => Some(ArithAssignOp::Xor),
                "|=" => Some(ArithAssignOp::Or),
                _ => None,
            },
            _ => None,
        };

        if let Some(op) = assign_op {
            let ArithExpr::Var { name, index } = lhs else {
                return Err(Error::parse(
                    "arithmetic: assignment to non-variable",
                    self.line,
                ));
            };
            self.pos += 1;
            let value = self.parse_assignment()?;
            return Ok(ArithExpr::Assign {
                name,
                index,
                op,
                value: Box::new(value),
            });
        }
        Ok(lhs)
    }

    fn parse_ternary(&mut self) -> Result<ArithExpr> {
        let cond = self.parse_logical_or()?;
        if self.eat_op("?") {
            let then = self.parse_assignment()?;
            if !self.eat_op(":") {
                return Err(Error::parse("arithmetic: expected `:`", self.line));
            }
            let otherwise = self.parse_assignment()?;
            return Ok(ArithExpr::Ternary {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(cond)
    }

    fn parse_binary_level(
        &mut self,
        ops: &[(&'static str, ArithBinaryOp)],
        next: fn(&mut Self) -> Result<ArithExpr>,
    ) -> Result<ArithExpr> {
        let mut lhs = next(self)?;
        'outer: loop {
            for (text, op) in ops {
                if self.eat_op(text) {
                    let rhs = next(self)?;
                    lhs = ArithExpr::Binary {
                        op: *op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    };
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }

    fn parse_logical_or(&mut self) -> Result<ArithExpr> {
        self.parse_binary_level(&[("||", ArithBinaryOp::LogOr)], Self::parse_logical_and)
    }

    fn parse_logical_and(&mut self) -> Result<ArithExpr> {
        self.parse_binary_level(&[("&&", ArithBinaryOp::LogAnd)], Self::parse_bit_or)
    }

    fn parse_bit_or(&mut self) -> Result<ArithExpr> {
        self.parse_binary_level(&[("|", ArithBinaryOp::BitOr)], Self::parse_bit_xor)
    }

    fn parse_bit_xor(&mut self) -> Result<ArithExpr> {
        self.parse_binary_level(&[("^", ArithBinaryOp::BitXor)], Self::parse_bit_and)
    }

    fn parse_bit_and(&mut self) -> Result<ArithExpr> {
        self.parse_binary_level(&[("&", ArithBinaryOp::BitAnd)], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> Result<ArithExpr> {
        self.parse_binary_level(
            &[("==", ArithBinaryOp::Eq), ("!=", ArithBinaryOp::Ne)],
            Self::parse_relational,
        )
    }

    fn parse_relational(&mut self) -> Result<ArithExpr> {
        self.parse_binary_level(
            &[
                ("<=", ArithBinaryOp::Le),
                (">=", ArithBinaryOp::Ge),
                ("<", ArithBinaryOp::Lt),
                (">", ArithBinaryOp::Gt),
            ],
            Self::parse_shift,
        )
    }

    fn parse_shift(&mut self) -> Result<ArithExpr> {
        self.parse_binary_level(
            &[("<<", ArithBinaryOp::Shl), (">>", ArithBinaryOp::Shr)],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<ArithExpr> {
        self.parse_binary_level(
            &[("+", ArithBinaryOp::Add), ("-", ArithBinaryOp::Sub)],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> Result<ArithExpr> {
        self.parse_binary_level(
            &[
                ("*", ArithBinaryOp::Mul),
                ("/", ArithBinaryOp::Div),
                ("%", ArithBinaryOp::Mod),
            ],
            Self::parse_power,
        )
    }

    fn parse_power(&mut self) -> Result<ArithExpr> {
        let lhs = self.parse_unary()?;
        if self.eat_op("**") {
            // Right-associative.
            let rhs = self.parse_power()?;
            return Ok(ArithExpr::Binary {
                op: ArithBinaryOp::Pow,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<ArithExpr> {
        if self.eat_op("++") {
            return self.parse_incdec(true, true);
        }
        if self.eat_op("--") {
            return self.parse_incdec(false, true);
        }
        if self.eat_op("!") {
            return Ok(ArithExpr::Unary {
                op: ArithUnaryOp::Not,
                operand: Box::new(self.parse_unary()?),
            });
        }
        if self.eat_op("~") {
            return Ok(ArithExpr::Unary {
                op: ArithUnaryOp::BitNot,
                operand: Box::new(self.parse_unary()?),
            });
        }
        if self.eat_op("-") {
            return Ok(ArithExpr::Unary {
                op: ArithUnaryOp::Neg,
                operand: Box::new(self.parse_unary()?),
            });
        }
        if self.eat_op("+") {
            return Ok(ArithExpr::Unary {
                op: ArithUnaryOp::Pos,
                operand: Box::new(self.parse_unary()?),
            });
        }
        self.parse_postfix()
    }

    fn parse_incdec(&mut self, increment: bool, prefix: bool) -> Result<ArithExpr> {
        match self.bump() {
            Some(ArithToken::Name(name, index)) => Ok(ArithExpr::IncDec {
                name,
                index,
                increment,
                prefix,
            }),
            Some(tok) => Err(self.unexpected(&tok)),
            None => Err(Error::parse(
                "arithmetic: expected variable after ++/--",
                self.line,
            )),
        }
    }

    fn parse_postfix(&mut self) -> Result<ArithExpr> {
        let primary = self.parse_primary()?;
        if let ArithExpr::Var { name, index } = &primary {
            if self.eat_op("++") {
                return Ok(ArithExpr::IncDec {
                    name: name.clone(),
                    index: index.clone(),
                    increment: true,
                    prefix: false,
                });
            }
            if self.eat_op("--") {
                return Ok(ArithExpr::IncDec {
                    name: name.clone(),
                    index: index.clone(),
                    increment: false,
                    prefix: false,
                });
            }
        }
        Ok(primary)
    }

    fn parse_primary(&mut self) -> Result<ArithExpr> {
        match self.bump() {
            Some(ArithToken::Number(n)) => Ok(ArithExpr::Number(n)),
            Some(ArithToken::Name(name, index)) => Ok(ArithExpr::Var { name, index }),
            Some(ArithToken::Op("(")) => {
                let expr = self.parse_comma()?;
                if !self.eat_op(")") {
                    return Err(Error::parse("arithmetic: expected `)`", self.line));
                }
                Ok(expr)
            }
            Some(tok) => Err(self.unexpected(&tok)),
            None => Err(Error::parse(
                "arithmetic: unexpected end of expression",
                self.line,
            )),
        }
    }
}

/// Operator spellings ordered longest-first for maximal munch.
const OPERATORS: &[&str] = &[
    "<<=", ">>=", "**=", "<<", ">>", "**", "<=", ">=", "==", "!=", "&&", "||", "++", "--", "+=",
    "-=", "*=", "/=", "%=", "&=", "^=", "|=", "+", "-", "*", "/", "%", "<", ">", "&", "|", "^",
    "!", "~", "?", ":", ",", "=", "(", ")",
];

fn tokenize(text: &str, line: usize) -> Result<Vec<ArithToken>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '#') {
                i += 1;
            }
            // `N#...` literals may continue with @ and _ digits.
            if i < chars.len() && chars[start..i].contains(&'#') {
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '@' || chars[i] == '_')
                {
                    i += 1;
                }
            }
            let lexeme: String = chars[start..i].iter().collect();
            tokens.push(ArithToken::Number(parse_number(&lexeme, line)?));
            continue;
        }

        if c == '_' || c.is_ascii_alphabetic() || c == '$' {
            let dollar = c == '$';
            if dollar {
                i += 1;
                // ${name} inside static arithmetic: strip the braces.
                if i < chars.len() && chars[i] == '{' {
                    let mut j = i + 1;
                    let mut name = String::new();
                    while j < chars.len() && chars[j] != '}' {
                        name.push(chars[j]);
                        j += 1;
                    }
                    if j >= chars.len() {
                        return Err(Error::parse("arithmetic: unterminated ${", line));
                    }
                    i = j + 1;
                    tokens.push(ArithToken::Name(name, None));
                    continue;
                }
                // Special parameters read as plain names here.
                if i < chars.len() && matches!(chars[i], '?' | '#' | '$' | '!') {
                    tokens.push(ArithToken::Name(chars[i].to_string(), None));
                    i += 1;
                    continue;
                }
            }
            let start = i;
            while i < chars.len() && (chars[i] == '_' || chars[i].is_ascii_alphanumeric()) {
                i += 1;
            }
            if start == i {
                return Err(Error::parse("arithmetic: bad `$` reference", line));
            }
            let name: String = chars[start..i].iter().collect();
            let mut index = None;
            if i < chars.len() && chars[i] == '[' {
                let mut depth = 1usize;
                let mut sub = String::new();
                i += 1;
                while i < chars.len() {
                    match chars[i] {
                        '[' => depth += 1,
                        ']' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    sub.push(chars[i]);
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(Error::parse("arithmetic: unterminated subscript", line));
                }
                i += 1; // closing ]
                index = Some(sub);
            }
            tokens.push(ArithToken::Name(name, index));
            continue;
        }

        let rest: String = chars[i..].iter().collect();
        let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) else {
            return Err(Error::parse(
                format!("arithmetic: unexpected character `{c}`"),
                line,
            ));
        };
        tokens.push(ArithToken::Op(*op));
        i += op.chars().count();
    }

    Ok(tokens)
}

/// Parse an integer literal: `0x` hex, leading-`0` octal, `base#digits`
/// (base 2..=64), else decimal.
pub fn parse_number(lexeme: &str, line: usize) -> Result<i64> {
    let bad = || Error::parse(format!("arithmetic: invalid number `{lexeme}`"), line);

    if let Some(hex) = lexeme.strip_prefix("0x").or_else(|| lexeme.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).map_err(|_| bad());
    }
    if let Some((base, digits)) = lexeme.split_once('#') {
        let base: u32 = base.parse().map_err(|_| bad())?;
        if !(2..=64).contains(&base) {
            return Err(bad());
        }
        let mut value: i64 = 0;
        for c in digits.chars() {
            let digit = match c {
                '0'..='9' => c as i64 - '0' as i64,
                'a'..='z' => c as i64 - 'a' as i64 + 10,
                'A'..='Z' => c as i64 - 'A' as i64 + 36,
                '@' => 62,
                '_' => 63,
                _ => return Err(bad()),
            };
            // In bases up to 36, letters are case-insensitive.
            let digit = if base <= 36 && (10..36).contains(&digit) {
                digit
            } else if base <= 36 && (36..62).contains(&digit) {
                digit - 26
            } else {
                digit
            };
            if digit >= base as i64 {
                return Err(bad());
            }
            value = value.wrapping_mul(base as i64).wrapping_add(digit);
        }
        if digits.is_empty() {
            return Err(bad());
        }
        return Ok(value);
    }
    if lexeme.len() > 1 && lexeme.starts_with('0') {
        return i64::from_str_radix(&lexeme[1..], 8).map_err(|_| bad());
    }
    lexeme.parse().map_err(|_| bad())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ArithExpr {
        parse_arith(text, 1).unwrap()
    }

    #[test]
    fn numbers_in_all_bases() {
        assert_eq!(parse_number("42", 1).unwrap(), 42);
        assert_eq!(parse_number("0x1f", 1).unwrap(), 31);
        assert_eq!(parse_number("010", 1).unwrap(), 8);
        assert_eq!(parse_number("2#101", 1).unwrap(), 5);
        assert_eq!(parse_number("16#ff", 1).unwrap(), 255);
        assert_eq!(parse_number("64#@", 1).unwrap(), 62);
        assert!(parse_number("2#9", 1).is_err());
        assert!(parse_number("1#0", 1).is_err());
    }

    #[test]
    fn precedence_mul_over_add() {
        let expr = parse("1 + 2 * 3");
        let ArithExpr::Binary { op, rhs, .. } = expr else {
            panic!("expected binary");
        };
        assert_eq!(op, ArithBinaryOp::Add);
        assert!(matches!(
            *rhs,
            ArithExpr::Binary {
                op: ArithBinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn power_is_right_associative() {
        let expr = parse("2 ** 3 ** 2");
        let ArithExpr::Binary { op, rhs, .. } = expr else {
            panic!("expected binary");
        };
        assert_eq!(op, ArithBinaryOp::Pow);
        assert!(matches!(
            *rhs,
            ArithExpr::Binary {
                op: ArithBinaryOp::Pow,
                ..
            }
        ));
    }

    #[test]
    fn assignment_builds_assign_node() {
        let expr = parse("x += 2");
        assert!(matches!(
            expr,
            ArithExpr::Assign {
                op: ArithAssignOp::Add,
                ..
            }
        ));
    }

    #[test]
    fn assignment_to_literal_is_an_error() {
        assert!(parse_arith("1 = 2", 1).is_err());
    }

    #[test]
    fn ternary_and_comma() {
        assert!(matches!(parse("a ? 1 : 2"), ArithExpr::Ternary { .. }));
        assert!(matches!(parse("1, 2"), ArithExpr::Comma(..)));
    }

    #[test]
    fn postfix_and_prefix_incdec() {
        assert!(matches!(
            parse("x++"),
            ArithExpr::IncDec {
                prefix: false,
                increment: true,
                ..
            }
        ));
        assert!(matches!(
            parse("--x"),
            ArithExpr::IncDec {
                prefix: true,
                increment: false,
                ..
            }
        ));
    }

    #[test]
    fn array_subscript_stays_raw() {
        let expr = parse("a[i+1] + 1");
        let ArithExpr::Binary { lhs, .. } = expr else {
            panic!("expected binary");
        };
        assert_eq!(
            *lhs,
            ArithExpr::Var {
                name: "a".into(),
                index: Some("i+1".into())
            }
        );
    }

    #[test]
    fn dollar_names_allowed() {
        assert_eq!(
            parse("$x + 1"),
            ArithExpr::Binary {
                op: ArithBinaryOp::Add,
                lhs: Box::new(ArithExpr::Var {
                    name: "x".into(),
                    index: None
                }),
                rhs: Box::new(ArithExpr::Number(1)),
            }
        );
    }

    #[test]
    fn empty_expression_is_zero() {
        assert_eq!(parse(""), ArithExpr::Number(0));
        assert_eq!(parse("  "), ArithExpr::Number(0));
    }

    #[test]
    fn dynamic_sources_defer_parsing() {
        let src = parse_arith_source("$(echo 1) + 1", 1).unwrap();
        assert!(src.parsed.is_none());

        let src = parse_arith_source("1 + 2", 1).unwrap();
        assert!(src.parsed.is_some());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(parse_arith("1 +* 2", 1).is_err());
        assert!(parse_arith("(1", 1).is_err());
    }
}
