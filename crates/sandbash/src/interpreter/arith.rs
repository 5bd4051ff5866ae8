//! Arithmetic evaluation
//!
//! Evaluates the arithmetic AST over 64-bit two's-complement integers
//! against the variable store. Values that need substitution first
//! (deferred sources) are expanded and re-parsed here before evaluation.

use super::expand::param::read_element;
use super::expand::{ExpandError, ExpandResult};
use super::state::{ArrayKey, AssignMode};
use super::{BoxFuture, Interpreter};
use crate::parser::arith::{parse_arith, parse_number};
use crate::parser::ast::{
    ArithAssignOp, ArithBinaryOp, ArithExpr, ArithSource, ArithUnaryOp,
};
use crate::parser::word::parse_expansion_text;

/// Bound on `x` referring to `y` referring to `z`... chains during
/// evaluation.
const EVAL_DEPTH_MAX: usize = 64;

impl Interpreter {
    /// Evaluate an arithmetic source: pre-parsed when static, expanded and
    /// re-parsed when it contained substitutions.
    pub(crate) fn eval_arith_source<'a>(
        &'a mut self,
        src: &'a ArithSource,
    ) -> BoxFuture<'a, ExpandResult<i64>> {
        Box::pin(async move {
            match &src.parsed {
                Some(expr) => self.eval_arith(expr, 0),
                None => self.eval_arith_text_inner(&src.text).await,
            }
        })
    }

    /// Expand (if needed), parse, and evaluate arithmetic text. Used for
    /// substring offsets, subscripts, and numeric `[[ ]]` operands.
    pub(crate) fn eval_arith_text<'a>(
        &'a mut self,
        text: &'a str,
    ) -> BoxFuture<'a, ExpandResult<i64>> {
        Box::pin(async move { self.eval_arith_text_inner(text).await })
    }

    async fn eval_arith_text_inner(&mut self, text: &str) -> ExpandResult<i64> {
        let line = self.state.line;
        let expanded = if text.contains('$') || text.contains('`') {
            let word = parse_expansion_text(text, line)
                .map_err(|e| ExpandError::soft(e.to_string(), 1))?;
            self.expand_word_single(&word).await?
        } else {
            text.to_string()
        };
        let expr =
            parse_arith(&expanded, line).map_err(|e| ExpandError::soft(e.to_string(), 1))?;
        self.eval_arith(&expr, 0)
    }

    /// Resolve an array subscript: associative arrays take expanded string
    /// keys, everything else evaluates arithmetically.
    pub(crate) fn eval_subscript<'a>(
        &'a mut self,
        name: &'a str,
        raw: &'a str,
    ) -> BoxFuture<'a, ExpandResult<ArrayKey>> {
        Box::pin(async move {
            let is_assoc = matches!(
                self.state.get(name),
                Some(super::state::Value::Assoc(_))
            );
            if is_assoc {
                let line = self.state.line;
                let word = parse_expansion_text(raw, line)
                    .map_err(|e| ExpandError::soft(e.to_string(), 1))?;
                let key = self.expand_word_single(&word).await?;
                Ok(ArrayKey::Key(key))
            } else {
                Ok(ArrayKey::Index(self.eval_arith_text_inner(raw).await?))
            }
        })
    }

    /// Synchronous tree evaluation. Any substitution has happened by now.
    pub(crate) fn eval_arith(&mut self, expr: &ArithExpr, depth: usize) -> ExpandResult<i64> {
        if depth > EVAL_DEPTH_MAX {
            return Err(ExpandError::soft(
                "arithmetic: expression recursion level exceeded",
                1,
            ));
        }

        match expr {
            ArithExpr::Number(n) => Ok(*n),

            ArithExpr::Var { name, index } => self.read_numeric(name, index.as_deref(), depth),

            ArithExpr::Unary { op, operand } => {
                let value = self.eval_arith(operand, depth)?;
                Ok(match op {
                    ArithUnaryOp::Neg => value.wrapping_neg(),
                    ArithUnaryOp::Pos => value,
                    ArithUnaryOp::Not => i64::from(value == 0),
                    ArithUnaryOp::BitNot => !value,
                })
            }

            ArithExpr::Binary { op, lhs, rhs } => {
                // Logical operators short-circuit; their right side may
                // carry side effects that must not run.
                match op {
                    ArithBinaryOp::LogAnd => {
                        if self.eval_arith(lhs, depth)? == 0 {
                            return Ok(0);
                        }
                        return Ok(i64::from(self.eval_arith(rhs, depth)? != 0));
                    }
                    ArithBinaryOp::LogOr => {
                        if self.eval_arith(lhs, depth)? != 0 {
                            return Ok(1);
                        }
                        return Ok(i64::from(self.eval_arith(rhs, depth)? != 0));
                    }
                    _ => {}
                }

                let a = self.eval_arith(lhs, depth)?;
                let b = self.eval_arith(rhs, depth)?;
                apply_binary(*op, a, b)
            }

            ArithExpr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                if self.eval_arith(cond, depth)? != 0 {
                    self.eval_arith(then, depth)
                } else {
                    self.eval_arith(otherwise, depth)
                }
            }

            ArithExpr::Assign {
                name,
                index,
                op,
                value,
            } => {
                let rhs = self.eval_arith(value, depth)?;
                let result = match op {
                    ArithAssignOp::Assign => rhs,
                    _ => {
                        let old = self.read_numeric(name, index.as_deref(), depth)?;
                        let binary = match op {
                            ArithAssignOp::Add => ArithBinaryOp::Add,
                            ArithAssignOp::Sub => ArithBinaryOp::Sub,
                            ArithAssignOp::Mul => ArithBinaryOp::Mul,
                            ArithAssignOp::Div => ArithBinaryOp::Div,
                            ArithAssignOp::Mod => ArithBinaryOp::Mod,
                            ArithAssignOp::Pow => ArithBinaryOp::Pow,
                            ArithAssignOp::Shl => ArithBinaryOp::Shl,
                            ArithAssignOp::Shr => ArithBinaryOp::Shr,
                            ArithAssignOp::And => ArithBinaryOp::BitAnd,
                            ArithAssignOp::Xor => ArithBinaryOp::BitXor,
                            ArithAssignOp::Or => ArithBinaryOp::BitOr,
                            ArithAssignOp::Assign => ArithBinaryOp::Add,
                        };
                        apply_binary(binary, old, rhs)?
                    }
                };
                self.store_numeric(name, index.as_deref(), result, depth)?;
                Ok(result)
            }

            ArithExpr::IncDec {
                name,
                index,
                increment,
                prefix,
            } => {
                let old = self.read_numeric(name, index.as_deref(), depth)?;
                let new = if *increment {
                    old.wrapping_add(1)
                } else {
                    old.wrapping_sub(1)
                };
                self.store_numeric(name, index.as_deref(), new, depth)?;
                Ok(if *prefix { new } else { old })
            }

            ArithExpr::Comma(lhs, rhs) => {
                self.eval_arith(lhs, depth)?;
                self.eval_arith(rhs, depth)
            }
        }
    }

    /// A variable's numeric value: unset reads as 0; non-numeric strings
    /// are themselves evaluated as expressions, with a depth guard.
    fn read_numeric(
        &mut self,
        name: &str,
        index: Option<&str>,
        depth: usize,
    ) -> ExpandResult<i64> {
        // Special parameters usable in arithmetic.
        let direct = match name {
            "?" => Some(self.state.last_status as i64),
            "#" => Some(self.state.positional.len() as i64),
            "$" => Some(4242),
            "LINENO" => Some(self.state.line as i64),
            _ => None,
        };
        if let Some(value) = direct {
            return Ok(value);
        }

        let text = match index {
            Some(raw) => {
                let key = self.subscript_key(name, raw, depth)?;
                read_element(self, name, &key).unwrap_or_default()
            }
            None => match self.state.get(name) {
                Some(value) => value.to_field(),
                None => String::new(),
            },
        };

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(0);
        }
        if let Ok(n) = parse_number(trimmed, self.state.line) {
            return Ok(n);
        }
        // Strings evaluate as expressions, the way `x=y+1; echo $((x))`
        // reaches through.
        let expr = parse_arith(trimmed, self.state.line)
            .map_err(|e| ExpandError::soft(e.to_string(), 1))?;
        self.eval_arith(&expr, depth + 1)
    }

    fn store_numeric(
        &mut self,
        name: &str,
        index: Option<&str>,
        value: i64,
        depth: usize,
    ) -> ExpandResult<()> {
        let outcome = match index {
            Some(raw) => {
                let key = self.subscript_key(name, raw, depth)?;
                self.state
                    .set_element(name, key, value.to_string(), AssignMode::default())
            }
            None => self
                .state
                .set_scalar(name, value.to_string(), AssignMode::default()),
        };
        outcome.map_err(|e| ExpandError::soft(e.message(), 1))
    }

    /// Synchronous subscript resolution inside arithmetic: substitutions
    /// were already expanded, so associative keys are literal.
    fn subscript_key(&mut self, name: &str, raw: &str, depth: usize) -> ExpandResult<ArrayKey> {
        if matches!(self.state.get(name), Some(super::state::Value::Assoc(_))) {
            return Ok(ArrayKey::Key(raw.trim().to_string()));
        }
        let expr =
            parse_arith(raw, self.state.line).map_err(|e| ExpandError::soft(e.to_string(), 1))?;
        Ok(ArrayKey::Index(self.eval_arith(&expr, depth + 1)?))
    }
}

fn apply_binary(op: ArithBinaryOp, a: i64, b: i64) -> ExpandResult<i64> {
    Ok(match op {
        ArithBinaryOp::Add => a.wrapping_add(b),
        ArithBinaryOp::Sub => a.wrapping_sub(b),
        ArithBinaryOp::Mul => a.wrapping_mul(b),
        ArithBinaryOp::Div => {
            if b == 0 {
                return Err(ExpandError::soft("division by 0", 1));
            }
            a.wrapping_div(b)
        }
        ArithBinaryOp::Mod => {
            if b == 0 {
                return Err(ExpandError::soft("division by 0", 1));
            }
            a.wrapping_rem(b)
        }
        ArithBinaryOp::Pow => {
            if b < 0 {
                return Err(ExpandError::soft("exponent less than 0", 1));
            }
            let mut result: i64 = 1;
            let mut base = a;
            let mut exp = b as u64;
            while exp > 0 {
                if exp & 1 == 1 {
                    result = result.wrapping_mul(base);
                }
                base = base.wrapping_mul(base);
                exp >>= 1;
            }
            result
        }
        ArithBinaryOp::Shl => a.wrapping_shl(b as u32),
        ArithBinaryOp::Shr => a.wrapping_shr(b as u32),
        ArithBinaryOp::Lt => i64::from(a < b),
        ArithBinaryOp::Le => i64::from(a <= b),
        ArithBinaryOp::Gt => i64::from(a > b),
        ArithBinaryOp::Ge => i64::from(a >= b),
        ArithBinaryOp::Eq => i64::from(a == b),
        ArithBinaryOp::Ne => i64::from(a != b),
        ArithBinaryOp::BitAnd => a & b,
        ArithBinaryOp::BitXor => a ^ b,
        ArithBinaryOp::BitOr => a | b,
        // Short-circuit operators never reach here.
        ArithBinaryOp::LogAnd | ArithBinaryOp::LogOr => 0,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fs::MemFs;
    use crate::limits::ExecutionLimits;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn interp() -> Interpreter {
        Interpreter::new(
            Arc::new(MemFs::new()),
            HashMap::new(),
            None,
            ExecutionLimits::default(),
        )
    }

    async fn eval(interp: &mut Interpreter, text: &str) -> i64 {
        interp.eval_arith_text(text).await.unwrap()
    }

    #[tokio::test]
    async fn basic_arithmetic() {
        let mut i = interp();
        assert_eq!(eval(&mut i, "1 + 2 * 3").await, 7);
        assert_eq!(eval(&mut i, "(1 + 2) * 3").await, 9);
        assert_eq!(eval(&mut i, "7 / 2").await, 3);
        assert_eq!(eval(&mut i, "7 % 3").await, 1);
        assert_eq!(eval(&mut i, "2 ** 10").await, 1024);
        assert_eq!(eval(&mut i, "1 << 4").await, 16);
        assert_eq!(eval(&mut i, "-7 / 2").await, -3);
    }

    #[tokio::test]
    async fn comparisons_and_logic() {
        let mut i = interp();
        assert_eq!(eval(&mut i, "3 < 5").await, 1);
        assert_eq!(eval(&mut i, "3 >= 5").await, 0);
        assert_eq!(eval(&mut i, "1 && 0").await, 0);
        assert_eq!(eval(&mut i, "1 || 0").await, 1);
        assert_eq!(eval(&mut i, "!5").await, 0);
        assert_eq!(eval(&mut i, "~0").await, -1);
    }

    #[tokio::test]
    async fn unset_variables_read_as_zero() {
        let mut i = interp();
        assert_eq!(eval(&mut i, "nothing + 1").await, 1);
    }

    #[tokio::test]
    async fn assignment_mutates_store() {
        let mut i = interp();
        assert_eq!(eval(&mut i, "x = 5").await, 5);
        assert_eq!(i.state.get("x").unwrap().to_field(), "5");
        assert_eq!(eval(&mut i, "x += 3").await, 8);
        assert_eq!(eval(&mut i, "x <<= 2").await, 32);
    }

    #[tokio::test]
    async fn increment_decrement() {
        let mut i = interp();
        eval(&mut i, "n = 10").await;
        assert_eq!(eval(&mut i, "n++").await, 10);
        assert_eq!(eval(&mut i, "n").await, 11);
        assert_eq!(eval(&mut i, "--n").await, 10);
    }

    #[tokio::test]
    async fn string_values_evaluate_recursively() {
        let mut i = interp();
        i.state
            .set_scalar("y", "2".into(), AssignMode::default())
            .unwrap();
        i.state
            .set_scalar("x", "y + 1".into(), AssignMode::default())
            .unwrap();
        assert_eq!(eval(&mut i, "x * 2").await, 6);
    }

    #[tokio::test]
    async fn recursion_guard_trips() {
        let mut i = interp();
        i.state
            .set_scalar("a", "b".into(), AssignMode::default())
            .unwrap();
        i.state
            .set_scalar("b", "a".into(), AssignMode::default())
            .unwrap();
        assert!(i.eval_arith_text("a").await.is_err());
    }

    #[tokio::test]
    async fn division_by_zero_is_an_error() {
        let mut i = interp();
        assert!(i.eval_arith_text("1 / 0").await.is_err());
        assert!(i.eval_arith_text("1 % 0").await.is_err());
        assert!(i.eval_arith_text("2 ** -1").await.is_err());
    }

    #[tokio::test]
    async fn wrapping_two_complement() {
        let mut i = interp();
        assert_eq!(
            eval(&mut i, "9223372036854775807 + 1").await,
            i64::MIN
        );
    }

    #[tokio::test]
    async fn array_elements_in_arithmetic() {
        let mut i = interp();
        i.state
            .set_element("a", ArrayKey::Index(0), "10".into(), AssignMode::default())
            .unwrap();
        i.state
            .set_element("a", ArrayKey::Index(2), "30".into(), AssignMode::default())
            .unwrap();
        assert_eq!(eval(&mut i, "a[0] + a[2]").await, 40);
        assert_eq!(eval(&mut i, "a[1 + 1]").await, 30);
        assert_eq!(eval(&mut i, "a[1]++, a[1]").await, 1);
    }

    #[tokio::test]
    async fn dollar_expansion_in_text() {
        let mut i = interp();
        i.state
            .set_scalar("n", "7".into(), AssignMode::default())
            .unwrap();
        assert_eq!(eval(&mut i, "$n + 1").await, 8);
        assert_eq!(eval(&mut i, "${n} * 2").await, 14);
    }

    #[tokio::test]
    async fn bases_in_values() {
        let mut i = interp();
        assert_eq!(eval(&mut i, "0xff").await, 255);
        assert_eq!(eval(&mut i, "010").await, 8);
        assert_eq!(eval(&mut i, "2#1010").await, 10);
    }

    #[tokio::test]
    async fn ternary_and_comma() {
        let mut i = interp();
        assert_eq!(eval(&mut i, "1 ? 10 : 20").await, 10);
        assert_eq!(eval(&mut i, "0 ? 10 : 20").await, 20);
        assert_eq!(eval(&mut i, "1 + 1, 2 + 2").await, 4);
    }

    #[tokio::test]
    async fn short_circuit_skips_side_effects() {
        let mut i = interp();
        eval(&mut i, "x = 0").await;
        assert_eq!(eval(&mut i, "0 && (x = 9)").await, 0);
        assert_eq!(eval(&mut i, "x").await, 0);
        assert_eq!(eval(&mut i, "1 || (x = 9)").await, 1);
        assert_eq!(eval(&mut i, "x").await, 0);
    }
}
