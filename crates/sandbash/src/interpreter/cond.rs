//! `[[ ]]` conditional evaluation
//!
//! Operands expand without splitting or globbing; the right side of `==`,
//! `!=`, and pattern contexts keeps quoting information so quoted text
//! matches literally. File tests go through the virtual filesystem.

use regex::RegexBuilder;
use std::collections::BTreeMap;

use super::expand::{ExpandError, ExpandResult};
use super::state::{AssignMode, Value};
use super::{BoxFuture, Interpreter};
use crate::parser::ast::{CondExpr, CondOp};
use crate::pattern::pattern_matches;

impl Interpreter {
    /// Evaluate a conditional expression to a boolean.
    pub(crate) fn eval_cond<'a>(
        &'a mut self,
        expr: &'a CondExpr,
    ) -> BoxFuture<'a, ExpandResult<bool>> {
        Box::pin(async move {
            match expr {
                CondExpr::Not(inner) => Ok(!self.eval_cond(inner).await?),
                CondExpr::And(lhs, rhs) => {
                    // Short-circuit: the right side must not expand.
                    if !self.eval_cond(lhs).await? {
                        return Ok(false);
                    }
                    self.eval_cond(rhs).await
                }
                CondExpr::Or(lhs, rhs) => {
                    if self.eval_cond(lhs).await? {
                        return Ok(true);
                    }
                    self.eval_cond(rhs).await
                }
                CondExpr::Word(word) => {
                    let value = self.expand_word_single(word).await?;
                    Ok(!value.is_empty())
                }
                CondExpr::Unary { op, operand } => {
                    let value = self.expand_word_single(operand).await?;
                    self.eval_unary_test(*op, &value).await
                }
                CondExpr::Binary { op, lhs, rhs } => self.eval_binary_test(*op, lhs, rhs).await,
            }
        })
    }

    async fn eval_unary_test(&mut self, op: char, operand: &str) -> ExpandResult<bool> {
        // String and shell-state tests need no filesystem.
        match op {
            'z' => return Ok(operand.is_empty()),
            'n' => return Ok(!operand.is_empty()),
            'o' => {
                if operand.chars().count() == 1 {
                    let letter = operand.chars().next().unwrap_or(' ');
                    return Ok(self.state.options.flag_letters().contains(letter));
                }
                return Ok(self
                    .state
                    .options
                    .set_o_listing()
                    .iter()
                    .find(|(name, _)| *name == operand)
                    .map(|(_, on)| *on)
                    .unwrap_or(false));
            }
            'v' => {
                // Accepts subscripted references like a[2].
                if let Some(open) = operand.find('[') {
                    if let Some(raw) = operand[open + 1..].strip_suffix(']') {
                        let name = operand[..open].to_string();
                        let key = self.eval_subscript(&name, raw).await?;
                        return Ok(
                            super::expand::param::read_element(self, &name, &key).is_some()
                        );
                    }
                }
                return Ok(self.state.is_set(operand));
            }
            't' => return Ok(false),
            _ => {}
        }

        let path = self.resolve_path(operand);
        let stat = self.fs.stat(&path).await.ok();
        let lstat = self.fs.lstat(&path).await.ok();

        Ok(match op {
            'a' | 'e' => stat.is_some(),
            'f' => stat.map(|m| m.file_type.is_file()).unwrap_or(false),
            'd' => stat.map(|m| m.file_type.is_dir()).unwrap_or(false),
            'L' | 'h' => lstat.map(|m| m.file_type.is_symlink()).unwrap_or(false),
            's' => stat.map(|m| m.size > 0).unwrap_or(false),
            'r' => stat.map(|m| m.mode & 0o444 != 0).unwrap_or(false),
            'w' => stat.map(|m| m.mode & 0o222 != 0).unwrap_or(false),
            'x' => stat.map(|m| m.mode & 0o111 != 0).unwrap_or(false),
            'u' => stat.map(|m| m.mode & 0o4000 != 0).unwrap_or(false),
            'g' => stat.map(|m| m.mode & 0o2000 != 0).unwrap_or(false),
            'k' => stat.map(|m| m.mode & 0o1000 != 0).unwrap_or(false),
            // No devices, fifos, sockets, or read-tracking in this world.
            'b' | 'c' | 'p' | 'S' | 'N' | 'G' | 'O' => false,
            _ => false,
        })
    }

    async fn eval_binary_test(
        &mut self,
        op: CondOp,
        lhs: &crate::parser::ast::Word,
        rhs: &crate::parser::ast::Word,
    ) -> ExpandResult<bool> {
        match op {
            CondOp::Eq | CondOp::Ne => {
                let left = self.expand_word_single(lhs).await?;
                let pattern = self.expand_word_pattern(rhs).await?;
                let matched = pattern_matches(&pattern, &left, self.match_options());
                Ok(if op == CondOp::Eq { matched } else { !matched })
            }
            CondOp::Match => {
                let left = self.expand_word_single(lhs).await?;
                let pattern = self.expand_word_pattern(rhs).await?;
                self.regex_match(&left, &pattern)
            }
            CondOp::StrLt | CondOp::StrGt => {
                let left = self.expand_word_single(lhs).await?;
                let right = self.expand_word_single(rhs).await?;
                Ok(if op == CondOp::StrLt {
                    left < right
                } else {
                    left > right
                })
            }
            CondOp::NumEq
            | CondOp::NumNe
            | CondOp::NumLt
            | CondOp::NumLe
            | CondOp::NumGt
            | CondOp::NumGe => {
                let left_text = self.expand_word_single(lhs).await?;
                let right_text = self.expand_word_single(rhs).await?;
                let a = self.eval_arith_text(&left_text).await?;
                let b = self.eval_arith_text(&right_text).await?;
                Ok(match op {
                    CondOp::NumEq => a == b,
                    CondOp::NumNe => a != b,
                    CondOp::NumLt => a < b,
                    CondOp::NumLe => a <= b,
                    CondOp::NumGt => a > b,
                    _ => a >= b,
                })
            }
            CondOp::NewerThan | CondOp::OlderThan | CondOp::SameFile => {
                let left = self.expand_word_single(lhs).await?;
                let right = self.expand_word_single(rhs).await?;
                let a = self.fs.stat(&self.resolve_path(&left)).await.ok();
                let b = self.fs.stat(&self.resolve_path(&right)).await.ok();
                Ok(match op {
                    CondOp::NewerThan => match (a, b) {
                        (Some(a), Some(b)) => a.mtime > b.mtime,
                        (Some(_), None) => true,
                        _ => false,
                    },
                    CondOp::OlderThan => match (a, b) {
                        (Some(a), Some(b)) => a.mtime < b.mtime,
                        (None, Some(_)) => true,
                        _ => false,
                    },
                    _ => {
                        let ra = self.fs.realpath(&self.resolve_path(&left)).await.ok();
                        let rb = self.fs.realpath(&self.resolve_path(&right)).await.ok();
                        matches!((ra, rb), (Some(x), Some(y)) if x == y)
                    }
                })
            }
        }
    }

    /// `=~`: extended regex match, capture groups into BASH_REMATCH.
    fn regex_match(&mut self, text: &str, pattern: &str) -> ExpandResult<bool> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(self.state.options.shopt.nocasematch)
            .build()
            .map_err(|e| ExpandError::soft(format!("invalid regex: {e}"), 2))?;

        match regex.captures(text) {
            Some(captures) => {
                let mut rematch = BTreeMap::new();
                for (i, group) in captures.iter().enumerate() {
                    if let Some(m) = group {
                        rematch.insert(i as i64, m.as_str().to_string());
                    }
                }
                self.state
                    .set_array("BASH_REMATCH", Value::Indexed(rematch), AssignMode::default())
                    .ok();
                Ok(true)
            }
            None => {
                self.state
                    .set_array(
                        "BASH_REMATCH",
                        Value::Indexed(BTreeMap::new()),
                        AssignMode::default(),
                    )
                    .ok();
                Ok(false)
            }
        }
    }
}
