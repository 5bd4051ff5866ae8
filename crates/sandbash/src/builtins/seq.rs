//! seq builtin command

use async_trait::async_trait;

use super::{Builtin, Context};
use crate::error::Result;
use crate::interpreter::ExecResult;

/// Print a sequence of numbers: `seq LAST`, `seq FIRST LAST`,
/// `seq FIRST INCREMENT LAST`. `-s` sets the separator.
pub struct Seq;

#[async_trait]
impl Builtin for Seq {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let mut separator = "\n".to_string();
        let mut operands: Vec<&String> = Vec::new();
        let mut iter = ctx.args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-s" => {
                    if let Some(sep) = iter.next() {
                        separator = sep.clone();
                    }
                }
                _ => operands.push(arg),
            }
        }

        let parse = |s: &String| s.trim().parse::<i64>();
        let (first, step, last) = match operands.as_slice() {
            [last] => match parse(last) {
                Ok(last) => (1, 1, last),
                Err(_) => return Ok(invalid(operands[0])),
            },
            [first, last] => match (parse(first), parse(last)) {
                (Ok(first), Ok(last)) => (first, 1, last),
                _ => return Ok(invalid(operands[0])),
            },
            [first, step, last] => match (parse(first), parse(step), parse(last)) {
                (Ok(first), Ok(step), Ok(last)) if step != 0 => (first, step, last),
                _ => return Ok(invalid(operands[1])),
            },
            _ => {
                return Ok(ExecResult::err(
                    "seq: usage: seq [-s sep] [first [incr]] last\n".to_string(),
                    2,
                ))
            }
        };

        let mut items = Vec::new();
        let mut current = first;
        while (step > 0 && current <= last) || (step < 0 && current >= last) {
            items.push(current.to_string());
            current = match current.checked_add(step) {
                Some(next) => next,
                None => break,
            };
        }

        let mut output = items.join(&separator);
        if !output.is_empty() {
            output.push('\n');
        }
        Ok(ExecResult::ok(output))
    }
}

fn invalid(arg: &str) -> ExecResult {
    ExecResult::err(format!("seq: invalid number: {arg}\n"), 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::tests_support::run;

    #[tokio::test]
    async fn single_operand_counts_from_one() {
        assert_eq!(run(&Seq, &["3"], "").await.stdout, "1\n2\n3\n");
    }

    #[tokio::test]
    async fn first_and_last() {
        assert_eq!(run(&Seq, &["2", "4"], "").await.stdout, "2\n3\n4\n");
    }

    #[tokio::test]
    async fn explicit_increment() {
        assert_eq!(run(&Seq, &["1", "2", "7"], "").await.stdout, "1\n3\n5\n7\n");
        assert_eq!(run(&Seq, &["5", "-2", "1"], "").await.stdout, "5\n3\n1\n");
    }

    #[tokio::test]
    async fn separator_flag() {
        assert_eq!(run(&Seq, &["-s", ",", "3"], "").await.stdout, "1,2,3\n");
    }

    #[tokio::test]
    async fn empty_range_prints_nothing() {
        assert_eq!(run(&Seq, &["3", "1", "1"], "").await.stdout, "");
        assert_eq!(run(&Seq, &["5", "4"], "").await.stdout, "");
    }

    #[tokio::test]
    async fn bad_number_fails() {
        assert_eq!(run(&Seq, &["x"], "").await.exit_code, 1);
    }
}
