//! echo builtin command

use async_trait::async_trait;

use super::{Builtin, Context};
use crate::error::Result;
use crate::interpreter::ExecResult;
use crate::parser::word::decode_ansi_c;

/// The echo builtin command: `-n` suppresses the newline, `-e` enables
/// escape sequences, `-E` disables them again.
pub struct Echo;

#[async_trait]
impl Builtin for Echo {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let mut add_newline = true;
        let mut interpret_escapes = false;
        let mut start = 0;

        for arg in ctx.args {
            match arg.as_str() {
                "-n" => add_newline = false,
                "-e" => interpret_escapes = true,
                "-E" => interpret_escapes = false,
                // Combined flags like -ne.
                flags
                    if flags.starts_with('-')
                        && flags.len() > 1
                        && flags.chars().skip(1).all(|c| matches!(c, 'n' | 'e' | 'E')) =>
                {
                    for c in flags.chars().skip(1) {
                        match c {
                            'n' => add_newline = false,
                            'e' => interpret_escapes = true,
                            _ => interpret_escapes = false,
                        }
                    }
                }
                _ => break,
            }
            start += 1;
        }

        let mut output = String::new();
        for (i, arg) in ctx.args[start..].iter().enumerate() {
            if i > 0 {
                output.push(' ');
            }
            if interpret_escapes {
                output.push_str(&decode_ansi_c(arg));
            } else {
                output.push_str(arg);
            }
        }
        if add_newline {
            output.push('\n');
        }
        Ok(ExecResult::ok(output))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::builtins::tests_support::run;

    #[tokio::test]
    async fn plain_args_with_newline() {
        let result = run(&Echo, &["hello", "world"], "").await;
        assert_eq!(result.stdout, "hello world\n");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn dash_n_suppresses_newline() {
        let result = run(&Echo, &["-n", "x"], "").await;
        assert_eq!(result.stdout, "x");
    }

    #[tokio::test]
    async fn dash_e_decodes_escapes() {
        let result = run(&Echo, &["-e", "a\\tb"], "").await;
        assert_eq!(result.stdout, "a\tb\n");
        let result = run(&Echo, &["a\\tb"], "").await;
        assert_eq!(result.stdout, "a\\tb\n");
    }

    #[tokio::test]
    async fn combined_flags() {
        let result = run(&Echo, &["-ne", "x\\n"], "").await;
        assert_eq!(result.stdout, "x\n");
    }

    #[tokio::test]
    async fn no_args_prints_newline() {
        let result = run(&Echo, &[], "").await;
        assert_eq!(result.stdout, "\n");
    }
}
