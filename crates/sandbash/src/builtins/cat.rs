//! cat builtin command

use async_trait::async_trait;

use super::{Builtin, Context};
use crate::error::Result;
use crate::interpreter::ExecResult;

/// Concatenate files (or stdin) to stdout; `-n` numbers output lines.
pub struct Cat;

#[async_trait]
impl Builtin for Cat {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let mut number_lines = false;
        let mut operands: Vec<&str> = Vec::new();
        for arg in ctx.args {
            match arg.as_str() {
                "-n" => number_lines = true,
                "-" => operands.push("-"),
                other => operands.push(other),
            }
        }

        let mut content = String::new();
        let mut result = ExecResult::default();

        if operands.is_empty() {
            content.push_str(ctx.stdin);
        } else {
            for operand in operands {
                if operand == "-" {
                    content.push_str(ctx.stdin);
                    continue;
                }
                match ctx.fs.read_file(&ctx.resolve(operand)).await {
                    Ok(bytes) => content.push_str(&String::from_utf8_lossy(&bytes)),
                    Err(err) => {
                        let message = err.to_string();
                        let message = message.strip_prefix("io error: ").unwrap_or(&message);
                        result.stderr.push_str(&format!("cat: {message}\n"));
                        result.exit_code = 1;
                    }
                }
            }
        }

        if number_lines {
            let mut numbered = String::new();
            for (i, line) in content.lines().enumerate() {
                numbered.push_str(&format!("{:>6}\t{line}\n", i + 1));
            }
            result.stdout = numbered;
        } else {
            result.stdout = content;
        }
        Ok(result)
    }

    fn wants_stdin(&self) -> bool {
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::builtins::tests_support::{run, run_with_fs};
    use crate::fs::{FileSystem, MemFs, WriteOptions};
    use std::path::Path;
    use std::sync::Arc;

    #[tokio::test]
    async fn passes_stdin_through() {
        let result = run(&Cat, &[], "line one\nline two\n").await;
        assert_eq!(result.stdout, "line one\nline two\n");
    }

    #[tokio::test]
    async fn reads_files_in_order() {
        let fs = Arc::new(MemFs::new());
        fs.write_file(Path::new("/tmp/a"), b"first\n", WriteOptions::truncate())
            .await
            .unwrap();
        fs.write_file(Path::new("/tmp/b"), b"second\n", WriteOptions::truncate())
            .await
            .unwrap();
        let result = run_with_fs(&Cat, &["/tmp/a", "/tmp/b"], "", fs).await;
        assert_eq!(result.stdout, "first\nsecond\n");
    }

    #[tokio::test]
    async fn missing_file_reports_and_fails() {
        let result = run(&Cat, &["/nope"], "").await;
        assert_eq!(result.exit_code, 1);
        assert!(result.stderr.contains("No such file"));
    }

    #[tokio::test]
    async fn numbers_lines() {
        let result = run(&Cat, &["-n"], "a\nb\n").await;
        assert_eq!(result.stdout, "     1\ta\n     2\tb\n");
    }
}
