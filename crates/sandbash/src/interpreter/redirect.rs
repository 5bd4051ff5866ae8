//! Redirection handling
//!
//! Redirections are applied against captured streams and the virtual
//! filesystem. A plan is computed before the command runs (targets
//! expanded, input read, an fd table built in operator order) and applied
//! to the command's captured output afterwards.

use std::path::PathBuf;

use super::expand::{ExpandError, ExpandResult};
use super::{ExecResult, Interpreter};
use crate::fs::WriteOptions;
use crate::parser::ast::{Redirect, RedirOp, RedirTarget};
use crate::parser::word::parse_expansion_text;

/// Where a captured stream ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Dest {
    /// Parent's stdout capture.
    Stdout,
    /// Parent's stderr capture.
    Stderr,
    File {
        path: PathBuf,
        append: bool,
    },
    /// `>&-`: discarded.
    Closed,
}

/// Computed redirections for one command.
#[derive(Debug, Clone)]
pub(crate) struct RedirPlan {
    /// Replacement stdin, when `<`, `<<`, or `<<<` appeared.
    pub stdin: Option<String>,
    pub fd1: Dest,
    pub fd2: Dest,
    /// Targets of redirections on fds above 2: the file side effect is
    /// honored even though no captured stream feeds them.
    pub side_files: Vec<(PathBuf, bool)>,
}

impl Default for RedirPlan {
    fn default() -> Self {
        Self {
            stdin: None,
            fd1: Dest::Stdout,
            fd2: Dest::Stderr,
            side_files: Vec::new(),
        }
    }
}

impl RedirPlan {
    pub fn is_default(&self) -> bool {
        self.stdin.is_none()
            && self.fd1 == Dest::Stdout
            && self.fd2 == Dest::Stderr
            && self.side_files.is_empty()
    }
}

impl Interpreter {
    /// Expand targets and build the plan, honoring operator order (so
    /// `> f 2>&1` and `2>&1 > f` differ, as they must).
    pub(crate) async fn prepare_redirects(
        &mut self,
        redirects: &[Redirect],
    ) -> ExpandResult<RedirPlan> {
        let mut plan = RedirPlan::default();

        for redirect in redirects {
            match (&redirect.op, &redirect.target) {
                (RedirOp::HereDoc, RedirTarget::HereDoc(heredoc)) => {
                    let body = if heredoc.expand {
                        let word = parse_expansion_text(&heredoc.body, self.state.line)
                            .map_err(|e| ExpandError::soft(e.to_string(), 1))?;
                        self.expand_word_single(&word).await?
                    } else {
                        heredoc.body.clone()
                    };
                    plan.stdin = Some(body);
                }
                (RedirOp::HereString, RedirTarget::Word(word)) => {
                    let mut text = self.expand_word_single(word).await?;
                    text.push('\n');
                    plan.stdin = Some(text);
                }
                (op, RedirTarget::Word(word)) => {
                    let target = self.expand_redirect_target(word).await?;
                    self.plan_one(&mut plan, redirect.fd, *op, &target).await?;
                }
                _ => {}
            }
        }
        Ok(plan)
    }

    /// A redirection target must expand to exactly one field.
    async fn expand_redirect_target(
        &mut self,
        word: &crate::parser::ast::Word,
    ) -> ExpandResult<String> {
        let fields = self.expand_words(std::slice::from_ref(word)).await?;
        match fields.len() {
            1 => Ok(fields.into_iter().next().unwrap_or_default()),
            _ => Err(ExpandError::soft(
                format!("{word}: ambiguous redirect"),
                1,
            )),
        }
    }

    async fn plan_one(
        &mut self,
        plan: &mut RedirPlan,
        fd: Option<i32>,
        op: RedirOp,
        target: &str,
    ) -> ExpandResult<()> {
        match op {
            RedirOp::In => {
                let path = self.resolve_path(target);
                let bytes = self.fs.read_file(&path).await.map_err(|e| {
                    ExpandError::soft(strip_prefix_error(&e.to_string()), 1)
                })?;
                plan.stdin = Some(String::from_utf8_lossy(&bytes).into_owned());
            }
            RedirOp::ReadWrite => {
                let path = self.resolve_path(target);
                let bytes = self.fs.read_file(&path).await.unwrap_or_default();
                if self.fs.exists(&path).await.unwrap_or(false) {
                    plan.stdin = Some(String::from_utf8_lossy(&bytes).into_owned());
                } else {
                    self.fs
                        .write_file(&path, b"", WriteOptions::truncate())
                        .await
                        .map_err(|e| ExpandError::soft(e.to_string(), 1))?;
                    plan.stdin = Some(String::new());
                }
            }
            RedirOp::Out | RedirOp::Clobber | RedirOp::Append => {
                let path = self.resolve_path(target);
                if op == RedirOp::Out && self.state.options.set.noclobber {
                    let exists_regular = self
                        .fs
                        .stat(&path)
                        .await
                        .map(|m| m.file_type.is_file())
                        .unwrap_or(false);
                    if exists_regular {
                        return Err(ExpandError::soft(
                            format!("{target}: cannot overwrite existing file"),
                            1,
                        ));
                    }
                }
                let dest = Dest::File {
                    path,
                    append: op == RedirOp::Append,
                };
                set_fd(plan, fd.unwrap_or(1), dest);
            }
            RedirOp::BothOut | RedirOp::BothAppend => {
                let path = self.resolve_path(target);
                let append = op == RedirOp::BothAppend;
                plan.fd1 = Dest::File {
                    path: path.clone(),
                    append,
                };
                plan.fd2 = Dest::File { path, append };
            }
            RedirOp::DupOut => {
                let source_fd = fd.unwrap_or(1);
                match target {
                    "-" => set_fd(plan, source_fd, Dest::Closed),
                    "1" => {
                        let dest = plan.fd1.clone();
                        set_fd(plan, source_fd, dest);
                    }
                    "2" => {
                        let dest = plan.fd2.clone();
                        set_fd(plan, source_fd, dest);
                    }
                    digits if digits.chars().all(|c| c.is_ascii_digit()) => {
                        set_fd(plan, source_fd, Dest::Closed);
                    }
                    // `>& file` with no fd sends both streams to the file.
                    file => {
                        if fd.is_none() {
                            let path = self.resolve_path(file);
                            plan.fd1 = Dest::File {
                                path: path.clone(),
                                append: false,
                            };
                            plan.fd2 = Dest::File {
                                path,
                                append: false,
                            };
                        } else {
                            let path = self.resolve_path(file);
                            set_fd(
                                plan,
                                source_fd,
                                Dest::File {
                                    path,
                                    append: false,
                                },
                            );
                        }
                    }
                }
            }
            RedirOp::DupIn => {
                if target == "-" {
                    plan.stdin = Some(String::new());
                }
                // Duplicating numbered input fds has no meaning over
                // captured buffers; the redirection is accepted and inert.
            }
            RedirOp::HereDoc | RedirOp::HereString => {}
        }
        Ok(())
    }

    /// Route a finished command's streams through the plan.
    pub(crate) async fn apply_redirects(
        &mut self,
        plan: &RedirPlan,
        result: ExecResult,
    ) -> ExpandResult<ExecResult> {
        if plan.is_default() {
            return Ok(result);
        }

        let mut routed = ExecResult {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: result.exit_code,
            control_flow: result.control_flow,
        };
        // Writes to the same file merge in fd order instead of clobbering
        // each other.
        let mut writes: Vec<(PathBuf, bool, String)> = Vec::new();

        for (content, dest) in [(result.stdout, &plan.fd1), (result.stderr, &plan.fd2)] {
            match dest {
                Dest::Stdout => routed.stdout.push_str(&content),
                Dest::Stderr => routed.stderr.push_str(&content),
                Dest::Closed => {}
                Dest::File { path, append } => {
                    match writes.iter_mut().find(|(p, _, _)| p == path) {
                        Some((_, _, buffer)) => buffer.push_str(&content),
                        None => writes.push((path.clone(), *append, content)),
                    }
                }
            }
        }

        for (path, append, content) in writes {
            let opts = if append {
                WriteOptions::append()
            } else {
                WriteOptions::truncate()
            };
            self.fs
                .write_file(&path, content.as_bytes(), opts)
                .await
                .map_err(|e| ExpandError::soft(e.to_string(), 1))?;
        }

        for (path, append) in &plan.side_files {
            let opts = if *append {
                WriteOptions::append()
            } else {
                WriteOptions::truncate()
            };
            // Create/truncate only; no stream content flows to fds > 2.
            if !(*append && self.fs.exists(path).await.unwrap_or(false)) {
                self.fs
                    .write_file(path, b"", opts)
                    .await
                    .map_err(|e| ExpandError::soft(e.to_string(), 1))?;
            }
        }

        Ok(routed)
    }
}

fn set_fd(plan: &mut RedirPlan, fd: i32, dest: Dest) {
    match fd {
        1 => plan.fd1 = dest,
        2 => plan.fd2 = dest,
        _ => {
            if let Dest::File { path, append } = dest {
                plan.side_files.push((path, append));
            }
        }
    }
}

/// The fs layer prefixes messages with "io error: "; shell diagnostics
/// don't carry that.
fn strip_prefix_error(message: &str) -> String {
    message
        .strip_prefix("io error: ")
        .unwrap_or(message)
        .to_string()
}
