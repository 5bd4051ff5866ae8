//! Word expansion pipeline
//!
//! Fixed order per word: brace expansion, tilde expansion, parameter /
//! arithmetic / command substitution, field splitting, pathname expansion,
//! quote removal. Quoting classification travels with every piece so the
//! later stages know what they may touch.

pub mod brace;
pub mod glob;
pub mod param;
pub mod split;
pub mod tilde;

use crate::error::Error;
use crate::interpreter::{ControlFlow, ExecResult, Interpreter};
use crate::parser::ast::{Script, Word, WordPart};
use crate::pattern::{escape_pattern, has_glob_chars};

use self::param::ParamValue;
use self::split::split_ifs;

/// Errors surfaced during expansion.
#[derive(Debug)]
pub enum ExpandError {
    /// A shell-level failure: message for stderr, a status, and whether the
    /// whole invocation unwinds (`nounset`, `${x:?}`) or just this command.
    Shell {
        message: String,
        status: i32,
        abort: bool,
    },
    /// Host/limit faults that always propagate.
    Fatal(Error),
}

impl From<Error> for ExpandError {
    fn from(err: Error) -> Self {
        ExpandError::Fatal(err)
    }
}

pub type ExpandResult<T> = Result<T, ExpandError>;

impl ExpandError {
    pub fn soft(message: impl Into<String>, status: i32) -> Self {
        ExpandError::Shell {
            message: message.into(),
            status,
            abort: false,
        }
    }

    pub fn aborting(message: impl Into<String>, status: i32) -> Self {
        ExpandError::Shell {
            message: message.into(),
            status,
            abort: true,
        }
    }
}

/// One expanded piece of a word, before splitting.
#[derive(Debug, Clone)]
pub(crate) enum Piece {
    Text {
        text: String,
        /// Quoted text is immune to splitting and globbing.
        quoted: bool,
        /// Results of `$`-expansions are split; literal text is not.
        splittable: bool,
    },
    /// Hard field boundary (between `"$@"` elements).
    Sep,
}

/// An assembled field: the globbing pattern (quoted chars escaped) and the
/// literal text used when globbing is off or finds nothing.
#[derive(Debug, Clone, Default)]
struct Field {
    pattern: String,
    literal: String,
    exists: bool,
}

impl Interpreter {
    /// Expand words to the final argv fields (the full pipeline).
    pub(crate) async fn expand_words(&mut self, words: &[Word]) -> ExpandResult<Vec<String>> {
        let mut argv = Vec::new();
        for word in words {
            let variants = if self.state.options.set.nobraceexpand {
                vec![word.clone()]
            } else {
                brace::expand_braces(word)
            };
            for variant in variants {
                argv.extend(self.expand_variant(&variant).await?);
            }
        }
        Ok(argv)
    }

    /// Expand one brace-free word into fields.
    async fn expand_variant(&mut self, word: &Word) -> ExpandResult<Vec<String>> {
        let pieces = self.expand_parts(&word.parts, false).await?;
        let ifs = self.state.ifs();
        let fields = assemble_fields(&pieces, &ifs);

        let noglob = self.state.options.set.noglob;
        let extglob = self.state.options.shopt.extglob;
        let nullglob = self.state.options.shopt.nullglob;
        let failglob = self.state.options.shopt.failglob;

        let mut out = Vec::new();
        for field in fields {
            if !noglob && has_glob_chars(&field.pattern, extglob) {
                match glob::glob_field(self, &field.pattern).await? {
                    Some(matches) => out.extend(matches),
                    None if failglob => {
                        return Err(ExpandError::soft(
                            format!("no match: {}", field.literal),
                            1,
                        ))
                    }
                    None if nullglob => {}
                    None => out.push(field.literal),
                }
            } else {
                out.push(field.literal);
            }
        }
        Ok(out)
    }

    /// Expansion without splitting or globbing, producing exactly one
    /// string: redirection targets, case subjects, `[[ ]]` operands.
    pub(crate) async fn expand_word_single(&mut self, word: &Word) -> ExpandResult<String> {
        let pieces = self.expand_parts(&word.parts, false).await?;
        let mut out = String::new();
        let mut first = true;
        for piece in &pieces {
            match piece {
                Piece::Text { text, .. } => out.push_str(text),
                Piece::Sep => {
                    // Multi-field expansions joined with a space here.
                    if !first {
                        out.push(' ');
                    }
                }
            }
            first = false;
        }
        Ok(out)
    }

    /// Assignment-value expansion: like single-field expansion, plus tilde
    /// handling after colons.
    pub(crate) async fn expand_assignment_value(&mut self, word: &Word) -> ExpandResult<String> {
        let pieces = self.expand_parts(&word.parts, false).await?;
        let mut out = String::new();
        for piece in &pieces {
            match piece {
                Piece::Text {
                    text,
                    quoted: false,
                    splittable: false,
                } if text.contains(":~") => {
                    // Tilde after a colon expands in assignment context.
                    let expanded = tilde::expand_tilde_in_assignment(&self.state, text);
                    out.push_str(&expanded);
                }
                Piece::Text { text, .. } => out.push_str(text),
                Piece::Sep => out.push(' '),
            }
        }
        Ok(out)
    }

    /// Expand a word for use as a match pattern: quoted characters are
    /// escaped so they match literally.
    pub(crate) async fn expand_word_pattern(&mut self, word: &Word) -> ExpandResult<String> {
        let pieces = self.expand_parts(&word.parts, false).await?;
        let mut out = String::new();
        for piece in &pieces {
            match piece {
                Piece::Text {
                    text, quoted: true, ..
                } => out.push_str(&escape_pattern(text)),
                Piece::Text { text, .. } => out.push_str(text),
                Piece::Sep => out.push(' '),
            }
        }
        Ok(out)
    }

    /// Expand the parts of a word into pieces.
    pub(crate) async fn expand_parts(
        &mut self,
        parts: &[WordPart],
        quoted_ctx: bool,
    ) -> ExpandResult<Vec<Piece>> {
        let mut pieces = Vec::new();
        for part in parts {
            match part {
                WordPart::DoubleQuoted(inner) => {
                    // An empty "" still produces a field.
                    if inner.is_empty() {
                        pieces.push(Piece::Text {
                            text: String::new(),
                            quoted: true,
                            splittable: false,
                        });
                    }
                    for p in inner {
                        self.expand_one_part(p, true, &mut pieces).await?;
                    }
                }
                p => self.expand_one_part(p, quoted_ctx, &mut pieces).await?,
            }
        }
        Ok(pieces)
    }

    async fn expand_one_part(
        &mut self,
        part: &WordPart,
        quoted: bool,
        pieces: &mut Vec<Piece>,
    ) -> ExpandResult<()> {
        match part {
            WordPart::Literal(text) => pieces.push(Piece::Text {
                text: text.clone(),
                quoted,
                splittable: false,
            }),
            WordPart::SingleQuoted(text) | WordPart::Escaped(text) => pieces.push(Piece::Text {
                text: text.clone(),
                quoted: true,
                splittable: false,
            }),
            WordPart::Tilde(user) => pieces.push(Piece::Text {
                text: tilde::expand_tilde(&self.state, user),
                quoted,
                splittable: false,
            }),
            WordPart::Param(exp) => {
                let value = param::expand_param(self, exp, quoted).await?;
                push_param_value(pieces, value, quoted);
            }
            WordPart::CmdSub { script, .. } => {
                let mut output = self.run_substitution(script).await?;
                while output.ends_with('\n') {
                    output.pop();
                }
                pieces.push(Piece::Text {
                    text: output,
                    quoted,
                    splittable: !quoted,
                });
            }
            WordPart::ArithSub(src) => {
                let value = self.eval_arith_source(src).await?;
                pieces.push(Piece::Text {
                    text: value.to_string(),
                    quoted,
                    splittable: !quoted,
                });
            }
            WordPart::ProcSub { output, script } => {
                let path = self.setup_proc_sub(*output, script).await?;
                pieces.push(Piece::Text {
                    text: path,
                    quoted,
                    splittable: false,
                });
            }
            WordPart::BraceGroup(_) | WordPart::BraceRange(_) => {
                // Reached when brace expansion is off or in single-field
                // contexts: braces are literal there.
                if let Some(text) = brace::brace_part_literal(part) {
                    pieces.push(Piece::Text {
                        text,
                        quoted,
                        splittable: false,
                    });
                }
            }
            WordPart::DoubleQuoted(_) => unreachable!("handled by expand_parts"),
        }
        Ok(())
    }

    /// Run a command substitution: subshell semantics, captured stdout.
    /// The child's stderr joins the surrounding command's stderr.
    pub(crate) async fn run_substitution(&mut self, script: &Script) -> ExpandResult<String> {
        self.counters.check_deadline().map_err(Error::from)?;
        let snapshot = self.state.clone();
        self.state.subshell_depth += 1;
        let outcome = self.execute_script(script).await;
        self.state = snapshot;

        let mut result = outcome?;
        // exit inside a substitution terminates only the substitution.
        if let ControlFlow::Exit(code) | ControlFlow::Return(code) = result.control_flow {
            result.exit_code = code;
        }
        self.state.last_status = result.exit_code;
        self.cmd_sub_status = Some(result.exit_code);
        self.expand_stderr.push_str(&result.stderr);
        Ok(result.stdout)
    }

    /// Materialize a process substitution and hand back its path.
    async fn setup_proc_sub(&mut self, output: bool, script: &Script) -> ExpandResult<String> {
        use crate::fs::WriteOptions;
        use std::path::PathBuf;

        self.proc_sub_counter += 1;
        let path = PathBuf::from(format!("/dev/fd/{}", 62 + self.proc_sub_counter));
        self.fs.mkdir(std::path::Path::new("/dev/fd"), true).await.ok();

        if output {
            self.fs
                .write_file(&path, b"", WriteOptions::truncate())
                .await
                .map_err(ExpandError::Fatal)?;
            self.pending_out_procs.push(super::PendingOutProc {
                path: path.clone(),
                script: script.clone(),
            });
        } else {
            let stdout = self.run_substitution(script).await?;
            self.fs
                .write_file(&path, stdout.as_bytes(), WriteOptions::truncate())
                .await
                .map_err(ExpandError::Fatal)?;
        }
        Ok(path.display().to_string())
    }

    /// Feed collected `>(cmd)` files to their commands; called after the
    /// owning command completes.
    pub(crate) async fn flush_out_procs(&mut self, into: &mut ExecResult) -> ExpandResult<()> {
        let pending = std::mem::take(&mut self.pending_out_procs);
        for proc in pending {
            let content = self.fs.read_file(&proc.path).await.unwrap_or_default();
            let stdin = String::from_utf8_lossy(&content).into_owned();
            let snapshot = self.state.clone();
            let outcome = self
                .execute_script_with_stdin(&proc.script, Some(stdin))
                .await;
            self.state = snapshot;
            let child = outcome?;
            into.absorb_output(&child);
        }
        Ok(())
    }
}

fn push_param_value(pieces: &mut Vec<Piece>, value: ParamValue, quoted: bool) {
    match value {
        ParamValue::Single(text) => pieces.push(Piece::Text {
            text,
            quoted,
            splittable: !quoted,
        }),
        ParamValue::Fields(fields) => {
            for (i, field) in fields.into_iter().enumerate() {
                if i > 0 {
                    pieces.push(Piece::Sep);
                }
                pieces.push(Piece::Text {
                    text: field,
                    quoted,
                    splittable: !quoted,
                });
            }
        }
    }
}

/// Stitch pieces into fields, splitting the splittable ones on IFS.
fn assemble_fields(pieces: &[Piece], ifs: &str) -> Vec<Field> {
    let mut fields: Vec<Field> = Vec::new();
    let mut cur = Field::default();

    let close = |fields: &mut Vec<Field>, cur: &mut Field| {
        if cur.exists {
            fields.push(std::mem::take(cur));
        } else {
            *cur = Field::default();
        }
    };

    for piece in pieces {
        match piece {
            Piece::Sep => close(&mut fields, &mut cur),
            Piece::Text {
                text,
                quoted: true,
                ..
            } => {
                cur.pattern.push_str(&escape_pattern(text));
                cur.literal.push_str(text);
                cur.exists = true;
            }
            Piece::Text {
                text,
                splittable: false,
                ..
            } => {
                cur.pattern.push_str(text);
                cur.literal.push_str(text);
                cur.exists |= !text.is_empty();
            }
            Piece::Text { text, .. } => {
                let parts = split_ifs(text, ifs);
                if parts.leading_sep {
                    close(&mut fields, &mut cur);
                }
                let count = parts.tokens.len();
                for (i, token) in parts.tokens.into_iter().enumerate() {
                    cur.pattern.push_str(&token);
                    cur.literal.push_str(&token);
                    cur.exists = true;
                    if i + 1 < count {
                        close(&mut fields, &mut cur);
                    }
                }
                if parts.trailing_sep {
                    close(&mut fields, &mut cur);
                }
            }
        }
    }
    close(&mut fields, &mut cur);
    fields
}
