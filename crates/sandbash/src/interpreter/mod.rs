//! Interpreter for executing parsed scripts
//!
//! The executor walks the AST and returns captured output from every level;
//! callers concatenate child output into their own buffers, which is what
//! gives subshells and command substitutions their private streams.

mod arith;
mod compound;
mod cond;
mod exec;
pub(crate) mod expand;
mod functions;
pub mod options;
mod redirect;
mod special;
pub mod state;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::builtins::CommandRegistry;
use crate::error::{normalize_status, Error, Result};
use crate::fs::FileSystem;
use crate::limits::{ExecutionCounters, ExecutionLimits};
use crate::network::NetworkAdapter;
use crate::parser::ast::Script;
use crate::parser::Parser;

pub use state::ShellState;

/// Boxed future used to break async recursion cycles in the executor and
/// the expansion pipeline.
pub(crate) type BoxFuture<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Control flow signals carried up the executor stack as values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlFlow {
    #[default]
    None,
    /// Break out of `n` enclosing loops.
    Break(u32),
    /// Continue the `n`th enclosing loop.
    Continue(u32),
    /// Return from the current function (or sourced script).
    Return(i32),
    /// Unwind the whole invocation.
    Exit(i32),
}

/// Result of executing a command, statement, or script.
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Exit status in 0..=255.
    pub exit_code: i32,
    /// Pending control-flow signal, consumed by loops and functions.
    pub control_flow: ControlFlow,
}

impl ExecResult {
    /// Successful result with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    /// Failed result with a message on stderr.
    pub fn err(stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stderr: stderr.into(),
            exit_code,
            ..Self::default()
        }
    }

    /// Result with stdout and an explicit exit code.
    pub fn with_code(stdout: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            exit_code,
            ..Self::default()
        }
    }

    /// Result carrying only a control-flow signal.
    pub fn flow(control_flow: ControlFlow, exit_code: i32) -> Self {
        Self {
            exit_code,
            control_flow,
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Append a child's streams onto this result.
    pub(crate) fn absorb_output(&mut self, child: &ExecResult) {
        self.stdout.push_str(&child.stdout);
        self.stderr.push_str(&child.stderr);
    }
}

/// A `>(cmd)` whose body runs once the surrounding command finishes.
pub(crate) struct PendingOutProc {
    pub path: PathBuf,
    pub script: Script,
}

/// The interpreter: owns the state, the filesystem handle, the command
/// registry, and the resource counters for one invocation.
pub struct Interpreter {
    pub(crate) state: ShellState,
    pub(crate) fs: Arc<dyn FileSystem>,
    pub(crate) registry: CommandRegistry,
    pub(crate) net: Option<Arc<dyn NetworkAdapter>>,
    pub(crate) limits: ExecutionLimits,
    pub(crate) counters: ExecutionCounters,
    /// Exit status of the most recent command substitution, consulted when
    /// a command turns out to be assignments-only.
    pub(crate) cmd_sub_status: Option<i32>,
    /// Stderr produced inside expansions (command substitutions), routed
    /// into the surrounding command's stderr.
    pub(crate) expand_stderr: String,
    /// Stack of stdin buffers; commands consume from the top. Pipelines
    /// and `< file` redirections push here.
    pub(crate) stdin_stack: Vec<String>,
    /// Next `/dev/fd/N` slot for process substitution.
    pub(crate) proc_sub_counter: u32,
    /// Output process substitutions awaiting the end of the current command.
    pub(crate) pending_out_procs: Vec<PendingOutProc>,
}

impl Interpreter {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        registry: CommandRegistry,
        net: Option<Arc<dyn NetworkAdapter>>,
        limits: ExecutionLimits,
    ) -> Self {
        let counters = ExecutionCounters::start(&limits);
        Self {
            state: ShellState::new(),
            fs,
            registry,
            net,
            limits,
            counters,
            cmd_sub_status: None,
            expand_stderr: String::new(),
            stdin_stack: Vec::new(),
            proc_sub_counter: 0,
            pending_out_procs: Vec::new(),
        }
    }

    /// Current stdin buffer; empty when nothing was redirected or piped.
    pub(crate) fn stdin_mut(&mut self) -> &mut String {
        if self.stdin_stack.is_empty() {
            self.stdin_stack.push(String::new());
        }
        let top = self.stdin_stack.len() - 1;
        &mut self.stdin_stack[top]
    }

    pub fn state(&self) -> &ShellState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ShellState {
        &mut self.state
    }

    /// Run a whole invocation: execute, fire the EXIT trap, fold fatal
    /// errors into a diagnostic result.
    pub async fn run(&mut self, script: &Script) -> Result<ExecResult> {
        self.counters = ExecutionCounters::start(&self.limits);
        let mut result = match self.execute_script(script).await {
            Ok(result) => result,
            Err(err) => self.fatal_result(err)?,
        };

        // exit / return / errexit unwinds land here with their status.
        match result.control_flow {
            ControlFlow::Exit(code) | ControlFlow::Return(code) => {
                result.exit_code = code;
            }
            _ => {}
        }
        result.control_flow = ControlFlow::None;

        if let Some(trap) = self.state.traps.get("EXIT").cloned() {
            self.state.traps.remove("EXIT");
            let saved_status = result.exit_code;
            self.state.last_status = saved_status;
            match self.run_trap_body(&trap).await {
                Ok(trap_result) => {
                    result.absorb_output(&trap_result);
                }
                Err(err) => {
                    let diag = self.fatal_result(err)?;
                    result.absorb_output(&diag);
                }
            }
            result.exit_code = saved_status;
        }

        result.exit_code = normalize_status(result.exit_code as i64);
        Ok(result)
    }

    /// Convert an abort-class error into the diagnostic result the caller
    /// sees; host faults keep propagating.
    fn fatal_result(&self, err: Error) -> Result<ExecResult> {
        match &err {
            Error::Parse { .. } | Error::Limit(_) => Ok(ExecResult::err(
                format!("{}: {}\n", self.state.script_name, err),
                err.exit_status(),
            )),
            _ => Err(err),
        }
    }

    /// Parse and execute trap text in the current shell context.
    pub(crate) async fn run_trap_body(&mut self, body: &str) -> Result<ExecResult> {
        let script = Parser::new(body)
            .parse()
            .map_err(|e| Error::Execution(format!("trap: {e}")))?;
        self.execute_script(&script).await
    }

    /// Resolve a path against the current working directory.
    pub(crate) fn resolve_path(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.state.cwd.join(p)
        }
    }

    /// Exported variables as an environment map for commands.
    pub(crate) fn environment(&self) -> HashMap<String, String> {
        self.state.environment()
    }

    /// Pattern-matching options reflecting the current shell flags.
    pub(crate) fn match_options(&self) -> crate::pattern::MatchOptions {
        crate::pattern::MatchOptions {
            extglob: self.state.options.shopt.extglob,
            casefold: self.state.options.shopt.nocasematch,
        }
    }
}
