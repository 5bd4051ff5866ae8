//! Sandbash - Sandboxed bash interpreter for agent workloads
//!
//! Scripts run hermetically: a virtual filesystem, captured output streams,
//! resource limits, and no host processes. Given the same inputs, a script
//! produces byte-identical results.
//!
//! # Example
//!
//! ```rust
//! use sandbash::Bash;
//!
//! #[tokio::main]
//! async fn main() -> sandbash::Result<()> {
//!     let mut bash = Bash::new();
//!     let result = bash.exec("echo hello").await?;
//!     assert_eq!(result.stdout, "hello\n");
//!     assert_eq!(result.exit_code, 0);
//!     Ok(())
//! }
//! ```

mod builtins;
mod error;
mod fs;
mod interpreter;
mod limits;
pub mod logging;
mod network;
mod parser;
mod pattern;

pub use builtins::{default_registry, Builtin, CommandRegistry, Context};
pub use error::{Error, Result};
pub use fs::{DirEntry, FileSystem, FileType, MemFs, Metadata, RmOptions, WriteOptions};
pub use interpreter::{ExecResult, Interpreter};
pub use limits::{ExecutionLimits, LimitExceeded};
pub use network::{
    GatedAdapter, NetRequest, NetResponse, NetworkAdapter, NetworkAllowlist, UrlMatch,
};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use interpreter::state::AssignMode;
use parser::Parser;

/// Main entry point: a sandboxed shell with persistent state across
/// `exec` calls (one instance behaves like one long-lived shell session).
pub struct Bash {
    fs: Arc<dyn FileSystem>,
    interpreter: Interpreter,
    /// Home and cwd are created on the first `exec`.
    seeded: bool,
}

impl Default for Bash {
    fn default() -> Self {
        Self::new()
    }
}

impl Bash {
    /// A shell with an in-memory filesystem and the default registry.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start configuring a shell.
    pub fn builder() -> BashBuilder {
        BashBuilder::default()
    }

    /// The filesystem this shell runs against.
    pub fn fs(&self) -> Arc<dyn FileSystem> {
        Arc::clone(&self.fs)
    }

    /// Parse and execute a script, returning captured output and status.
    ///
    /// Parse and limit failures come back as an [`ExecResult`] with exit
    /// status 2 and a diagnostic on stderr; `Err` is reserved for host
    /// faults (filesystem adapter failures and the like).
    pub async fn exec(&mut self, script: &str) -> Result<ExecResult> {
        if !self.seeded {
            self.seeded = true;
            let home = self
                .interpreter
                .state()
                .get("HOME")
                .map(|v| v.to_field())
                .unwrap_or_else(|| "/home/user".to_string());
            let cwd = self.interpreter.state().cwd.clone();
            let _ = self.fs.mkdir(Path::new(&home), true).await;
            let _ = self.fs.mkdir(&cwd, true).await;
        }

        let aliases = if self.interpreter.state().options.shopt.expand_aliases {
            self.interpreter.state().aliases.clone()
        } else {
            HashMap::new()
        };
        let ast = match Parser::with_aliases(script, aliases).parse() {
            Ok(ast) => ast,
            Err(err @ Error::Parse { .. }) => {
                return Ok(ExecResult::err(
                    format!("{}: {}\n", self.interpreter.state().script_name, err),
                    err.exit_status(),
                ));
            }
            Err(err) => return Err(err),
        };
        self.interpreter.run(&ast).await
    }
}

/// Builder for customized shells.
pub struct BashBuilder {
    fs: Option<Arc<dyn FileSystem>>,
    registry: CommandRegistry,
    net: Option<Arc<dyn NetworkAdapter>>,
    allowlist: NetworkAllowlist,
    limits: ExecutionLimits,
    env: Vec<(String, String)>,
    cwd: Option<PathBuf>,
    script_name: Option<String>,
    positional: Vec<String>,
}

impl Default for BashBuilder {
    fn default() -> Self {
        Self {
            fs: None,
            registry: default_registry(),
            net: None,
            allowlist: NetworkAllowlist::new(),
            limits: ExecutionLimits::default(),
            env: Vec::new(),
            cwd: None,
            script_name: None,
            positional: Vec::new(),
        }
    }
}

impl BashBuilder {
    /// Use a custom filesystem.
    pub fn fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    /// Add (or replace) a registry command.
    pub fn command(mut self, name: impl Into<String>, builtin: Arc<dyn Builtin>) -> Self {
        self.registry.insert(name.into(), builtin);
        self
    }

    /// Replace the whole command registry.
    pub fn registry(mut self, registry: CommandRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Attach a network adapter (gated by the allowlist).
    pub fn network(mut self, net: Arc<dyn NetworkAdapter>, allowlist: NetworkAllowlist) -> Self {
        self.net = Some(net);
        self.allowlist = allowlist;
        self
    }

    /// Set execution limits.
    pub fn limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Pre-set an exported variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the initial working directory (created if missing).
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Set `$0`.
    pub fn script_name(mut self, name: impl Into<String>) -> Self {
        self.script_name = Some(name.into());
        self
    }

    /// Set the positional parameters.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.positional = args.into_iter().map(Into::into).collect();
        self
    }

    /// Build the shell.
    pub fn build(self) -> Bash {
        let fs = self.fs.unwrap_or_else(|| Arc::new(MemFs::new()));
        let net: Option<Arc<dyn NetworkAdapter>> = self
            .net
            .map(|inner| {
                Arc::new(GatedAdapter::new(inner, self.allowlist.clone())) as Arc<dyn NetworkAdapter>
            });
        let mut interpreter = Interpreter::new(
            Arc::clone(&fs),
            self.registry,
            net,
            self.limits,
        );

        let state = interpreter.state_mut();
        for (key, value) in self.env {
            state.set_scalar(&key, value, AssignMode::default()).ok();
            state
                .declare(&key, AssignMode::default(), |attrs| attrs.exported = true)
                .ok();
        }
        if let Some(cwd) = self.cwd {
            state
                .set_scalar("PWD", cwd.display().to_string(), AssignMode::default())
                .ok();
            state.cwd = cwd;
        }
        if let Some(name) = self.script_name {
            state.script_name = name;
        }
        state.positional = self.positional;

        Bash {
            fs,
            interpreter,
            seeded: false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn run(script: &str) -> ExecResult {
        let mut bash = Bash::new();
        bash.exec(script).await.unwrap()
    }

    async fn stdout(script: &str) -> String {
        let result = run(script).await;
        assert_eq!(result.exit_code, 0, "stderr: {}", result.stderr);
        result.stdout
    }

    // --- basics ---

    #[tokio::test]
    async fn echo_hello() {
        assert_eq!(stdout("echo hello").await, "hello\n");
    }

    #[tokio::test]
    async fn variable_assignment_and_readback() {
        assert_eq!(stdout("x=world; echo hello $x").await, "hello world\n");
        assert_eq!(stdout("x='a b'; echo \"[$x]\"").await, "[a b]\n");
    }

    #[tokio::test]
    async fn exit_status_flows_through_dollar_question() {
        assert_eq!(stdout("false; echo $?").await, "1\n");
        assert_eq!(stdout("true; echo $?").await, "0\n");
    }

    #[tokio::test]
    async fn command_not_found_is_127() {
        let result = run("no_such_command_zz").await;
        assert_eq!(result.exit_code, 127);
        assert!(result.stderr.contains("command not found"));
    }

    #[tokio::test]
    async fn parse_error_is_status_2_with_diagnostic() {
        let result = run("if true; then echo x").await;
        assert_eq!(result.exit_code, 2);
        assert!(result.stderr.contains("syntax error"));
    }

    // --- expansion & splitting ---

    #[tokio::test]
    async fn unquoted_expansion_splits_fields() {
        assert_eq!(
            stdout("x=\"a b c\"; for w in $x; do echo \"[$w]\"; done").await,
            "[a]\n[b]\n[c]\n"
        );
    }

    #[tokio::test]
    async fn quoted_expansion_is_one_field() {
        assert_eq!(
            stdout("x=\"a b c\"; for w in \"$x\"; do echo \"[$w]\"; done").await,
            "[a b c]\n"
        );
    }

    #[tokio::test]
    async fn pipefail_reports_rightmost_failure() {
        assert_eq!(stdout("set -o pipefail; false | true; echo $?").await, "1\n");
        assert_eq!(stdout("false | true; echo $?").await, "0\n");
    }

    #[tokio::test]
    async fn errexit_forgives_condition_positions() {
        assert_eq!(
            stdout("set -e; if false; then echo x; fi; echo ok").await,
            "ok\n"
        );
    }

    #[tokio::test]
    async fn errexit_stops_on_plain_failure() {
        let result = run("set -e\nfalse\necho unreachable").await;
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.stdout, "");
    }

    #[tokio::test]
    async fn errexit_ignores_left_of_and_or() {
        assert_eq!(stdout("set -e; false && echo a; echo ok").await, "ok\n");
        assert_eq!(stdout("set -e; false || echo b").await, "b\n");
        assert_eq!(stdout("set -e; ! false; ! true; echo ok").await, "ok\n");
    }

    #[tokio::test]
    async fn subshell_isolation() {
        assert_eq!(
            stdout("x=1; ( x=2; echo inner $x ); echo outer $x").await,
            "inner 2\nouter 1\n"
        );
        assert_eq!(stdout("(X=1); echo \"${X-unset}\"").await, "unset\n");
    }

    #[tokio::test]
    async fn arithmetic_with_arrays() {
        assert_eq!(
            stdout("a=(10 20 30); echo $((a[0]+a[2])); echo ${#a[@]}").await,
            "40\n3\n"
        );
    }

    // --- quoting preservation ---

    #[tokio::test]
    async fn quoting_survives_ifs_content() {
        assert_eq!(
            stdout("IFS=:; x='a:b:c'; echo \"$x\"").await,
            "a:b:c\n"
        );
        assert_eq!(
            stdout("x='a b'; set -- \"$x\"; echo $#").await,
            "1\n"
        );
    }

    #[tokio::test]
    async fn empty_ifs_disables_splitting() {
        assert_eq!(
            stdout("IFS=; x='a b  c'; set -- $x; echo $#").await,
            "1\n"
        );
    }

    #[tokio::test]
    async fn custom_ifs_splitting() {
        assert_eq!(
            stdout("IFS=:; x='a::b'; set -- $x; echo $#; echo \"$2\"").await,
            "3\n\n"
        );
    }

    // --- brace and tilde expansion ---

    #[tokio::test]
    async fn brace_expansion_first() {
        assert_eq!(stdout("echo a{b,c}d").await, "abd acd\n");
        assert_eq!(stdout("echo {1..3}").await, "1 2 3\n");
        assert_eq!(stdout("echo {01..03}").await, "01 02 03\n");
        assert_eq!(stdout("echo x{a,b").await, "x{a,b\n");
    }

    #[tokio::test]
    async fn brace_expansion_can_be_disabled() {
        assert_eq!(stdout("set +B; echo {a,b}").await, "{a,b}\n");
        assert_eq!(stdout("set +B; set -B; echo {a,b}").await, "a b\n");
    }

    #[tokio::test]
    async fn assignments_do_not_brace_expand() {
        assert_eq!(stdout("x={a,b}; echo $x").await, "{a,b}\n");
    }

    #[tokio::test]
    async fn tilde_expansion() {
        assert_eq!(stdout("echo ~").await, "/home/user\n");
        assert_eq!(stdout("echo ~/docs").await, "/home/user/docs\n");
        assert_eq!(stdout("echo \"~\"").await, "~\n");
    }

    // --- parameter expansion operators ---

    #[tokio::test]
    async fn default_and_assign_operators() {
        assert_eq!(stdout("echo ${x:-fallback}; echo ${x-y}").await, "fallback\ny\n");
        // :- does not assign.
        assert_eq!(stdout("echo ${x:-v}; echo ${x-unset2}").await, "v\nunset2\n");
        // := assigns.
        assert_eq!(stdout("echo ${x:=v}; echo $x").await, "v\nv\n");
        // :+ alternate.
        assert_eq!(stdout("x=1; echo ${x:+set}; echo ${y:+set}").await, "set\n\n");
    }

    #[tokio::test]
    async fn error_operator_aborts() {
        let result = run("echo before; : ${x:?custom message}; echo after").await;
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.stdout, "before\n");
        assert!(result.stderr.contains("custom message"));
    }

    #[tokio::test]
    async fn length_substring_and_patterns() {
        assert_eq!(stdout("x=hello; echo ${#x}").await, "5\n");
        assert_eq!(stdout("x=hello; echo ${x:1:3}").await, "ell\n");
        assert_eq!(stdout("x=hello; echo ${x: -2}").await, "lo\n");
        assert_eq!(stdout("x=a.b.c; echo ${x#*.}; echo ${x##*.}").await, "b.c\nc\n");
        assert_eq!(stdout("x=a.b.c; echo ${x%.*}; echo ${x%%.*}").await, "a.b\na\n");
        assert_eq!(stdout("x=banana; echo ${x/an/AN}; echo ${x//an/AN}").await, "bANana\nbANANa\n");
        assert_eq!(stdout("x=abc; echo ${x^}; echo ${x^^}").await, "Abc\nABC\n");
        assert_eq!(stdout("x=ABC; echo ${x,}; echo ${x,,}").await, "aBC\nabc\n");
    }

    #[tokio::test]
    async fn transforms_and_indirection() {
        assert_eq!(stdout("x='a b'; echo ${x@Q}").await, "'a b'\n");
        assert_eq!(stdout("x=hi; ref=x; echo ${!ref}").await, "hi\n");
        assert_eq!(stdout("pre_a=1 pre_b=2; echo ${!pre_*}").await, "pre_a pre_b\n");
    }

    #[tokio::test]
    async fn bad_substitution_fails_command_only() {
        let result = run("echo ${x@Z}; echo after").await;
        assert!(result.stderr.contains("bad substitution"));
        assert!(result.stdout.contains("after"));
    }

    // --- arrays ---

    #[tokio::test]
    async fn indexed_arrays() {
        assert_eq!(stdout("a=(x y z); echo ${a[1]}; echo ${a[@]}; echo ${#a[@]}").await, "y\nx y z\n3\n");
        assert_eq!(stdout("a=(x); a[5]=far; echo ${!a[@]}").await, "0 5\n");
        assert_eq!(stdout("a=(1 2); a+=(3); echo ${a[@]}").await, "1 2 3\n");
        assert_eq!(stdout("a=(x y z); echo ${a[-1]}").await, "z\n");
        assert_eq!(stdout("a=(a b c d); echo ${a[@]:1:2}").await, "b c\n");
        assert_eq!(stdout("a=(x y); unset 'a[0]'; echo ${#a[@]}").await, "1\n");
    }

    #[tokio::test]
    async fn associative_arrays() {
        assert_eq!(
            stdout("declare -A m; m[zz]=1; m[aa]=2; echo ${m[zz]}; echo ${!m[@]}").await,
            "1\naa zz\n"
        );
        assert_eq!(
            stdout("declare -A m=([k1]=v1 [k2]=v2); echo ${m[k2]}").await,
            "v2\n"
        );
    }

    #[tokio::test]
    async fn quoted_array_at_keeps_fields() {
        assert_eq!(
            stdout("a=('x y' z); for e in \"${a[@]}\"; do echo \"[$e]\"; done").await,
            "[x y]\n[z]\n"
        );
    }

    // --- positional parameters ---

    #[tokio::test]
    async fn positional_and_shift() {
        assert_eq!(
            stdout("set -- a b c; echo $1 $3 $#; shift; echo $1 $#").await,
            "a c 3\nb 2\n"
        );
    }

    #[tokio::test]
    async fn quoted_at_preserves_arguments() {
        assert_eq!(
            stdout("set -- 'a b' c; for x in \"$@\"; do echo \"[$x]\"; done").await,
            "[a b]\n[c]\n"
        );
        assert_eq!(
            stdout("set -- 'a b' c; IFS=-; echo \"$*\"").await,
            "a b-c\n"
        );
    }

    // --- command substitution ---

    #[tokio::test]
    async fn command_substitution_trims_trailing_newlines() {
        assert_eq!(stdout("x=$(echo hi); echo \"[$x]\"").await, "[hi]\n");
        assert_eq!(stdout("echo $(echo a; echo b)").await, "a b\n");
        assert_eq!(stdout("echo `echo back`").await, "back\n");
    }

    #[tokio::test]
    async fn command_substitution_is_isolated() {
        assert_eq!(stdout("x=1; y=$(x=2; echo $x); echo $x $y").await, "1 2\n");
    }

    #[tokio::test]
    async fn substitution_status_for_bare_assignment() {
        assert_eq!(stdout("x=$(false); echo $?").await, "1\n");
        assert_eq!(stdout("x=$(true); echo $?").await, "0\n");
    }

    // --- pipelines ---

    #[tokio::test]
    async fn pipeline_feeds_stdout_to_stdin() {
        assert_eq!(stdout("echo hello | cat").await, "hello\n");
        assert_eq!(stdout("echo hi | cat | cat | cat").await, "hi\n");
    }

    #[tokio::test]
    async fn pipeline_stages_are_subshells() {
        assert_eq!(stdout("x=1; echo go | x=2; echo $x").await, "1\n");
    }

    #[tokio::test]
    async fn lastpipe_shares_parent_scope() {
        assert_eq!(
            stdout("shopt -s lastpipe; echo value | read v; echo $v").await,
            "value\n"
        );
    }

    #[tokio::test]
    async fn stderr_pipe_includes_stderr() {
        assert_eq!(
            stdout("{ echo out; no_cmd_zz; } |& cat | cat").await,
            "out\nsandbash: line 1: no_cmd_zz: command not found\n"
        );
    }

    #[tokio::test]
    async fn negation_inverts_status() {
        assert_eq!(stdout("! false; echo $?").await, "0\n");
        assert_eq!(stdout("! true; echo $?").await, "1\n");
    }

    // --- control flow ---

    #[tokio::test]
    async fn if_elif_else_chain() {
        let script = "x=2\nif [ $x = 1 ]; then echo one\nelif [ $x = 2 ]; then echo two\nelse echo other\nfi";
        assert_eq!(stdout(script).await, "two\n");
    }

    #[tokio::test]
    async fn while_and_until_loops() {
        assert_eq!(
            stdout("i=0; while [ $i -lt 3 ]; do echo $i; i=$((i+1)); done").await,
            "0\n1\n2\n"
        );
        assert_eq!(
            stdout("i=0; until [ $i -ge 2 ]; do echo $i; i=$((i+1)); done").await,
            "0\n1\n"
        );
    }

    #[tokio::test]
    async fn c_style_for() {
        assert_eq!(
            stdout("for ((i=0; i<3; i++)); do echo $i; done").await,
            "0\n1\n2\n"
        );
    }

    #[tokio::test]
    async fn break_and_continue_with_levels() {
        assert_eq!(
            stdout("for i in 1 2 3; do if [ $i = 2 ]; then break; fi; echo $i; done").await,
            "1\n"
        );
        assert_eq!(
            stdout("for i in 1 2 3; do if [ $i = 2 ]; then continue; fi; echo $i; done").await,
            "1\n3\n"
        );
        assert_eq!(
            stdout("for i in 1 2; do for j in a b; do echo $i$j; break 2; done; done").await,
            "1a\n"
        );
    }

    #[tokio::test]
    async fn case_terminators() {
        let script = "case b in a) echo A;; b) echo B;& c) echo C;; d) echo D;; esac";
        assert_eq!(stdout(script).await, "B\nC\n");

        let script = "case ab in a*) echo first;;& *b) echo second;; esac";
        assert_eq!(stdout(script).await, "first\nsecond\n");
    }

    #[tokio::test]
    async fn case_patterns_use_glob_matching() {
        assert_eq!(stdout("case hello.rs in *.rs) echo rust;; *) echo other;; esac").await, "rust\n");
        assert_eq!(stdout("case x in a|x|b) echo hit;; esac").await, "hit\n");
    }

    #[tokio::test]
    async fn group_runs_in_current_shell() {
        assert_eq!(stdout("{ x=5; }; echo $x").await, "5\n");
    }

    // --- functions ---

    #[tokio::test]
    async fn function_definition_and_call() {
        assert_eq!(
            stdout("greet() { echo hello $1; }; greet world").await,
            "hello world\n"
        );
        assert_eq!(
            stdout("function wave { echo wave $#; }; wave a b").await,
            "wave 2\n"
        );
    }

    #[tokio::test]
    async fn function_return_status() {
        assert_eq!(stdout("f() { return 3; }; f; echo $?").await, "3\n");
    }

    #[tokio::test]
    async fn local_variables_stay_local() {
        assert_eq!(
            stdout("x=outer; f() { local x=inner; echo $x; }; f; echo $x").await,
            "inner\nouter\n"
        );
    }

    #[tokio::test]
    async fn function_sees_and_mutates_globals() {
        assert_eq!(stdout("x=1; f() { x=2; }; f; echo $x").await, "2\n");
    }

    #[tokio::test]
    async fn positional_restored_after_call() {
        assert_eq!(
            stdout("set -- a b; f() { echo $1; }; f inner; echo $1").await,
            "inner\na\n"
        );
    }

    #[tokio::test]
    async fn recursion_limit_is_fatal() {
        let mut bash = Bash::builder()
            .limits(ExecutionLimits::new().max_call_depth(10))
            .build();
        let result = bash.exec("f() { f; }; f").await.unwrap();
        assert_eq!(result.exit_code, 2);
        assert!(result.stderr.contains("function call depth"));
    }

    #[tokio::test]
    async fn prefix_assignment_is_temporary_for_functions() {
        assert_eq!(
            stdout("f() { echo $V; }; V=tmp f; echo \"[${V-unset}]\"").await,
            "tmp\n[unset]\n"
        );
    }

    // --- redirections ---

    #[tokio::test]
    async fn output_and_append_redirection() {
        let script = "echo one > /tmp/f; echo two >> /tmp/f; cat /tmp/f";
        assert_eq!(stdout(script).await, "one\ntwo\n");
    }

    #[tokio::test]
    async fn input_redirection() {
        assert_eq!(
            stdout("echo data > /tmp/in; cat < /tmp/in").await,
            "data\n"
        );
    }

    #[tokio::test]
    async fn missing_input_fails_without_running() {
        let result = run("cat < /tmp/missing_zz; echo $?").await;
        assert!(result.stderr.contains("No such file"));
        assert_eq!(result.stdout, "1\n");
    }

    #[tokio::test]
    async fn stderr_redirection_and_merge() {
        assert_eq!(
            stdout("no_cmd_zz 2>/dev/null 2>/tmp/err; cat /tmp/err").await,
            "sandbash: line 1: no_cmd_zz: command not found\n"
        );
        let script = "{ echo out; no_cmd_zz; } > /tmp/both 2>&1; cat /tmp/both";
        let result = run(script).await;
        assert!(result.stdout.contains("out\n"));
        assert!(result.stdout.contains("command not found"));
    }

    #[tokio::test]
    async fn order_of_dup_and_file_redirect_matters() {
        // 2>&1 before > f: stderr goes to the old stdout (captured).
        let result = run("no_cmd_zz 2>&1 > /tmp/x").await;
        assert!(result.stdout.contains("command not found"));
    }

    #[tokio::test]
    async fn noclobber_respected_and_bypassed() {
        let script = "set -C; echo a > /tmp/f; echo b > /tmp/f";
        let result = run(script).await;
        assert!(result.stderr.contains("cannot overwrite"));
        assert_eq!(
            stdout("set -C; echo a > /tmp/g; echo b >| /tmp/g; cat /tmp/g").await,
            "b\n"
        );
    }

    #[tokio::test]
    async fn heredoc_with_and_without_expansion() {
        assert_eq!(
            stdout("x=42\ncat <<EOF\nvalue: $x\nEOF\n").await,
            "value: 42\n"
        );
        assert_eq!(
            stdout("x=42\ncat <<'EOF'\nvalue: $x\nEOF\n").await,
            "value: $x\n"
        );
        assert_eq!(
            stdout("cat <<-EOF\n\tindented\n\tEOF\n").await,
            "indented\n"
        );
    }

    #[tokio::test]
    async fn herestring_feeds_stdin() {
        assert_eq!(stdout("cat <<< hello").await, "hello\n");
        assert_eq!(stdout("x=abc; cat <<< \"$x def\"").await, "abc def\n");
    }

    #[tokio::test]
    async fn redirect_on_compound_feeds_loop() {
        let script = "printf '%s\\n' a b > /tmp/lines\nwhile read l; do echo \"<$l>\"; done < /tmp/lines";
        assert_eq!(stdout(script).await, "<a>\n<b>\n");
    }

    // --- globbing ---

    #[tokio::test]
    async fn glob_expansion_sorted() {
        let script = "cd /tmp; echo x > b.txt; echo x > a.txt; echo x > c.log; echo *.txt";
        assert_eq!(stdout(script).await, "a.txt b.txt\n");
    }

    #[tokio::test]
    async fn glob_miss_stays_literal_by_default() {
        assert_eq!(stdout("echo /tmp/*.zz").await, "/tmp/*.zz\n");
    }

    #[tokio::test]
    async fn nullglob_and_failglob() {
        assert_eq!(stdout("shopt -s nullglob; echo start /tmp/*.zz end").await, "start end\n");
        let result = run("shopt -s failglob; echo /tmp/*.zz; echo after").await;
        assert!(result.stderr.contains("no match"));
        assert!(result.stdout.contains("after"));
    }

    #[tokio::test]
    async fn noglob_disables_expansion() {
        assert_eq!(
            stdout("cd /tmp; echo x > a.txt; set -f; echo *.txt").await,
            "*.txt\n"
        );
    }

    #[tokio::test]
    async fn quoted_glob_chars_do_not_match() {
        assert_eq!(
            stdout("cd /tmp; echo x > a.txt; echo '*.txt'").await,
            "*.txt\n"
        );
    }

    // --- conditionals ---

    #[tokio::test]
    async fn double_bracket_patterns_and_regex() {
        assert_eq!(stdout("[[ hello == h* ]] && echo match").await, "match\n");
        assert_eq!(stdout("[[ hello == 'h*' ]] || echo literal").await, "literal\n");
        assert_eq!(
            stdout("[[ abc123 =~ ^([a-z]+)([0-9]+)$ ]] && echo ${BASH_REMATCH[1]}:${BASH_REMATCH[2]}").await,
            "abc:123\n"
        );
    }

    #[tokio::test]
    async fn double_bracket_no_word_splitting() {
        assert_eq!(stdout("x='a b'; [[ $x == 'a b' ]] && echo one").await, "one\n");
    }

    #[tokio::test]
    async fn numeric_conditions() {
        assert_eq!(stdout("[[ 5 -gt 3 ]] && echo yes").await, "yes\n");
        assert_eq!(stdout("x=4; [[ $((x*2)) -eq 8 ]] && echo math").await, "math\n");
    }

    #[tokio::test]
    async fn arithmetic_command_status() {
        assert_eq!(stdout("((1)) && echo true").await, "true\n");
        assert_eq!(stdout("((0)) || echo false").await, "false\n");
        assert_eq!(stdout("x=3; ((x == 3)) && echo eq").await, "eq\n");
    }

    // --- nounset ---

    #[tokio::test]
    async fn nounset_faults_bare_reads() {
        let result = run("set -u; echo $missing_zz; echo after").await;
        assert_eq!(result.exit_code, 1);
        assert!(result.stderr.contains("unbound variable"));
        assert!(!result.stdout.contains("after"));
    }

    #[tokio::test]
    async fn nounset_spares_defaulted_reads() {
        assert_eq!(stdout("set -u; echo \"[${missing-}]\"").await, "[]\n");
    }

    // --- xtrace ---

    #[tokio::test]
    async fn xtrace_prints_expanded_argv() {
        let result = run("set -x; x=42; echo $x").await;
        assert!(result.stderr.contains("+ echo 42"));
        assert_eq!(result.stdout, "42\n");
    }

    #[tokio::test]
    async fn xtrace_uses_ps4() {
        let result = run("PS4='>> '; set -x; echo hi").await;
        assert!(result.stderr.contains(">> echo hi"));
    }

    // --- traps ---

    #[tokio::test]
    async fn exit_trap_runs_at_end() {
        let result = run("trap 'echo cleanup' EXIT; echo main").await;
        assert_eq!(result.stdout, "main\ncleanup\n");
    }

    #[tokio::test]
    async fn exit_trap_preserves_status() {
        let result = run("trap 'echo bye' EXIT; exit 7").await;
        assert_eq!(result.exit_code, 7);
        assert_eq!(result.stdout, "bye\n");
    }

    #[tokio::test]
    async fn err_trap_fires_on_failure() {
        let result = run("trap 'echo errtrap' ERR; false; echo after").await;
        assert_eq!(result.stdout, "errtrap\nafter\n");
    }

    // --- exit & limits ---

    #[tokio::test]
    async fn exit_unwinds_everything() {
        let result = run("f() { exit 9; }; for i in 1 2 3; do f; echo no; done; echo no").await;
        assert_eq!(result.exit_code, 9);
        assert_eq!(result.stdout, "");
    }

    #[tokio::test]
    async fn exit_status_wraps_modulo_256() {
        let result = run("exit 256").await;
        assert_eq!(result.exit_code, 0);
        let result = run("exit 257").await;
        assert_eq!(result.exit_code, 1);
    }

    #[tokio::test]
    async fn loop_iteration_limit() {
        let mut bash = Bash::builder()
            .limits(ExecutionLimits::new().max_loop_iterations(10))
            .build();
        let result = bash.exec("while true; do :; done").await.unwrap();
        assert_eq!(result.exit_code, 2);
        assert!(result.stderr.contains("loop iterations"));
    }

    #[tokio::test]
    async fn command_count_limit_keeps_output() {
        let mut bash = Bash::builder()
            .limits(ExecutionLimits::new().max_commands(5))
            .build();
        let result = bash.exec("echo 1; echo 2; echo 3; echo 4; echo 5; echo 6").await.unwrap();
        assert_eq!(result.exit_code, 2);
        assert!(result.stdout.contains("1\n"));
        assert!(result.stderr.contains("command count"));
    }

    // --- determinism ---

    #[tokio::test]
    async fn repeated_runs_are_byte_identical() {
        let script = "for f in c a b; do echo x > /tmp/$f; done\necho /tmp/*\ndeclare -A m=([z]=1 [a]=2)\nfor k in ${!m[@]}; do echo $k; done";
        let mut first: Option<(String, String, i32)> = None;
        for _ in 0..3 {
            let mut bash = Bash::new();
            let result = bash.exec(script).await.unwrap();
            let snapshot = (result.stdout, result.stderr, result.exit_code);
            match &first {
                None => first = Some(snapshot),
                Some(prev) => assert_eq!(prev, &snapshot),
            }
        }
    }

    // --- printf round-trip law ---

    #[tokio::test]
    async fn printf_round_trips_strings() {
        assert_eq!(stdout("printf '%s' \"a b\tc\"").await, "a b\tc");
        assert_eq!(stdout("printf '%s\\n' one two").await, "one\ntwo\n");
        assert_eq!(stdout("printf '%d-%s.' 1 a 2 b").await, "1-a.2-b.");
        assert_eq!(stdout("printf -v out '%03d' 7; echo $out").await, "007\n");
    }

    // --- misc surface ---

    #[tokio::test]
    async fn eval_runs_in_current_context() {
        assert_eq!(stdout("eval 'x=42'; echo $x").await, "42\n");
        assert_eq!(stdout("cmd='echo hi'; eval $cmd").await, "hi\n");
    }

    #[tokio::test]
    async fn source_runs_in_current_context() {
        let script = "echo 'lib_var=99' > /tmp/lib.sh\nsource /tmp/lib.sh\necho $lib_var";
        assert_eq!(stdout(script).await, "99\n");
    }

    #[tokio::test]
    async fn cd_updates_pwd_and_oldpwd() {
        let script = "mkdir_out=$(cd /tmp; pwd); echo $mkdir_out; cd /tmp; echo $PWD; cd -; cd /tmp; echo $OLDPWD";
        let out = stdout(script).await;
        assert!(out.starts_with("/tmp\n/tmp\n"));
        assert!(out.ends_with("/home/user\n"));
    }

    #[tokio::test]
    async fn pushd_popd_maintain_directory_stack() {
        let script = "pushd /tmp; pwd; pushd /; pwd; popd; pwd; popd; pwd";
        assert_eq!(
            stdout(script).await,
            "/tmp /home/user\n/tmp\n/ /tmp /home/user\n/\n/tmp /home/user\n/tmp\n/home/user\n/home/user\n"
        );
    }

    #[tokio::test]
    async fn pushd_without_args_swaps_top() {
        assert_eq!(
            stdout("pushd /tmp; pushd; pwd; dirs").await,
            "/tmp /home/user\n/home/user /tmp\n/home/user\n/home/user /tmp\n"
        );
    }

    #[tokio::test]
    async fn dirs_listing_and_clear() {
        assert_eq!(
            stdout("pushd /tmp; dirs -v").await,
            "/tmp /home/user\n 0  /tmp\n 1  /home/user\n"
        );
        assert_eq!(
            stdout("pushd /tmp; dirs -p").await,
            "/tmp /home/user\n/tmp\n/home/user\n"
        );
        assert_eq!(stdout("pushd /tmp; dirs -c; dirs").await, "/tmp /home/user\n/tmp\n");
    }

    #[tokio::test]
    async fn directory_stack_errors() {
        let result = run("popd").await;
        assert_eq!(result.exit_code, 1);
        assert!(result.stderr.contains("directory stack empty"));

        let result = run("pushd").await;
        assert_eq!(result.exit_code, 1);
        assert!(result.stderr.contains("no other directory"));

        let result = run("pushd /no/such/dir_zz").await;
        assert_eq!(result.exit_code, 1);
        assert!(result.stderr.contains("No such file or directory"));
    }

    #[tokio::test]
    async fn getopts_parses_flags() {
        let script = "set -- -a -b val rest\nwhile getopts 'ab:' opt; do echo \"$opt:${OPTARG-}\"; done\nshift $((OPTIND-1)); echo left: $1";
        assert_eq!(stdout(script).await, "a:\nb:val\nleft: rest\n");
    }

    #[tokio::test]
    async fn read_splits_on_ifs() {
        // The group runs in a pipeline subshell; its output still flows out.
        assert_eq!(
            stdout("echo 'a b c' | { read x y; echo \"$y|$x\"; }").await,
            "b c|a\n"
        );
        assert_eq!(
            stdout("shopt -s lastpipe; echo 'a b c' | read x y; echo \"$y|$x\"").await,
            "b c|a\n"
        );
    }

    #[tokio::test]
    async fn declare_integer_attribute() {
        assert_eq!(stdout("declare -i n; n=2+3; echo $n").await, "5\n");
    }

    #[tokio::test]
    async fn readonly_refuses_reassignment() {
        let result = run("readonly r=1; r=2; echo $r").await;
        assert!(result.stderr.contains("readonly"));
        assert!(result.stdout.contains("1"));
    }

    #[tokio::test]
    async fn nameref_indirection() {
        assert_eq!(
            stdout("target=v1; declare -n ref=target; echo $ref; ref=v2; echo $target").await,
            "v1\nv2\n"
        );
    }

    #[tokio::test]
    async fn aliases_apply_on_next_parse() {
        let mut bash = Bash::new();
        bash.exec("shopt -s expand_aliases; alias ll='echo listed'")
            .await
            .unwrap();
        let result = bash.exec("ll now").await.unwrap();
        assert_eq!(result.stdout, "listed now\n");
    }

    #[tokio::test]
    async fn background_statement_is_synchronous_and_isolated() {
        let result = run("echo bg & echo fg").await;
        assert_eq!(result.stdout, "bg\nfg\n");
        assert_eq!(stdout("x=1; x=2 & echo $x").await, "1\n");
    }

    #[tokio::test]
    async fn ansi_c_quoting() {
        assert_eq!(stdout("printf '%s' $'a\\tb\\n'").await, "a\tb\n");
    }

    #[tokio::test]
    async fn process_substitution_provides_paths() {
        assert_eq!(stdout("cat <(echo sub)").await, "sub\n");
    }

    #[tokio::test]
    async fn builder_env_and_args() {
        let mut bash = Bash::builder()
            .env("GREETING", "hey")
            .args(["one", "two"])
            .script_name("myscript")
            .build();
        let result = bash.exec("echo $GREETING $1 $2 $0").await.unwrap();
        assert_eq!(result.stdout, "hey one two myscript\n");
    }

    #[tokio::test]
    async fn state_persists_across_exec_calls() {
        let mut bash = Bash::new();
        bash.exec("x=persists").await.unwrap();
        let result = bash.exec("echo $x").await.unwrap();
        assert_eq!(result.stdout, "persists\n");
    }

    #[tokio::test]
    async fn select_reads_menu_choice() {
        let script = "printf '2\\n' > /tmp/choice\nselect x in alpha beta; do echo picked $x; break; done < /tmp/choice";
        let result = run(script).await;
        assert_eq!(result.stdout, "picked beta\n");
        assert!(result.stderr.contains("1) alpha"));
    }
}
