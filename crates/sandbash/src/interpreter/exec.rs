//! Statement and command execution
//!
//! Dispatch order for a simple command: shell functions, then special
//! builtins (which mutate interpreter state), then the command registry.
//! Pipelines run their stages sequentially over captured buffers, each
//! stage in a state snapshot.

use std::sync::Arc;

use super::expand::ExpandError;
use super::special;
use super::state::{ArrayKey, AssignMode, Value};
use super::{BoxFuture, ControlFlow, ExecResult, Interpreter};
use crate::builtins::{Builtin, Context};
use crate::error::{normalize_status, Result};
use crate::parser::ast::{
    AndOr, AssignValue, Assignment, Command, Pipeline, Script, SimpleCommand, Statement,
};

impl Interpreter {
    /// Execute a script's statements in order, stopping on control flow.
    ///
    /// Limit and timeout faults are folded into the result here so output
    /// buffered before the fault survives; they then unwind as `Exit`.
    pub(crate) fn execute_script<'a>(
        &'a mut self,
        script: &'a Script,
    ) -> BoxFuture<'a, Result<ExecResult>> {
        Box::pin(async move {
            let mut out = ExecResult::default();
            for statement in &script.statements {
                match self.execute_statement(statement).await {
                    Ok(result) => {
                        out.absorb_output(&result);
                        out.exit_code = result.exit_code;
                        if result.control_flow != ControlFlow::None {
                            out.control_flow = result.control_flow;
                            break;
                        }
                    }
                    Err(crate::error::Error::Limit(limit)) => {
                        let err = crate::error::Error::Limit(limit.clone());
                        if self.counters.poison(limit) {
                            out.stderr
                                .push_str(&format!("{}: {}\n", self.state.script_name, err));
                        }
                        out.exit_code = err.exit_status();
                        out.control_flow = ControlFlow::Exit(out.exit_code);
                        break;
                    }
                    Err(err) => return Err(err),
                }
            }
            Ok(out)
        })
    }

    /// Run a script with a replacement stdin buffer.
    pub(crate) async fn execute_script_with_stdin(
        &mut self,
        script: &Script,
        stdin: Option<String>,
    ) -> Result<ExecResult> {
        let pushed = stdin.is_some();
        if let Some(stdin) = stdin {
            self.stdin_stack.push(stdin);
        }
        let result = self.execute_script(script).await;
        if pushed {
            self.stdin_stack.pop();
        }
        result
    }

    async fn execute_statement(&mut self, stmt: &Statement) -> Result<ExecResult> {
        if stmt.background {
            // Hermetic model: the "background" statement runs to completion
            // in a subshell; output and status are recorded immediately.
            let snapshot = self.state.clone();
            self.state.subshell_depth += 1;
            let outcome = self.execute_and_or(stmt).await;
            self.state = snapshot;
            let mut result = outcome?;
            result.control_flow = ControlFlow::None;
            self.state.last_background_id += 1;
            self.state.last_status = result.exit_code;
            return Ok(result);
        }
        self.execute_and_or(stmt).await
    }

    /// Run the `&&` / `||` chain with short-circuiting and errexit.
    async fn execute_and_or(&mut self, stmt: &Statement) -> Result<ExecResult> {
        let mut out = ExecResult::default();
        let last = stmt.pipelines.len() - 1;
        let mut status = 0;

        for (i, pipeline) in stmt.pipelines.iter().enumerate() {
            if i > 0 {
                let run = match stmt.ops[i - 1] {
                    AndOr::And => status == 0,
                    AndOr::Or => status != 0,
                };
                if !run {
                    continue;
                }
            }

            // Every pipeline but the chain's last sits in a forgiven
            // position for errexit purposes.
            let forgiven = i < last;
            if forgiven {
                self.state.condition_depth += 1;
            }
            let outcome = self.execute_pipeline(pipeline).await;
            if forgiven {
                self.state.condition_depth -= 1;
            }
            let result = outcome?;

            out.absorb_output(&result);
            status = result.exit_code;
            self.state.last_status = status;

            if result.control_flow != ControlFlow::None {
                out.control_flow = result.control_flow;
                out.exit_code = status;
                return Ok(out);
            }

            if i == last && status != 0 && !pipeline.negated {
                if let Some(flow) = self.handle_command_failure(status, &mut out).await? {
                    out.control_flow = flow;
                    out.exit_code = status;
                    return Ok(out);
                }
            }
        }

        out.exit_code = status;
        Ok(out)
    }

    /// ERR trap and errexit, skipped in forgiven positions.
    async fn handle_command_failure(
        &mut self,
        status: i32,
        out: &mut ExecResult,
    ) -> Result<Option<ControlFlow>> {
        if self.state.condition_depth > 0 {
            return Ok(None);
        }
        if let Some(trap) = self.state.traps.get("ERR").cloned() {
            let trap_result = self.run_trap_body(&trap).await?;
            out.absorb_output(&trap_result);
        }
        if self.state.options.set.errexit {
            return Ok(Some(ControlFlow::Exit(status)));
        }
        Ok(None)
    }

    async fn execute_pipeline(&mut self, pipeline: &Pipeline) -> Result<ExecResult> {
        let mut result = if pipeline.commands.len() == 1 {
            self.execute_command(&pipeline.commands[0]).await?
        } else {
            self.execute_multi_pipeline(pipeline).await?
        };

        if pipeline.negated {
            result.exit_code = if result.exit_code == 0 { 1 } else { 0 };
        }
        Ok(result)
    }

    async fn execute_multi_pipeline(&mut self, pipeline: &Pipeline) -> Result<ExecResult> {
        let mut out = ExecResult::default();
        let mut statuses = Vec::with_capacity(pipeline.commands.len());
        let mut next_stdin = String::new();
        let last = pipeline.commands.len() - 1;
        let lastpipe = self.state.options.shopt.lastpipe;

        for (i, command) in pipeline.commands.iter().enumerate() {
            let is_last = i == last;
            let in_parent = is_last && lastpipe;

            self.stdin_stack.push(std::mem::take(&mut next_stdin));
            let snapshot = if in_parent {
                None
            } else {
                let snapshot = self.state.clone();
                self.state.subshell_depth += 1;
                Some(snapshot)
            };

            let outcome = self.execute_command(command).await;
            self.stdin_stack.pop();
            if let Some(snapshot) = snapshot {
                self.state = snapshot;
            }
            let result = outcome?;
            statuses.push(result.exit_code);

            if is_last {
                out.stdout.push_str(&result.stdout);
                out.stderr.push_str(&result.stderr);
                if in_parent && result.control_flow != ControlFlow::None {
                    out.control_flow = result.control_flow;
                }
            } else if pipeline.stderr_pipes.get(i).copied().unwrap_or(false) {
                // |& : stderr follows stdout into the next stage.
                next_stdin = result.stdout;
                next_stdin.push_str(&result.stderr);
            } else {
                out.stderr.push_str(&result.stderr);
                next_stdin = result.stdout;
            }
        }

        out.exit_code = if self.state.options.set.pipefail {
            statuses
                .iter()
                .rev()
                .find(|s| **s != 0)
                .copied()
                .unwrap_or(0)
        } else {
            statuses.last().copied().unwrap_or(0)
        };
        Ok(out)
    }

    /// Execute one command node.
    pub(crate) fn execute_command<'a>(
        &'a mut self,
        command: &'a Command,
    ) -> BoxFuture<'a, Result<ExecResult>> {
        Box::pin(async move {
            self.counters.check_deadline()?;
            match command {
                Command::Simple(simple) => self.execute_simple(simple).await,
                Command::Compound(compound, redirects) => {
                    let plan = match self.prepare_redirects(redirects).await {
                        Ok(plan) => plan,
                        Err(err) => return self.expansion_failure(err),
                    };
                    let pushed = plan.stdin.is_some();
                    if let Some(stdin) = plan.stdin.clone() {
                        self.stdin_stack.push(stdin);
                    }
                    let outcome = self.execute_compound(compound).await;
                    if pushed {
                        self.stdin_stack.pop();
                    }
                    let mut result = outcome?;
                    // Guard-clause expansions (case words, `[[ ]]` operands,
                    // arithmetic) may have buffered substitution stderr.
                    let expand_stderr = std::mem::take(&mut self.expand_stderr);
                    if !expand_stderr.is_empty() {
                        result.stderr = format!("{expand_stderr}{}", result.stderr);
                    }
                    match self.apply_redirects(&plan, result).await {
                        Ok(result) => Ok(result),
                        Err(err) => self.expansion_failure(err),
                    }
                }
                Command::FunctionDef(def) => {
                    self.state.functions.insert(def.name.clone(), def.clone());
                    Ok(ExecResult::default())
                }
            }
        })
    }

    async fn execute_simple(&mut self, cmd: &SimpleCommand) -> Result<ExecResult> {
        self.state.line = cmd.line;
        self.counters.tick_command(&self.limits)?;
        self.cmd_sub_status = None;

        // 1. Expand argv.
        let argv = match self.expand_words(&cmd.words).await {
            Ok(argv) => argv,
            Err(err) => {
                let mut result = self.expansion_failure(err)?;
                let pre = std::mem::take(&mut self.expand_stderr);
                result.stderr = format!("{pre}{}", result.stderr);
                return Ok(result);
            }
        };

        let mut prefix = String::new();
        if self.state.options.set.xtrace && !argv.is_empty() {
            let ps4 = self
                .state
                .get("PS4")
                .map(|v| v.to_field())
                .unwrap_or_else(|| "+ ".to_string());
            prefix.push_str(&format!("{ps4}{}\n", argv.join(" ")));
        }
        prefix.push_str(&std::mem::take(&mut self.expand_stderr));

        // 2. Redirections.
        let plan = match self.prepare_redirects(&cmd.redirects).await {
            Ok(plan) => plan,
            Err(err) => {
                let mut result = self.expansion_failure(err)?;
                result.stderr = format!("{prefix}{}", result.stderr);
                return Ok(result);
            }
        };
        let pushed_stdin = plan.stdin.is_some();
        if let Some(stdin) = plan.stdin.clone() {
            self.stdin_stack.push(stdin);
        }

        // 3. Assignments: permanent without a command word, temporary
        //    otherwise. Declaration builtins consume the assignment list
        //    themselves (their operands carry scope and attribute flags).
        let assignment_names: Vec<String> =
            cmd.assignments.iter().map(|a| a.name.clone()).collect();
        let decl = is_declaration(&argv);
        let saved_cells = if argv.is_empty() || decl {
            None
        } else {
            Some(self.state.capture_cells(&assignment_names))
        };

        let assign_outcome = if decl {
            Ok(())
        } else {
            self.apply_assignments(&cmd.assignments, !argv.is_empty())
                .await
        };

        let mut result = match assign_outcome {
            Err(err) => {
                let mut result = self.expansion_failure(err)?;
                result.stderr = format!("{prefix}{}", result.stderr);
                if pushed_stdin {
                    self.stdin_stack.pop();
                }
                if let Some(saved) = saved_cells {
                    self.state.restore_cells(saved);
                }
                return Ok(result);
            }
            Ok(()) => {
                if argv.is_empty() {
                    // Assignments only: status comes from any command
                    // substitution that ran during expansion.
                    ExecResult::with_code("", self.cmd_sub_status.take().unwrap_or(0))
                } else {
                    match self.dispatch_command(&argv, cmd).await {
                        Err(err) => {
                            // Fatal: unwind, but restore shell invariants.
                            if pushed_stdin {
                                self.stdin_stack.pop();
                            }
                            if let Some(saved) = saved_cells {
                                self.state.restore_cells(saved);
                            }
                            return Err(err);
                        }
                        Ok(mut result) => {
                            result.exit_code = normalize_status(result.exit_code as i64);
                            result
                        }
                    }
                }
            }
        };

        if pushed_stdin {
            self.stdin_stack.pop();
        }
        if let Some(saved) = saved_cells {
            self.state.restore_cells(saved);
        }

        // Substitutions that ran during redirect/assignment expansion also
        // contributed stderr.
        let late_expand_stderr = std::mem::take(&mut self.expand_stderr);
        result.stderr = format!("{prefix}{late_expand_stderr}{}", result.stderr);

        // 4. Route streams, then feed any >(cmd) collectors.
        let mut routed = match self.apply_redirects(&plan, result).await {
            Ok(routed) => routed,
            Err(err) => return self.expansion_failure(err),
        };
        if !self.pending_out_procs.is_empty() {
            if let Err(err) = self.flush_out_procs(&mut routed).await {
                return self.expansion_failure(err);
            }
        }

        self.state.last_status = routed.exit_code;
        Ok(routed)
    }

    /// Functions, then special builtins, then the registry.
    async fn dispatch_command(
        &mut self,
        argv: &[String],
        cmd: &SimpleCommand,
    ) -> Result<ExecResult> {
        let name = argv[0].clone();
        let args: Vec<String> = argv[1..].to_vec();
        self.state.last_arg = argv.last().cloned().unwrap_or_default();

        if let Some(def) = self.state.functions.get(&name).cloned() {
            return self.invoke_function(&name, &args, def).await;
        }

        if special::is_special_builtin(&name) {
            return self.run_special(&name, &args, cmd).await;
        }

        if let Some(builtin) = self.registry.get(&name).cloned() {
            return self.run_registry(builtin, &args).await;
        }

        Ok(ExecResult::err(
            format!(
                "{}: line {}: {}: command not found\n",
                self.state.script_name, self.state.line, name
            ),
            127,
        ))
    }

    /// Invoke a registry command under the dispatch contract: argv, stdin,
    /// environment, working directory, filesystem, network.
    pub(crate) async fn run_registry(
        &mut self,
        builtin: Arc<dyn Builtin>,
        args: &[String],
    ) -> Result<ExecResult> {
        let stdin = if builtin.wants_stdin() {
            std::mem::take(self.stdin_mut())
        } else {
            String::new()
        };
        let env = self.environment();
        let cwd = self.state.cwd.clone();
        let ctx = Context {
            args,
            stdin: &stdin,
            env: &env,
            cwd: &cwd,
            fs: Arc::clone(&self.fs),
            net: self.net.clone(),
        };
        let mut result = builtin.execute(ctx).await?;
        result.exit_code = normalize_status(result.exit_code as i64);
        Ok(result)
    }

    /// Apply assignments; with `temporary` they also export (prefix
    /// assignments are command environment).
    pub(crate) async fn apply_assignments(
        &mut self,
        assignments: &[Assignment],
        temporary: bool,
    ) -> super::expand::ExpandResult<()> {
        for assignment in assignments {
            self.apply_assignment(assignment, temporary, AssignMode::default())
                .await?;
        }
        Ok(())
    }

    /// Apply one assignment under a caller-chosen scope mode (`declare`
    /// passes local/global).
    pub(crate) async fn apply_assignment(
        &mut self,
        assignment: &Assignment,
        temporary: bool,
        base: AssignMode,
    ) -> super::expand::ExpandResult<()> {
        let mode = AssignMode {
            append: assignment.append,
            ..base
        };

        let outcome = match &assignment.value {
            AssignValue::Scalar(word) => {
                let mut value = self.expand_assignment_value(word).await?;
                if self.state.attrs(&assignment.name).integer {
                    value = self.eval_arith_text(&value).await?.to_string();
                }
                match &assignment.index {
                    Some(raw) => {
                        let key = self.eval_subscript(&assignment.name, raw).await?;
                        let key = self.normalize_write_index(&assignment.name, key);
                        self.state
                            .set_element(&assignment.name, key, value, mode)
                    }
                    None => self.state.set_scalar(&assignment.name, value, mode),
                }
            }
            AssignValue::Array(elements) => {
                let is_assoc = matches!(
                    self.state.get(&assignment.name),
                    Some(Value::Assoc(_))
                );
                if is_assoc {
                    let mut map = std::collections::BTreeMap::new();
                    for element in elements {
                        let value = self.expand_assignment_value(&element.value).await?;
                        if let Some(raw) = &element.index {
                            let ArrayKey::Key(key) =
                                self.eval_subscript(&assignment.name, raw).await?
                            else {
                                continue;
                            };
                            map.insert(key, value);
                        }
                    }
                    self.state
                        .set_array(&assignment.name, Value::Assoc(map), mode)
                } else {
                    let mut map = std::collections::BTreeMap::new();
                    let mut next_index: i64 = 0;
                    for element in elements {
                        match &element.index {
                            Some(raw) => {
                                let idx = self.eval_arith_text(raw).await?;
                                let fields = self
                                    .expand_words(std::slice::from_ref(&element.value))
                                    .await?;
                                let value = fields.join(" ");
                                map.insert(idx, value);
                                next_index = idx + 1;
                            }
                            None => {
                                // Unsubscripted elements expand like argv
                                // words: one field each, globs included.
                                let fields = self
                                    .expand_words(std::slice::from_ref(&element.value))
                                    .await?;
                                for field in fields {
                                    map.insert(next_index, field);
                                    next_index += 1;
                                }
                            }
                        }
                    }
                    self.state
                        .set_array(&assignment.name, Value::Indexed(map), mode)
                }
            }
        };

        if let Err(err) = outcome {
            return Err(ExpandError::soft(err.message(), 1));
        }
        if temporary {
            // Prefix assignments join the command's environment.
            self.state
                .declare(&assignment.name, AssignMode::default(), |attrs| {
                    attrs.exported = true;
                })
                .ok();
        }
        Ok(())
    }

    /// Negative indices on writes address from the end of the array.
    pub(crate) fn normalize_write_index(&self, name: &str, key: ArrayKey) -> ArrayKey {
        match key {
            ArrayKey::Index(i) if i < 0 => {
                if let Some(Value::Indexed(map)) = self.state.get(name) {
                    if let Some(max) = map.keys().next_back() {
                        return ArrayKey::Index(max + 1 + i);
                    }
                }
                ArrayKey::Index(i)
            }
            other => other,
        }
    }

    /// Fold an expansion error into a shell-level result (or propagate the
    /// fatal ones).
    pub(crate) fn expansion_failure(&mut self, err: ExpandError) -> Result<ExecResult> {
        match err {
            ExpandError::Shell {
                message,
                status,
                abort,
            } => {
                let mut result = ExecResult::err(
                    format!(
                        "{}: line {}: {}\n",
                        self.state.script_name, self.state.line, message
                    ),
                    status,
                );
                if abort {
                    result.control_flow = ControlFlow::Exit(status);
                }
                self.state.last_status = status;
                Ok(result)
            }
            ExpandError::Fatal(err) => Err(err),
        }
    }
}

/// Declaration builtins keep their assignment arguments permanent.
fn is_declaration(argv: &[String]) -> bool {
    matches!(
        argv.first().map(String::as_str),
        Some("declare") | Some("typeset") | Some("local") | Some("export") | Some("readonly")
    )
}
