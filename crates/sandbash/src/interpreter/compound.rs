//! Compound command execution
//!
//! Control flow travels as tagged results: loops consume `Break` and
//! `Continue` (decrementing their level), functions consume `Return`,
//! `Exit` unwinds to the top. Subshells snapshot the state and discard
//! every mutation, keeping only output and status.

use super::state::AssignMode;
use super::{ControlFlow, ExecResult, Interpreter};
use crate::error::Result;
use crate::parser::ast::{
    CaseCommand, CaseTerminator, CompoundCommand, CStyleForCommand, ForCommand, IfCommand,
    LoopCommand, Script, SelectCommand,
};
use crate::pattern::pattern_matches;

/// What a loop body told the loop to do.
enum LoopSignal {
    Normal,
    Stop,
    Propagate(ControlFlow),
}

impl Interpreter {
    pub(crate) async fn execute_compound(
        &mut self,
        compound: &CompoundCommand,
    ) -> Result<ExecResult> {
        match compound {
            CompoundCommand::If(if_cmd) => self.execute_if(if_cmd).await,
            CompoundCommand::While(loop_cmd) => self.execute_while(loop_cmd, false).await,
            CompoundCommand::Until(loop_cmd) => self.execute_while(loop_cmd, true).await,
            CompoundCommand::For(for_cmd) => self.execute_for(for_cmd).await,
            CompoundCommand::CStyleFor(for_cmd) => self.execute_cstyle_for(for_cmd).await,
            CompoundCommand::Case(case_cmd) => self.execute_case(case_cmd).await,
            CompoundCommand::Select(select_cmd) => self.execute_select(select_cmd).await,
            CompoundCommand::Subshell(body) => self.execute_subshell(body).await,
            CompoundCommand::Group(body) => self.execute_script(body).await,
            CompoundCommand::Arith(src) => {
                match self.eval_arith_source(src).await {
                    Ok(value) => {
                        let status = if value != 0 { 0 } else { 1 };
                        Ok(ExecResult::with_code("", status))
                    }
                    Err(err) => self.expansion_failure(err),
                }
            }
            CompoundCommand::Cond(expr) => match self.eval_cond(expr).await {
                Ok(true) => Ok(ExecResult::default()),
                Ok(false) => Ok(ExecResult::with_code("", 1)),
                Err(err) => self.expansion_failure(err),
            },
        }
    }

    /// Run a condition list: errexit is forgiven inside.
    async fn execute_condition(&mut self, script: &Script) -> Result<ExecResult> {
        self.state.condition_depth += 1;
        let outcome = self.execute_script(script).await;
        self.state.condition_depth -= 1;
        outcome
    }

    async fn execute_if(&mut self, if_cmd: &IfCommand) -> Result<ExecResult> {
        let mut out = ExecResult::default();

        for (condition, body) in &if_cmd.clauses {
            let cond_result = self.execute_condition(condition).await?;
            out.absorb_output(&cond_result);
            if cond_result.control_flow != ControlFlow::None {
                out.control_flow = cond_result.control_flow;
                out.exit_code = cond_result.exit_code;
                return Ok(out);
            }
            if cond_result.exit_code == 0 {
                let body_result = self.execute_script(body).await?;
                out.absorb_output(&body_result);
                out.exit_code = body_result.exit_code;
                out.control_flow = body_result.control_flow;
                return Ok(out);
            }
        }

        if let Some(else_body) = &if_cmd.else_body {
            let body_result = self.execute_script(else_body).await?;
            out.absorb_output(&body_result);
            out.exit_code = body_result.exit_code;
            out.control_flow = body_result.control_flow;
            return Ok(out);
        }

        out.exit_code = 0;
        Ok(out)
    }

    /// Route a loop body's control flow; decrements break/continue levels.
    fn loop_signal(&mut self, result: &mut ExecResult, out: &mut ExecResult) -> LoopSignal {
        match result.control_flow {
            ControlFlow::Break(n) => {
                if n > 1 {
                    out.control_flow = ControlFlow::Break(n - 1);
                    LoopSignal::Propagate(ControlFlow::Break(n - 1))
                } else {
                    LoopSignal::Stop
                }
            }
            ControlFlow::Continue(n) => {
                if n > 1 {
                    out.control_flow = ControlFlow::Continue(n - 1);
                    LoopSignal::Propagate(ControlFlow::Continue(n - 1))
                } else {
                    LoopSignal::Normal
                }
            }
            ControlFlow::Return(_) | ControlFlow::Exit(_) => {
                out.control_flow = result.control_flow;
                LoopSignal::Propagate(result.control_flow)
            }
            ControlFlow::None => LoopSignal::Normal,
        }
    }

    async fn execute_while(&mut self, loop_cmd: &LoopCommand, until: bool) -> Result<ExecResult> {
        let mut out = ExecResult::default();
        let mut iterations: u64 = 0;
        self.state.loop_depth += 1;

        let outcome = loop {
            iterations += 1;
            if let Err(err) = self.counters.tick_loop(iterations, &self.limits) {
                break Err(err.into());
            }

            let cond = match self.execute_condition(&loop_cmd.condition).await {
                Ok(cond) => cond,
                Err(err) => break Err(err),
            };
            out.absorb_output(&cond);
            if cond.control_flow != ControlFlow::None {
                out.control_flow = cond.control_flow;
                break Ok(());
            }
            let truthy = (cond.exit_code == 0) != until;
            if !truthy {
                break Ok(());
            }

            let mut body = match self.execute_script(&loop_cmd.body).await {
                Ok(body) => body,
                Err(err) => break Err(err),
            };
            out.absorb_output(&body);
            out.exit_code = body.exit_code;
            match self.loop_signal(&mut body, &mut out) {
                LoopSignal::Normal => {}
                LoopSignal::Stop => break Ok(()),
                LoopSignal::Propagate(_) => break Ok(()),
            }
        };

        self.state.loop_depth -= 1;
        outcome.map(|()| out)
    }

    async fn execute_for(&mut self, for_cmd: &ForCommand) -> Result<ExecResult> {
        let items = match &for_cmd.words {
            Some(words) => match self.expand_words(words).await {
                Ok(items) => items,
                Err(err) => return self.expansion_failure(err),
            },
            None => self.state.positional.clone(),
        };

        let mut out = ExecResult::default();
        let mut iterations: u64 = 0;
        self.state.loop_depth += 1;

        let outcome = 'iter: {
            for item in items {
                iterations += 1;
                if let Err(err) = self.counters.tick_loop(iterations, &self.limits) {
                    break 'iter Err(err.into());
                }

                if let Err(err) =
                    self.state
                        .set_scalar(&for_cmd.variable, item, AssignMode::default())
                {
                    out.stderr.push_str(&format!(
                        "{}: line {}: {}\n",
                        self.state.script_name, self.state.line, err.message()
                    ));
                    out.exit_code = 1;
                    break 'iter Ok(());
                }

                let mut body = match self.execute_script(&for_cmd.body).await {
                    Ok(body) => body,
                    Err(err) => break 'iter Err(err),
                };
                out.absorb_output(&body);
                out.exit_code = body.exit_code;
                match self.loop_signal(&mut body, &mut out) {
                    LoopSignal::Normal => {}
                    LoopSignal::Stop | LoopSignal::Propagate(_) => break 'iter Ok(()),
                }
            }
            Ok(())
        };

        self.state.loop_depth -= 1;
        outcome.map(|()| out)
    }

    async fn execute_cstyle_for(&mut self, for_cmd: &CStyleForCommand) -> Result<ExecResult> {
        let mut out = ExecResult::default();

        if let Some(init) = &for_cmd.init {
            if let Err(err) = self.eval_arith_source(init).await {
                return self.expansion_failure(err);
            }
        }

        let mut iterations: u64 = 0;
        self.state.loop_depth += 1;

        let outcome = loop {
            iterations += 1;
            if let Err(err) = self.counters.tick_loop(iterations, &self.limits) {
                break Err(crate::error::Error::from(err));
            }

            if let Some(cond) = &for_cmd.cond {
                match self.eval_arith_source(cond).await {
                    Ok(value) => {
                        if value == 0 {
                            break Ok(());
                        }
                    }
                    Err(err) => {
                        let failure = self.expansion_failure(err)?;
                        out.absorb_output(&failure);
                        out.exit_code = failure.exit_code;
                        out.control_flow = failure.control_flow;
                        break Ok(());
                    }
                }
            }

            let mut body = match self.execute_script(&for_cmd.body).await {
                Ok(body) => body,
                Err(err) => break Err(err),
            };
            out.absorb_output(&body);
            out.exit_code = body.exit_code;
            match self.loop_signal(&mut body, &mut out) {
                LoopSignal::Normal => {}
                LoopSignal::Stop | LoopSignal::Propagate(_) => break Ok(()),
            }

            if let Some(update) = &for_cmd.update {
                if let Err(err) = self.eval_arith_source(update).await {
                    let failure = self.expansion_failure(err)?;
                    out.absorb_output(&failure);
                    out.exit_code = failure.exit_code;
                    break Ok(());
                }
            }
        };

        self.state.loop_depth -= 1;
        outcome.map(|()| out)
    }

    async fn execute_case(&mut self, case_cmd: &CaseCommand) -> Result<ExecResult> {
        let subject = match self.expand_word_single(&case_cmd.word).await {
            Ok(subject) => subject,
            Err(err) => return self.expansion_failure(err),
        };
        let opts = self.match_options();

        let mut out = ExecResult::default();
        let mut fall_through = false;

        for item in &case_cmd.items {
            let mut matched = fall_through;
            if !matched {
                for pattern_word in &item.patterns {
                    let pattern = match self.expand_word_pattern(pattern_word).await {
                        Ok(pattern) => pattern,
                        Err(err) => return self.expansion_failure(err),
                    };
                    if pattern_matches(&pattern, &subject, opts) {
                        matched = true;
                        break;
                    }
                }
            }
            if !matched {
                continue;
            }

            let body = self.execute_script(&item.body).await?;
            out.absorb_output(&body);
            out.exit_code = body.exit_code;
            if body.control_flow != ControlFlow::None {
                out.control_flow = body.control_flow;
                return Ok(out);
            }

            match item.terminator {
                CaseTerminator::Break => return Ok(out),
                CaseTerminator::FallThrough => {
                    fall_through = true;
                }
                CaseTerminator::Continue => {
                    fall_through = false;
                }
            }
        }
        Ok(out)
    }

    async fn execute_select(&mut self, select_cmd: &SelectCommand) -> Result<ExecResult> {
        let items = match &select_cmd.words {
            Some(words) => match self.expand_words(words).await {
                Ok(items) => items,
                Err(err) => return self.expansion_failure(err),
            },
            None => self.state.positional.clone(),
        };

        let mut out = ExecResult::default();
        let mut iterations: u64 = 0;
        self.state.loop_depth += 1;

        let outcome = loop {
            iterations += 1;
            if let Err(err) = self.counters.tick_loop(iterations, &self.limits) {
                break Err(crate::error::Error::from(err));
            }

            // Numbered menu on stderr, prompt from PS3.
            for (i, item) in items.iter().enumerate() {
                out.stderr.push_str(&format!("{}) {}\n", i + 1, item));
            }
            let prompt = self
                .state
                .get("PS3")
                .map(|v| v.to_field())
                .unwrap_or_else(|| "#? ".to_string());
            out.stderr.push_str(&prompt);

            let Some(line) = read_line(self.stdin_mut()) else {
                out.exit_code = 1;
                break Ok(());
            };
            let reply = line.trim().to_string();
            self.state
                .set_scalar("REPLY", reply.clone(), AssignMode::default())
                .ok();

            let selection = reply
                .parse::<usize>()
                .ok()
                .and_then(|n| items.get(n.saturating_sub(1)).filter(|_| n >= 1))
                .cloned()
                .unwrap_or_default();
            if let Err(err) =
                self.state
                    .set_scalar(&select_cmd.variable, selection, AssignMode::default())
            {
                out.stderr.push_str(&format!(
                    "{}: line {}: {}\n",
                    self.state.script_name, self.state.line, err.message()
                ));
                out.exit_code = 1;
                break Ok(());
            }

            let mut body = match self.execute_script(&select_cmd.body).await {
                Ok(body) => body,
                Err(err) => break Err(err),
            };
            out.absorb_output(&body);
            out.exit_code = body.exit_code;
            match self.loop_signal(&mut body, &mut out) {
                LoopSignal::Normal => {}
                LoopSignal::Stop | LoopSignal::Propagate(_) => break Ok(()),
            }
        };

        self.state.loop_depth -= 1;
        outcome.map(|()| out)
    }

    /// `( ... )`: state snapshot in, mutations discarded, output and exit
    /// status kept.
    async fn execute_subshell(&mut self, body: &Script) -> Result<ExecResult> {
        let snapshot = self.state.clone();
        self.state.subshell_depth += 1;
        let outcome = self.execute_script(body).await;
        self.state = snapshot;

        let mut result = outcome?;
        // exit inside the subshell ends the subshell alone; loop and
        // function signals do not cross the boundary either.
        if let ControlFlow::Exit(code) | ControlFlow::Return(code) = result.control_flow {
            result.exit_code = code;
        }
        result.control_flow = ControlFlow::None;
        Ok(result)
    }
}

/// Consume one line (without the newline) from a stdin buffer.
fn read_line(buffer: &mut String) -> Option<String> {
    if buffer.is_empty() {
        return None;
    }
    match buffer.find('\n') {
        Some(pos) => {
            let line: String = buffer.drain(..=pos).collect();
            Some(line.trim_end_matches('\n').to_string())
        }
        None => Some(std::mem::take(buffer)),
    }
}
