//! Function invocation
//!
//! A call pushes a scope frame, binds the positional parameters, runs the
//! body, and pops the frame. `local` cells live in the frame; `return`
//! stops here; recursion is bounded by the call-depth limit.

use super::{ControlFlow, ExecResult, Interpreter};
use crate::error::Result;
use crate::parser::ast::FunctionDef;

impl Interpreter {
    pub(crate) async fn invoke_function(
        &mut self,
        _name: &str,
        args: &[String],
        def: FunctionDef,
    ) -> Result<ExecResult> {
        self.counters.push_function(&self.limits)?;
        self.state.push_frame();
        let saved_positional = std::mem::replace(&mut self.state.positional, args.to_vec());

        let outcome = self.run_function_body(&def).await;

        self.state.positional = saved_positional;
        self.state.pop_frame();
        self.counters.pop_function();

        let mut result = outcome?;
        match result.control_flow {
            ControlFlow::Return(code) => {
                result.exit_code = code;
                result.control_flow = ControlFlow::None;
            }
            // Loop signals do not escape a function body.
            ControlFlow::Break(_) | ControlFlow::Continue(_) => {
                result.control_flow = ControlFlow::None;
            }
            _ => {}
        }
        self.state.last_status = result.exit_code;
        Ok(result)
    }

    async fn run_function_body(&mut self, def: &FunctionDef) -> Result<ExecResult> {
        // Definition-time redirections apply on every call.
        let plan = match self.prepare_redirects(&def.redirects).await {
            Ok(plan) => plan,
            Err(err) => return self.expansion_failure(err),
        };
        let pushed = plan.stdin.is_some();
        if let Some(stdin) = plan.stdin.clone() {
            self.stdin_stack.push(stdin);
        }

        let outcome = self.execute_compound(&def.body).await;

        if pushed {
            self.stdin_stack.pop();
        }
        match outcome {
            Ok(result) => match self.apply_redirects(&plan, result).await {
                Ok(result) => Ok(result),
                Err(err) => self.expansion_failure(err),
            },
            Err(err) => Err(err),
        }
    }
}
