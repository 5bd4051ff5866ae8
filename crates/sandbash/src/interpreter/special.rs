//! Special builtins
//!
//! Commands that execute inside the current shell context and may mutate
//! interpreter state. The executor routes here after functions and before
//! the command registry.

use std::collections::BTreeMap;
use std::path::PathBuf;

use super::state::{AssignMode, Value};
use super::{ControlFlow, ExecResult, Interpreter};
use crate::error::{normalize_status, Result};
use crate::parser::ast::SimpleCommand;
use crate::parser::Parser;

/// Names dispatched to the special-builtin layer.
pub(crate) fn is_special_builtin(name: &str) -> bool {
    matches!(
        name,
        "cd" | "pushd"
            | "popd"
            | "dirs"
            | "export"
            | "readonly"
            | "set"
            | "shopt"
            | "shift"
            | "unset"
            | "local"
            | "declare"
            | "typeset"
            | "return"
            | "break"
            | "continue"
            | "exit"
            | "eval"
            | "source"
            | "."
            | "trap"
            | "getopts"
            | "alias"
            | "unalias"
            | "read"
            | "let"
            | "type"
            | "command"
            | "exec"
            | "printf"
    )
}

impl Interpreter {
    pub(crate) async fn run_special(
        &mut self,
        name: &str,
        args: &[String],
        cmd: &SimpleCommand,
    ) -> Result<ExecResult> {
        match name {
            "cd" => self.builtin_cd(args).await,
            "pushd" => self.builtin_pushd(args).await,
            "popd" => self.builtin_popd(args).await,
            "dirs" => self.builtin_dirs(args),
            "export" => self.builtin_export(args, cmd, false).await,
            "readonly" => self.builtin_export(args, cmd, true).await,
            "set" => self.builtin_set(args),
            "shopt" => self.builtin_shopt(args),
            "shift" => self.builtin_shift(args),
            "unset" => self.builtin_unset(args).await,
            "local" => self.builtin_declare(args, cmd, true).await,
            "declare" | "typeset" => self.builtin_declare(args, cmd, false).await,
            "return" => self.builtin_return(args),
            "break" => self.builtin_break(args, true),
            "continue" => self.builtin_break(args, false),
            "exit" => self.builtin_exit(args),
            "eval" => self.builtin_eval(args).await,
            "source" | "." => self.builtin_source(args).await,
            "trap" => self.builtin_trap(args),
            "getopts" => self.builtin_getopts(args).await,
            "alias" => self.builtin_alias(args),
            "unalias" => self.builtin_unalias(args),
            "read" => self.builtin_read(args).await,
            "let" => self.builtin_let(args).await,
            "type" => self.builtin_type(args),
            "command" => self.builtin_command(args).await,
            "exec" => self.builtin_exec(args).await,
            "printf" => self.builtin_printf(args),
            _ => Ok(ExecResult::err(
                self.diag(&format!("{name}: not a shell builtin")),
                1,
            )),
        }
    }

    /// `program: line N: message` with trailing newline.
    pub(crate) fn diag(&self, message: &str) -> String {
        format!(
            "{}: line {}: {message}\n",
            self.state.script_name, self.state.line
        )
    }

    // --- directories ---

    async fn builtin_cd(&mut self, args: &[String]) -> Result<ExecResult> {
        let mut operand: Option<&str> = None;
        for arg in args {
            match arg.as_str() {
                "-L" | "-P" => {}
                other => {
                    operand = Some(other);
                    break;
                }
            }
        }

        let (target, echo) = match operand {
            None => {
                let home = self
                    .state
                    .get("HOME")
                    .map(|v| v.to_field())
                    .unwrap_or_default();
                if home.is_empty() {
                    return Ok(ExecResult::err(self.diag("cd: HOME not set"), 1));
                }
                (home, false)
            }
            Some("-") => match &self.state.prev_dir {
                Some(prev) => (prev.display().to_string(), true),
                None => {
                    return Ok(ExecResult::err(self.diag("cd: OLDPWD not set"), 1));
                }
            },
            Some(path) => (path.to_string(), false),
        };

        let canonical = match self.change_directory("cd", &target).await {
            Ok(path) => path,
            Err(message) => return Ok(ExecResult::err(self.diag(&message), 1)),
        };

        if echo {
            Ok(ExecResult::ok(format!("{}\n", canonical.display())))
        } else {
            Ok(ExecResult::default())
        }
    }

    /// Switch the working directory, maintaining `PWD`/`OLDPWD`. Returns
    /// the canonical path, or a diagnostic for the caller to report.
    async fn change_directory(
        &mut self,
        verb: &str,
        target: &str,
    ) -> std::result::Result<PathBuf, String> {
        let resolved = self.resolve_path(target);
        let canonical = match self.fs.realpath(&resolved).await {
            Ok(path) => path,
            Err(_) => return Err(format!("{verb}: {target}: No such file or directory")),
        };
        let is_dir = self
            .fs
            .stat(&canonical)
            .await
            .map(|m| m.file_type.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(format!("{verb}: {target}: Not a directory"));
        }

        let old = std::mem::replace(&mut self.state.cwd, canonical.clone());
        self.state.prev_dir = Some(old.clone());
        self.state
            .set_scalar("OLDPWD", old.display().to_string(), AssignMode::default())
            .ok();
        self.state
            .set_scalar("PWD", canonical.display().to_string(), AssignMode::default())
            .ok();
        Ok(canonical)
    }

    /// The directory stack as `dirs` prints it: cwd first, then stack
    /// entries newest-first.
    fn format_dir_stack(&self) -> String {
        let mut parts = vec![self.state.cwd.display().to_string()];
        for dir in self.state.dir_stack.iter().rev() {
            parts.push(dir.display().to_string());
        }
        parts.join(" ")
    }

    /// `pushd [dir]`: with a directory, push the cwd and change there;
    /// without one, swap the cwd with the top of the stack.
    async fn builtin_pushd(&mut self, args: &[String]) -> Result<ExecResult> {
        let target = args.iter().find(|a| !a.starts_with('-'));

        let Some(target) = target else {
            let Some(top) = self.state.dir_stack.pop() else {
                return Ok(ExecResult::err(self.diag("pushd: no other directory"), 1));
            };
            let old = self.state.cwd.clone();
            return match self
                .change_directory("pushd", &top.display().to_string())
                .await
            {
                Ok(_) => {
                    self.state.dir_stack.push(old);
                    Ok(ExecResult::ok(format!("{}\n", self.format_dir_stack())))
                }
                Err(message) => {
                    self.state.dir_stack.push(top);
                    Ok(ExecResult::err(self.diag(&message), 1))
                }
            };
        };

        let old = self.state.cwd.clone();
        let target = target.clone();
        match self.change_directory("pushd", &target).await {
            Ok(_) => {
                self.state.dir_stack.push(old);
                Ok(ExecResult::ok(format!("{}\n", self.format_dir_stack())))
            }
            Err(message) => Ok(ExecResult::err(self.diag(&message), 1)),
        }
    }

    /// `popd`: change to the top stack entry and drop it.
    async fn builtin_popd(&mut self, _args: &[String]) -> Result<ExecResult> {
        let Some(top) = self.state.dir_stack.pop() else {
            return Ok(ExecResult::err(self.diag("popd: directory stack empty"), 1));
        };
        match self
            .change_directory("popd", &top.display().to_string())
            .await
        {
            Ok(_) => Ok(ExecResult::ok(format!("{}\n", self.format_dir_stack()))),
            Err(message) => Ok(ExecResult::err(self.diag(&message), 1)),
        }
    }

    /// `dirs [-c] [-l] [-p] [-v]`: display (or clear) the stack.
    fn builtin_dirs(&mut self, args: &[String]) -> Result<ExecResult> {
        let mut clear = false;
        let mut per_line = false;
        let mut verbose = false;
        for arg in args {
            match arg.as_str() {
                "-c" => clear = true,
                "-p" => per_line = true,
                "-v" => {
                    verbose = true;
                    per_line = true;
                }
                // Long listing: no ~ substitution happens here anyway.
                "-l" => {}
                other => {
                    return Ok(ExecResult::err(
                        self.diag(&format!("dirs: {other}: invalid option")),
                        2,
                    ));
                }
            }
        }

        if clear {
            self.state.dir_stack.clear();
            return Ok(ExecResult::default());
        }

        let mut entries = vec![self.state.cwd.display().to_string()];
        entries.extend(self.state.dir_stack.iter().rev().map(|d| d.display().to_string()));

        let mut out = String::new();
        if verbose {
            for (i, entry) in entries.iter().enumerate() {
                out.push_str(&format!(" {i}  {entry}\n"));
            }
        } else if per_line {
            for entry in &entries {
                out.push_str(&format!("{entry}\n"));
            }
        } else {
            out.push_str(&entries.join(" "));
            out.push('\n');
        }
        Ok(ExecResult::ok(out))
    }

    // --- variables ---

    async fn builtin_export(
        &mut self,
        args: &[String],
        cmd: &SimpleCommand,
        readonly: bool,
    ) -> Result<ExecResult> {
        let flag = if readonly { "-r" } else { "-x" };
        let mut print = args.is_empty() && cmd.assignments.is_empty();
        let mut operands: Vec<&String> = Vec::new();
        let mut unexport = false;

        for arg in args {
            match arg.as_str() {
                "-p" => print = true,
                "-n" if !readonly => unexport = true,
                "-f" => {}
                _ => operands.push(arg),
            }
        }

        if print {
            let mut out = String::new();
            for (name, cell) in self.state.visible() {
                let relevant = if readonly {
                    cell.attrs.readonly
                } else {
                    cell.attrs.exported
                };
                if relevant {
                    match &cell.value {
                        Some(value) => out.push_str(&format!(
                            "declare {flag} {name}=\"{}\"\n",
                            value.to_field()
                        )),
                        None => out.push_str(&format!("declare {flag} {name}\n")),
                    }
                }
            }
            return Ok(ExecResult::ok(out));
        }

        // Array-literal operands arrive via the parsed assignment list.
        for assignment in &cmd.assignments {
            if let Err(err) = self
                .apply_assignment(assignment, false, AssignMode::default())
                .await
            {
                return self.expansion_failure(err);
            }
            let result = self.state.declare(&assignment.name, AssignMode::default(), |a| {
                if readonly {
                    a.readonly = true;
                } else {
                    a.exported = true;
                }
            });
            if let Err(err) = result {
                return Ok(ExecResult::err(self.diag(&err.message()), 1));
            }
        }

        for operand in operands {
            let (name, value) = match operand.split_once('=') {
                Some((n, v)) => (n.to_string(), Some(v.to_string())),
                None => (operand.clone(), None),
            };
            if let Some(value) = value {
                if let Err(err) = self.state.set_scalar(&name, value, AssignMode::default()) {
                    return Ok(ExecResult::err(self.diag(&err.message()), 1));
                }
            }
            let outcome = self.state.declare(&name, AssignMode::default(), |a| {
                if readonly {
                    a.readonly = true;
                } else if unexport {
                    a.exported = false;
                } else {
                    a.exported = true;
                }
            });
            if let Err(err) = outcome {
                return Ok(ExecResult::err(self.diag(&err.message()), 1));
            }
        }
        Ok(ExecResult::default())
    }

    fn builtin_set(&mut self, args: &[String]) -> Result<ExecResult> {
        if args.is_empty() {
            let mut out = String::new();
            for (name, cell) in self.state.visible() {
                if let Some(value) = &cell.value {
                    match value {
                        Value::Scalar(s) => out.push_str(&format!("{name}={s}\n")),
                        Value::Indexed(map) => {
                            let body: Vec<String> =
                                map.iter().map(|(k, v)| format!("[{k}]=\"{v}\"")).collect();
                            out.push_str(&format!("{name}=({})\n", body.join(" ")));
                        }
                        Value::Assoc(map) => {
                            let body: Vec<String> =
                                map.iter().map(|(k, v)| format!("[{k}]=\"{v}\"")).collect();
                            out.push_str(&format!("{name}=({})\n", body.join(" ")));
                        }
                    }
                }
            }
            return Ok(ExecResult::ok(out));
        }

        let mut i = 0;
        while i < args.len() {
            let arg = &args[i];
            match arg.as_str() {
                "--" => {
                    self.state.positional = args[i + 1..].to_vec();
                    return Ok(ExecResult::default());
                }
                "-o" | "+o" => {
                    let enable = arg.starts_with('-');
                    match args.get(i + 1) {
                        Some(name) => {
                            if !self.state.options.apply_set_option(name, enable) {
                                return Ok(ExecResult::err(
                                    self.diag(&format!("set: {name}: invalid option name")),
                                    2,
                                ));
                            }
                            i += 2;
                        }
                        None => {
                            // Listing forms.
                            let mut out = String::new();
                            for (name, on) in self.state.options.set_o_listing() {
                                if enable {
                                    out.push_str(&format!(
                                        "{name:<15}\t{}\n",
                                        if on { "on" } else { "off" }
                                    ));
                                } else {
                                    out.push_str(&format!(
                                        "set {}o {name}\n",
                                        if on { "-" } else { "+" }
                                    ));
                                }
                            }
                            return Ok(ExecResult::ok(out));
                        }
                    }
                }
                flags if flags.starts_with('-') || flags.starts_with('+') => {
                    let enable = flags.starts_with('-');
                    for letter in flags.chars().skip(1) {
                        if !self.state.options.apply_set_flag(letter, enable) {
                            return Ok(ExecResult::err(
                                self.diag(&format!("set: -{letter}: invalid option")),
                                2,
                            ));
                        }
                    }
                    i += 1;
                }
                _ => {
                    // First non-option: the rest become positional.
                    self.state.positional = args[i..].to_vec();
                    return Ok(ExecResult::default());
                }
            }
        }
        Ok(ExecResult::default())
    }

    fn builtin_shopt(&mut self, args: &[String]) -> Result<ExecResult> {
        let mut mode: Option<bool> = None;
        let mut quiet = false;
        let mut set_o = false;
        let mut names: Vec<&String> = Vec::new();

        for arg in args {
            match arg.as_str() {
                "-s" => mode = Some(true),
                "-u" => mode = Some(false),
                "-q" => quiet = true,
                "-p" => {}
                "-o" => set_o = true,
                _ => names.push(arg),
            }
        }

        if names.is_empty() {
            let mut out = String::new();
            for (name, on) in self.state.options.shopt_listing() {
                match mode {
                    Some(want) if want != on => continue,
                    _ => {}
                }
                out.push_str(&format!("{name}\t{}\n", if on { "on" } else { "off" }));
            }
            return Ok(ExecResult::ok(out));
        }

        let mut result = ExecResult::default();
        for name in names {
            match mode {
                Some(enable) => {
                    let known = if set_o {
                        self.state.options.apply_set_option(name, enable)
                    } else {
                        self.state.options.apply_shopt(name, enable)
                    };
                    if !known {
                        result.stderr.push_str(&self.diag(&format!(
                            "shopt: {name}: invalid shell option name"
                        )));
                        result.exit_code = 1;
                    }
                }
                None => match self.state.options.shopt_value(name) {
                    Some(on) => {
                        if !quiet {
                            result.stdout.push_str(&format!(
                                "{name}\t{}\n",
                                if on { "on" } else { "off" }
                            ));
                        }
                        if !on {
                            result.exit_code = 1;
                        }
                    }
                    None => {
                        result.stderr.push_str(&self.diag(&format!(
                            "shopt: {name}: invalid shell option name"
                        )));
                        result.exit_code = 1;
                    }
                },
            }
        }
        Ok(result)
    }

    fn builtin_shift(&mut self, args: &[String]) -> Result<ExecResult> {
        let n: usize = match args.first() {
            None => 1,
            Some(text) => match text.parse() {
                Ok(n) => n,
                Err(_) => {
                    return Ok(ExecResult::err(
                        self.diag(&format!("shift: {text}: numeric argument required")),
                        1,
                    ));
                }
            },
        };
        if n > self.state.positional.len() {
            return Ok(ExecResult::with_code("", 1));
        }
        self.state.positional.drain(..n);
        Ok(ExecResult::default())
    }

    async fn builtin_unset(&mut self, args: &[String]) -> Result<ExecResult> {
        let mut functions_only = false;
        let mut variables_only = false;
        let mut status = 0;
        let mut out = ExecResult::default();

        for arg in args {
            match arg.as_str() {
                "-f" => functions_only = true,
                "-v" => variables_only = true,
                name => {
                    if functions_only {
                        self.state.unset_function(name);
                        continue;
                    }
                    // a[idx] removes one element.
                    if let Some(open) = name.find('[') {
                        if let Some(raw) = name[open + 1..].strip_suffix(']') {
                            let base = name[..open].to_string();
                            let raw = raw.to_string();
                            let key = match self.eval_subscript(&base, &raw).await {
                                Ok(key) => key,
                                Err(err) => return self.expansion_failure(err),
                            };
                            let key = self.normalize_write_index(&base, key);
                            if let Err(err) = self.state.unset_element(&base, &key) {
                                out.stderr.push_str(&self.diag(&err.message()));
                                status = 1;
                            }
                            continue;
                        }
                    }
                    match self.state.unset(name) {
                        Ok(()) => {
                            if !variables_only && !self.state.is_set(name) {
                                // Fall through to functions like bash does.
                                self.state.unset_function(name);
                            }
                        }
                        Err(err) => {
                            out.stderr.push_str(&self.diag(&err.message()));
                            status = 1;
                        }
                    }
                }
            }
        }
        out.exit_code = status;
        Ok(out)
    }

    async fn builtin_declare(
        &mut self,
        args: &[String],
        cmd: &SimpleCommand,
        local_builtin: bool,
    ) -> Result<ExecResult> {
        if local_builtin && !self.state.in_function() {
            return Ok(ExecResult::err(
                self.diag("local: can only be used in a function"),
                1,
            ));
        }

        #[derive(Default)]
        struct Flags {
            indexed: bool,
            assoc: bool,
            integer: Option<bool>,
            lowercase: Option<bool>,
            uppercase: Option<bool>,
            readonly: Option<bool>,
            exported: Option<bool>,
            nameref: Option<bool>,
            global: bool,
            print: bool,
        }
        let mut flags = Flags::default();
        let mut operands: Vec<&String> = Vec::new();

        for arg in args {
            let (enable, letters) = if let Some(rest) = arg.strip_prefix('-') {
                (true, rest)
            } else if let Some(rest) = arg.strip_prefix('+') {
                (false, rest)
            } else {
                operands.push(arg);
                continue;
            };
            if !operands.is_empty() || letters.is_empty() {
                operands.push(arg);
                continue;
            }
            for letter in letters.chars() {
                match letter {
                    'a' => flags.indexed = enable,
                    'A' => flags.assoc = enable,
                    'i' => flags.integer = Some(enable),
                    'l' => flags.lowercase = Some(enable),
                    'u' => flags.uppercase = Some(enable),
                    'r' => flags.readonly = Some(enable),
                    'x' => flags.exported = Some(enable),
                    'n' => flags.nameref = Some(enable),
                    'g' => flags.global = enable,
                    'p' => flags.print = true,
                    'f' | 'F' => {}
                    other => {
                        return Ok(ExecResult::err(
                            self.diag(&format!("declare: -{other}: invalid option")),
                            2,
                        ));
                    }
                }
            }
        }

        let mode = AssignMode {
            local: (local_builtin || self.state.in_function()) && !flags.global,
            global: flags.global,
            append: false,
        };

        if flags.print || (operands.is_empty() && cmd.assignments.is_empty()) {
            let mut out = String::new();
            let wanted: Vec<String> = operands.iter().map(|s| s.to_string()).collect();
            for (name, cell) in self.state.visible() {
                if !wanted.is_empty() && !wanted.contains(&name) {
                    continue;
                }
                out.push_str(&declare_line(&name, cell));
            }
            let status = if !wanted.is_empty()
                && wanted
                    .iter()
                    .any(|w| !self.state.visible().iter().any(|(n, _)| n == w))
            {
                1
            } else {
                0
            };
            return Ok(ExecResult::with_code(out, status));
        }

        let apply_attrs = |a: &mut super::state::VarAttrs| {
            if let Some(v) = flags.integer {
                a.integer = v;
            }
            if let Some(v) = flags.lowercase {
                a.lowercase = v;
                if v {
                    a.uppercase = false;
                }
            }
            if let Some(v) = flags.uppercase {
                a.uppercase = v;
                if v {
                    a.lowercase = false;
                }
            }
            if let Some(v) = flags.readonly {
                a.readonly = v;
            }
            if let Some(v) = flags.exported {
                a.exported = v;
            }
            if let Some(v) = flags.nameref {
                a.nameref = v;
            }
        };

        let mut out = ExecResult::default();

        // Array literals parsed as assignments: declare -a x=(...).
        for assignment in &cmd.assignments {
            if let Err(err) = self
                .state
                .declare(&assignment.name, mode, &apply_attrs)
            {
                out.stderr.push_str(&self.diag(&err.message()));
                out.exit_code = 1;
                continue;
            }
            if flags.assoc && !matches!(self.state.get(&assignment.name), Some(Value::Assoc(_)))
            {
                self.state
                    .set_array(&assignment.name, Value::Assoc(BTreeMap::new()), mode)
                    .ok();
            }
            if let Err(err) = self.apply_assignment(assignment, false, mode).await {
                return self.expansion_failure(err);
            }
        }

        for operand in operands {
            let (name_part, value) = match operand.split_once('=') {
                Some((n, v)) => (n.to_string(), Some(v.to_string())),
                None => (operand.to_string(), None),
            };
            let (name, append) = match name_part.strip_suffix('+') {
                Some(n) => (n.to_string(), true),
                None => (name_part, false),
            };

            if let Err(err) = self.state.declare(&name, mode, &apply_attrs) {
                out.stderr.push_str(&self.diag(&err.message()));
                out.exit_code = 1;
                continue;
            }

            // Container flags shape empty declarations.
            if flags.assoc && !matches!(self.state.get(&name), Some(Value::Assoc(_))) {
                self.state
                    .set_array(&name, Value::Assoc(BTreeMap::new()), mode)
                    .ok();
            } else if flags.indexed && self.state.get(&name).is_none() {
                self.state
                    .set_array(&name, Value::Indexed(BTreeMap::new()), mode)
                    .ok();
            }

            if let Some(mut value) = value {
                if self.state.attrs(&name).integer {
                    value = match self.eval_arith_text(&value).await {
                        Ok(n) => n.to_string(),
                        Err(err) => return self.expansion_failure(err),
                    };
                }
                let assign_mode = AssignMode { append, ..mode };
                if let Err(err) = self.state.set_scalar(&name, value, assign_mode) {
                    out.stderr.push_str(&self.diag(&err.message()));
                    out.exit_code = 1;
                }
            }
        }
        Ok(out)
    }

    // --- control flow ---

    fn builtin_return(&mut self, args: &[String]) -> Result<ExecResult> {
        if !self.state.in_function() && self.state.source_depth == 0 {
            return Ok(ExecResult::err(
                self.diag("return: can only `return' from a function or sourced script"),
                1,
            ));
        }
        let code = match args.first() {
            None => self.state.last_status,
            Some(text) => match text.parse::<i64>() {
                Ok(n) => normalize_status(n),
                Err(_) => {
                    return Ok(ExecResult::err(
                        self.diag(&format!("return: {text}: numeric argument required")),
                        2,
                    ));
                }
            },
        };
        Ok(ExecResult::flow(ControlFlow::Return(code), code))
    }

    fn builtin_break(&mut self, args: &[String], is_break: bool) -> Result<ExecResult> {
        let verb = if is_break { "break" } else { "continue" };
        let n: u32 = match args.first() {
            None => 1,
            Some(text) => match text.parse() {
                Ok(0) | Err(_) => {
                    return Ok(ExecResult::err(
                        self.diag(&format!("{verb}: {text}: loop count out of range")),
                        1,
                    ));
                }
                Ok(n) => n,
            },
        };
        if self.state.loop_depth == 0 {
            return Ok(ExecResult::err(
                self.diag(&format!(
                    "{verb}: only meaningful in a `for', `while', or `until' loop"
                )),
                0,
            ));
        }
        let flow = if is_break {
            ControlFlow::Break(n)
        } else {
            ControlFlow::Continue(n)
        };
        Ok(ExecResult::flow(flow, 0))
    }

    fn builtin_exit(&mut self, args: &[String]) -> Result<ExecResult> {
        let code = match args.first() {
            None => self.state.last_status,
            Some(text) => match text.parse::<i64>() {
                Ok(n) => normalize_status(n),
                Err(_) => {
                    return Ok(ExecResult {
                        stderr: self.diag(&format!("exit: {text}: numeric argument required")),
                        exit_code: 2,
                        control_flow: ControlFlow::Exit(2),
                        stdout: String::new(),
                    });
                }
            },
        };
        Ok(ExecResult::flow(ControlFlow::Exit(code), code))
    }

    // --- re-entry ---

    async fn builtin_eval(&mut self, args: &[String]) -> Result<ExecResult> {
        let text = args.join(" ");
        if text.trim().is_empty() {
            return Ok(ExecResult::default());
        }
        let aliases = if self.state.options.shopt.expand_aliases {
            self.state.aliases.clone()
        } else {
            Default::default()
        };
        let script = match Parser::with_aliases(&text, aliases).parse() {
            Ok(script) => script,
            Err(err) => {
                return Ok(ExecResult::err(self.diag(&err.to_string()), 2));
            }
        };
        self.execute_script(&script).await
    }

    async fn builtin_source(&mut self, args: &[String]) -> Result<ExecResult> {
        let Some(path) = args.first() else {
            return Ok(ExecResult::err(self.diag("source: filename argument required"), 2));
        };
        let resolved = self.resolve_path(path);
        let bytes = match self.fs.read_file(&resolved).await {
            Ok(bytes) => bytes,
            Err(_) => {
                return Ok(ExecResult::err(
                    self.diag(&format!("source: {path}: No such file or directory")),
                    1,
                ));
            }
        };
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let aliases = if self.state.options.shopt.expand_aliases {
            self.state.aliases.clone()
        } else {
            Default::default()
        };
        let script = match Parser::with_aliases(&text, aliases).parse() {
            Ok(script) => script,
            Err(err) => {
                return Ok(ExecResult::err(self.diag(&err.to_string()), 2));
            }
        };

        let saved_positional = if args.len() > 1 {
            Some(std::mem::replace(
                &mut self.state.positional,
                args[1..].to_vec(),
            ))
        } else {
            None
        };
        self.state.source_depth += 1;
        let outcome = self.execute_script(&script).await;
        self.state.source_depth -= 1;
        if let Some(saved) = saved_positional {
            self.state.positional = saved;
        }

        let mut result = outcome?;
        if let ControlFlow::Return(code) = result.control_flow {
            result.exit_code = code;
            result.control_flow = ControlFlow::None;
        }
        Ok(result)
    }

    // --- traps ---

    fn builtin_trap(&mut self, args: &[String]) -> Result<ExecResult> {
        if args.is_empty() || args[0] == "-p" {
            let mut out = String::new();
            for (signal, body) in &self.state.traps {
                out.push_str(&format!("trap -- '{body}' {signal}\n"));
            }
            return Ok(ExecResult::ok(out));
        }

        let (action, signals) = if args[0] == "-" || args[0] == "--" {
            (None, &args[1..])
        } else {
            (Some(args[0].clone()), &args[1..])
        };
        if signals.is_empty() {
            return Ok(ExecResult::err(self.diag("trap: usage: trap [action] signal ..."), 2));
        }

        for signal in signals {
            let name = normalize_signal(signal);
            match &action {
                None => {
                    self.state.traps.remove(&name);
                }
                Some(body) => {
                    self.state.traps.insert(name, body.clone());
                }
            }
        }
        Ok(ExecResult::default())
    }

    // --- option parsing for scripts ---

    async fn builtin_getopts(&mut self, args: &[String]) -> Result<ExecResult> {
        let (Some(optstring), Some(varname)) = (args.first(), args.get(1)) else {
            return Ok(ExecResult::err(
                self.diag("getopts: usage: getopts optstring name [arg ...]"),
                2,
            ));
        };
        let params: Vec<String> = if args.len() > 2 {
            args[2..].to_vec()
        } else {
            self.state.positional.clone()
        };
        let silent = optstring.starts_with(':');

        let mut optind: usize = self
            .state
            .get("OPTIND")
            .map(|v| v.to_field())
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);
        let mut cluster = self
            .state
            .get("__GETOPTS_REST")
            .map(|v| v.to_field())
            .unwrap_or_default();

        let mut finish = |interp: &mut Self, optind: usize, cluster: &str| {
            interp
                .state
                .set_scalar("OPTIND", optind.to_string(), AssignMode::default())
                .ok();
            interp
                .state
                .set_scalar("__GETOPTS_REST", cluster.to_string(), AssignMode::default())
                .ok();
        };

        if cluster.is_empty() {
            let Some(arg) = params.get(optind.saturating_sub(1)) else {
                self.state.set_scalar(varname, "?".into(), AssignMode::default()).ok();
                finish(self, optind, "");
                return Ok(ExecResult::with_code("", 1));
            };
            if arg == "--" {
                self.state.set_scalar(varname, "?".into(), AssignMode::default()).ok();
                finish(self, optind + 1, "");
                return Ok(ExecResult::with_code("", 1));
            }
            if !arg.starts_with('-') || arg == "-" {
                self.state.set_scalar(varname, "?".into(), AssignMode::default()).ok();
                finish(self, optind, "");
                return Ok(ExecResult::with_code("", 1));
            }
            cluster = arg[1..].to_string();
            optind += 1;
        }

        let opt = cluster.chars().next().unwrap_or('?');
        cluster = cluster.chars().skip(1).collect();

        let known = optstring
            .trim_start_matches(':')
            .chars()
            .collect::<Vec<char>>();
        let position = known.iter().position(|c| *c == opt);
        let takes_arg = position
            .map(|i| known.get(i + 1) == Some(&':'))
            .unwrap_or(false);

        let mut result = ExecResult::default();
        if position.is_none() || opt == ':' {
            self.state.set_scalar(varname, "?".into(), AssignMode::default()).ok();
            if silent {
                self.state
                    .set_scalar("OPTARG", opt.to_string(), AssignMode::default())
                    .ok();
            } else {
                self.state.unset("OPTARG").ok();
                result
                    .stderr
                    .push_str(&self.diag(&format!("getopts: illegal option -- {opt}")));
            }
        } else if takes_arg {
            let optarg = if !cluster.is_empty() {
                let taken = cluster.clone();
                cluster.clear();
                Some(taken)
            } else if let Some(arg) = params.get(optind.saturating_sub(1)) {
                optind += 1;
                Some(arg.clone())
            } else {
                None
            };
            match optarg {
                Some(value) => {
                    self.state
                        .set_scalar(varname, opt.to_string(), AssignMode::default())
                        .ok();
                    self.state
                        .set_scalar("OPTARG", value, AssignMode::default())
                        .ok();
                }
                None => {
                    if silent {
                        self.state
                            .set_scalar(varname, ":".into(), AssignMode::default())
                            .ok();
                        self.state
                            .set_scalar("OPTARG", opt.to_string(), AssignMode::default())
                            .ok();
                    } else {
                        self.state
                            .set_scalar(varname, "?".into(), AssignMode::default())
                            .ok();
                        result.stderr.push_str(
                            &self.diag(&format!("getopts: option requires an argument -- {opt}")),
                        );
                    }
                }
            }
        } else {
            self.state
                .set_scalar(varname, opt.to_string(), AssignMode::default())
                .ok();
            self.state.unset("OPTARG").ok();
        }

        finish(self, optind, &cluster);
        Ok(result)
    }

    // --- aliases ---

    fn builtin_alias(&mut self, args: &[String]) -> Result<ExecResult> {
        if args.is_empty() {
            let mut out = String::new();
            let mut pairs: Vec<(&String, &String)> = self.state.aliases.iter().collect();
            pairs.sort();
            for (name, value) in pairs {
                out.push_str(&format!("alias {name}='{value}'\n"));
            }
            return Ok(ExecResult::ok(out));
        }

        let mut out = ExecResult::default();
        for arg in args {
            match arg.split_once('=') {
                Some((name, value)) => {
                    self.state
                        .aliases
                        .insert(name.to_string(), value.to_string());
                }
                None => match self.state.aliases.get(arg) {
                    Some(value) => out.stdout.push_str(&format!("alias {arg}='{value}'\n")),
                    None => {
                        out.stderr
                            .push_str(&self.diag(&format!("alias: {arg}: not found")));
                        out.exit_code = 1;
                    }
                },
            }
        }
        Ok(out)
    }

    fn builtin_unalias(&mut self, args: &[String]) -> Result<ExecResult> {
        let mut out = ExecResult::default();
        for arg in args {
            if arg == "-a" {
                self.state.aliases.clear();
                continue;
            }
            if self.state.aliases.remove(arg).is_none() {
                out.stderr
                    .push_str(&self.diag(&format!("unalias: {arg}: not found")));
                out.exit_code = 1;
            }
        }
        Ok(out)
    }

    // --- input ---

    async fn builtin_read(&mut self, args: &[String]) -> Result<ExecResult> {
        let mut raw = false;
        let mut array_name: Option<String> = None;
        let mut delim = '\n';
        let mut prompt = String::new();
        let mut names: Vec<String> = Vec::new();

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "-r" => raw = true,
                "-a" => {
                    if let Some(name) = args.get(i + 1) {
                        array_name = Some(name.clone());
                        i += 1;
                    }
                }
                "-d" => {
                    if let Some(d) = args.get(i + 1) {
                        delim = d.chars().next().unwrap_or('\0');
                        i += 1;
                    }
                }
                "-p" => {
                    if let Some(p) = args.get(i + 1) {
                        prompt = p.clone();
                        i += 1;
                    }
                }
                "-s" | "-e" => {}
                "-n" | "-N" | "-t" | "-u" => {
                    i += 1; // accepted, argument ignored
                }
                name => names.push(name.to_string()),
            }
            i += 1;
        }

        let mut result = ExecResult::default();
        if !prompt.is_empty() {
            result.stderr.push_str(&prompt);
        }

        // Read up to the delimiter, honoring backslash-newline
        // continuation unless -r.
        let buffer = self.stdin_mut();
        if buffer.is_empty() {
            result.exit_code = 1;
        }
        let mut line = String::new();
        loop {
            let Some(pos) = buffer.find(delim) else {
                line.push_str(&std::mem::take(buffer));
                break;
            };
            let chunk: String = buffer.drain(..=pos).collect();
            let chunk = chunk.trim_end_matches(delim);
            if !raw && chunk.ends_with('\\') && !chunk.ends_with("\\\\") {
                line.push_str(&chunk[..chunk.len() - 1]);
                continue;
            }
            line.push_str(chunk);
            break;
        }
        if !raw {
            line = line.replace("\\\\", "\\");
        }

        let ifs = self.state.ifs();

        if let Some(array) = array_name {
            let tokens = super::expand::split::split_ifs(&line, &ifs).tokens;
            let mut map = BTreeMap::new();
            for (idx, token) in tokens.into_iter().enumerate() {
                map.insert(idx as i64, token);
            }
            if let Err(err) =
                self.state
                    .set_array(&array, Value::Indexed(map), AssignMode::default())
            {
                result.stderr.push_str(&self.diag(&err.message()));
                result.exit_code = 1;
            }
            return Ok(result);
        }

        if names.is_empty() {
            names.push("REPLY".to_string());
        }

        if names.len() == 1 {
            let trimmed = trim_ifs_ws(&line, &ifs);
            if let Err(err) =
                self.state
                    .set_scalar(&names[0], trimmed, AssignMode::default())
            {
                result.stderr.push_str(&self.diag(&err.message()));
                result.exit_code = 1;
            }
            return Ok(result);
        }

        let tokens = super::expand::split::split_ifs(&line, &ifs).tokens;
        for (i, name) in names.iter().enumerate() {
            let value = if i + 1 == names.len() {
                tokens[i.min(tokens.len())..].join(" ")
            } else {
                tokens.get(i).cloned().unwrap_or_default()
            };
            if let Err(err) = self.state.set_scalar(name, value, AssignMode::default()) {
                result.stderr.push_str(&self.diag(&err.message()));
                result.exit_code = 1;
                break;
            }
        }
        Ok(result)
    }

    // --- arithmetic ---

    async fn builtin_let(&mut self, args: &[String]) -> Result<ExecResult> {
        if args.is_empty() {
            return Ok(ExecResult::err(self.diag("let: expression expected"), 1));
        }
        let mut last = 0;
        for arg in args {
            last = match self.eval_arith_text(arg).await {
                Ok(value) => value,
                Err(err) => return self.expansion_failure(err),
            };
        }
        Ok(ExecResult::with_code("", if last != 0 { 0 } else { 1 }))
    }

    // --- introspection ---

    fn builtin_type(&mut self, args: &[String]) -> Result<ExecResult> {
        let mut out = ExecResult::default();
        for name in args {
            if let Some(value) = self.state.aliases.get(name) {
                out.stdout
                    .push_str(&format!("{name} is aliased to `{value}'\n"));
            } else if self.state.functions.contains_key(name) {
                out.stdout.push_str(&format!("{name} is a function\n"));
            } else if is_special_builtin(name) || self.registry.contains_key(name) {
                out.stdout.push_str(&format!("{name} is a shell builtin\n"));
            } else {
                out.stderr
                    .push_str(&self.diag(&format!("type: {name}: not found")));
                out.exit_code = 1;
            }
        }
        Ok(out)
    }

    async fn builtin_command(&mut self, args: &[String]) -> Result<ExecResult> {
        let mut rest = args;
        let mut verify = false;
        while let Some(first) = rest.first() {
            match first.as_str() {
                "-v" | "-V" => {
                    verify = true;
                    rest = &rest[1..];
                }
                "-p" => rest = &rest[1..],
                _ => break,
            }
        }
        let Some(name) = rest.first() else {
            return Ok(ExecResult::default());
        };

        if verify {
            if is_special_builtin(name)
                || self.registry.contains_key(name)
                || self.state.functions.contains_key(name)
            {
                return Ok(ExecResult::ok(format!("{name}\n")));
            }
            return Ok(ExecResult::with_code("", 1));
        }

        // Bypass functions: straight to builtins/registry.
        let cmd_args: Vec<String> = rest[1..].to_vec();
        if is_special_builtin(name) {
            let placeholder = SimpleCommand {
                assignments: vec![],
                words: vec![],
                redirects: vec![],
                line: self.state.line,
            };
            return Box::pin(self.run_special(name, &cmd_args, &placeholder)).await;
        }
        if let Some(builtin) = self.registry.get(name.as_str()).cloned() {
            return self.run_registry(builtin, &cmd_args).await;
        }
        Ok(ExecResult::err(
            self.diag(&format!("command: {name}: command not found")),
            127,
        ))
    }

    /// There is no process to replace; `exec cmd` runs the command and then
    /// ends the invocation with its status. `exec` alone is a no-op (its
    /// redirections were already applied like any command's).
    async fn builtin_exec(&mut self, args: &[String]) -> Result<ExecResult> {
        let Some(name) = args.first() else {
            return Ok(ExecResult::default());
        };
        let rest: Vec<String> = args[1..].to_vec();

        let mut result = if is_special_builtin(name) {
            let placeholder = SimpleCommand {
                assignments: vec![],
                words: vec![],
                redirects: vec![],
                line: self.state.line,
            };
            Box::pin(self.run_special(name, &rest, &placeholder)).await?
        } else if let Some(builtin) = self.registry.get(name.as_str()).cloned() {
            self.run_registry(builtin, &rest).await?
        } else {
            ExecResult::err(
                self.diag(&format!("exec: {name}: command not found")),
                127,
            )
        };
        result.control_flow = ControlFlow::Exit(result.exit_code);
        Ok(result)
    }

    // --- formatted output ---

    fn builtin_printf(&mut self, args: &[String]) -> Result<ExecResult> {
        let mut rest = args;
        let mut target_var: Option<String> = None;
        if rest.first().map(String::as_str) == Some("-v") {
            match rest.get(1) {
                Some(name) => {
                    target_var = Some(name.clone());
                    rest = &rest[2..];
                }
                None => {
                    return Ok(ExecResult::err(
                        self.diag("printf: -v: option requires an argument"),
                        2,
                    ));
                }
            }
        }

        let Some(format) = rest.first() else {
            return Ok(ExecResult::err(self.diag("printf: usage: printf format [arguments]"), 2));
        };
        let out = match format_printf(format, &rest[1..]) {
            Ok(out) => out,
            Err(message) => {
                return Ok(ExecResult::err(self.diag(&format!("printf: {message}")), 1));
            }
        };

        match target_var {
            Some(name) => {
                if let Err(err) = self.state.set_scalar(&name, out, AssignMode::default()) {
                    return Ok(ExecResult::err(self.diag(&err.message()), 1));
                }
                Ok(ExecResult::default())
            }
            None => Ok(ExecResult::ok(out)),
        }
    }
}

/// `declare -p` output for one cell.
fn declare_line(name: &str, cell: &super::state::Cell) -> String {
    let mut letters = String::new();
    match &cell.value {
        Some(Value::Indexed(_)) => letters.push('a'),
        Some(Value::Assoc(_)) => letters.push('A'),
        _ => {}
    }
    if cell.attrs.integer {
        letters.push('i');
    }
    if cell.attrs.lowercase {
        letters.push('l');
    }
    if cell.attrs.uppercase {
        letters.push('u');
    }
    if cell.attrs.nameref {
        letters.push('n');
    }
    if cell.attrs.readonly {
        letters.push('r');
    }
    if cell.attrs.exported {
        letters.push('x');
    }
    if letters.is_empty() {
        letters.push('-');
    }

    match &cell.value {
        None => format!("declare -{letters} {name}\n"),
        Some(Value::Scalar(s)) => format!("declare -{letters} {name}=\"{s}\"\n"),
        Some(Value::Indexed(map)) => {
            let body: Vec<String> = map.iter().map(|(k, v)| format!("[{k}]=\"{v}\"")).collect();
            format!("declare -{letters} {name}=({})\n", body.join(" "))
        }
        Some(Value::Assoc(map)) => {
            let body: Vec<String> = map.iter().map(|(k, v)| format!("[{k}]=\"{v}\"")).collect();
            format!("declare -{letters} {name}=({})\n", body.join(" "))
        }
    }
}

/// Accept `INT`, `SIGINT`, `int`; store the canonical bare name.
fn normalize_signal(signal: &str) -> String {
    let upper = signal.to_uppercase();
    upper.strip_prefix("SIG").unwrap_or(&upper).to_string()
}

/// Leading/trailing IFS-whitespace trim used by single-variable `read`.
fn trim_ifs_ws(line: &str, ifs: &str) -> String {
    let is_ws = |c: char| ifs.contains(c) && c.is_whitespace();
    line.trim_matches(is_ws).to_string()
}

/// The printf format engine: `%s %d %i %x %X %o %c %b %q %%` with flags,
/// width, and precision; the format cycles over remaining arguments.
pub(crate) fn format_printf(format: &str, args: &[String]) -> std::result::Result<String, String> {
    let mut out = String::new();
    let mut arg_index = 0;

    loop {
        let consumed_before = arg_index;
        let chars: Vec<char> = format.chars().collect();
        let mut i = 0;
        let mut used_directive = false;

        while i < chars.len() {
            let c = chars[i];
            if c == '\\' && i + 1 < chars.len() {
                out.push_str(&crate::parser::word::decode_ansi_c(&format!(
                    "\\{}",
                    chars[i + 1]
                )));
                i += 2;
                continue;
            }
            if c != '%' {
                out.push(c);
                i += 1;
                continue;
            }
            if chars.get(i + 1) == Some(&'%') {
                out.push('%');
                i += 2;
                continue;
            }

            // %[flags][width][.precision]conv
            let mut j = i + 1;
            let mut flags = String::new();
            while j < chars.len() && "-+ 0#".contains(chars[j]) {
                flags.push(chars[j]);
                j += 1;
            }
            let mut width = String::new();
            while j < chars.len() && chars[j].is_ascii_digit() {
                width.push(chars[j]);
                j += 1;
            }
            let mut precision: Option<usize> = None;
            if chars.get(j) == Some(&'.') {
                j += 1;
                let mut p = String::new();
                while j < chars.len() && chars[j].is_ascii_digit() {
                    p.push(chars[j]);
                    j += 1;
                }
                precision = Some(p.parse().unwrap_or(0));
            }
            let Some(&conv) = chars.get(j) else {
                return Err("missing format character".to_string());
            };

            let arg = args.get(arg_index).cloned().unwrap_or_default();
            if args.get(arg_index).is_some() {
                used_directive = true;
            }
            arg_index += 1;

            let width: usize = width.parse().unwrap_or(0);
            let left = flags.contains('-');
            let zero = flags.contains('0') && !left;

            let formatted = match conv {
                's' => {
                    let mut s = arg;
                    if let Some(p) = precision {
                        s = s.chars().take(p).collect();
                    }
                    s
                }
                'b' => crate::parser::word::decode_ansi_c(&arg),
                'q' => {
                    if arg.is_empty() {
                        "''".to_string()
                    } else if arg
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || "_-./=:%+@".contains(c))
                    {
                        arg
                    } else {
                        format!("'{}'", arg.replace('\'', "'\\''"))
                    }
                }
                'c' => arg.chars().next().map(String::from).unwrap_or_default(),
                'd' | 'i' => {
                    let n = parse_printf_int(&arg)?;
                    if zero {
                        let sign = if n < 0 { "-" } else { "" };
                        let digits = n.unsigned_abs().to_string();
                        let pad = width.saturating_sub(digits.len() + sign.len());
                        format!("{sign}{}{digits}", "0".repeat(pad))
                    } else {
                        n.to_string()
                    }
                }
                'u' => (parse_printf_int(&arg)? as u64).to_string(),
                'x' => format!("{:x}", parse_printf_int(&arg)?),
                'X' => format!("{:X}", parse_printf_int(&arg)?),
                'o' => format!("{:o}", parse_printf_int(&arg)?),
                other => return Err(format!("%{other}: invalid format character")),
            };

            // Width padding (numeric zero-padding handled above).
            let padded = if formatted.chars().count() >= width {
                formatted
            } else if left {
                let pad = width - formatted.chars().count();
                format!("{formatted}{}", " ".repeat(pad))
            } else {
                let pad = width - formatted.chars().count();
                format!("{}{formatted}", " ".repeat(pad))
            };
            out.push_str(&padded);
            i = j + 1;
        }

        // Cycle the format while arguments remain and progress is made.
        if arg_index >= args.len() || !used_directive || arg_index == consumed_before {
            break;
        }
    }
    Ok(out)
}

fn parse_printf_int(arg: &str) -> std::result::Result<i64, String> {
    let trimmed = arg.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    // A leading quote yields the character's code point.
    if let Some(rest) = trimmed.strip_prefix('\'').or_else(|| trimmed.strip_prefix('"')) {
        if let Some(c) = rest.chars().next() {
            return Ok(c as i64);
        }
    }
    crate::parser::arith::parse_number(trimmed, 0)
        .map_err(|_| format!("{arg}: invalid number"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printf_basic_conversions() {
        assert_eq!(format_printf("%s\n", &["hi".into()]).unwrap(), "hi\n");
        assert_eq!(format_printf("%d", &["42".into()]).unwrap(), "42");
        assert_eq!(format_printf("%x", &["255".into()]).unwrap(), "ff");
        assert_eq!(format_printf("%X", &["255".into()]).unwrap(), "FF");
        assert_eq!(format_printf("%o", &["8".into()]).unwrap(), "10");
        assert_eq!(format_printf("%%", &[]).unwrap(), "%");
        assert_eq!(format_printf("%c", &["abc".into()]).unwrap(), "a");
    }

    #[test]
    fn printf_width_and_precision() {
        assert_eq!(format_printf("%5d", &["42".into()]).unwrap(), "   42");
        assert_eq!(format_printf("%-5d|", &["42".into()]).unwrap(), "42   |");
        assert_eq!(format_printf("%05d", &["42".into()]).unwrap(), "00042");
        assert_eq!(format_printf("%05d", &["-42".into()]).unwrap(), "-0042");
        assert_eq!(format_printf("%.3s", &["abcdef".into()]).unwrap(), "abc");
    }

    #[test]
    fn printf_cycles_format_over_args() {
        assert_eq!(
            format_printf("%s-", &["a".into(), "b".into(), "c".into()]).unwrap(),
            "a-b-c-"
        );
    }

    #[test]
    fn printf_escapes_and_b() {
        assert_eq!(format_printf("a\\tb", &[]).unwrap(), "a\tb");
        assert_eq!(format_printf("%b", &["x\\ny".into()]).unwrap(), "x\ny");
    }

    #[test]
    fn printf_q_quotes_when_needed() {
        assert_eq!(format_printf("%q", &["plain".into()]).unwrap(), "plain");
        assert_eq!(format_printf("%q", &["a b".into()]).unwrap(), "'a b'");
        assert_eq!(format_printf("%q", &["".into()]).unwrap(), "''");
    }

    #[test]
    fn printf_missing_args_are_empty_or_zero() {
        assert_eq!(format_printf("[%s][%d]", &[]).unwrap(), "[][0]");
    }

    #[test]
    fn printf_char_code() {
        assert_eq!(format_printf("%d", &["'A".into()]).unwrap(), "65");
    }

    #[test]
    fn printf_bad_number_is_an_error() {
        assert!(format_printf("%d", &["xyz".into()]).is_err());
    }

    #[test]
    fn signal_normalization() {
        assert_eq!(normalize_signal("SIGINT"), "INT");
        assert_eq!(normalize_signal("exit"), "EXIT");
        assert_eq!(normalize_signal("Err"), "ERR");
    }
}
