//! Command registry
//!
//! The dispatch contract between the executor and command implementations:
//! a command gets argv, stdin bytes, the exported environment, the working
//! directory, the filesystem handle, and the optional network adapter; it
//! returns captured stdout, stderr, and an exit status. Commands here never
//! touch interpreter state — state-mutating builtins live inside the
//! interpreter.

mod cat;
mod echo;
mod flow;
mod navigation;
mod seq;

pub use cat::Cat;
pub use echo::Echo;
pub use flow::{Colon, False, True};
pub use navigation::Pwd;
pub use seq::Seq;
pub use test::{Bracket, Test};

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::fs::FileSystem;
use crate::interpreter::ExecResult;
use crate::network::NetworkAdapter;

/// Context for command execution.
pub struct Context<'a> {
    /// Arguments, not including the command name.
    pub args: &'a [String],
    /// Standard input bytes (drained from the surrounding pipe or
    /// redirection when the command declares it reads stdin).
    pub stdin: &'a str,
    /// Exported variables.
    pub env: &'a HashMap<String, String>,
    /// Current working directory.
    pub cwd: &'a Path,
    /// Virtual filesystem.
    pub fs: Arc<dyn FileSystem>,
    /// Optional network adapter, already behind its allowlist.
    pub net: Option<Arc<dyn NetworkAdapter>>,
}

impl Context<'_> {
    /// Resolve an operand path against the working directory.
    pub fn resolve(&self, path: &str) -> std::path::PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.cwd.join(p)
        }
    }
}

/// Trait for registry commands.
#[async_trait]
pub trait Builtin: Send + Sync {
    /// Execute the command.
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult>;

    /// Whether the command consumes stdin. Consuming commands drain the
    /// surrounding buffer; others leave it for the next reader.
    fn wants_stdin(&self) -> bool {
        false
    }
}

/// Name-to-implementation mapping used by the executor.
pub type CommandRegistry = HashMap<String, Arc<dyn Builtin>>;

/// The baseline registry: the utilities scripts lean on for control flow
/// and text plumbing. Hosts extend or replace this map freely.
pub fn default_registry() -> CommandRegistry {
    let mut registry: CommandRegistry = HashMap::new();
    registry.insert("echo".to_string(), Arc::new(Echo));
    registry.insert("cat".to_string(), Arc::new(Cat));
    registry.insert("true".to_string(), Arc::new(True));
    registry.insert("false".to_string(), Arc::new(False));
    registry.insert(":".to_string(), Arc::new(Colon));
    registry.insert("pwd".to_string(), Arc::new(Pwd));
    registry.insert("test".to_string(), Arc::new(Test));
    registry.insert("[".to_string(), Arc::new(Bracket));
    registry.insert("seq".to_string(), Arc::new(Seq));
    registry
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests_support {
    use super::*;
    use crate::fs::MemFs;

    /// Run a builtin against a fresh in-memory filesystem.
    pub async fn run(builtin: &dyn Builtin, args: &[&str], stdin: &str) -> ExecResult {
        run_with_fs(builtin, args, stdin, Arc::new(MemFs::new())).await
    }

    pub async fn run_with_fs(
        builtin: &dyn Builtin,
        args: &[&str],
        stdin: &str,
        fs: Arc<dyn FileSystem>,
    ) -> ExecResult {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let env = HashMap::new();
        let ctx = Context {
            args: &args,
            stdin,
            env: &env,
            cwd: Path::new("/home/user"),
            fs,
            net: None,
        };
        builtin.execute(ctx).await.unwrap()
    }
}
