//! Sandbash CLI - command line interface for sandboxed script execution
//!
//! Usage:
//!   sandbash -c 'echo hello'        # Execute a command string
//!   sandbash script.sh arg1 arg2    # Execute a script file
//!   echo 'echo hi' | sandbash       # Execute stdin
//!
//! The script runs against an in-memory filesystem; nothing on the host is
//! touched. `--json` serializes the captured result instead of printing
//! the streams.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;

use sandbash::logging::{format_script_for_log, LogConfig};

/// Sandboxed bash interpreter
#[derive(Parser, Debug)]
#[command(name = "sandbash")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Execute the given command string
    #[arg(short = 'c', value_name = "SCRIPT")]
    command: Option<String>,

    /// Initial working directory inside the sandbox
    #[arg(long, value_name = "DIR")]
    cwd: Option<String>,

    /// Print {"stdout", "stderr", "exitCode"} as JSON
    #[arg(long)]
    json: bool,

    /// Enable errexit before the script runs (like `set -e`)
    #[arg(short = 'e', long = "errexit")]
    errexit: bool,

    /// Script file to execute
    #[arg(value_name = "FILE")]
    script: Option<PathBuf>,

    /// Arguments passed to the script as $1, $2, ...
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

#[derive(Serialize)]
struct JsonResult<'a> {
    stdout: &'a str,
    stderr: &'a str,
    #[serde(rename = "exitCode")]
    exit_code: i32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (script, name) = if let Some(command) = &args.command {
        (command.clone(), "sandbash".to_string())
    } else if let Some(path) = &args.script {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read script: {}", path.display()))?;
        (text, path.display().to_string())
    } else {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("failed to read script from stdin")?;
        (text, "sandbash".to_string())
    };

    let script = if args.errexit {
        format!("set -e\n{script}")
    } else {
        script
    };

    let mut builder = sandbash::Bash::builder()
        .script_name(&name)
        .args(args.args.clone());
    if let Some(cwd) = &args.cwd {
        builder = builder.cwd(cwd);
    }
    let mut bash = builder.build();

    let result = match bash.exec(&script).await {
        Ok(result) => result,
        Err(err) => {
            // Host-level fault: report without leaking script content.
            let summary = format_script_for_log(&script, &LogConfig::new());
            eprintln!("sandbash: {err} while running {summary}");
            std::process::exit(1);
        }
    };

    if args.json {
        let json = serde_json::to_string(&JsonResult {
            stdout: &result.stdout,
            stderr: &result.stderr,
            exit_code: result.exit_code,
        })?;
        println!("{json}");
    } else {
        print!("{}", result.stdout);
        if !result.stderr.is_empty() {
            eprint!("{}", result.stderr);
        }
    }

    std::process::exit(result.exit_code.clamp(0, 255));
}
