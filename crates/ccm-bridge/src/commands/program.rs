//! Handler that forwards a command to the cluster manager executable.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use clap::{Arg, ArgMatches};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::bridge::protocol::Kind;
use crate::error::{ExecutionError, ValidationError};
use crate::registry::CommandHandler;

const NODE_ARG: &str = "node";
const ARGS_ARG: &str = "args";

/// How long stderr keeps being read after the command exits.
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Runs `<program> [node] <command> <args...>`.
pub struct ProgramCmd {
    program: PathBuf,
    kind: Kind,
    name: &'static str,
    requires_target: bool,
    argv: Vec<String>,
}

impl ProgramCmd {
    pub fn new(program: PathBuf, kind: Kind, name: &'static str) -> Self {
        Self {
            program,
            kind,
            name,
            requires_target: false,
            argv: Vec::new(),
        }
    }

    /// Refuse to run without at least one argument after the command name.
    pub fn requiring_target(mut self) -> Self {
        self.requires_target = true;
        self
    }

    /// Arguments passed to the program, available after `validate`.
    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

#[async_trait::async_trait]
impl CommandHandler for ProgramCmd {
    fn parser(&self) -> clap::Command {
        let cmd = clap::Command::new(self.name)
            .no_binary_name(true)
            .disable_help_flag(true)
            .disable_version_flag(true);

        let cmd = match self.kind {
            Kind::Node => cmd.arg(Arg::new(NODE_ARG).required(true).value_name("NODE")),
            Kind::Cluster => cmd,
        };

        cmd.arg(
            Arg::new(ARGS_ARG)
                .num_args(0..)
                .trailing_var_arg(true)
                .allow_hyphen_values(true),
        )
    }

    fn validate(&mut self, options: &ArgMatches) -> Result<(), ValidationError> {
        let node = match self.kind {
            Kind::Node => options.get_one::<String>(NODE_ARG).cloned(),
            Kind::Cluster => None,
        };
        if let Some(node) = &node
            && (node.is_empty() || node.starts_with('-'))
        {
            return Err(ValidationError::new(
                self.name,
                format!("invalid node name '{node}'"),
            ));
        }

        let args: Vec<String> = options
            .get_many::<String>(ARGS_ARG)
            .map(|values| values.cloned().collect())
            .unwrap_or_default();
        if self.requires_target && args.is_empty() {
            return Err(ValidationError::new(
                self.name,
                "expected at least one argument",
            ));
        }

        self.argv = node
            .into_iter()
            .chain([self.name.to_string()])
            .chain(args)
            .collect();
        Ok(())
    }

    async fn run(&mut self) -> Result<(), ExecutionError> {
        tracing::debug!(program = %self.program.display(), argv = ?self.argv, "Running command");

        // stdin is the frame channel and must never reach the child.
        let mut child = Command::new(&self.program)
            .args(&self.argv)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExecutionError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        // stderr is the sentinel channel; route the child's diagnostics into
        // the log instead.
        let drain = child.stderr.take().map(|stderr| {
            let command = self.name;
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).split(b'\n');
                while let Ok(Some(line)) = lines.next_segment().await {
                    tracing::info!(
                        target: "ccm_bridge::command",
                        command,
                        "{}",
                        String::from_utf8_lossy(&line)
                    );
                }
            })
        });

        let status = child.wait().await;

        // A daemon started by the command may hold the pipe open forever.
        // Give the drain a moment to catch the child's last lines, then drop it.
        if let Some(mut drain) = drain
            && tokio::time::timeout(DRAIN_GRACE, &mut drain).await.is_err()
        {
            drain.abort();
        }

        let status = status?;
        if !status.success() {
            return Err(ExecutionError::Failed {
                command: self.argv.join(" "),
                status,
            });
        }
        Ok(())
    }
}
