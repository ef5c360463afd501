use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{AgentConfig, Config};
use crate::llm::Message;
use crate::oracle::{CommandGenerator, PlanRequest, Planner, RecoveryPlanner};
use crate::sandbox::{SandboxExecutor, StateTracker};

use super::error::PlanError;
use super::runner::{PlanOutcome, PlanRunner};
use super::types::{SessionContext, StepResult};

const EXIT_TOKENS: [&str; 3] = ["exit", "quit", "q"];

/// What a line of user input asks for.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Exit,
    Empty,
    Command(&'a str),
    Request(&'a str),
}

fn classify(line: &str) -> Input<'_> {
    let line = line.trim();
    if line.is_empty() {
        Input::Empty
    } else if EXIT_TOKENS.iter().any(|t| line.eq_ignore_ascii_case(t)) {
        Input::Exit
    } else if line.starts_with('/') {
        Input::Command(line)
    } else {
        Input::Request(line)
    }
}

/// Interactive session around one sandbox.
///
/// Owns the conversation history and the session working directory; each
/// request gets a fresh plan and a fresh [`SessionContext`].
pub struct AgentRuntime {
    config: AgentConfig,
    sandbox_name: String,
    sandbox: Arc<dyn SandboxExecutor>,
    planner: Arc<dyn Planner>,
    generator: Arc<dyn CommandGenerator>,
    recovery: Arc<dyn RecoveryPlanner>,
    working_directory: String,
    history: Vec<Message>,
}

impl AgentRuntime {
    pub fn new<O>(
        config: &Config,
        sandbox_name: impl Into<String>,
        sandbox: Arc<dyn SandboxExecutor>,
        oracle: Arc<O>,
    ) -> Self
    where
        O: Planner + CommandGenerator + RecoveryPlanner + 'static,
    {
        Self {
            config: config.agent.clone(),
            sandbox_name: sandbox_name.into(),
            sandbox,
            planner: oracle.clone(),
            generator: oracle.clone(),
            recovery: oracle,
            working_directory: config.sandbox.initial_directory.clone(),
            history: Vec::new(),
        }
    }

    pub fn working_directory(&self) -> &str {
        &self.working_directory
    }

    fn prompt(&self) -> String {
        format!("[{}:{}]$ ", self.sandbox_name, self.working_directory)
    }

    /// Reads requests from stdin until an exit token or end of input.
    pub async fn run(&mut self) -> Result<()> {
        self.run_lines(spawn_stdin_reader()).await
    }

    async fn run_lines(
        &mut self,
        mut lines: mpsc::Receiver<std::io::Result<String>>,
    ) -> Result<()> {
        info!("Session started in {}", self.working_directory);
        println!("Type a request in plain language, /help for commands, exit to quit.");

        loop {
            print!("{}", self.prompt());
            std::io::stdout().flush()?;

            let Some(line) = lines.recv().await else {
                println!();
                break;
            };
            if !self.handle_line(&line?).await {
                break;
            }
        }

        info!("Session ended");
        Ok(())
    }

    /// Handles one line of input. Returns `false` when the session should end.
    async fn handle_line(&mut self, line: &str) -> bool {
        match classify(line) {
            Input::Exit => return false,
            Input::Empty => {}
            Input::Command(command) => println!("{}", self.handle_command(command).await),
            Input::Request(request) => match self.handle_request(request).await {
                Ok(outcome) => match outcome.abort {
                    None => println!("✓ Done (in {})", outcome.working_directory),
                    Some(e) => println!("✗ {e}"),
                },
                Err(e) => println!("✗ {e}"),
            },
        }
        true
    }

    // ── Slash commands ────────────────────────────────────

    /// Handles a slash command. These never reach an oracle.
    async fn handle_command(&mut self, body: &str) -> String {
        let command = body.split_whitespace().next().unwrap_or(body).to_lowercase();
        info!("Slash command: {command}");

        match command.as_str() {
            "/help" => self.cmd_help(),
            "/pwd" => self.working_directory.clone(),
            "/state" => {
                let state = StateTracker::new(self.sandbox.as_ref(), self.config.snapshot_limit)
                    .snapshot(&self.working_directory)
                    .await;
                if state.is_empty() {
                    format!("Nothing visible in {}", self.working_directory)
                } else {
                    state.summary()
                }
            }
            "/history" => self.cmd_history(),
            "/reset" => {
                let count = self.history.len();
                self.history.clear();
                format!("Conversation history cleared ({count} entries)")
            }
            _ => format!("Unknown command: {command}\nType /help for available commands."),
        }
    }

    fn cmd_history(&self) -> String {
        if self.history.is_empty() {
            return "(no history)".to_string();
        }
        self.history
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn cmd_help(&self) -> String {
        "\
Commands:\n\
  /pwd      Show the sandbox working directory\n\
  /state    List directories, files and packages the agent can see\n\
  /history  Show the conversation history sent to the planner\n\
  /reset    Clear the conversation history\n\
  /help     This message\n\
  exit      Stop the session (also: quit, q)"
            .to_string()
    }

    // ── Requests ─────────────────────────────────────────

    /// Plans and runs one request.
    ///
    /// Only a planning failure is an `Err`; an aborted plan is reported in
    /// the outcome, and the session still moves to wherever it stopped.
    async fn handle_request(&mut self, request: &str) -> Result<PlanOutcome, PlanError> {
        info!("Request: {request}");
        let tracker = StateTracker::new(self.sandbox.as_ref(), self.config.snapshot_limit);
        let state = tracker.snapshot(&self.working_directory).await;

        // Prior turns only; the request itself is passed separately
        let plan = self
            .planner
            .plan(&PlanRequest {
                user_request: request,
                working_directory: &self.working_directory,
                history: &self.history,
                state: &state,
            })
            .await;
        let plan = match plan {
            Ok(plan) if !plan.is_empty() => plan,
            Ok(_) => {
                warn!("Planner returned no steps");
                return Err(PlanError::Planning("no steps were planned".to_string()));
            }
            Err(e) => {
                warn!("Planning failed: {e}");
                return Err(PlanError::Planning(e.to_string()));
            }
        };
        self.history.push(Message::user(request));

        println!("Plan:");
        for (i, step) in plan.iter().enumerate() {
            println!("  {}. {step}", i + 1);
        }

        let mut ctx = SessionContext::new(request, self.working_directory.clone());
        let runner = PlanRunner::new(
            self.sandbox.as_ref(),
            self.generator.as_ref(),
            self.recovery.as_ref(),
            self.config.snapshot_limit,
            self.config.max_recovery_steps,
        );
        let outcome = runner.run(&mut ctx, &plan).await;

        for entry in &ctx.log {
            print_result(entry);
            self.history.push(Message::assistant(entry.describe()));
        }
        self.working_directory = outcome.working_directory.clone();
        Ok(outcome)
    }
}

/// Reads stdin lines on a plain thread.
///
/// A blocking read cannot be cancelled, so it must not live on the tokio
/// blocking pool: runtime shutdown would wait for the next Enter. The thread
/// is detached and dies with the process.
fn spawn_stdin_reader() -> mpsc::Receiver<std::io::Result<String>> {
    let (tx, rx) = mpsc::channel(1);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn print_result(entry: &StepResult) {
    println!("  ✓ [{}] {}", entry.kind, entry.describe());
    for line in entry.output.lines() {
        println!("      {line}");
    }
}
