//! Prompt text for the three oracles.

use std::fmt::Write;

use super::GenerationContext;
use crate::agent::types::{ErrorInfo, StepResult};
use crate::llm::Message;
use crate::sandbox::SandboxState;

pub fn planner(
    working_directory: &str,
    state: &SandboxState,
    history: &[Message],
    window: usize,
) -> String {
    let mut prompt = format!(
        "You are a Linux action planner for an Ubuntu Docker container with a root shell.\n\
         Current directory: '{working_directory}'\n\n\
         Sandbox state (partial listing):\n{}\n\n",
        state.summary()
    );

    let recent = &history[history.len().saturating_sub(window)..];
    if !recent.is_empty() {
        prompt.push_str("Recent conversation:\n");
        for msg in recent {
            let _ = writeln!(prompt, "- {}: {}", msg.role, msg.content);
        }
        prompt.push('\n');
    }

    prompt.push_str(
        "Break the user's request into clear, actionable steps.\n\n\
         PLANNING RULES:\n\
         - For simple single commands (ls, pwd, which), create ONE step only\n\
         - For installations, use \"Install X package\" format\n\
         - For file/folder operations, be specific about names\n\
         - For navigation, use \"Navigate to X directory\" format\n\
         - Each step must be one action; later steps may rely on earlier ones\n\
         - Output ONLY valid JSON: {\"steps\": [\"step1\", \"step2\", ...]}\n\n\
         EXAMPLES:\n\
         \"check if wget exists\" → {\"steps\": [\"Check if wget is installed\"]}\n\
         \"make project folder and go there\" → \
             {\"steps\": [\"Create project directory\", \"Navigate to project directory\"]}\n\
         \"install git and curl\" → \
             {\"steps\": [\"Install git package\", \"Install curl package\"]}\n\
         \"list files in current directory\" → {\"steps\": [\"List files in current directory\"]}",
    );
    prompt
}

pub fn command(context: &GenerationContext<'_>) -> String {
    let mut prompt = format!(
        "You generate exactly one Linux shell command for one step of a plan.\n\
         You are inside a minimal Ubuntu Docker container with a ROOT shell: never use sudo.\n\
         The current working directory is '{}'.\n\n\
         Sandbox state (partial listing):\n{}\n\n\
         Original request: \"{}\"\n\nPlan:\n",
        context.working_directory,
        context.state.summary(),
        context.request
    );
    for (i, step) in context.plan.iter().enumerate() {
        let marker = if i == context.step_index { "  <-- current step" } else { "" };
        let _ = writeln!(prompt, "{}. {step}{marker}", i + 1);
    }
    if !context.prior_results.is_empty() {
        prompt.push_str("\nAlready done:\n");
        for result in context.prior_results {
            let _ = writeln!(prompt, "- {}", result.describe());
        }
    }
    prompt.push_str(
        "\nRULES:\n\
         - Output ONLY a JSON object with one key: {\"command\": \"<the command>\"}\n\
         - The command must completely achieve the current step and nothing else\n\
         - Use relative paths inside the current directory; absolute paths for system directories\n\
         - To change directory output just `cd <path>`, never combined with other commands\n\
         - Commands must be non-interactive (no editors, no prompts)\n\n\
         EXAMPLES:\n\
         - 'Create directory my_data' → {\"command\": \"mkdir my_data\"}\n\
         - 'List all files including hidden ones' → {\"command\": \"ls -la\"}\n\
         - 'Navigate to /opt/app' → {\"command\": \"cd /opt/app\"}\n\
         - 'Write \\'Final report content.\\' into final_report.txt' → \
             {\"command\": \"echo 'Final report content.' > final_report.txt\"}\n\
         - 'Install nano package' → {\"command\": \"apt-get install -y nano\"}",
    );
    prompt
}

pub fn recovery(
    error: &ErrorInfo,
    original_request: &str,
    prior_results: &[StepResult],
    now: &str,
) -> String {
    let mut prompt = format!(
        "You are an error recovery specialist for an Ubuntu Docker container with a root shell.\n\n\
         ERROR ANALYSIS:\n\
         - Failed command: {}\n\
         - Error message: {}\n\
         - Exit code: {}\n\
         - Failed step: {}\n\
         - Current directory: {}\n\
         - Time: {now}\n\n\
         Sandbox state (partial listing):\n{}\n\n\
         ORIGINAL REQUEST: \"{original_request}\"\n",
        error.failed_command,
        error.error_message,
        error.exit_code,
        error.failed_step,
        error.working_directory,
        error.sandbox_state.summary(),
    );
    if !prior_results.is_empty() {
        prompt.push_str("\nPrevious successful steps:\n");
        for result in prior_results {
            let _ = writeln!(prompt, "- {}", result.describe());
        }
    }
    prompt.push_str(
        "\nCreate the minimal steps that fix ONLY this error. The failed command will be \
         retried unchanged afterwards.\n\n\
         COMMON PATTERNS:\n\
         - Missing package or command → Install the package that provides it\n\
         - Package not found → Update package lists first\n\
         - Directory does not exist → Create the missing directory\n\
         - Permission errors → Fix file permissions\n\n\
         RULES:\n\
         - Use specific package names mentioned in the error message\n\
         - Don't repeat steps that already succeeded\n\
         - Output ONLY JSON: {\"recovery_steps\": [\"fix1\", \"fix2\", ...]}\n\n\
         EXAMPLES:\n\
         Error \"python3-venv not available\" → \
             {\"recovery_steps\": [\"Install python3-venv package\"]}\n\
         Error \"curl: command not found\" → {\"recovery_steps\": [\"Install curl package\"]}\n\
         Error \"No such file or directory\" → \
             {\"recovery_steps\": [\"Create missing directory\"]}",
    );
    prompt
}
