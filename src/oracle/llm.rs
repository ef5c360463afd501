//! LLM-backed implementation of all three oracles.
//!
//! Every reply is expected to be one JSON object. Models sometimes wrap it
//! in prose, so the outermost `{...}` is cut out before parsing. Anything
//! that does not validate is an error, never a partial result.

use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::{prompts, CommandGenerator, GenerationContext, PlanRequest, Planner, RecoveryPlanner};
use crate::agent::intent::normalize_command;
use crate::agent::types::{ErrorInfo, Step, StepResult};
use crate::llm::{CompletionOptions, LlmClient, Message};

const PLANNER_TEMPERATURE: f32 = 0.1;
const COMMAND_TEMPERATURE: f32 = 0.0;
const RECOVERY_TEMPERATURE: f32 = 0.2;

#[derive(Debug, Deserialize)]
struct PlanReply {
    steps: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CommandReply {
    command: String,
}

#[derive(Debug, Deserialize)]
struct RecoveryReply {
    recovery_steps: Vec<String>,
}

pub struct LlmOracle {
    client: Arc<dyn LlmClient>,
    history_window: usize,
}

impl LlmOracle {
    pub fn new(client: Arc<dyn LlmClient>, history_window: usize) -> Self {
        Self {
            client,
            history_window,
        }
    }

    async fn ask(&self, system_prompt: &str, user: &str, temperature: f32) -> Result<String> {
        let response = self
            .client
            .complete(
                system_prompt,
                &[Message::user(user)],
                CompletionOptions::json(temperature),
            )
            .await?;
        debug!(
            "Oracle reply ({} in / {} out tokens): {}",
            response.input_tokens, response.output_tokens, response.text
        );
        Ok(response.text)
    }
}

#[async_trait]
impl Planner for LlmOracle {
    async fn plan(&self, request: &PlanRequest<'_>) -> Result<Vec<Step>> {
        let system = prompts::planner(
            request.working_directory,
            request.state,
            request.history,
            self.history_window,
        );
        let text = self.ask(&system, request.user_request, PLANNER_TEMPERATURE).await?;
        let reply: PlanReply = parse_reply(&text)?;
        let steps = validate_steps(reply.steps)?;
        info!("Planned {} step(s)", steps.len());
        Ok(steps)
    }
}

#[async_trait]
impl CommandGenerator for LlmOracle {
    async fn generate(&self, context: &GenerationContext<'_>) -> Result<String> {
        let system = prompts::command(context);
        let text = self
            .ask(&system, context.step().as_str(), COMMAND_TEMPERATURE)
            .await?;
        let reply: CommandReply = parse_reply(&text)?;
        let raw = reply.command.trim();
        if raw.is_empty() {
            bail!("model returned an empty command");
        }
        let command = normalize_command(raw);
        if command != raw {
            debug!("Normalized command: {raw:?} → {command:?}");
        }
        Ok(command)
    }
}

#[async_trait]
impl RecoveryPlanner for LlmOracle {
    async fn recover(
        &self,
        error: &ErrorInfo,
        original_request: &str,
        prior_results: &[StepResult],
    ) -> Result<Vec<Step>> {
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        let system = prompts::recovery(error, original_request, prior_results, &now);
        let text = self
            .ask(&system, "Propose recovery steps for this error.", RECOVERY_TEMPERATURE)
            .await?;
        let reply: RecoveryReply = parse_reply(&text)?;
        validate_steps(reply.recovery_steps)
    }
}

/// Cuts the outermost `{...}` out of `text`.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn parse_reply<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T> {
    let json =
        extract_json_object(text).ok_or_else(|| anyhow!("no JSON object in reply: {text:?}"))?;
    serde_json::from_str(json).map_err(|e| anyhow!("malformed reply ({e}): {json}"))
}

/// Every description must be non-empty; one bad entry rejects the whole list.
fn validate_steps(descriptions: Vec<String>) -> Result<Vec<Step>> {
    descriptions
        .iter()
        .map(|d| Step::new(d).ok_or_else(|| anyhow!("blank step in {descriptions:?}")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::llm::LlmResponse;
    use crate::sandbox::SandboxState;

    /// Replays one canned reply and records the prompts it was given.
    struct CannedClient {
        reply: std::result::Result<String, String>,
        seen: Mutex<Vec<(String, Vec<Message>, CompletionOptions)>>,
    }

    impl CannedClient {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing(error: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(error.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmClient for CannedClient {
        async fn complete(
            &self,
            system_prompt: &str,
            messages: &[Message],
            options: CompletionOptions,
        ) -> Result<LlmResponse> {
            self.seen
                .lock()
                .unwrap()
                .push((system_prompt.to_string(), messages.to_vec(), options));
            match &self.reply {
                Ok(text) => Ok(LlmResponse {
                    text: text.clone(),
                    input_tokens: 0,
                    output_tokens: 0,
                }),
                Err(e) => Err(anyhow!("{e}")),
            }
        }

        fn description(&self) -> String {
            "canned".to_string()
        }
    }

    fn plan_request<'a>(state: &'a SandboxState) -> PlanRequest<'a> {
        PlanRequest {
            user_request: "make project folder and go there",
            working_directory: "/",
            history: &[],
            state,
        }
    }

    #[test]
    fn test_extract_json_object() {
        assert_eq!(extract_json_object("{\"a\": 1}"), Some("{\"a\": 1}"));
        assert_eq!(
            extract_json_object("Here you go: {\"a\": {\"b\": 2}} hope it helps"),
            Some("{\"a\": {\"b\": 2}}")
        );
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
    }

    #[test]
    fn test_validate_steps_rejects_blank_entries() {
        assert!(validate_steps(vec!["ok".into(), "  ".into()]).is_err());
        let steps = validate_steps(vec![" Create dir ".into()]).unwrap();
        assert_eq!(steps[0].as_str(), "Create dir");
    }

    #[tokio::test]
    async fn test_plan_parses_steps() {
        let client = CannedClient::replying(
            r#"{"steps": ["Create project directory", "Navigate to project directory"]}"#,
        );
        let oracle = LlmOracle::new(client.clone(), 6);
        let state = SandboxState::default();

        let steps = oracle.plan(&plan_request(&state)).await.unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].as_str(), "Navigate to project directory");

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen[0].1[0].content, "make project folder and go there");
        assert!(seen[0].2.json);
        assert_eq!(seen[0].2.temperature, Some(PLANNER_TEMPERATURE));
    }

    #[tokio::test]
    async fn test_plan_rejects_malformed_output() {
        let state = SandboxState::default();
        for reply in [
            "I think you should make a folder",
            r#"{"steps": "mkdir project"}"#,
            r#"{"steps": ["ok", 3]}"#,
            r#"{"steps": ["ok", ""]}"#,
            r#"{"linuxcommand": ["x"]}"#,
        ] {
            let oracle = LlmOracle::new(CannedClient::replying(reply), 6);
            assert!(oracle.plan(&plan_request(&state)).await.is_err(), "{reply}");
        }
    }

    #[tokio::test]
    async fn test_plan_propagates_transport_error() {
        let oracle = LlmOracle::new(CannedClient::failing("connection refused"), 6);
        let state = SandboxState::default();
        let err = oracle.plan(&plan_request(&state)).await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_generate_normalizes_command() {
        let client = CannedClient::replying(r#"{"command": "sudo apt install nano"}"#);
        let oracle = LlmOracle::new(client.clone(), 6);
        let plan = crate::agent::testing::steps(&["Install nano package"]);
        let state = SandboxState::default();
        let context = GenerationContext {
            request: "install nano",
            plan: &plan,
            step_index: 0,
            prior_results: &[],
            state: &state,
            working_directory: "/",
        };

        let command = oracle.generate(&context).await.unwrap();
        assert_eq!(command, "DEBIAN_FRONTEND=noninteractive apt-get install -y nano");
        let seen = client.seen.lock().unwrap();
        assert_eq!(seen[0].1[0].content, "Install nano package");
        assert_eq!(seen[0].2.temperature, Some(COMMAND_TEMPERATURE));
    }

    #[tokio::test]
    async fn test_generate_rejects_empty_command() {
        let oracle = LlmOracle::new(CannedClient::replying(r#"{"command": "   "}"#), 6);
        let plan = crate::agent::testing::steps(&["List files"]);
        let state = SandboxState::default();
        let context = GenerationContext {
            request: "ls",
            plan: &plan,
            step_index: 0,
            prior_results: &[],
            state: &state,
            working_directory: "/",
        };
        assert!(oracle.generate(&context).await.is_err());
    }

    #[tokio::test]
    async fn test_recover_parses_steps() {
        let client = CannedClient::replying(
            r#"Sure! {"recovery_steps": ["Install pytest using pip3"]}"#,
        );
        let oracle = LlmOracle::new(client.clone(), 6);
        let error = ErrorInfo {
            failed_command: "apt-get install -y pytest".to_string(),
            error_message: "E: Unable to locate package pytest".to_string(),
            exit_code: 100,
            failed_step: Step::new("Install pytest").unwrap(),
            working_directory: "/".to_string(),
            sandbox_state: SandboxState::default(),
        };

        let steps = oracle.recover(&error, "install pytest", &[]).await.unwrap();
        assert_eq!(steps, vec![Step::new("Install pytest using pip3").unwrap()]);
        let seen = client.seen.lock().unwrap();
        assert!(seen[0].0.contains("E: Unable to locate package pytest"));
        assert_eq!(seen[0].2.temperature, Some(RECOVERY_TEMPERATURE));
    }

    #[tokio::test]
    async fn test_recover_empty_list_is_ok() {
        let oracle = LlmOracle::new(CannedClient::replying(r#"{"recovery_steps": []}"#), 6);
        let error = ErrorInfo {
            failed_command: "false".to_string(),
            error_message: String::new(),
            exit_code: 1,
            failed_step: Step::new("x").unwrap(),
            working_directory: "/".to_string(),
            sandbox_state: SandboxState::default(),
        };
        // An empty plan is the controller's call, not a parse error
        assert!(oracle.recover(&error, "x", &[]).await.unwrap().is_empty());
    }
}
