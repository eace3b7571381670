//! Bounded retry with model self-correction.
//!
//! Each structured-generation stage wraps one model call plus a parse step
//! in [`run_with_retry`]. On a failed attempt the controller issues a
//! separate meta call asking the model to diagnose its own malformed output
//! and propose an improved prompt; the improved prompt replaces the last
//! user message for the next attempt. Conversation state is an immutable
//! value so every attempt is independently replayable.
//!
//! This layer never falls back silently: exhaustion surfaces as
//! [`GenerationError::Exhausted`] and the orchestrator above decides whether
//! a deterministic default substitutes for the stage.

use tracing::{debug, warn};

use crate::config::RetryPolicy;
use crate::error::{GenerationError, Result};
use crate::json_repair;
use crate::model::{ChatMessage, ModelClient};

/// Message history for one generation stage, plus the attempt counter.
/// All mutation returns a new value.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    attempt: u32,
}

impl Conversation {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            attempt: 1,
        }
    }

    pub fn from_user_prompt(prompt: impl Into<String>) -> Self {
        Self::new(vec![ChatMessage::user(prompt)])
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    fn last_user_content(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }

    /// Next attempt with the last user message replaced wholesale.
    fn with_replaced_prompt(&self, content: String) -> Self {
        let mut messages = self.messages.clone();
        if let Some(last) = messages.iter_mut().rev().find(|m| m.role == "user") {
            last.content = content;
        } else {
            messages.push(ChatMessage::user(content));
        }
        Self {
            messages,
            attempt: self.attempt + 1,
        }
    }

    /// Next attempt with an instruction appended to the last user message.
    fn with_appended_instruction(&self, instruction: &str) -> Self {
        let mut messages = self.messages.clone();
        if let Some(last) = messages.iter_mut().rev().find(|m| m.role == "user") {
            last.content = format!("{}\n\n{}", last.content, instruction);
        } else {
            messages.push(ChatMessage::user(instruction));
        }
        Self {
            messages,
            attempt: self.attempt + 1,
        }
    }
}

const GENERIC_RETRY_INSTRUCTION: &str = "IMPORTANT: Your previous response could not be parsed. \
Respond with valid JSON only. Balance all brackets and braces, quote every key, \
and do not include any text outside the JSON object.";

/// Runs `parse_fn` over model output, retrying up to `policy.max_attempts`
/// times. The model is invoked at most `max_attempts` times for generation;
/// meta diagnosis calls are extra and best-effort.
pub async fn run_with_retry<M, T, F>(
    client: &M,
    conversation: Conversation,
    parse_fn: F,
    policy: &RetryPolicy,
    task: &str,
) -> Result<T>
where
    M: ModelClient,
    F: Fn(&str) -> Option<T>,
{
    let mut conversation = conversation;
    let mut last_error = String::new();

    for attempt in 1..=policy.max_attempts {
        let temperature = if attempt == 1 {
            policy.first_attempt_temperature
        } else {
            policy.retry_temperature
        };
        debug!(task, attempt, temperature, "generation attempt");

        let response = client
            .generate(conversation.messages(), temperature, policy.max_tokens)
            .await?;

        if response.content.trim().is_empty() {
            last_error = GenerationError::EmptyContent.to_string();
        } else {
            match parse_fn(&response.content) {
                Some(parsed) => {
                    debug!(task, attempt, "parse succeeded");
                    return Ok(parsed);
                }
                None => {
                    last_error = format!(
                        "output did not parse into the expected structure (preview: {})",
                        preview(&response.content)
                    );
                }
            }
        }

        warn!(task, attempt, error = %last_error, "attempt failed");
        if attempt < policy.max_attempts {
            conversation =
                improve_conversation(client, &conversation, &last_error, policy).await;
        }
    }

    Err(GenerationError::Exhausted {
        task: task.to_string(),
        attempts: policy.max_attempts,
        last_error,
    })
}

/// Asks the model to diagnose the failure and propose a replacement prompt.
/// Any failure here degrades to appending a generic format instruction; the
/// attempt itself is never consumed by a broken meta call.
async fn improve_conversation<M: ModelClient>(
    client: &M,
    conversation: &Conversation,
    error: &str,
    policy: &RetryPolicy,
) -> Conversation {
    let meta_prompt = format!(
        "You previously attempted a generation task and the output could not be used.\n\n\
         Original prompt:\n{original}\n\n\
         What went wrong: {error}\n\n\
         Diagnose the failure, then respond with JSON of the form:\n\
         {{\"diagnosis\": \"...\", \"improved_prompt\": \"a full replacement prompt that avoids the failure\"}}",
        original = preview(conversation.last_user_content()),
    );
    let meta_messages = [ChatMessage::user(meta_prompt)];

    match client
        .generate(&meta_messages, policy.retry_temperature, policy.max_tokens)
        .await
    {
        Ok(response) => {
            let map = json_repair::extract_and_repair(&response.content);
            match json_repair::str_field(&map, "improved_prompt") {
                Some(improved) => {
                    debug!("self-correction produced an improved prompt");
                    conversation.with_replaced_prompt(improved)
                }
                None => conversation.with_appended_instruction(GENERIC_RETRY_INSTRUCTION),
            }
        }
        Err(err) => {
            warn!(error = %err, "meta diagnosis call failed, appending generic instruction");
            conversation.with_appended_instruction(GENERIC_RETRY_INSTRUCTION)
        }
    }
}

fn preview(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= 400 {
        trimmed.to_string()
    } else {
        let mut end = 400;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &trimmed[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::model::ModelResponse;
    use std::sync::Mutex;

    /// Replays a fixed list of responses and records every prompt it saw.
    struct ScriptedClient {
        responses: Mutex<Vec<String>>,
        calls: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<&str>) -> Self {
            let mut responses: Vec<String> =
                responses.into_iter().map(|s| s.to_string()).collect();
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Vec<ChatMessage>> {
            self.calls.lock().unwrap().clone()
        }

        /// Calls whose prompt is not a diagnosis meta-prompt.
        fn generation_calls(&self) -> usize {
            self.calls()
                .iter()
                .filter(|msgs| {
                    !msgs
                        .last()
                        .map(|m| m.content.starts_with("You previously attempted"))
                        .unwrap_or(false)
                })
                .count()
        }
    }

    impl ModelClient for ScriptedClient {
        async fn generate(
            &self,
            messages: &[ChatMessage],
            _temperature: f32,
            _max_tokens: u32,
        ) -> Result<ModelResponse> {
            self.calls.lock().unwrap().push(messages.to_vec());
            let content = self.responses.lock().unwrap().pop().unwrap_or_default();
            Ok(ModelResponse {
                content,
                tokens_used: 10,
            })
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::default()
    }

    #[tokio::test]
    async fn test_success_on_first_attempt_calls_once() {
        let client = ScriptedClient::new(vec![r#"{"ok": true}"#]);
        let result: Result<bool> = run_with_retry(
            &client,
            Conversation::from_user_prompt("p"),
            |content| {
                let map = json_repair::extract_and_repair(content);
                json_repair::bool_field(&map, "ok")
            },
            &policy(),
            "stage",
        )
        .await;
        assert!(result.unwrap());
        assert_eq!(client.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_always_failing_parse_exhausts_at_max_attempts() {
        let client = ScriptedClient::new(vec!["junk"; 8]);
        let result: Result<bool> = run_with_retry(
            &client,
            Conversation::from_user_prompt("p"),
            |_| None,
            &policy(),
            "stage",
        )
        .await;
        match result {
            Err(GenerationError::Exhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected exhaustion, got {other:?}"),
        }
        // Exactly max_attempts generation calls; diagnosis calls are separate.
        assert_eq!(client.generation_calls(), 3);
        assert_eq!(client.calls().len(), 5);
    }

    #[tokio::test]
    async fn test_short_circuits_on_second_attempt() {
        let client = ScriptedClient::new(vec![
            "not json",
            r#"{"improved_prompt": "try again with valid JSON"}"#,
            r#"{"ok": true}"#,
        ]);
        let result: Result<bool> = run_with_retry(
            &client,
            Conversation::from_user_prompt("p"),
            |content| {
                let map = json_repair::extract_and_repair(content);
                json_repair::bool_field(&map, "ok")
            },
            &policy(),
            "stage",
        )
        .await;
        assert!(result.unwrap());
        assert_eq!(client.generation_calls(), 2);
    }

    #[tokio::test]
    async fn test_improved_prompt_replaces_last_user_message() {
        let client = ScriptedClient::new(vec![
            "junk",
            r#"{"diagnosis": "bad", "improved_prompt": "REPLACEMENT"}"#,
            r#"{"ok": true}"#,
        ]);
        let _: Result<bool> = run_with_retry(
            &client,
            Conversation::from_user_prompt("ORIGINAL"),
            |content| {
                let map = json_repair::extract_and_repair(content);
                json_repair::bool_field(&map, "ok")
            },
            &policy(),
            "stage",
        )
        .await;
        let calls = client.calls();
        let second_generation = calls.last().unwrap();
        assert_eq!(second_generation.last().unwrap().content, "REPLACEMENT");
    }

    #[tokio::test]
    async fn test_meta_without_improved_prompt_appends_instruction() {
        let client = ScriptedClient::new(vec![
            "junk",
            "also junk from the diagnosis call",
            r#"{"ok": true}"#,
        ]);
        let _: Result<bool> = run_with_retry(
            &client,
            Conversation::from_user_prompt("ORIGINAL"),
            |content| {
                let map = json_repair::extract_and_repair(content);
                json_repair::bool_field(&map, "ok")
            },
            &policy(),
            "stage",
        )
        .await;
        let calls = client.calls();
        let second_generation = calls.last().unwrap();
        let content = &second_generation.last().unwrap().content;
        assert!(content.starts_with("ORIGINAL"));
        assert!(content.contains("valid JSON"));
    }

    #[tokio::test]
    async fn test_empty_content_counts_as_attempt_failure() {
        let client = ScriptedClient::new(vec![
            "   ",
            "diagnosis junk",
            r#"{"ok": true}"#,
        ]);
        let result: Result<bool> = run_with_retry(
            &client,
            Conversation::from_user_prompt("p"),
            |content| {
                let map = json_repair::extract_and_repair(content);
                json_repair::bool_field(&map, "ok")
            },
            &policy(),
            "stage",
        )
        .await;
        assert!(result.unwrap());
        assert_eq!(client.generation_calls(), 2);
    }

    #[tokio::test]
    async fn test_all_empty_responses_exhaust_with_empty_content_error() {
        let client = ScriptedClient::new(vec![""; 8]);
        let result: Result<bool> = run_with_retry(
            &client,
            Conversation::from_user_prompt("p"),
            |_| None,
            &policy(),
            "stage",
        )
        .await;
        match result {
            Err(GenerationError::Exhausted { last_error, .. }) => {
                assert_eq!(last_error, GenerationError::EmptyContent.to_string());
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn test_conversation_values_are_independent() {
        let base = Conversation::from_user_prompt("first");
        let replaced = base.with_replaced_prompt("second".to_string());
        assert_eq!(base.messages()[0].content, "first");
        assert_eq!(replaced.messages()[0].content, "second");
        assert_eq!(base.attempt(), 1);
        assert_eq!(replaced.attempt(), 2);
    }
}
