//! Text-generation capability used by the pipeline steps.
//!
//! The [`TextGenerator`] trait decouples steps from the actual model backend
//! (an HTTP chat-completions endpoint or an external command). Tests use
//! scripted generators that return predetermined replies without any network.

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::{Draft, Validator};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::io::retry::RetryPolicy;

const OUTLINE_SCHEMA: &str = include_str!("../../schemas/outline.schema.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One role-tagged message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Parameters for one model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    /// Ask the backend for a JSON object reply when it supports that mode.
    pub json_output: bool,
}

/// Abstraction over text-generation backends.
///
/// Implementations are shared by every run in the process, so they must be
/// safe to call from several threads.
pub trait TextGenerator: Send + Sync {
    /// Return the raw text of the model's reply.
    fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

impl<T: TextGenerator + ?Sized> TextGenerator for &T {
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        (**self).complete(request)
    }
}

impl<T: TextGenerator + ?Sized> TextGenerator for Box<T> {
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        (**self).complete(request)
    }
}

/// Free-form generation. Returns the trimmed reply.
#[instrument(skip_all, fields(messages = messages.len()))]
pub fn generate<G: TextGenerator + ?Sized>(
    generator: &G,
    messages: &[Message],
    retry: &RetryPolicy,
) -> Result<String> {
    let request = CompletionRequest {
        messages: messages.to_vec(),
        json_output: false,
    };
    retry.run("generate", |_| {
        let reply = generator.complete(&request)?;
        let trimmed = reply.trim();
        if trimmed.is_empty() {
            bail!("model returned an empty reply");
        }
        Ok(trimmed.to_string())
    })
}

/// Schema-constrained generation.
///
/// The reply must contain a JSON object (bare or in a fenced block) that
/// validates against `schema`; it is then deserialized into `T`. Parse and
/// validation failures count as failed attempts.
#[instrument(skip_all, fields(messages = messages.len(), schema = schema.name()))]
pub fn generate_structured<G: TextGenerator + ?Sized, T: DeserializeOwned>(
    generator: &G,
    messages: &[Message],
    schema: &OutputSchema,
    retry: &RetryPolicy,
) -> Result<T> {
    let request = CompletionRequest {
        messages: messages.to_vec(),
        json_output: true,
    };
    retry.run("generate_structured", |_| {
        let reply = generator.complete(&request)?;
        let value = extract_json(&reply)?;
        schema.validate(&value)?;
        let parsed = serde_json::from_value(value)
            .with_context(|| format!("deserialize {} output", schema.name()))?;
        debug!(schema = schema.name(), "structured output accepted");
        Ok(parsed)
    })
}

/// Pull the JSON object out of a model reply.
///
/// Accepts a bare object, an object inside a ```json fenced block, or an
/// object surrounded by prose (first `{` to last `}`).
pub fn extract_json(reply: &str) -> Result<Value> {
    use std::sync::LazyLock;
    static FENCE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("fence regex should be valid")
    });

    let trimmed = reply.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }
    if let Some(caps) = FENCE_RE.captures(trimmed)
        && let Some(body) = caps.get(1)
        && let Ok(value) = serde_json::from_str::<Value>(body.as_str().trim())
    {
        return Ok(value);
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && start < end
    {
        return serde_json::from_str(&trimmed[start..=end]).context("parse JSON in model reply");
    }
    Err(anyhow!("model reply contains no JSON object"))
}

/// Compiled JSON Schema (Draft 2020-12) for a structured output.
pub struct OutputSchema {
    name: &'static str,
    validator: Validator,
}

impl std::fmt::Debug for OutputSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSchema")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl OutputSchema {
    pub fn compile(name: &'static str, raw: &str) -> Result<Self> {
        let schema: Value =
            serde_json::from_str(raw).with_context(|| format!("parse {name} schema"))?;
        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(&schema)
            .map_err(|err| anyhow!("compile {name} schema: {err}"))?;
        Ok(Self { name, validator })
    }

    /// Schema for the outline step: `{"sections": [{"title", "description"}]}`.
    pub fn outline() -> Self {
        Self::compile("outline", OUTLINE_SCHEMA).expect("embedded outline schema should be valid")
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn validate(&self, instance: &Value) -> Result<()> {
        let messages: Vec<String> = self
            .validator
            .iter_errors(instance)
            .map(|err| err.to_string())
            .collect();
        if !messages.is_empty() {
            bail!(
                "{} output failed schema validation:\n- {}",
                self.name,
                messages.join("\n- ")
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::OutlineOutput;
    use crate::test_support::{ScriptedGenerator, ScriptedReply};
    use std::time::Duration;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::ZERO)
    }

    #[test]
    fn extract_json_accepts_bare_fenced_and_wrapped_objects() {
        let bare = extract_json(r#"{"sections": []}"#).expect("bare");
        assert_eq!(bare["sections"], serde_json::json!([]));

        let fenced = extract_json("Here you go:\n```json\n{\"sections\": []}\n```\n").expect("fenced");
        assert_eq!(fenced, bare);

        let wrapped = extract_json("Sure! {\"sections\": []} Hope it helps.").expect("wrapped");
        assert_eq!(wrapped, bare);

        assert!(extract_json("no json here").is_err());
    }

    #[test]
    fn outline_schema_rejects_missing_description() {
        let schema = OutputSchema::outline();
        let ok = serde_json::json!({"sections": [{"title": "A", "description": "B"}]});
        schema.validate(&ok).expect("valid");

        let bad = serde_json::json!({"sections": [{"title": "A"}]});
        let err = schema.validate(&bad).unwrap_err();
        assert!(err.to_string().contains("schema validation"));
    }

    #[test]
    fn structured_generation_retries_invalid_replies() {
        let generator = ScriptedGenerator::new(vec![
            ScriptedReply::text("not json"),
            ScriptedReply::fail("rate limited"),
            ScriptedReply::text(r#"{"sections": [{"title": "Intro", "description": "Why"}]}"#),
        ]);

        let output: OutlineOutput = generate_structured(
            &generator,
            &[Message::user("outline please")],
            &OutputSchema::outline(),
            &policy(),
        )
        .expect("third reply is valid");

        assert_eq!(output.sections.len(), 1);
        assert_eq!(generator.requests().len(), 3);
        assert!(generator.requests().iter().all(|r| r.json_output));
    }

    #[test]
    fn structured_generation_gives_up_after_max_attempts() {
        let generator = ScriptedGenerator::new(vec![
            ScriptedReply::fail("down"),
            ScriptedReply::fail("down"),
            ScriptedReply::fail("still down"),
            ScriptedReply::text(r#"{"sections": []}"#),
        ]);

        let err = generate_structured::<_, OutlineOutput>(
            &generator,
            &[Message::user("outline please")],
            &OutputSchema::outline(),
            &policy(),
        )
        .unwrap_err();

        assert!(format!("{err:#}").contains("still down"));
        assert_eq!(generator.remaining(), 1);
    }

    #[test]
    fn generate_trims_and_rejects_empty_replies() {
        let generator = ScriptedGenerator::new(vec![
            ScriptedReply::text("   "),
            ScriptedReply::text("\n A summary. \n"),
        ]);
        let text = generate(&generator, &[Message::user("summarize")], &policy()).expect("text");
        assert_eq!(text, "A summary.");
        assert!(!generator.requests()[0].json_output);
    }
}
