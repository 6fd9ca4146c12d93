//! Text generation through an external program.
//!
//! The conversation is written to the program's stdin as role-labelled
//! blocks; whatever the program prints to stdout is the reply. This makes any
//! local CLI model runner usable as a backend.

use std::process::Command;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{info, instrument, warn};

use crate::io::config::CommandModelConfig;
use crate::io::llm::{CompletionRequest, TextGenerator};
use crate::io::process::run_command_with_timeout;

/// Generator that spawns a configured command per call.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    argv: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandGenerator {
    pub fn new(config: &CommandModelConfig) -> Result<Self> {
        if config.command.is_empty() {
            return Err(anyhow!("command backend needs a program to run"));
        }
        Ok(Self {
            argv: config.command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        })
    }
}

/// Flatten a conversation into the text fed to the program.
pub fn render_transcript(request: &CompletionRequest) -> String {
    let mut buf = String::new();
    for message in &request.messages {
        buf.push_str(&format!("### {}\n{}\n\n", message.role.as_str(), message.content.trim()));
    }
    if request.json_output {
        buf.push_str("### format\nRespond with a single JSON object and nothing else.\n");
    }
    buf
}

impl TextGenerator for CommandGenerator {
    #[instrument(skip_all, fields(program = %self.argv[0], json = request.json_output))]
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        info!("invoking model command");
        let mut cmd = Command::new(&self.argv[0]);
        cmd.args(&self.argv[1..]);

        let output = run_command_with_timeout(
            cmd,
            Some(render_transcript(request).into_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )?;

        if output.timed_out {
            return Err(anyhow!("model command timed out after {:?}", self.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "model command failed");
            return Err(anyhow!(
                "model command failed with status {:?}: {}",
                output.status.code(),
                output.stderr_text()
            ));
        }
        if output.stdout_truncated > 0 {
            return Err(anyhow!(
                "model reply exceeded {} bytes",
                self.output_limit_bytes
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::llm::Message;

    fn config(command: &[&str]) -> CommandModelConfig {
        CommandModelConfig {
            command: command.iter().map(|s| s.to_string()).collect(),
            ..CommandModelConfig::default()
        }
    }

    fn request(json_output: bool) -> CompletionRequest {
        CompletionRequest {
            messages: vec![Message::system("be brief"), Message::user("summarize")],
            json_output,
        }
    }

    #[test]
    fn transcript_labels_roles_and_json_mode() {
        let text = render_transcript(&request(true));
        assert!(text.starts_with("### system\nbe brief\n\n### user\nsummarize\n\n"));
        assert!(text.contains("single JSON object"));
        assert!(!render_transcript(&request(false)).contains("### format"));
    }

    #[test]
    fn returns_stdout_as_reply() {
        let generator =
            CommandGenerator::new(&config(&["sh", "-c", "cat >/dev/null; echo summary"]))
                .expect("generator");
        let reply = generator.complete(&request(false)).expect("reply");
        assert_eq!(reply.trim(), "summary");
    }

    #[test]
    fn nonzero_exit_is_an_error_with_stderr() {
        let generator =
            CommandGenerator::new(&config(&["sh", "-c", "cat >/dev/null; echo nope >&2; exit 3"]))
                .expect("generator");
        let err = generator.complete(&request(false)).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }
}
