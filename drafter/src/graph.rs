//! The orchestrator: runs steps until the next interrupt or the end of the run.
//!
//! Every step result is checkpointed through a [`CheckpointStore`] keyed by run
//! id. A suspended step leaves `next` pointing at itself, so resuming re-runs
//! that step from the top with the human's text as its resume value.

use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::core::interrupt::{Interrupt, InterruptPayload, Suspended};
use crate::core::invariants::validate_invariants;
use crate::core::node::{Edge, NodeId, edge_from, route_after_set_next_section};
use crate::core::types::{RunState, precondition};
use crate::io::checkpoint::{Checkpoint, CheckpointStore, RunStatus, validate_run_id};
use crate::io::config::DrafterConfig;
use crate::io::llm::{OutputSchema, TextGenerator};
use crate::io::prompt::PromptEngine;
use crate::io::retry::RetryPolicy;
use crate::steps::{StepContext, run_node};

/// How a `run` call begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunInput {
    /// Fresh state. Replaces any existing checkpoint for the run id.
    Start(RunState),
    /// Human response for the pending interrupt.
    Resume(String),
}

/// Emitted as the run progresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    /// A step finished; `state` is the snapshot after it.
    Update { node: NodeId, state: RunState },
    /// A step suspended waiting for human input.
    Interrupt {
        node: NodeId,
        payload: InterruptPayload,
    },
}

/// Where a `run` call stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Interrupted {
        node: NodeId,
        payload: InterruptPayload,
    },
    Completed {
        state: RunState,
    },
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Steps one `run` call may execute before giving up.
    pub max_steps: u32,
    pub retry: RetryPolicy,
    pub code_budget_bytes: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&DrafterConfig::default())
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &DrafterConfig) -> Self {
        Self {
            max_steps: config.max_steps,
            retry: config.retry.policy(),
            code_budget_bytes: config.code_budget_bytes,
        }
    }
}

pub struct Orchestrator<G, S> {
    generator: G,
    store: S,
    prompts: PromptEngine,
    outline_schema: OutputSchema,
    settings: OrchestratorSettings,
}

impl<G: TextGenerator, S: CheckpointStore> Orchestrator<G, S> {
    pub fn new(generator: G, store: S, settings: OrchestratorSettings) -> Self {
        Self {
            generator,
            store,
            prompts: PromptEngine::new(settings.code_budget_bytes),
            outline_schema: OutputSchema::outline(),
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Latest checkpoint for `run_id`, if any.
    pub fn checkpoint(&self, run_id: &str) -> Result<Option<Checkpoint>> {
        self.store.load(run_id)
    }

    /// Run until the next interrupt or completion, reporting each event.
    pub fn run<F>(&self, input: RunInput, run_id: &str, mut on_event: F) -> Result<RunOutcome>
    where
        F: FnMut(&RunEvent),
    {
        validate_run_id(run_id)?;
        let (mut checkpoint, resume) = match input {
            RunInput::Start(state) => {
                if self.store.load(run_id)?.is_some() {
                    info!(run_id, "restarting run from a fresh state");
                }
                (Checkpoint::new(run_id, state), None)
            }
            RunInput::Resume(value) => (self.resumable(run_id)?, Some(value)),
        };
        checkpoint.status = RunStatus::Running;
        checkpoint.pending = None;
        checkpoint.error = None;
        self.store.save(&checkpoint)?;

        match self.advance(&mut checkpoint, resume, &mut on_event) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                let message = format!("{err:#}");
                warn!(run_id, next = ?checkpoint.next, error = %message, "run failed");
                checkpoint.status = RunStatus::Failed;
                checkpoint.error = Some(message.clone());
                let event = serde_json::json!({
                    "event": "failed",
                    "node": checkpoint.next,
                    "error": message,
                });
                if let Err(save_err) = self
                    .store
                    .save(&checkpoint)
                    .and_then(|()| self.store.append_event(run_id, &event))
                {
                    warn!(run_id, error = %save_err, "could not record run failure");
                }
                Err(err)
            }
        }
    }

    /// [`run`](Self::run), returning the events instead of streaming them.
    pub fn run_collect(&self, input: RunInput, run_id: &str) -> Result<Vec<RunEvent>> {
        let mut events = Vec::new();
        self.run(input, run_id, |event| events.push(event.clone()))?;
        Ok(events)
    }

    fn resumable(&self, run_id: &str) -> Result<Checkpoint> {
        let Some(checkpoint) = self.store.load(run_id)? else {
            return precondition(format!("no run '{run_id}' to resume"));
        };
        let status = checkpoint.status;
        match status {
            RunStatus::AwaitingInput if checkpoint.next.is_some_and(NodeId::is_interrupt_point) => {
                Ok(checkpoint)
            }
            RunStatus::AwaitingInput | RunStatus::Running => {
                precondition(format!("run '{run_id}' is not waiting for input"))
            }
            RunStatus::Completed => precondition(format!("run '{run_id}' is already complete")),
            RunStatus::Failed => precondition(format!(
                "run '{run_id}' failed and cannot be resumed; start a new run"
            )),
        }
    }

    fn advance<F>(
        &self,
        checkpoint: &mut Checkpoint,
        mut resume: Option<String>,
        on_event: &mut F,
    ) -> Result<RunOutcome>
    where
        F: FnMut(&RunEvent),
    {
        let ctx = StepContext {
            generator: &self.generator,
            prompts: &self.prompts,
            outline_schema: &self.outline_schema,
            retry: &self.settings.retry,
        };
        let run_id = checkpoint.run_id.clone();
        let mut steps = 0u32;

        while let Some(node) = checkpoint.next {
            if steps >= self.settings.max_steps {
                bail!(
                    "step limit of {} reached at node {node}",
                    self.settings.max_steps
                );
            }
            let span = info_span!("step", run_id = %run_id, node = node.as_str());
            let _enter = span.enter();

            let mut interrupt = Interrupt::new(node, resume.take());
            let output = match run_node(node, &checkpoint.state, &ctx, &mut interrupt) {
                Ok(output) => output,
                Err(err) => match err.downcast::<Suspended>() {
                    Ok(suspended) => {
                        info!("waiting for human input");
                        checkpoint.status = RunStatus::AwaitingInput;
                        checkpoint.pending = Some(suspended.payload.clone());
                        self.store.save(checkpoint)?;
                        let event = RunEvent::Interrupt {
                            node: suspended.node,
                            payload: suspended.payload.clone(),
                        };
                        self.emit(&run_id, &event, on_event)?;
                        return Ok(RunOutcome::Interrupted {
                            node: suspended.node,
                            payload: suspended.payload,
                        });
                    }
                    Err(err) => return Err(err.context(format!("step {node} failed"))),
                },
            };

            if interrupt.has_resume_value() {
                warn!("resume value was not consumed by the step");
            }

            let violations = validate_invariants(&output.state);
            if !violations.is_empty() {
                bail!(
                    "state invariants violated after {node}:\n- {}",
                    violations.join("\n- ")
                );
            }

            let next = match output.goto {
                Some(target) => Some(target),
                None => match edge_from(node) {
                    Edge::To(target) => Some(target),
                    Edge::Conditional => route_after_set_next_section(&output.state),
                    Edge::StepChooses => {
                        return Err(anyhow!("step {node} finished without choosing a successor"));
                    }
                },
            };
            debug!(next = ?next, "step finished");

            steps += 1;
            checkpoint.steps_taken += 1;
            checkpoint.state = output.state;
            checkpoint.next = next;
            if next.is_none() {
                checkpoint.status = RunStatus::Completed;
            }
            self.store.save(checkpoint)?;
            self.emit(
                &run_id,
                &RunEvent::Update {
                    node,
                    state: checkpoint.state.clone(),
                },
                on_event,
            )?;
        }

        info!(run_id = %run_id, steps = checkpoint.steps_taken, "run complete");
        Ok(RunOutcome::Completed {
            state: checkpoint.state.clone(),
        })
    }

    fn emit<F>(&self, run_id: &str, event: &RunEvent, on_event: &mut F) -> Result<()>
    where
        F: FnMut(&RunEvent),
    {
        self.store.append_event(run_id, &persisted(event)?)?;
        on_event(event);
        Ok(())
    }
}

/// The event log form of `event`. State snapshots leave out the source code,
/// which the checkpoint already holds.
fn persisted(event: &RunEvent) -> Result<serde_json::Value> {
    let mut value = serde_json::to_value(event)?;
    if let Some(state) = value.get_mut("state").and_then(serde_json::Value::as_object_mut) {
        state.remove("code");
    }
    Ok(value)
}
