//! Drives one command invocation from raw text to a delivered reply.
//!
//! An invocation walks a fixed sequence: match the line against the
//! registry, check the feature switch, run the handler, dispatch the
//! resulting payload. Handler failures never escape: they are normalized
//! into a user-facing notice and still dispatched, so the requester always
//! hears back. The snapshot is taken once at the start and used throughout,
//! keeping the invocation consistent across concurrent config reloads.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::commands::{CommandRegistry, InvocationContext};
use crate::config::ConfigStore;
use crate::dispatch::{DispatchOutcome, DispatchPayload, MessageDispatcher};
use crate::platforms::PlatformRegistry;
use crate::providers::ProviderClient;

/// Where an invocation ended up. Variants are declared in progression
/// order; an invocation only ever moves forward through them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum InvocationState {
    /// The line was read but matched no command.
    Received,
    /// A command matched but nothing ran yet.
    Matched,
    /// The handler is running.
    Executing,
    /// The payload is being delivered.
    Dispatching,
    /// The reply was delivered.
    Completed,
    /// Neither delivery channel got the reply out.
    Failed,
}

/// The record of one invocation, for hosts that track delivery.
#[derive(Debug)]
pub struct ExecutionReport {
    pub state: InvocationState,
    /// The matched command name, if any.
    pub command: Option<&'static str>,
    pub outcome: Option<DispatchOutcome>,
    /// Handler failure detail, when the reply carried an error notice.
    pub logic_error: Option<String>,
}

fn advance(state: &mut InvocationState, next: InvocationState, command: &str) {
    debug_assert!(*state < next, "invocation state may only move forward");
    debug!("command {command}: {:?} -> {next:?}", *state);
    *state = next;
}

impl ExecutionReport {
    fn not_a_command() -> ExecutionReport {
        ExecutionReport {
            state: InvocationState::Received,
            command: None,
            outcome: None,
            logic_error: None,
        }
    }
}

/// Executes commands against a fixed set of registries and the live config
/// store. Shared behind an `Arc`; every method takes `&self`, so hosts may
/// run invocations concurrently.
pub struct CommandExecutor {
    registry: Arc<CommandRegistry>,
    platforms: Arc<PlatformRegistry>,
    providers: ProviderClient,
    store: Arc<ConfigStore>,
    dispatcher: MessageDispatcher,
}

impl CommandExecutor {
    pub fn new(
        registry: Arc<CommandRegistry>,
        platforms: Arc<PlatformRegistry>,
        store: Arc<ConfigStore>,
        dispatcher: MessageDispatcher,
    ) -> CommandExecutor {
        CommandExecutor {
            registry,
            platforms,
            providers: ProviderClient::new(),
            store,
            dispatcher,
        }
    }

    /// Handles one incoming line end to end.
    ///
    /// # Returns
    ///
    /// A report describing how far the invocation got. Lines that are not
    /// commands come back in the `Received` state with nothing dispatched.
    pub async fn handle(&self, input: &str) -> ExecutionReport {
        let snapshot = self.store.snapshot();

        let Some((command, args)) = self.registry.resolve(input) else {
            debug!("input is not a command, ignoring");
            return ExecutionReport::not_a_command();
        };
        let name = command.descriptor.name;
        info!("matched command {name} (config v{})", snapshot.version);
        let mut state = InvocationState::Received;
        advance(&mut state, InvocationState::Matched, name);

        let mut logic_error = None;
        let disabled = command
            .descriptor
            .enable_key
            .is_some_and(|key| !snapshot.is_enabled(key));
        let payload = if disabled {
            // the handler never runs, so Executing is skipped
            info!("command {name} is disabled in the settings");
            DispatchPayload::text(format!("❌ the {name} feature is currently disabled"))
        } else {
            advance(&mut state, InvocationState::Executing, name);
            let context = InvocationContext {
                snapshot: &snapshot,
                registry: &self.registry,
                platforms: &self.platforms,
                providers: &self.providers,
            };
            match command.handler.execute(&args, &context).await {
                Ok(payload) => payload,
                Err(failure) => {
                    warn!("command {name} failed: {}", failure.detail);
                    logic_error = Some(failure.detail);
                    DispatchPayload::text(failure.user_message)
                }
            }
        };

        advance(&mut state, InvocationState::Dispatching, name);
        let outcome = self.dispatcher.send(&payload, &snapshot).await;
        if outcome.delivered {
            advance(&mut state, InvocationState::Completed, name);
        } else {
            advance(&mut state, InvocationState::Failed, name);
        }
        ExecutionReport {
            state,
            command: Some(name),
            outcome: Some(outcome),
            logic_error,
        }
    }
}
