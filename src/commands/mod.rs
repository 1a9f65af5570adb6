//! Command handling: metadata, registration, matching and the built-in
//! handlers.

pub mod descriptor;
pub mod height;
pub mod help;
pub mod media;
pub mod registry;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::config::ConfigSnapshot;
use crate::dispatch::DispatchPayload;
use crate::platforms::PlatformRegistry;
use crate::providers::ProviderClient;

pub use descriptor::CommandDescriptor;
pub use registry::{CommandRegistry, CommandRegistryError};

/// Named arguments captured from a matched command line.
#[derive(Clone, Debug, Default)]
pub struct CommandArgs {
    values: HashMap<String, String>,
}

impl CommandArgs {
    pub fn new(values: HashMap<String, String>) -> CommandArgs {
        CommandArgs { values }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

/// A command failure the executor turns into a user-facing notice.
#[derive(Debug)]
pub struct CommandFailure {
    /// Text dispatched to the chat.
    pub user_message: String,
    /// Diagnostic detail for logs and execution reports.
    pub detail: String,
}

impl CommandFailure {
    pub fn new(user_message: impl Into<String>, detail: impl Into<String>) -> CommandFailure {
        CommandFailure {
            user_message: user_message.into(),
            detail: detail.into(),
        }
    }
}

/// Everything a handler may consult while executing. Borrowed for the
/// duration of one invocation; the snapshot stays fixed even if a config
/// reload lands mid-command.
pub struct InvocationContext<'a> {
    pub snapshot: &'a ConfigSnapshot,
    pub registry: &'a CommandRegistry,
    pub platforms: &'a PlatformRegistry,
    pub providers: &'a ProviderClient,
}

/// A command implementation.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Produces the payload to dispatch. User-correctable problems (bad
    /// arguments, unknown platform) come back as `Ok` payloads carrying
    /// guidance text; `Err` is for failures worth logging.
    async fn execute(
        &self,
        args: &CommandArgs,
        context: &InvocationContext<'_>,
    ) -> Result<DispatchPayload, CommandFailure>;
}
