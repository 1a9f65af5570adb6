//! Command registration and matching.
//!
//! Each command compiles to one anchored regex: the escaped prefix, an
//! alternation of the name and all aliases, then the descriptor's argument
//! pattern. Matching walks the commands in registration order and the first
//! full match wins, so command resolution stays deterministic.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::debug;
use regex::Regex;

use crate::commands::{CommandArgs, CommandHandler};
use crate::commands::descriptor::CommandDescriptor;

/// Registration failures. Registration fails closed: a colliding command is
/// rejected instead of shadowing the existing one.
#[derive(Debug)]
pub enum CommandRegistryError {
    DuplicateName { name: String, existing: String },
    InvalidPattern { name: String, detail: String },
}

impl fmt::Display for CommandRegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandRegistryError::DuplicateName { name, existing } => {
                write!(f, "name {name:?} is already taken by command {existing:?}")
            }
            CommandRegistryError::InvalidPattern { name, detail } => {
                write!(f, "command {name:?} has an invalid pattern: {detail}")
            }
        }
    }
}

impl std::error::Error for CommandRegistryError {}

/// A descriptor bound to its handler and compiled pattern.
pub struct RegisteredCommand {
    pub descriptor: &'static CommandDescriptor,
    pattern: Regex,
    pub handler: Arc<dyn CommandHandler>,
}

/// Owns every registered command. The prefix is fixed at construction;
/// changing it requires rebuilding the registry (in practice, a restart).
pub struct CommandRegistry {
    prefix: String,
    commands: Vec<RegisteredCommand>,
}

impl CommandRegistry {
    pub fn new(prefix: &str) -> CommandRegistry {
        CommandRegistry {
            prefix: prefix.to_string(),
            commands: Vec::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Registers a command, compiling its match pattern for the registry's
    /// prefix.
    ///
    /// # Returns
    ///
    /// An error if the name or any alias is already taken, or if the
    /// descriptor's argument pattern does not compile. The registry is left
    /// unchanged on error.
    pub fn register(
        &mut self,
        descriptor: &'static CommandDescriptor,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<(), CommandRegistryError> {
        for candidate in std::iter::once(descriptor.name).chain(descriptor.aliases.iter().copied())
        {
            if let Some(existing) = self.owner_of(candidate) {
                return Err(CommandRegistryError::DuplicateName {
                    name: candidate.to_string(),
                    existing: existing.to_string(),
                });
            }
        }

        let pattern = compile_pattern(&self.prefix, descriptor).map_err(|error| {
            CommandRegistryError::InvalidPattern {
                name: descriptor.name.to_string(),
                detail: error.to_string(),
            }
        })?;

        debug!(
            "registered command {} with aliases {:?}",
            descriptor.name, descriptor.aliases
        );
        self.commands.push(RegisteredCommand {
            descriptor,
            pattern,
            handler,
        });
        Ok(())
    }

    /// Matches an incoming line against the registered commands.
    ///
    /// # Returns
    ///
    /// The first command whose pattern matches the whole (trimmed) line,
    /// with its captured named arguments, or `None` when the line is not a
    /// command.
    pub fn resolve(&self, input: &str) -> Option<(&RegisteredCommand, CommandArgs)> {
        let input = input.trim();
        if !input.starts_with(&self.prefix) {
            return None;
        }

        for command in &self.commands {
            if let Some(captures) = command.pattern.captures(input) {
                let mut values = HashMap::new();
                for name in command.pattern.capture_names().flatten() {
                    if let Some(value) = captures.name(name) {
                        values.insert(name.to_string(), value.as_str().to_string());
                    }
                }
                return Some((command, CommandArgs::new(values)));
            }
        }
        None
    }

    /// Finds a command by exact name or alias (case-insensitive), for help
    /// lookups.
    pub fn find(&self, token: &str) -> Option<&RegisteredCommand> {
        let token = token.to_lowercase();
        self.commands.iter().find(|command| {
            command.descriptor.name == token
                || command.descriptor.aliases.iter().any(|alias| *alias == token)
        })
    }

    /// Commands in display order: the names listed in `order` first, then
    /// everything else in registration order.
    pub fn in_display_order(&self, order: &[String]) -> Vec<&RegisteredCommand> {
        let mut result: Vec<&RegisteredCommand> = Vec::with_capacity(self.commands.len());
        for name in order {
            if let Some(command) = self
                .commands
                .iter()
                .find(|command| command.descriptor.name == name.as_str())
            {
                if !result
                    .iter()
                    .any(|seen| seen.descriptor.name == command.descriptor.name)
                {
                    result.push(command);
                }
            }
        }
        for command in &self.commands {
            if !result
                .iter()
                .any(|seen| seen.descriptor.name == command.descriptor.name)
            {
                result.push(command);
            }
        }
        result
    }

    fn owner_of(&self, token: &str) -> Option<&'static str> {
        self.commands
            .iter()
            .find(|command| {
                command.descriptor.name == token
                    || command.descriptor.aliases.contains(&token)
            })
            .map(|command| command.descriptor.name)
    }
}

fn compile_pattern(
    prefix: &str,
    descriptor: &CommandDescriptor,
) -> Result<Regex, regex::Error> {
    let alternation = std::iter::once(descriptor.name)
        .chain(descriptor.aliases.iter().copied())
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(
        "^{}(?:{}){}$",
        regex::escape(prefix),
        alternation,
        descriptor.argument_pattern
    ))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::commands::descriptor::{self, CommandDescriptor};
    use crate::commands::{CommandFailure, InvocationContext};
    use crate::dispatch::DispatchPayload;

    struct NoopHandler;

    #[async_trait]
    impl CommandHandler for NoopHandler {
        async fn execute(
            &self,
            _args: &CommandArgs,
            _context: &InvocationContext<'_>,
        ) -> Result<DispatchPayload, CommandFailure> {
            Ok(DispatchPayload::text("ok"))
        }
    }

    fn registry_with_builtins(prefix: &str) -> CommandRegistry {
        let mut registry = CommandRegistry::new(prefix);
        for descriptor in descriptor::builtin_descriptors() {
            registry.register(descriptor, Arc::new(NoopHandler)).unwrap();
        }
        registry
    }

    #[test]
    fn test_register_rejects_alias_collision() {
        static CLASHING: CommandDescriptor = CommandDescriptor {
            name: "tasks",
            aliases: &["rw"],
            category: "test",
            description: "",
            detailed: "",
            examples: &[],
            parameters: &[],
            notes: &[],
            icon: "",
            argument_pattern: "",
            enable_key: None,
        };

        let mut registry = registry_with_builtins("#");
        let result = registry.register(&CLASHING, Arc::new(NoopHandler));
        match result {
            Err(CommandRegistryError::DuplicateName { name, existing }) => {
                assert_eq!(name, "rw");
                assert_eq!(existing, "task");
            }
            other => panic!("expected DuplicateName, got {other:?}"),
        }
        // the registry is unchanged: "tasks" did not land
        assert!(registry.find("tasks").is_none());
    }

    #[test]
    fn test_resolve_matches_name_and_aliases() {
        let registry = registry_with_builtins("#");

        let (command, _) = registry.resolve("#task").unwrap();
        assert_eq!(command.descriptor.name, "task");
        let (command, _) = registry.resolve("#rw").unwrap();
        assert_eq!(command.descriptor.name, "task");
        let (command, _) = registry.resolve("  #任务  ").unwrap();
        assert_eq!(command.descriptor.name, "task");
    }

    #[test]
    fn test_resolve_rejects_non_commands() {
        let registry = registry_with_builtins("#");

        assert!(registry.resolve("task").is_none());
        assert!(registry.resolve("#nope").is_none());
        assert!(registry.resolve("#taskmaster").is_none());
        assert!(registry.resolve("#task extra").is_none());
        assert!(registry.resolve("plain chatter").is_none());
    }

    #[test]
    fn test_resolve_captures_height_arguments() {
        let registry = registry_with_builtins("#");
        let game_id = "01234567-89ab-cdef-0123-456789abcdef";

        let (_, args) = registry.resolve(&format!("#height {game_id}")).unwrap();
        assert_eq!(args.get("platform"), None);
        assert_eq!(args.get("game_id"), Some(game_id));
        assert_eq!(args.get("friend_code"), None);

        let (_, args) = registry
            .resolve(&format!("#height mango {game_id} ABCD-1234-EF56"))
            .unwrap();
        assert_eq!(args.get("platform"), Some("mango"));
        assert_eq!(args.get("game_id"), Some(game_id));
        assert_eq!(args.get("friend_code"), Some("ABCD-1234-EF56"));

        let (_, args) = registry.resolve("#身高").unwrap();
        assert_eq!(args.get("game_id"), None);
    }

    #[test]
    fn test_prefix_is_escaped_in_patterns() {
        let registry = registry_with_builtins(".");

        assert!(registry.resolve(".task").is_some());
        // an unescaped "." would let any character match the prefix slot
        assert!(registry.resolve("xtask").is_none());
        assert!(registry.resolve("#task").is_none());
    }

    #[test]
    fn test_find_by_name_or_alias() {
        let registry = registry_with_builtins("#");

        assert_eq!(registry.find("task").unwrap().descriptor.name, "task");
        assert_eq!(registry.find("RW").unwrap().descriptor.name, "task");
        assert_eq!(registry.find("身高").unwrap().descriptor.name, "height");
        assert!(registry.find("nope").is_none());
    }

    #[test]
    fn test_in_display_order_puts_listed_names_first() {
        let registry = registry_with_builtins("#");
        let order = vec!["all".to_string(), "height".to_string(), "ghost".to_string()];

        let ordered = registry.in_display_order(&order);
        assert_eq!(ordered.len(), 11);
        assert_eq!(ordered[0].descriptor.name, "all");
        assert_eq!(ordered[1].descriptor.name, "height");
        // the rest keep registration order
        assert_eq!(ordered[2].descriptor.name, "skytools");
        assert_eq!(ordered[3].descriptor.name, "task");
    }
}
