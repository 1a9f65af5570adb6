//! Registration and resolution of height platforms.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use log::{debug, warn};
use tokio::time::timeout;

use crate::config::ConfigSnapshot;
use crate::platforms::{PlatformHandler, QueryError, QueryOutcome, QueryRequest};

/// Registration failures. These are programming or packaging errors, so the
/// plugin fails closed at startup instead of shadowing an existing name.
#[derive(Debug)]
pub enum PlatformRegistryError {
    DuplicateId { id: String },
    DuplicateAlias { alias: String, existing: String },
}

impl fmt::Display for PlatformRegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformRegistryError::DuplicateId { id } => {
                write!(f, "platform {id:?} is already registered")
            }
            PlatformRegistryError::DuplicateAlias { alias, existing } => {
                write!(f, "alias {alias:?} is already taken by platform {existing:?}")
            }
        }
    }
}

impl std::error::Error for PlatformRegistryError {}

struct PlatformEntry {
    id: String,
    aliases: Vec<String>,
    handler: Arc<dyn PlatformHandler>,
}

/// Owns the platform handlers and their built-in aliases.
///
/// Alias resolution consults the current [`ConfigSnapshot`] first, so
/// operator-defined aliases apply without restart, then falls back to the
/// aliases declared at registration.
#[derive(Default)]
pub struct PlatformRegistry {
    entries: Vec<PlatformEntry>,
}

impl PlatformRegistry {
    pub fn new() -> PlatformRegistry {
        PlatformRegistry::default()
    }

    /// Registers a platform under `id` with its built-in aliases.
    ///
    /// # Returns
    ///
    /// An error if the id or any alias collides with an earlier
    /// registration; the registry is left unchanged in that case.
    pub fn register(
        &mut self,
        id: &str,
        aliases: &[&str],
        handler: Arc<dyn PlatformHandler>,
    ) -> Result<(), PlatformRegistryError> {
        let id = id.to_lowercase();
        let mut taken: HashSet<&str> = HashSet::new();
        for entry in &self.entries {
            taken.insert(&entry.id);
            taken.extend(entry.aliases.iter().map(String::as_str));
        }

        if taken.contains(id.as_str()) {
            return Err(PlatformRegistryError::DuplicateId { id });
        }
        let aliases: Vec<String> = aliases.iter().map(|alias| alias.to_lowercase()).collect();
        for alias in &aliases {
            if alias == &id {
                continue;
            }
            if taken.contains(alias.as_str()) || aliases.iter().filter(|a| *a == alias).count() > 1
            {
                let existing = self
                    .entries
                    .iter()
                    .find(|entry| {
                        entry.id == *alias || entry.aliases.iter().any(|a| a == alias)
                    })
                    .map(|entry| entry.id.clone())
                    .unwrap_or_else(|| id.clone());
                return Err(PlatformRegistryError::DuplicateAlias {
                    alias: alias.clone(),
                    existing,
                });
            }
        }

        debug!("registered platform {id} with aliases {aliases:?}");
        self.entries.push(PlatformEntry {
            id,
            aliases,
            handler,
        });
        Ok(())
    }

    /// Registered platform ids, in registration order.
    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.id.as_str()).collect()
    }

    /// Built-in aliases of a platform.
    pub fn aliases_of(&self, id: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.aliases.as_slice())
    }

    /// Resolves a user token to an enabled platform id.
    ///
    /// With no token, the configured default platform is used when it is
    /// enabled, otherwise the first enabled platform. Tokens are matched
    /// case-insensitively against configured aliases, then platform ids,
    /// then built-in aliases. Disabled platforms never resolve.
    pub fn resolve(&self, token: Option<&str>, config: &ConfigSnapshot) -> Option<String> {
        let enabled = |id: &str| -> bool {
            config.height.platform_enabled(id) && self.entries.iter().any(|entry| entry.id == id)
        };

        match token {
            None => {
                let default = config.height.default_platform.as_str();
                if enabled(default) {
                    return Some(default.to_string());
                }
                self.entries
                    .iter()
                    .find(|entry| config.height.platform_enabled(&entry.id))
                    .map(|entry| entry.id.clone())
            }
            Some(token) => {
                let token = token.to_lowercase();
                let id = if let Some(target) = config.height.alias_target(&token) {
                    target.to_string()
                } else if self.entries.iter().any(|entry| entry.id == token) {
                    token
                } else {
                    self.entries
                        .iter()
                        .find(|entry| entry.aliases.iter().any(|alias| alias == &token))
                        .map(|entry| entry.id.clone())?
                };
                enabled(&id).then_some(id)
            }
        }
    }

    /// Runs a query against a registered platform, normalizing every
    /// failure into a [`QueryOutcome`] and enforcing the request timeout as
    /// a hard deadline around the handler.
    pub async fn query(&self, id: &str, request: &QueryRequest) -> QueryOutcome {
        let Some(entry) = self.entries.iter().find(|entry| entry.id == id) else {
            return QueryOutcome {
                success: false,
                message: format!("❌ unknown platform: {id}"),
                error: Some(format!("platform {id} is not registered")),
            };
        };

        let result = match timeout(request.timeout, entry.handler.query(request)).await {
            Ok(result) => result,
            Err(_) => Err(QueryError::Timeout),
        };

        match result {
            Ok(message) => QueryOutcome {
                success: true,
                message,
                error: None,
            },
            Err(error) => {
                warn!("platform {id} query failed: {error}");
                let message = match &error {
                    QueryError::InvalidArguments(detail) => format!("❌ {detail}"),
                    QueryError::Network(detail) => format!("❌ network error: {detail}"),
                    QueryError::Timeout => "❌ the request timed out, try again later".to_string(),
                    QueryError::Http(status, detail) => {
                        format!("❌ API request failed (HTTP {status}): {detail}")
                    }
                    QueryError::Rejected(detail) => format!("❌ API returned an error: {detail}"),
                    QueryError::Malformed(detail) => {
                        format!("❌ could not parse the API reply: {detail}")
                    }
                };
                QueryOutcome {
                    success: false,
                    message,
                    error: Some(error.to_string()),
                }
            }
        }
    }
}
