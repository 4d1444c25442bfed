//! Command resolution: `(Kind, name)` to a handler factory.
//!
//! Handlers are looked up by the conventional key `<Kind><Name>Cmd`
//! (`ClusterCreateCmd`, `NodeStartCmd`) in a table built once at startup. The
//! table is never mutated afterwards and is handed to the dispatch loop by
//! reference.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use clap::ArgMatches;

use crate::bridge::protocol::Kind;
use crate::error::{ExecutionError, ValidationError};

/// Contract every command handler satisfies.
///
/// A fresh instance is created for each invocation and dropped after `run`.
#[async_trait::async_trait]
pub trait CommandHandler: Send {
    /// Option parser for this command. It sees only the command's own
    /// arguments, never the command name.
    fn parser(&self) -> clap::Command;

    /// Check preconditions against the parsed options and keep whatever
    /// `run` needs.
    fn validate(&mut self, options: &ArgMatches) -> Result<(), ValidationError>;

    /// Perform the command's side effects.
    async fn run(&mut self) -> Result<(), ExecutionError>;
}

pub type HandlerFactory = Arc<dyn Fn() -> Box<dyn CommandHandler> + Send + Sync>;

/// Build the lookup key for a handler.
pub fn handler_key(kind: Kind, name: &str) -> String {
    format!("{}{}Cmd", kind.title(), capitalize(&name.to_lowercase()))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Clone, Default)]
pub struct Registry {
    handlers: HashMap<(Kind, String), HandlerFactory>,
    cluster_commands: BTreeSet<String>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Find the factory for a command, or `None` if nothing is registered
    /// under that key in the kind's namespace.
    pub fn resolve(&self, kind: Kind, name: &str) -> Option<HandlerFactory> {
        self.handlers
            .get(&(kind, handler_key(kind, name)))
            .map(Arc::clone)
    }

    /// Whether `name` is one of the known cluster commands.
    pub fn is_cluster_command(&self, name: &str) -> bool {
        self.cluster_commands.contains(&name.to_lowercase())
    }

    pub fn cluster_commands(&self) -> impl Iterator<Item = &str> {
        self.cluster_commands.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.handlers.keys().map(|(_, key)| key.as_str()).collect();
        keys.sort_unstable();
        f.debug_struct("Registry").field("handlers", &keys).finish()
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    registry: Registry,
}

impl RegistryBuilder {
    pub fn register<F, H>(mut self, kind: Kind, name: &str, factory: F) -> Self
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: CommandHandler + 'static,
    {
        let key = handler_key(kind, name);
        let boxed: HandlerFactory =
            Arc::new(move || -> Box<dyn CommandHandler> { Box::new(factory()) });
        if self
            .registry
            .handlers
            .insert((kind, key.clone()), boxed)
            .is_some()
        {
            tracing::warn!(%key, "Handler registered twice, keeping the last one");
        }
        if kind == Kind::Cluster {
            self.registry.cluster_commands.insert(name.to_lowercase());
        }
        self
    }

    pub fn build(self) -> Registry {
        tracing::debug!(handlers = self.registry.len(), "Command registry built");
        self.registry
    }
}
