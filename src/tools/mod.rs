//! Tool catalog and the tool-provider seam.
//!
//! Tools are not implemented here. They live behind a [`ToolProvider`]
//! (in practice an MCP session) and are advertised to the model through the
//! [`ToolCatalog`] discovered once per session.

mod executor;

pub use executor::ToolExecutor;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::{AgentError, Result};

/// A callable tool as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON schema of the arguments object.
    pub input_schema: Value,
}

/// Failure of a single tool call.
#[derive(Debug, Error)]
pub enum ToolCallError {
    /// The tool ran and reported an error. Fed back to the model.
    #[error("{0}")]
    Execution(String),

    /// The provider itself failed (transport, protocol). Ends the query.
    #[error("{0}")]
    Provider(String),
}

/// A service that can list and invoke tools by name.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Raw tool list. Schemas are validated by [`ToolCatalog::discover`].
    async fn list_tools(&self) -> std::result::Result<Vec<ToolDescriptor>, ToolCallError>;

    /// Invoke a tool and return its textual output.
    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> std::result::Result<String, ToolCallError>;
}

/// The immutable set of tools available for one session.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: Vec<ToolDescriptor>,
    by_name: HashMap<String, usize>,
}

impl ToolCatalog {
    /// Query the provider and normalize its tool list.
    ///
    /// # Errors
    ///
    /// `AgentError::ToolDiscovery` if the provider fails, a schema is not a
    /// JSON object, or two tools share a name.
    pub async fn discover(provider: &dyn ToolProvider) -> Result<Self> {
        let tools = provider
            .list_tools()
            .await
            .map_err(|e| AgentError::ToolDiscovery(e.to_string()))?;
        let catalog = Self::from_descriptors(tools)?;
        tracing::info!(
            count = catalog.len(),
            tools = ?catalog.names().collect::<Vec<_>>(),
            "Discovered tools"
        );
        Ok(catalog)
    }

    /// Build a catalog from already-fetched descriptors.
    pub fn from_descriptors(tools: Vec<ToolDescriptor>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(tools.len());
        for (index, tool) in tools.iter().enumerate() {
            if tool.name.is_empty() {
                return Err(AgentError::ToolDiscovery(
                    "tool with empty name".to_string(),
                ));
            }
            if !tool.input_schema.is_object() {
                return Err(AgentError::ToolDiscovery(format!(
                    "tool '{}' has a malformed input schema: {}",
                    tool.name, tool.input_schema
                )));
            }
            if by_name.insert(tool.name.clone(), index).is_some() {
                return Err(AgentError::ToolDiscovery(format!(
                    "duplicate tool name '{}'",
                    tool.name
                )));
            }
        }
        Ok(Self { tools, by_name })
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.by_name.get(name).map(|&i| &self.tools[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ToolDescriptor> {
        self.tools.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|t| t.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted tool provider shared by the executor and agent tests.

    use super::*;
    use std::sync::Mutex;

    pub enum Scripted {
        Ok(String),
        ExecutionError(String),
        ProviderError(String),
    }

    #[derive(Default)]
    pub struct MockProvider {
        pub tools: Vec<ToolDescriptor>,
        pub fail_listing: bool,
        pub(crate) responses: Mutex<HashMap<String, Vec<Scripted>>>,
        pub calls: Mutex<Vec<(String, Map<String, Value>)>>,
    }

    impl MockProvider {
        pub fn with_tools(names: &[&str]) -> Self {
            Self {
                tools: names.iter().map(|n| descriptor(n)).collect(),
                ..Default::default()
            }
        }

        /// Queue a response for the next call of `name`.
        pub fn respond(self, name: &str, response: Scripted) -> Self {
            self.responses
                .lock()
                .unwrap()
                .entry(name.to_string())
                .or_default()
                .push(response);
            self
        }

        pub fn called_names(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(n, _)| n.clone())
                .collect()
        }
    }

    pub fn descriptor(name: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: format!("{} tool", name),
            input_schema: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    #[async_trait]
    impl ToolProvider for MockProvider {
        async fn list_tools(&self) -> std::result::Result<Vec<ToolDescriptor>, ToolCallError> {
            if self.fail_listing {
                return Err(ToolCallError::Provider("connection refused".to_string()));
            }
            Ok(self.tools.clone())
        }

        async fn call_tool(
            &self,
            name: &str,
            arguments: Map<String, Value>,
        ) -> std::result::Result<String, ToolCallError> {
            self.calls
                .lock()
                .unwrap()
                .push((name.to_string(), arguments));
            let next = {
                let mut responses = self.responses.lock().unwrap();
                match responses.get_mut(name) {
                    Some(queue) if !queue.is_empty() => Some(queue.remove(0)),
                    _ => None,
                }
            };
            match next {
                Some(Scripted::Ok(s)) => Ok(s),
                Some(Scripted::ExecutionError(s)) => Err(ToolCallError::Execution(s)),
                Some(Scripted::ProviderError(s)) => Err(ToolCallError::Provider(s)),
                None => Ok(format!("{} ok", name)),
            }
        }
    }
}
