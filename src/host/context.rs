//! External context data and the providers that bring it into scripts.
//!
//! A provider connects to some data source (a file, a capture session in
//! the host UI) described by connection parameters. It can import the data
//! directly or hand back a script expression that rebuilds it inside the
//! graph, which is how captured data becomes a live binding.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::core::Value;
use crate::errors::{Result, RunnerError};

/// Connection parameters: names and values a provider understands.
pub type ContextParameters = BTreeMap<String, Value>;

/// A named piece of external data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextData {
    pub name: String,
    pub data: Value,
    /// Provider the data came from.
    pub provider: String,
}

pub trait ContextDataProvider: Send + Sync {
    /// Unique name the provider is registered under.
    fn name(&self) -> &str;

    fn import_data(&self, parameters: &ContextParameters) -> Result<Vec<ContextData>>;

    /// Store `data` at `path`, returning the parameters that import it back.
    fn export_data(&self, _data: &[ContextData], _path: &Path) -> Result<ContextParameters> {
        Err(RunnerError::invalid_argument(format!(
            "context provider '{}' cannot export data",
            self.name()
        )))
    }

    /// Capture data interactively, returning the parameters to import it.
    fn capture_data(&self) -> Result<ContextParameters> {
        Ok(ContextParameters::new())
    }

    /// Script expression producing the data `parameters` describe, to be
    /// bound to `variable`.
    fn expression(&self, parameters: &ContextParameters, variable: &str) -> Result<String>;
}

/// Providers registered with a runner, by name.
#[derive(Default)]
pub struct ContextProviders {
    providers: DashMap<String, Arc<dyn ContextDataProvider>>,
}

impl ContextProviders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider`, replacing any provider with the same name.
    pub fn register(&self, provider: Arc<dyn ContextDataProvider>) {
        let name = provider.name().to_string();
        if self.providers.insert(name.clone(), provider).is_some() {
            tracing::debug!(provider = %name, "context provider replaced");
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn ContextDataProvider>> {
        self.providers
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RunnerError::invalid_argument(format!("no context provider named '{}'", name)))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.providers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl ContextDataProvider for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn import_data(&self, parameters: &ContextParameters) -> Result<Vec<ContextData>> {
            Ok(parameters
                .iter()
                .map(|(name, data)| ContextData {
                    name: name.clone(),
                    data: data.clone(),
                    provider: self.name().to_string(),
                })
                .collect())
        }

        fn expression(&self, _parameters: &ContextParameters, _variable: &str) -> Result<String> {
            Ok("1".to_string())
        }
    }

    #[test]
    fn test_registry_lookup() {
        let providers = ContextProviders::new();
        providers.register(Arc::new(Fixed));
        providers.register(Arc::new(Fixed));
        assert_eq!(providers.names(), vec!["fixed"]);

        let provider = providers.get("fixed").unwrap();
        let params = ContextParameters::from([("depth".to_string(), Value::Int(3))]);
        let data = provider.import_data(&params).unwrap();
        assert_eq!(data[0].name, "depth");
        assert_eq!(data[0].provider, "fixed");

        assert!(provider.export_data(&data, Path::new("out.csv")).is_err());
        assert!(provider.capture_data().unwrap().is_empty());
        assert_eq!(providers.get("other").err().unwrap().status_code(), -1);
    }
}
