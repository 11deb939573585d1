//! Built-in service adapters

pub mod biodbnet;
pub mod kegg;
pub mod pathwaycommons;

pub use biodbnet::BioDbNet;
pub use kegg::Kegg;
pub use pathwaycommons::PathwayCommons;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::service::Service;
use crate::transport::HttpTransport;

/// Service adapters by name
#[derive(Default, Clone)]
pub struct ServiceRegistry {
    services: BTreeMap<String, Arc<dyn Service>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in adapter, sharing one transport
    pub fn with_defaults(config: &EngineConfig) -> Result<Self> {
        let transport = HttpTransport::new(config)?;
        let mut registry = Self::new();
        registry.register(Arc::new(Kegg::new(transport.clone())?));
        registry.register(Arc::new(BioDbNet::new(transport.clone())?));
        registry.register(Arc::new(PathwayCommons::new(transport)?));
        Ok(registry)
    }

    /// Adds `service` under its own name, replacing any previous one
    pub fn register(&mut self, service: Arc<dyn Service>) {
        self.services.insert(service.name().to_string(), service);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Service>> {
        self.services
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| Error::UnknownService {
                name: name.to_string(),
                available: self.names().collect::<Vec<_>>().join(", "),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }
}
