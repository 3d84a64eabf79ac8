//! Registry - Flat lookup of resource handlers grouped by service package
//!
//! Each service package contributes its resources and data sources; the
//! registry flattens them into one map keyed by type name. The host discovers
//! the supported types by enumerating the registry once at startup.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::schema::ResourceSchema;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("duplicate {kind} type '{type_name}' registered by '{first}' and '{second}'")]
    Duplicate {
        kind: &'static str,
        type_name: String,
        first: String,
        second: String,
    },
}

/// Something registrable under a type name
pub trait Registered {
    fn type_name(&self) -> &str;
    fn schema(&self) -> &ResourceSchema;
}

impl<T: Registered + ?Sized> Registered for Arc<T> {
    fn type_name(&self) -> &str {
        (**self).type_name()
    }

    fn schema(&self) -> &ResourceSchema {
        (**self).schema()
    }
}

/// A group of resources for one cloud service
pub trait ServicePackage<H> {
    fn name(&self) -> &'static str;
    fn resources(&self) -> Vec<H>;
    fn data_sources(&self) -> Vec<H> {
        Vec::new()
    }
}

struct Entry<H> {
    service: String,
    handler: H,
}

pub struct Registry<H> {
    resources: HashMap<String, Entry<H>>,
    data_sources: HashMap<String, Entry<H>>,
}

impl<H: Registered> Registry<H> {
    pub fn new<'a, I>(packages: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = &'a dyn ServicePackage<H>>,
        H: 'a,
    {
        let mut resources = HashMap::new();
        let mut data_sources = HashMap::new();
        for package in packages {
            insert_all(&mut resources, "resource", package.name(), package.resources())?;
            insert_all(
                &mut data_sources,
                "data source",
                package.name(),
                package.data_sources(),
            )?;
        }
        Ok(Self {
            resources,
            data_sources,
        })
    }

    pub fn resource(&self, type_name: &str) -> Option<&H> {
        self.resources.get(type_name).map(|e| &e.handler)
    }

    pub fn data_source(&self, type_name: &str) -> Option<&H> {
        self.data_sources.get(type_name).map(|e| &e.handler)
    }

    /// Resource type names, sorted
    pub fn resource_types(&self) -> Vec<String> {
        sorted_keys(&self.resources)
    }

    /// Data source type names, sorted
    pub fn data_source_types(&self) -> Vec<String> {
        sorted_keys(&self.data_sources)
    }

    /// Service package that registered a resource or data source type
    pub fn service_of(&self, type_name: &str) -> Option<&str> {
        self.resources
            .get(type_name)
            .or_else(|| self.data_sources.get(type_name))
            .map(|e| e.service.as_str())
    }
}

fn insert_all<H: Registered>(
    map: &mut HashMap<String, Entry<H>>,
    kind: &'static str,
    service: &str,
    handlers: Vec<H>,
) -> Result<(), RegistryError> {
    for handler in handlers {
        let type_name = handler.type_name().to_string();
        if let Some(existing) = map.get(&type_name) {
            return Err(RegistryError::Duplicate {
                kind,
                type_name,
                first: existing.service.clone(),
                second: service.to_string(),
            });
        }
        map.insert(
            type_name,
            Entry {
                service: service.to_string(),
                handler,
            },
        );
    }
    Ok(())
}

fn sorted_keys<H>(map: &HashMap<String, Entry<H>>) -> Vec<String> {
    let mut keys: Vec<String> = map.keys().cloned().collect();
    keys.sort();
    keys
}
