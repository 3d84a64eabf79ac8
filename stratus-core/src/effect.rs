//! Effect - A side effect described as a value
//!
//! Effects are produced by the differ and executed by the interpreter. Nothing
//! touches the cloud until an Effect is interpreted.

use std::collections::HashMap;

use crate::resource::{Resource, ResourceId, State, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Read a data source
    Read(Resource),
    Create(Resource),
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Delete then create, because a force-new attribute changed
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Delete a managed object. Carries the last known attributes since some
    /// deletes depend on them (e.g. `force_destroy`).
    Delete {
        id: ResourceId,
        identifier: String,
        attributes: HashMap<String, Value>,
    },
}

impl Effect {
    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Effect::Read(r) | Effect::Create(r) => &r.id,
            Effect::Update { id, .. } | Effect::Replace { id, .. } | Effect::Delete { id, .. } => {
                id
            }
        }
    }

    /// Whether interpreting this Effect changes the cloud
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Effect::Read(_))
    }

    /// Deletion of the object described by `state`
    pub fn delete_state(state: &State) -> Self {
        Effect::Delete {
            id: state.id.clone(),
            identifier: state.identifier.clone().unwrap_or_default(),
            attributes: state.attributes.clone(),
        }
    }
}
