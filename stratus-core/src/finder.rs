//! Finder helpers
//!
//! A finder performs one lookup call and normalizes the vendor's "not found"
//! answer into `ErrorKind::NotFound`. These helpers cover the shapes shared by
//! most finders.

use crate::provider::ProviderResult;
use crate::resource::{ResourceId, State};

/// Turn a finder's `NotFound` into an absent state
pub fn found_or_state(id: &ResourceId, result: ProviderResult<State>) -> ProviderResult<State> {
    match result {
        Err(e) if e.is_not_found() => {
            log::debug!("{} not found, treating as absent: {}", id, e);
            Ok(State::not_found(id.clone()))
        }
        other => other,
    }
}

/// Treat `NotFound` from a delete as success
pub fn ignore_not_found(result: ProviderResult<()>) -> ProviderResult<()> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;

    #[test]
    fn not_found_becomes_absent_state() {
        let id = ResourceId::new("ec2_vpc", "main");
        let state = found_or_state(&id, Err(ProviderError::not_found("gone"))).unwrap();
        assert!(!state.exists);

        let err = found_or_state(&id, Err(ProviderError::new("denied"))).unwrap_err();
        assert_eq!(err.message, "denied");
    }

    #[test]
    fn delete_of_missing_object_succeeds() {
        assert!(ignore_not_found(Err(ProviderError::not_found("gone"))).is_ok());
        assert!(ignore_not_found(Err(ProviderError::retryable("slow down"))).is_err());
    }
}
