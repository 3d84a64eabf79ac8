//! Stratus Core
//!
//! Resource model and the shared plumbing every Stratus resource handler is
//! built from: schemas, finders, waiters, retries, pagination and ID parsing.

pub mod arn;
pub mod config;
pub mod differ;
pub mod effect;
pub mod finder;
pub mod id;
pub mod interpreter;
pub mod paginate;
pub mod plan;
pub mod provider;
pub mod registry;
pub mod resource;
pub mod retry;
pub mod schema;
pub mod tags;
pub mod timeouts;
pub mod waiter;
