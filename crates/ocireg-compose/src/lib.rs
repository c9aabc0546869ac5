//! # ocireg-compose
//!
//! Contract-to-contract wrappers over [`ocireg_core::registry::Registry`]:
//! filter middlewares ([`Select`], [`Sub`], [`ReadOnly`], [`Immutable`])
//! and a two-backend mirroring composite ([`Unifier`]). Every type here
//! takes one or more `Arc<dyn Registry>` and produces another `Registry`
//! implementation, so they compose in any order and stack with any
//! backend, including each other.

mod error;
pub use error::{Error, Result};

mod filters;
pub use filters::{Immutable, ReadOnly, Select, Sub};

mod unifier;
pub use unifier::{ReadPolicy, Unifier};
