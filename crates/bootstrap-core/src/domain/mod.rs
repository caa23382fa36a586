//! Domain models for tofu-bootstrap.
//!
//! Canonical definitions for the core entities:
//! - `BootstrapRequest`: validated tenant/environment/repository inputs
//! - `DerivedNames`: every resource name a run touches
//! - `BootstrapError`: the error taxonomy of a run

pub mod error;
pub mod names;
pub mod request;

pub use error::{BootstrapError, InputValidationError, Result};
pub use names::DerivedNames;
pub use request::{parse_repository_url, BootstrapInput, BootstrapRequest, Environment};
