//! Stack-Manager: Cloud Resource Manager Seam for tofu-bootstrap
//!
//! This crate owns every interaction with the cloud resource manager. The
//! bootstrap workflow only ever submits desired state for a named stack and
//! reads back its status and outputs; it never creates resources itself.
//!
//! ## Layer 0 - Cloud Resource Manager
//!
//! Focus: stack lifecycle, error classification, and a faithful fake.
//!
//! ## Key Components
//!
//! - `StackManager`: async trait the deployer is written against
//! - `CloudFormationStackManager`: AWS CloudFormation implementation
//! - `MemoryStackManager`: in-memory fake (see `fakes`)

mod cloudformation;
mod error;
pub mod fakes;
pub mod stack_traits;

pub use cloudformation::{default_region, CloudFormationStackManager};
pub use error::StackError;
pub use stack_traits::{
    ResourceFailure, StackDescription, StackManager, StackOutput, StackPhase, StackRequest,
    StackResult, StackStatus, UpdateOutcome,
};
