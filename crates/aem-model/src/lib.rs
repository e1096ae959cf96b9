//! Domain model for the AEM deployment operator.
//!
//! Types in this crate describe the desired-state resource, its status, the
//! instances that make up a deployment and the naming rules that tie them
//! together. Nothing here performs I/O.

mod domain;
pub use domain::*;

mod error;
pub use error::ModelError;
