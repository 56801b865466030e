#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod analytics;
pub mod checkpoint;
pub mod context;
pub mod definition;
pub mod engine;
mod error;
pub mod events;
pub mod graph;
pub mod pricing;
pub mod processor;
pub mod queue;
pub mod routing;
pub mod store;
pub mod validation;
pub mod variable;

#[cfg(any(test, feature = "test-utils"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-utils")))]
pub mod mock;

#[doc(hidden)]
pub mod prelude;

pub use error::{
    CheckpointError, ErrorKind, GraphError, InputValidationError, PersistenceError,
    ProcessorError, WorkflowError, WorkflowResult,
};

/// Tracing target for runtime operations.
pub const TRACING_TARGET: &str = "weaver_runtime";
