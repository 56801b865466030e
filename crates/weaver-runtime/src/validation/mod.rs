//! Input and output contract validation.
//!
//! - [`validate_node_input`]: may a node run given the current context?
//! - [`validate_node_output`]: is a node's output usable?

mod input;
pub mod output;

pub use input::{
    InputStatus, InputValidation, PredecessorGate, TEMPLATED_FIELDS, validate_node_input,
    validate_node_input_with_gate,
};
pub use output::{OutputStatus, OutputValidation, OutputValidator, validate_node_output};
