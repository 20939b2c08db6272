//! Base types and error handling.
//!
//! - [`AskerError`](askererror::AskerError): the error taxonomy with stable codes
//! - [`Diagnostics`](context::Diagnostics): request identity bound into errors
//! - [`Timings`](timer::Timings): named execution spans
//! - [`ExecutionState`](state::ExecutionState): request lifecycle

pub mod askererror;
pub mod context;
pub mod state;
pub mod timer;
