//! Application configuration.
//!
//! - [`ExecutionParams`]: loop ceilings, tool timeouts and approval mode

pub mod execution_params;

pub use execution_params::ExecutionParams;
