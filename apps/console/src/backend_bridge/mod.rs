//! Backend worker: owns the async runtime and the environment connection.

pub mod commands;
pub mod runtime;
