//! Type definitions shared by the retry engine and the configuration layer

mod policy;

pub use policy::{RetryPolicy, TraceOptions, DEFAULT_MAX_ATTEMPTS, DEFAULT_STACK_SIZE};
