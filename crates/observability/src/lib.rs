//! Process-wide logging setup shared by the server binary and the HTTP tests.

pub mod subscriber;

pub use subscriber::{init, init_for_tests, DEFAULT_DIRECTIVE};
