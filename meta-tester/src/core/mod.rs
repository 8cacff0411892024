//! Deterministic, pure logic shared by the tester.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod annotation;
pub mod descriptor;
pub mod directives;
pub mod errors;
pub mod game;
pub mod mod_version;
pub mod paths;
pub mod types;
pub mod version;
