//! Tester for CKAN metadata pull requests.
//!
//! Selects the `.netkan` and `.ckan` files a run should look at, lints them,
//! expands or validates them with the external tools, and installs every
//! result into a throwaway game instance. Problems are reported as GitHub
//! Actions annotations.
//!
//! - **[`core`]**: pure logic (game versions, descriptors, directives,
//!   annotations, path rules). No I/O.
//! - **[`io`]**: side effects (subprocesses, git, HTTP, filesystem, sandboxes).
//!
//! Orchestration modules ([`change_set`], [`pipeline`], [`install`]) combine
//! the two into a run.

pub mod change_set;
pub mod core;
pub mod exit_codes;
pub mod install;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
