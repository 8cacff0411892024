//! I/O adapters: configuration, subprocesses, git, HTTP and the filesystem.

pub mod baseline;
pub mod bundle;
pub mod catalog;
pub mod config;
pub mod git;
pub mod github;
pub mod process;
pub mod reporter;
pub mod sandbox;
pub mod scripts;
pub mod tools;
