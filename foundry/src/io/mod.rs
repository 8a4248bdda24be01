//! I/O helpers: file-backed stores, subprocesses and external collaborators.

pub mod command_runner;
pub mod config;
pub mod confirm;
pub mod generator;
pub mod git;
pub mod init;
pub mod manifest;
pub mod plan_queue;
pub mod process;
pub mod project_map;
pub mod prompt;
pub mod report;
pub mod tickets;
