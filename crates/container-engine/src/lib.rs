//! Runtime-agnostic container engine abstraction
//!
//! This crate provides the thin layer the orchestrator uses to talk to a
//! container engine: a [`ContainerEngine`] trait covering the create, start,
//! stop, kill, remove, exec, logs, inspect and copy primitives, a
//! [`ContainerHandle`] bound to a single named container, and a backend that
//! drives the `docker` CLI.
//!
//! An in-memory engine is available behind the `test-utils` feature so that
//! dependent crates can exercise their lifecycle logic without a daemon.

#![warn(missing_docs)]

pub mod command;
pub mod docker;
pub mod engine;
pub mod error;
pub mod handle;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod types;

pub use command::{Command, CommandOutput};
pub use docker::DockerCli;
pub use engine::{ContainerEngine, LogStream};
pub use error::{Error, Result};
pub use handle::ContainerHandle;
#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryEngine;
pub use types::{
    ContainerInfo, ContainerLink, ContainerSpec, ContainerStatus, ExecOutput, LogOptions, Mount,
    RemoveOptions, Tail,
};
