//! # shellblocks
//!
//! Turns block-built command-line programs into shell scripts and grades them.
//!
//! A learner's program arrives as an [`ast::AstNode`] tree. The
//! [`generator::ScriptGenerator`] renders it to shell text using the rules in a
//! [`definitions::DefinitionRegistry`], and the [`sandbox::SandboxExecutor`]
//! runs that text between a level's setup and verification scripts inside a
//! network-less, resource-capped container. [`grader::Grader`] wires the two
//! together for one request.

pub mod ast;
pub mod definitions;
pub mod error;
pub mod generator;
pub mod grader;
pub mod levels;
pub mod runtime;
pub mod sandbox;
pub mod shell;

pub use ast::{AstNode, NodeKind};
pub use definitions::DefinitionRegistry;
pub use error::{GenerationError, RegistryError, RuntimeError};
pub use generator::ScriptGenerator;
pub use grader::{Grader, RunRequest};
pub use levels::{Level, LevelRegistry};
pub use runtime::RuntimeCommand;
pub use sandbox::{ExecutionResult, SandboxConfig, SandboxExecutor};
