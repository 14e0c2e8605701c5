// Error types shared across the crate

use crate::ast::{NodeKind, SourceKind};
use std::path::PathBuf;
use thiserror::Error;

/// A learner program that cannot be turned into a script.
///
/// These are per-request failures: the request is rejected, nothing is retried
/// and the process keeps serving.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("AST root is missing")]
    MissingRoot,

    #[error("malformed AST: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unknown node kind `{0}`")]
    UnknownKind(String),

    #[error("{kind} node has no name")]
    MissingName { kind: NodeKind },

    #[error("no {kind} definition named `{name}`")]
    UnknownDefinition { kind: NodeKind, name: String },

    #[error("control `{control}` requires slot `{slot}`")]
    MissingSlot { control: String, slot: String },

    #[error("`{name}` has no slot `{slot}`")]
    UnknownSlot { name: String, slot: String },

    #[error("binding for slot `{slot}` of `{name}` is out of declared order or repeated")]
    SlotOrder { name: String, slot: String },

    #[error("binding `{key}` of `{name}` must be {expected}-sourced")]
    BindingSource {
        name: String,
        key: String,
        expected: SourceKind,
    },

    #[error("{kind} node cannot appear {context}")]
    Misplaced {
        kind: NodeKind,
        context: &'static str,
    },
}

/// Failure loading one of the startup catalogs. Always fatal.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("duplicate {kind} id `{id}`")]
    Duplicate { kind: &'static str, id: String },
}

/// The container runtime is unusable. Detected once at startup.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("`{binary}` not found on PATH ({source}); install a container runtime first")]
    BinaryNotFound {
        binary: String,
        #[source]
        source: which::Error,
    },

    #[error(
        "no permission to use `{binary}`; add your user to its group or allow passwordless `sudo {binary}`"
    )]
    PermissionDenied { binary: String },

    #[error("container runtime I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("building image `{image}` failed with {status}")]
    ImageBuild { image: String, status: String },
}
