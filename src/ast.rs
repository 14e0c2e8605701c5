// Abstract Syntax Tree definitions
//
// A learner program arrives as a tree of nodes. Each node keeps its raw
// block data (named fields and named child lists) plus an ordered list of
// bindings that say which slot each piece of raw data fills.

use crate::error::GenerationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Binding keys with a fixed meaning on structural nodes.
pub mod keys {
    pub const COMMANDS: &str = "commands";
    pub const OPTIONS: &str = "options";
    pub const OPERANDS: &str = "operands";
    pub const FLAG: &str = "flag";
    pub const VALUE: &str = "value";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NodeKind {
    Script,
    Command,
    Control,
    Operator,
    Option,
    Operand,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Script => "script",
            NodeKind::Command => "command",
            NodeKind::Control => "control",
            NodeKind::Operator => "operator",
            NodeKind::Option => "option",
            NodeKind::Operand => "operand",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "script" => Ok(NodeKind::Script),
            "command" => Ok(NodeKind::Command),
            "control" => Ok(NodeKind::Control),
            "operator" => Ok(NodeKind::Operator),
            "option" => Ok(NodeKind::Option),
            "operand" => Ok(NodeKind::Operand),
            other => Err(GenerationError::UnknownKind(other.to_string())),
        }
    }
}

impl TryFrom<String> for NodeKind {
    type Error = GenerationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Where a binding's data lives on the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Field,
    Input,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Field => f.write_str("field"),
            SourceKind::Input => f.write_str("input"),
        }
    }
}

/// A binding's data source: a literal field or a named list of children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Field(String),
    Input(String),
}

impl Source {
    pub fn kind(&self) -> SourceKind {
        match self {
            Source::Field(_) => SourceKind::Field,
            Source::Input(_) => SourceKind::Input,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Source::Field(name) | Source::Input(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawBinding", into = "RawBinding")]
pub struct Binding {
    pub key: String,
    pub source: Source,
}

// Wire shape of a binding: `{"key", "source": "field" | "input", "name"}`
#[derive(Serialize, Deserialize)]
struct RawBinding {
    key: String,
    source: SourceKind,
    name: String,
}

impl From<RawBinding> for Binding {
    fn from(raw: RawBinding) -> Self {
        let source = match raw.source {
            SourceKind::Field => Source::Field(raw.name),
            SourceKind::Input => Source::Input(raw.name),
        };
        Binding {
            key: raw.key,
            source,
        }
    }
}

impl From<Binding> for RawBinding {
    fn from(binding: Binding) -> Self {
        let source = binding.source.kind();
        let name = match binding.source {
            Source::Field(name) | Source::Input(name) => name,
        };
        RawBinding {
            key: binding.key,
            source,
            name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub name: String,
    #[serde(default)]
    pub children: Vec<AstNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AstNode {
    #[serde(alias = "nodeType")]
    pub kind: NodeKind,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub bindings: Vec<Binding>,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub inputs: Vec<Input>,
}

impl AstNode {
    pub fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            bindings: Vec::new(),
            fields: Vec::new(),
            inputs: Vec::new(),
        }
    }

    /// Decode a learner program from JSON. A `null` document has no root.
    pub fn from_json(input: &str) -> Result<Self, GenerationError> {
        let value: serde_json::Value = serde_json::from_str(input)?;
        Self::from_value(value)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, GenerationError> {
        if value.is_null() {
            return Err(GenerationError::MissingRoot);
        }
        check_kinds(&value)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Bind `key` to a literal value stored under a field of the same name.
    pub fn with_field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.bindings.push(Binding {
            key: key.to_string(),
            source: Source::Field(key.to_string()),
        });
        self.fields.push(Field {
            name: key.to_string(),
            value: value.into(),
        });
        self
    }

    /// Bind `key` to a list of children stored under an input of the same name.
    pub fn with_input(mut self, key: &str, children: Vec<AstNode>) -> Self {
        self.bindings.push(Binding {
            key: key.to_string(),
            source: Source::Input(key.to_string()),
        });
        self.inputs.push(Input {
            name: key.to_string(),
            children,
        });
        self
    }

    pub fn binding(&self, key: &str) -> Option<&Binding> {
        self.bindings.iter().find(|b| b.key == key)
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    pub fn input(&self, name: &str) -> &[AstNode] {
        self.inputs
            .iter()
            .find(|i| i.name == name)
            .map(|i| i.children.as_slice())
            .unwrap_or_default()
    }
}

// Serde would bury an unknown kind inside a `Malformed` error; find it first.
fn check_kinds(value: &serde_json::Value) -> Result<(), GenerationError> {
    let kind = value.get("kind").or_else(|| value.get("nodeType"));
    if let Some(kind) = kind.and_then(serde_json::Value::as_str) {
        kind.parse::<NodeKind>()?;
    }

    let inputs = value.get("inputs").and_then(serde_json::Value::as_array);
    for input in inputs.into_iter().flatten() {
        let children = input.get("children").and_then(serde_json::Value::as_array);
        for child in children.into_iter().flatten() {
            check_kinds(child)?;
        }
    }
    Ok(())
}
