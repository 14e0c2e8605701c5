// Definition Registry: rendering rules for commands, controls and operators
//
// Loaded once at startup from the JSON catalog shared with the block editor
// and read-only afterwards. Entries carry a lot of editor-only metadata
// (labels, colors, help text); only what the generator needs is kept.

use crate::error::RegistryError;
use log::info;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandDefinition {
    pub id: String,
    pub shell_command: String,
    /// Closing word emitted after the operands, e.g. `]` for `[`.
    #[serde(default)]
    pub syntax_end: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlSlot {
    pub name: String,
    #[serde(default)]
    pub syntax_prefix: Option<String>,
    #[serde(default)]
    pub obligatory: bool,
    /// Lay the slot out as a block even when its content fits on one line.
    #[serde(default)]
    pub break_line_before: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlDefinition {
    pub id: String,
    /// Opening keyword, e.g. `if`, `while`, `for`.
    pub shell_command: String,
    #[serde(default)]
    pub syntax_end: Option<String>,
    #[serde(default)]
    pub slots: Vec<ControlSlot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolPlacement {
    #[default]
    Before,
    After,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorSlot {
    pub name: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub symbol_placement: Option<SymbolPlacement>,
}

impl OperatorSlot {
    pub fn placement(&self) -> SymbolPlacement {
        self.symbol_placement.unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorDefinition {
    pub id: String,
    #[serde(default)]
    pub slots: Vec<OperatorSlot>,
}

#[derive(Deserialize)]
struct Catalog {
    #[serde(default)]
    commands: Vec<CommandDefinition>,
    #[serde(default)]
    controls: Vec<ControlDefinition>,
    #[serde(default)]
    operators: Vec<OperatorDefinition>,
}

#[derive(Debug, Default)]
pub struct DefinitionRegistry {
    commands: HashMap<String, CommandDefinition>,
    controls: HashMap<String, ControlDefinition>,
    operators: HashMap<String, OperatorDefinition>,
}

impl DefinitionRegistry {
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let content = fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog: Catalog =
            serde_json::from_str(&content).map_err(|source| RegistryError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let registry = Self::from_definitions(catalog.commands, catalog.controls, catalog.operators)?;
        info!(
            "loaded {} commands, {} controls, {} operators from {}",
            registry.commands.len(),
            registry.controls.len(),
            registry.operators.len(),
            path.display()
        );
        Ok(registry)
    }

    pub fn from_definitions(
        commands: Vec<CommandDefinition>,
        controls: Vec<ControlDefinition>,
        operators: Vec<OperatorDefinition>,
    ) -> Result<Self, RegistryError> {
        Ok(Self {
            commands: index("command", commands, |d| &d.id)?,
            controls: index("control", controls, |d| &d.id)?,
            operators: index("operator", operators, |d| &d.id)?,
        })
    }

    pub fn command(&self, id: &str) -> Option<&CommandDefinition> {
        self.commands.get(id)
    }

    pub fn control(&self, id: &str) -> Option<&ControlDefinition> {
        self.controls.get(id)
    }

    pub fn operator(&self, id: &str) -> Option<&OperatorDefinition> {
        self.operators.get(id)
    }
}

fn index<T>(
    kind: &'static str,
    items: Vec<T>,
    id: impl Fn(&T) -> &String,
) -> Result<HashMap<String, T>, RegistryError> {
    let mut map = HashMap::with_capacity(items.len());
    for item in items {
        let key = id(&item).clone();
        if map.contains_key(&key) {
            return Err(RegistryError::Duplicate { kind, id: key });
        }
        map.insert(key, item);
    }
    Ok(map)
}
