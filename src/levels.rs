// Level Registry: setup commands and verification scripts per level

use crate::error::RegistryError;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Level {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub setup_commands: Vec<String>,
    #[serde(default)]
    pub verification_script: Option<String>,
}

// Level files come either wrapped (`{"levels": [...]}`) or as a bare list.
#[derive(Deserialize)]
#[serde(untagged)]
enum LevelFile {
    Wrapped { levels: Vec<Level> },
    Bare(Vec<Level>),
}

#[derive(Debug, Default)]
pub struct LevelRegistry {
    levels: Vec<Level>,
    by_id: HashMap<String, usize>,
}

impl LevelRegistry {
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let content = fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: LevelFile =
            serde_json::from_str(&content).map_err(|source| RegistryError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let levels = match file {
            LevelFile::Wrapped { levels } | LevelFile::Bare(levels) => levels,
        };

        let registry = Self::from_levels(levels)?;
        info!("loaded {} levels from {}", registry.len(), path.display());
        Ok(registry)
    }

    pub fn from_levels(levels: Vec<Level>) -> Result<Self, RegistryError> {
        let mut by_id = HashMap::with_capacity(levels.len());
        for (position, level) in levels.iter().enumerate() {
            if by_id.insert(level.id.clone(), position).is_some() {
                return Err(RegistryError::Duplicate {
                    kind: "level",
                    id: level.id.clone(),
                });
            }
        }
        Ok(Self { levels, by_id })
    }

    pub fn get(&self, id: &str) -> Option<&Level> {
        self.by_id.get(id).map(|&i| &self.levels[i])
    }

    /// Levels in file order.
    pub fn iter(&self) -> impl Iterator<Item = &Level> {
        self.levels.iter()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
