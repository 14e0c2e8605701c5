// Grading orchestration: AST + level id -> generated script -> sandbox run

use crate::ast::AstNode;
use crate::error::GenerationError;
use crate::generator::ScriptGenerator;
use crate::levels::LevelRegistry;
use crate::sandbox::{ExecutionResult, SandboxExecutor};
use log::{info, warn};
use std::sync::Arc;

/// One grading request: `{"ast": ..., "levelId": ...}`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub ast: Option<AstNode>,
    pub level_id: Option<String>,
}

impl RunRequest {
    pub fn new(ast: AstNode, level_id: Option<String>) -> Self {
        Self {
            ast: Some(ast),
            level_id,
        }
    }

    /// Decode `{"ast": ..., "levelId": ...}`, or a bare AST with no level.
    pub fn from_json(input: &str) -> Result<Self, GenerationError> {
        let mut value: serde_json::Value = serde_json::from_str(input)?;
        let Some(ast) = value.get_mut("ast").map(serde_json::Value::take) else {
            return Ok(Self::new(AstNode::from_value(value)?, None));
        };

        let ast = match ast {
            serde_json::Value::Null => None,
            ast => Some(AstNode::from_value(ast)?),
        };
        let level_id = match value.get_mut("levelId").map(serde_json::Value::take) {
            Some(level_id) => serde_json::from_value(level_id)?,
            None => None,
        };
        Ok(Self { ast, level_id })
    }
}

pub struct Grader {
    generator: ScriptGenerator,
    levels: Arc<LevelRegistry>,
    executor: SandboxExecutor,
}

impl Grader {
    pub fn new(
        generator: ScriptGenerator,
        levels: Arc<LevelRegistry>,
        executor: SandboxExecutor,
    ) -> Self {
        Self {
            generator,
            levels,
            executor,
        }
    }

    pub fn generate(&self, ast: Option<&AstNode>) -> Result<String, GenerationError> {
        let root = ast.ok_or(GenerationError::MissingRoot)?;
        self.generator.generate(root)
    }

    /// Generate the learner's script and run it against the level's checks.
    ///
    /// Only a malformed program is an error. An unknown level id runs the
    /// script with no setup and a verification that always passes.
    pub fn grade(&self, request: &RunRequest) -> Result<ExecutionResult, GenerationError> {
        let script = self
            .generate(request.ast.as_ref())
            .inspect_err(|e| warn!("rejected run request: {e}"))?;

        let level = request.level_id.as_deref().and_then(|id| {
            let level = self.levels.get(id);
            if level.is_none() {
                warn!("unknown level `{id}`; running without verification");
            }
            level
        });

        let result = match level {
            Some(level) => {
                info!("grading level `{}`", level.id);
                self.executor.run(
                    &script,
                    &level.setup_commands,
                    level.verification_script.as_deref().unwrap_or_default(),
                )
            }
            None => self.executor.run(&script, &[], ""),
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeKind;

    #[test]
    fn request_with_level() {
        let request = RunRequest::from_json(
            r#"{"ast": {"kind": "script", "bindings": []}, "levelId": "intro"}"#,
        )
        .unwrap();
        assert_eq!(request.level_id.as_deref(), Some("intro"));
        assert_eq!(request.ast.unwrap().kind, NodeKind::Script);
    }

    #[test]
    fn bare_ast_is_a_request_without_level() {
        let request = RunRequest::from_json(r#"{"kind": "command", "name": "ls"}"#).unwrap();
        assert_eq!(request.level_id, None);
        assert_eq!(request.ast.unwrap().name, "ls");
    }

    #[test]
    fn wrapped_ast_with_unknown_kind() {
        let request = RunRequest::from_json(
            r#"{"ast": {"kind": "pipeline"}, "levelId": "intro"}"#,
        );
        assert!(matches!(
            request,
            Err(GenerationError::UnknownKind(k)) if k == "pipeline"
        ));
    }

    #[test]
    fn null_level_id_is_no_level() {
        let request =
            RunRequest::from_json(r#"{"ast": {"kind": "script"}, "levelId": null}"#).unwrap();
        assert_eq!(request.level_id, None);
    }

    #[test]
    fn null_ast_is_missing_root() {
        let request = RunRequest::from_json(r#"{"ast": null}"#).unwrap();
        let grader = Grader::new(
            ScriptGenerator::new(Arc::default()),
            Arc::default(),
            SandboxExecutor::default(),
        );
        assert!(matches!(
            grader.grade(&request),
            Err(GenerationError::MissingRoot)
        ));
    }
}
