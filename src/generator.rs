// Script generator: walks a learner AST and emits shell script text

use crate::ast::{AstNode, NodeKind, Source, SourceKind, keys};
use crate::definitions::{
    ControlDefinition, DefinitionRegistry, OperatorDefinition, SymbolPlacement,
};
use crate::error::GenerationError;
use crate::shell::{indent, quote};
use std::sync::Arc;

/// Turns learner ASTs into shell script text.
///
/// Generation is a pure function of the tree and the definition registry, so a
/// single generator can be shared freely between threads.
#[derive(Debug, Clone)]
pub struct ScriptGenerator {
    definitions: Arc<DefinitionRegistry>,
}

// What a slot is bound to once its binding has been resolved.
enum SlotContent<'a> {
    Nodes(&'a [AstNode]),
    Literal(Option<&'a str>),
    Unbound,
}

impl ScriptGenerator {
    pub fn new(definitions: Arc<DefinitionRegistry>) -> Self {
        Self { definitions }
    }

    pub fn generate(&self, root: &AstNode) -> Result<String, GenerationError> {
        self.render(root)
    }

    fn render(&self, node: &AstNode) -> Result<String, GenerationError> {
        match node.kind {
            NodeKind::Script => {
                check_structural_keys(node, &[keys::COMMANDS])?;
                let commands = input_binding(node, keys::COMMANDS)?;
                self.render_statements(commands)
            }
            NodeKind::Command => self.render_command(node),
            NodeKind::Control => self.render_control(node),
            NodeKind::Operator => self.render_operator(node),
            NodeKind::Option | NodeKind::Operand => Err(GenerationError::Misplaced {
                kind: node.kind,
                context: "as a statement",
            }),
        }
    }

    /// Render a statement list, one per line, dropping blank renders.
    fn render_statements(&self, nodes: &[AstNode]) -> Result<String, GenerationError> {
        let mut lines = Vec::with_capacity(nodes.len());
        for node in nodes {
            let code = self.render(node)?;
            if !code.trim().is_empty() {
                lines.push(code);
            }
        }
        Ok(lines.join("\n"))
    }

    fn render_command(&self, node: &AstNode) -> Result<String, GenerationError> {
        if node.name.is_empty() {
            return Err(GenerationError::MissingName { kind: node.kind });
        }
        check_structural_keys(node, &[keys::OPTIONS, keys::OPERANDS])?;

        let def = self.definitions.command(&node.name);
        let mut words: Vec<String> = Vec::new();
        match def {
            Some(def) => words.push(def.shell_command.clone()),
            None => words.push(quote(&node.name).into_owned()),
        }

        for option in input_binding(node, keys::OPTIONS)? {
            if option.kind != NodeKind::Option {
                return Err(GenerationError::Misplaced {
                    kind: option.kind,
                    context: "under `options`",
                });
            }
            check_structural_keys(option, &[keys::FLAG, keys::VALUE])?;
            let Some(flag) = field_binding(option, keys::FLAG)?.filter(|f| !f.is_empty()) else {
                continue;
            };
            words.push(quote(flag).into_owned());
            if let Some(argument) = field_binding(option, keys::VALUE)? {
                words.push(quote(argument).into_owned());
            }
        }

        for operand in input_binding(node, keys::OPERANDS)? {
            if operand.kind != NodeKind::Operand {
                return Err(GenerationError::Misplaced {
                    kind: operand.kind,
                    context: "under `operands`",
                });
            }
            check_structural_keys(operand, &[keys::VALUE])?;
            if let Some(value) = field_binding(operand, keys::VALUE)? {
                words.push(quote(value).into_owned());
            }
        }

        if let Some(end) = def.and_then(|d| d.syntax_end.as_deref()).filter(|e| !e.is_empty()) {
            words.push(end.to_string());
        }
        Ok(words.join(" "))
    }

    fn render_control(&self, node: &AstNode) -> Result<String, GenerationError> {
        let def = self.definitions.control(&node.name).ok_or_else(|| {
            GenerationError::UnknownDefinition {
                kind: NodeKind::Control,
                name: node.name.clone(),
            }
        })?;
        check_binding_order(node, def.slots.iter().map(|s| s.name.as_str()))?;

        let mut out = def.shell_command.clone();
        for slot in &def.slots {
            let content = match self.slot_content(node, &slot.name)? {
                SlotContent::Nodes(children) => self.render_statements(children)?,
                SlotContent::Literal(_) => {
                    return Err(GenerationError::BindingSource {
                        name: node.name.clone(),
                        key: slot.name.clone(),
                        expected: SourceKind::Input,
                    });
                }
                SlotContent::Unbound => String::new(),
            };

            if content.trim().is_empty() {
                if slot.obligatory {
                    return Err(missing_slot(def, &slot.name));
                }
                continue;
            }

            let prefix = slot.syntax_prefix.as_deref().filter(|p| !p.is_empty());
            if slot.break_line_before || content.contains('\n') {
                if let Some(prefix) = prefix {
                    out.push('\n');
                    out.push_str(prefix);
                }
                out.push('\n');
                out.push_str(&indent(&content));
            } else {
                if let Some(prefix) = prefix {
                    out.push(' ');
                    out.push_str(prefix);
                }
                out.push(' ');
                out.push_str(&content);
            }
        }

        if let Some(end) = def.syntax_end.as_deref().filter(|e| !e.is_empty()) {
            out.push('\n');
            out.push_str(end);
        }
        Ok(out)
    }

    fn render_operator(&self, node: &AstNode) -> Result<String, GenerationError> {
        let def = self.operator_definition(node)?;
        check_binding_order(node, def.slots.iter().map(|s| s.name.as_str()))?;

        let mut parts = Vec::with_capacity(def.slots.len());
        for slot in &def.slots {
            let content = match self.slot_content(node, &slot.name)? {
                SlotContent::Nodes(children) => {
                    let rendered = self.render_statements(children)?;
                    if rendered.contains('\n') {
                        format!("(\n{}\n)", indent(&rendered))
                    } else {
                        rendered
                    }
                }
                SlotContent::Literal(Some(value)) => quote(value).into_owned(),
                SlotContent::Literal(None) | SlotContent::Unbound => String::new(),
            };

            let symbol = slot.symbol.as_deref().filter(|s| !s.is_empty());
            let part = match (symbol, content.is_empty()) {
                (None, _) => content,
                (Some(symbol), true) => symbol.to_string(),
                (Some(symbol), false) => match slot.placement() {
                    SymbolPlacement::Before => format!("{symbol} {content}"),
                    SymbolPlacement::After => format!("{content} {symbol}"),
                },
            };
            if !part.is_empty() {
                parts.push(part);
            }
        }
        Ok(parts.join(" "))
    }

    fn operator_definition(&self, node: &AstNode) -> Result<&OperatorDefinition, GenerationError> {
        self.definitions
            .operator(&node.name)
            .ok_or_else(|| GenerationError::UnknownDefinition {
                kind: NodeKind::Operator,
                name: node.name.clone(),
            })
    }

    fn slot_content<'a>(
        &self,
        node: &'a AstNode,
        slot: &str,
    ) -> Result<SlotContent<'a>, GenerationError> {
        Ok(match node.binding(slot).map(|b| &b.source) {
            Some(Source::Input(name)) => SlotContent::Nodes(node.input(name)),
            Some(Source::Field(name)) => SlotContent::Literal(node.field(name)),
            None => SlotContent::Unbound,
        })
    }
}

fn missing_slot(def: &ControlDefinition, slot: &str) -> GenerationError {
    GenerationError::MissingSlot {
        control: def.id.clone(),
        slot: slot.to_string(),
    }
}

/// Children bound to a structural `input` key. Unbound keys have no children.
fn input_binding<'a>(node: &'a AstNode, key: &str) -> Result<&'a [AstNode], GenerationError> {
    match node.binding(key).map(|b| &b.source) {
        Some(Source::Input(name)) => Ok(node.input(name)),
        Some(Source::Field(_)) => Err(source_mismatch(node, key, SourceKind::Input)),
        None => Ok(&[]),
    }
}

/// Literal value bound to a structural `field` key.
fn field_binding<'a>(node: &'a AstNode, key: &str) -> Result<Option<&'a str>, GenerationError> {
    match node.binding(key).map(|b| &b.source) {
        Some(Source::Field(name)) => Ok(node.field(name)),
        Some(Source::Input(_)) => Err(source_mismatch(node, key, SourceKind::Field)),
        None => Ok(None),
    }
}

fn source_mismatch(node: &AstNode, key: &str, expected: SourceKind) -> GenerationError {
    GenerationError::BindingSource {
        name: display_name(node),
        key: key.to_string(),
        expected,
    }
}

// Structural nodes are often nameless; fall back to their kind.
fn display_name(node: &AstNode) -> String {
    if node.name.is_empty() {
        node.kind.to_string()
    } else {
        node.name.clone()
    }
}

/// Structural nodes accept only their fixed keys, each at most once.
fn check_structural_keys(node: &AstNode, allowed: &[&str]) -> Result<(), GenerationError> {
    for (i, binding) in node.bindings.iter().enumerate() {
        if !allowed.contains(&binding.key.as_str()) {
            return Err(GenerationError::UnknownSlot {
                name: display_name(node),
                slot: binding.key.clone(),
            });
        }
        if node.bindings[..i].iter().any(|b| b.key == binding.key) {
            return Err(GenerationError::SlotOrder {
                name: display_name(node),
                slot: binding.key.clone(),
            });
        }
    }
    Ok(())
}

/// Bindings must name declared slots, each at most once, in declared order.
fn check_binding_order<'a>(
    node: &AstNode,
    slots: impl Iterator<Item = &'a str> + Clone,
) -> Result<(), GenerationError> {
    let mut last: Option<usize> = None;
    for binding in &node.bindings {
        let position = slots
            .clone()
            .position(|s| s == binding.key)
            .ok_or_else(|| GenerationError::UnknownSlot {
                name: node.name.clone(),
                slot: binding.key.clone(),
            })?;
        if last.is_some_and(|l| position <= l) {
            return Err(GenerationError::SlotOrder {
                name: node.name.clone(),
                slot: binding.key.clone(),
            });
        }
        last = Some(position);
    }
    Ok(())
}
