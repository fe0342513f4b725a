//! Grounded execution: buffering a subtree so a template gets a fully
//! navigable node.

use crate::context::Context;
use crate::error::EngineError;
use crate::stylesheet::TemplateRule;
use std::rc::Rc;
use xylem_xdm::{EventAttribute, EventBuffer, Node, QName, SourceEvent, TreeBuilder};

/// Collects the events of one subtree, from its start-element through the
/// matching end-element. A nested-depth counter lets nested grounded
/// regions share the buffer: only the outermost exit completes the region.
#[derive(Debug, Default)]
pub struct GroundedExecutor {
    buffer: EventBuffer,
    depth: usize,
}

impl GroundedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.depth > 0
    }

    pub fn enter(&mut self, name: &QName, attributes: &[EventAttribute]) -> Result<(), EngineError> {
        self.buffer.record(SourceEvent::StartElement {
            name: name.clone(),
            attributes: attributes.to_vec(),
        })?;
        self.depth += 1;
        Ok(())
    }

    /// Records an end-element. Returns true when this closed the outermost
    /// element, completing the region.
    pub fn exit(&mut self, name: &QName) -> Result<bool, EngineError> {
        self.buffer
            .record(SourceEvent::EndElement { name: name.clone() })?;
        self.depth -= 1;
        Ok(self.depth == 0)
    }

    pub fn characters(&mut self, text: &str) -> Result<(), EngineError> {
        self.buffer
            .record(SourceEvent::Characters(text.to_string()))?;
        Ok(())
    }

    pub fn comment(&mut self, text: &str) -> Result<(), EngineError> {
        self.buffer.record(SourceEvent::Comment(text.to_string()))?;
        Ok(())
    }

    pub fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), EngineError> {
        self.buffer.record(SourceEvent::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        })?;
        Ok(())
    }

    pub fn prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<(), EngineError> {
        self.buffer.record(SourceEvent::StartPrefixMapping {
            prefix: prefix.to_string(),
            uri: uri.to_string(),
        })?;
        Ok(())
    }

    /// Materializes the buffered subtree as a fully navigable tree and
    /// resets the buffer for the next region. Returns the subtree's
    /// element node.
    pub fn materialize(&mut self) -> Result<Node, EngineError> {
        self.buffer.stop_recording();
        let mut builder = TreeBuilder::new();
        self.buffer.replay(&mut builder)?;
        let root = builder.finish();
        self.buffer.clear();
        root.children()
            .into_iter()
            .find(Node::is_element)
            .ok_or_else(|| EngineError::parse("grounded region contained no element"))
    }
}

/// Runs a template rule against a materialized subtree node.
pub fn execute_grounded(
    subtree: &Node,
    rule: &Rc<TemplateRule>,
    ctx: &Context,
) -> Result<(), EngineError> {
    let rule_ctx = ctx
        .with_current_node(subtree.clone())
        .with_variables(ctx.variables().push())
        .with_current_rule(rule.clone());
    rule.body.execute(&rule_ctx)
}
