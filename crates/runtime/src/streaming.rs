//! The streaming path: a source-event sink that drives transformation
//! without materializing the document.

use crate::context::Context;
use crate::error::EngineError;
use crate::grounded::{GroundedExecutor, execute_grounded};
use crate::matcher::is_builtin;
use crate::source;
use crate::stylesheet::{TemplateBody, TemplateRule};
use crate::transformer::Transformer;
use std::rc::Rc;
use xylem_serializer::OutputHandler;
use xylem_xdm::{EventAttribute, Node, QName, SourceEventHandler};

struct GroundingState {
    executor: GroundedExecutor,
    rule: Rc<TemplateRule>,
    trigger: Node,
}

/// Receives source events and transforms on the fly.
///
/// A pointer to the current streaming node tracks the open-element chain;
/// nodes are unlinked as their elements close, so memory stays bounded by
/// depth. Accumulators are notified around every element. When the matcher
/// selects a rule that needs grounding, the subtree is buffered, then
/// materialized and executed as one unit.
pub struct StreamingHandler {
    ctx: Context,
    body: Rc<dyn TemplateBody>,
    root: Node,
    current: Node,
    depth: usize,
    order: u64,
    pending_mappings: Vec<(String, String)>,
    grounding: Option<GroundingState>,
}

impl StreamingHandler {
    pub fn new(ctx: Context, body: Rc<dyn TemplateBody>) -> Self {
        let root = Node::new_root();
        root.set_fully_navigable(false);
        Self {
            ctx,
            body,
            current: root.clone(),
            root,
            depth: 0,
            order: 0,
            pending_mappings: Vec::new(),
            grounding: None,
        }
    }

    /// The current streaming node; the document root before the first
    /// element.
    pub fn current_node(&self) -> &Node {
        &self.current
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    fn next_order(&mut self) -> u64 {
        self.order += 1;
        self.order
    }

    fn notify_start(&self, node: &Node) -> Result<(), EngineError> {
        if let Some(manager) = self.ctx.accumulators() {
            manager.borrow_mut().start_element(node, &self.ctx)?;
        }
        Ok(())
    }

    fn notify_end(&self, node: &Node) -> Result<(), EngineError> {
        if let Some(manager) = self.ctx.accumulators() {
            manager.borrow_mut().end_element(node, &self.ctx)?;
        }
        Ok(())
    }

    /// Normal close of the current streaming node: post-descent rules,
    /// unlink, depth decrement.
    fn close_current(&mut self) -> Result<(), EngineError> {
        let node = self.current.clone();
        let parent = node.parent().unwrap_or_else(|| self.root.clone());
        self.notify_end(&node)?;
        node.detach();
        self.current = parent;
        self.depth -= 1;
        Ok(())
    }
}

impl SourceEventHandler for StreamingHandler {
    type Error = EngineError;

    fn start_document(&mut self) -> Result<(), EngineError> {
        if let Some(manager) = self.ctx.accumulators() {
            manager.borrow_mut().start_document(&self.ctx)?;
        }
        self.ctx.checked_output()?.borrow_mut().start_document()?;
        Ok(())
    }

    fn end_document(&mut self) -> Result<(), EngineError> {
        if let Some(manager) = self.ctx.accumulators() {
            manager.borrow_mut().reset();
        }
        self.ctx.checked_output()?.borrow_mut().end_document()?;
        Ok(())
    }

    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<(), EngineError> {
        if let Some(grounding) = &mut self.grounding {
            return grounding.executor.prefix_mapping(prefix, uri);
        }
        self.pending_mappings
            .push((prefix.to_string(), uri.to_string()));
        Ok(())
    }

    fn start_element(
        &mut self,
        name: &QName,
        attributes: &[EventAttribute],
    ) -> Result<(), EngineError> {
        self.ctx.check_cancelled()?;
        if let Some(grounding) = &mut self.grounding {
            return grounding.executor.enter(name, attributes);
        }

        self.depth += 1;
        let node = Node::new_element(name.clone());
        node.set_fully_navigable(false);
        node.set_document_order(self.next_order());
        for (prefix, uri) in self.pending_mappings.drain(..) {
            node.add_namespace(&prefix, &uri);
        }
        for attr in attributes {
            let attr_node = Node::new_attribute(attr.name.clone(), attr.value.clone());
            attr_node.set_dtd_type(attr.dtd_type);
            attr_node.set_document_order(self.order + 1);
            self.order += 1;
            attr_node.set_fully_navigable(false);
            node.add_attribute(&attr_node);
        }
        self.current.append_child(&node);
        self.current = node.clone();

        self.notify_start(&node)?;

        let rule = self
            .ctx
            .matcher()
            .find_match(&node, self.ctx.mode(), &self.ctx)?;
        if !is_builtin(&rule) && rule.grounded {
            let mut executor = GroundedExecutor::new();
            executor.enter(name, attributes)?;
            self.grounding = Some(GroundingState {
                executor,
                rule,
                trigger: node,
            });
            return Ok(());
        }

        if self.depth == 1 {
            let entry_ctx = self.ctx.with_current_node(node);
            self.body.execute(&entry_ctx)?;
        }
        Ok(())
    }

    fn end_element(&mut self, name: &QName) -> Result<(), EngineError> {
        let finished = match &mut self.grounding {
            Some(grounding) => grounding.executor.exit(name)?,
            None => return self.close_current(),
        };
        if !finished {
            return Ok(());
        }
        if let Some(state) = self.grounding.take() {
            let mut executor = state.executor;
            let subtree = executor.materialize()?;
            execute_grounded(&subtree, &state.rule, &self.ctx)?;
            debug_assert!(state.trigger.same_node(&self.current));
        }
        self.close_current()
    }

    fn characters(&mut self, text: &str) -> Result<(), EngineError> {
        if let Some(grounding) = &mut self.grounding {
            return grounding.executor.characters(text);
        }
        // Text accumulates on the current node's (single) text child.
        if let Some(last) = self.current.last_child()
            && last.is_text()
        {
            last.append_to_value(text);
        } else {
            let node = Node::new_text(text);
            node.set_fully_navigable(false);
            node.set_document_order(self.next_order());
            self.current.append_child(&node);
        }
        Ok(())
    }

    fn comment(&mut self, text: &str) -> Result<(), EngineError> {
        if let Some(grounding) = &mut self.grounding {
            return grounding.executor.comment(text);
        }
        let node = Node::new_comment(text);
        node.set_fully_navigable(false);
        node.set_document_order(self.next_order());
        self.current.append_child(&node);
        Ok(())
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), EngineError> {
        if let Some(grounding) = &mut self.grounding {
            return grounding.executor.processing_instruction(target, data);
        }
        let node = Node::new_processing_instruction(target, data);
        node.set_fully_navigable(false);
        node.set_document_order(self.next_order());
        self.current.append_child(&node);
        Ok(())
    }
}

impl Transformer {
    /// Streams a document through the handler: the body executes once with
    /// the root element as the XSLT current node, accumulators update
    /// along the way, and grounded rules buffer their subtrees.
    pub fn stream_transform(
        &self,
        xml: &str,
        body: Rc<dyn TemplateBody>,
        output: Rc<std::cell::RefCell<dyn OutputHandler>>,
    ) -> Result<(), EngineError> {
        let ctx = self.fresh_context(output);
        let mut handler = StreamingHandler::new(ctx, body);
        source::parse_document(xml, &mut handler)
    }
}
