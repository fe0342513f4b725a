//! Builds a fully navigable tree from a stream of source events.

use crate::error::XdmError;
use crate::event::{EventAttribute, SourceEventHandler};
use crate::node::{Node, NodeKind};
use crate::qname::QName;

type SpaceFilter = Box<dyn Fn(&QName) -> bool>;

/// A [`SourceEventHandler`] that materializes the event stream as a tree.
///
/// Adjacent character runs merge into a single text node. Document order is
/// assigned in pre-order with namespace nodes before attribute nodes, so it
/// is strictly increasing across the whole document.
pub struct TreeBuilder {
    root: Node,
    stack: Vec<Node>,
    pending_mappings: Vec<(String, String)>,
    text_run: String,
    order: u64,
    space_filter: Option<SpaceFilter>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        let root = Node::new_root();
        root.set_document_order(0);
        Self {
            root,
            stack: Vec::new(),
            pending_mappings: Vec::new(),
            text_run: String::new(),
            order: 0,
            space_filter: None,
        }
    }

    /// Installs a whitespace-stripping decision: when the filter returns
    /// true for the parent element, whitespace-only text is dropped.
    pub fn with_space_filter(mut self, filter: impl Fn(&QName) -> bool + 'static) -> Self {
        self.space_filter = Some(Box::new(filter));
        self
    }

    pub fn root(&self) -> Node {
        self.root.clone()
    }

    /// Consumes the builder, returning the document root.
    pub fn finish(mut self) -> Node {
        self.flush_text();
        self.root.clone()
    }

    fn current(&self) -> Node {
        self.stack.last().cloned().unwrap_or_else(|| self.root.clone())
    }

    fn next_order(&mut self) -> u64 {
        self.order += 1;
        self.order
    }

    fn flush_text(&mut self) {
        if self.text_run.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.text_run);
        let parent = self.current();
        let whitespace_only = text.chars().all(|c| c.is_ascii_whitespace());
        if whitespace_only
            && let Some(filter) = &self.space_filter
            && let Some(name) = parent.name()
            && parent.kind() == NodeKind::Element
            && filter(&name)
        {
            return;
        }
        if let Some(last) = parent.last_child()
            && last.kind() == NodeKind::Text
        {
            last.append_to_value(&text);
            return;
        }
        let node = Node::new_text(text);
        node.set_document_order(self.next_order());
        parent.append_child(&node);
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceEventHandler for TreeBuilder {
    type Error = XdmError;

    fn start_document(&mut self) -> Result<(), XdmError> {
        Ok(())
    }

    fn end_document(&mut self) -> Result<(), XdmError> {
        self.flush_text();
        if !self.stack.is_empty() {
            return Err(XdmError::malformed("endDocument with open elements"));
        }
        Ok(())
    }

    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<(), XdmError> {
        self.pending_mappings
            .push((prefix.to_string(), uri.to_string()));
        Ok(())
    }

    fn start_element(
        &mut self,
        name: &QName,
        attributes: &[EventAttribute],
    ) -> Result<(), XdmError> {
        self.flush_text();
        let element = Node::new_element(name.clone());
        element.set_document_order(self.next_order());

        for (prefix, uri) in self.pending_mappings.drain(..) {
            let ns = element.add_namespace(&prefix, &uri);
            ns.set_document_order(0);
        }
        // Namespace nodes precede attributes in document order.
        for ns in element.namespaces() {
            ns.set_document_order(self.next_order());
        }
        for attr in attributes {
            let node = Node::new_attribute(attr.name.clone(), attr.value.clone());
            node.set_dtd_type(attr.dtd_type);
            node.set_document_order(self.next_order());
            element.add_attribute(&node);
        }

        self.current().append_child(&element);
        self.stack.push(element);
        Ok(())
    }

    fn end_element(&mut self, name: &QName) -> Result<(), XdmError> {
        self.flush_text();
        let closed = self
            .stack
            .pop()
            .ok_or_else(|| XdmError::malformed("endElement without matching start"))?;
        if !closed.name().is_some_and(|n| n.expanded_eq(name)) {
            return Err(XdmError::malformed(format!(
                "endElement {} does not close {}",
                name,
                closed.name().map(|n| n.qualified()).unwrap_or_default()
            )));
        }
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<(), XdmError> {
        self.text_run.push_str(text);
        Ok(())
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), XdmError> {
        self.flush_text();
        let node = Node::new_processing_instruction(target, data);
        node.set_document_order(self.next_order());
        self.current().append_child(&node);
        Ok(())
    }

    fn comment(&mut self, text: &str) -> Result<(), XdmError> {
        self.flush_text();
        let node = Node::new_comment(text);
        node.set_document_order(self.next_order());
        self.current().append_child(&node);
        Ok(())
    }
}
