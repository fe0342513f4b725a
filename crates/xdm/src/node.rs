//! The node model: a uniform, navigable view of source documents.
//!
//! One tagged node type serves both materialization strategies. Nodes built
//! by the tree builder are fully navigable; nodes built incrementally while
//! streaming carry `fully_navigable() == false` and only expose the
//! materialized portion (the ancestor chain, attributes, and namespaces of
//! the open elements).

use crate::qname::{ExpandedName, QName};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Root,
    Element,
    Attribute,
    Namespace,
    Text,
    Comment,
    ProcessingInstruction,
}

/// DTD-declared attribute types. Without a DTD everything is CDATA, except
/// `xml:id` which is treated as an ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DtdAttributeType {
    Cdata,
    Id,
    Idref,
    Idrefs,
    Nmtoken,
    Nmtokens,
    Entity,
    Entities,
    Notation,
}

/// Schema validation modes applied when constructing or validating content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    Strict,
    Lax,
    Preserve,
    #[default]
    Strip,
}

struct NodeData {
    kind: NodeKind,
    name: Option<QName>,
    value: RefCell<String>,
    parent: RefCell<Weak<NodeData>>,
    children: RefCell<Vec<Node>>,
    attributes: RefCell<Vec<Node>>,
    namespaces: RefCell<Vec<Node>>,
    order: Cell<u64>,
    type_annotation: RefCell<Option<QName>>,
    dtd_type: Cell<Option<DtdAttributeType>>,
    fully_navigable: Cell<bool>,
}

/// A cheap, cloneable handle to a node. Identity is handle identity:
/// `same_node` compares the underlying allocation.
#[derive(Clone)]
pub struct Node(Rc<NodeData>);

impl Node {
    fn make(kind: NodeKind, name: Option<QName>, value: String) -> Self {
        Node(Rc::new(NodeData {
            kind,
            name,
            value: RefCell::new(value),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
            attributes: RefCell::new(Vec::new()),
            namespaces: RefCell::new(Vec::new()),
            order: Cell::new(0),
            type_annotation: RefCell::new(None),
            dtd_type: Cell::new(None),
            fully_navigable: Cell::new(true),
        }))
    }

    pub fn new_root() -> Self {
        Self::make(NodeKind::Root, None, String::new())
    }

    pub fn new_element(name: QName) -> Self {
        Self::make(NodeKind::Element, Some(name), String::new())
    }

    pub fn new_attribute(name: QName, value: impl Into<String>) -> Self {
        Self::make(NodeKind::Attribute, Some(name), value.into())
    }

    /// Namespace nodes use the prefix as their name and the URI as value.
    /// The default namespace has an empty-string prefix.
    pub fn new_namespace(prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        Self::make(NodeKind::Namespace, Some(QName::new(prefix)), uri.into())
    }

    pub fn new_text(content: impl Into<String>) -> Self {
        Self::make(NodeKind::Text, None, content.into())
    }

    pub fn new_comment(content: impl Into<String>) -> Self {
        Self::make(NodeKind::Comment, None, content.into())
    }

    pub fn new_processing_instruction(target: impl Into<String>, data: impl Into<String>) -> Self {
        Self::make(
            NodeKind::ProcessingInstruction,
            Some(QName::new(target)),
            data.into(),
        )
    }

    pub fn kind(&self) -> NodeKind {
        self.0.kind
    }

    pub fn name(&self) -> Option<QName> {
        self.0.name.clone()
    }

    pub fn local_name(&self) -> Option<String> {
        self.0.name.as_ref().map(|n| n.local_name.clone())
    }

    pub fn namespace_uri(&self) -> Option<String> {
        self.0.name.as_ref().and_then(|n| n.namespace_uri.clone())
    }

    pub fn prefix(&self) -> Option<String> {
        self.0.name.as_ref().and_then(|n| n.prefix.clone())
    }

    pub fn is_element(&self) -> bool {
        self.0.kind == NodeKind::Element
    }

    pub fn is_text(&self) -> bool {
        self.0.kind == NodeKind::Text
    }

    pub fn is_attribute(&self) -> bool {
        self.0.kind == NodeKind::Attribute
    }

    /// The XPath string-value. Stored for leaves, computed for Element and
    /// Root by concatenating descendant text in document order.
    pub fn string_value(&self) -> String {
        match self.0.kind {
            NodeKind::Element | NodeKind::Root => {
                let mut out = String::new();
                collect_text(self, &mut out);
                out
            }
            _ => self.0.value.borrow().clone(),
        }
    }

    pub fn parent(&self) -> Option<Node> {
        self.0.parent.borrow().upgrade().map(Node)
    }

    pub fn children(&self) -> Vec<Node> {
        self.0.children.borrow().clone()
    }

    pub fn attributes(&self) -> Vec<Node> {
        self.0.attributes.borrow().clone()
    }

    pub fn namespaces(&self) -> Vec<Node> {
        self.0.namespaces.borrow().clone()
    }

    pub fn following_sibling(&self) -> Option<Node> {
        let parent = self.parent()?;
        let siblings = parent.0.children.borrow();
        let idx = siblings.iter().position(|s| s.same_node(self))?;
        siblings.get(idx + 1).cloned()
    }

    pub fn preceding_sibling(&self) -> Option<Node> {
        let parent = self.parent()?;
        let siblings = parent.0.children.borrow();
        let idx = siblings.iter().position(|s| s.same_node(self))?;
        if idx == 0 { None } else { siblings.get(idx - 1).cloned() }
    }

    pub fn document_order(&self) -> u64 {
        self.0.order.get()
    }

    pub fn set_document_order(&self, order: u64) {
        self.0.order.set(order);
    }

    pub fn same_node(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn root(&self) -> Node {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// True when every axis, including the reverse ones, is supported.
    /// Streaming-built nodes report false.
    pub fn fully_navigable(&self) -> bool {
        self.0.fully_navigable.get()
    }

    pub fn set_fully_navigable(&self, value: bool) {
        self.0.fully_navigable.set(value);
    }

    pub fn type_annotation(&self) -> Option<QName> {
        self.0.type_annotation.borrow().clone()
    }

    pub fn set_type_annotation(&self, annotation: Option<QName>) {
        *self.0.type_annotation.borrow_mut() = annotation;
    }

    pub fn dtd_type(&self) -> Option<DtdAttributeType> {
        self.0.dtd_type.get()
    }

    pub fn set_dtd_type(&self, dtd_type: DtdAttributeType) {
        self.0.dtd_type.set(Some(dtd_type));
    }

    /// Looks up an attribute value by expanded name.
    pub fn attribute_value(&self, name: &ExpandedName) -> Option<String> {
        self.0
            .attributes
            .borrow()
            .iter()
            .find(|a| a.0.name.as_ref().is_some_and(|n| n.expanded() == *name))
            .map(|a| a.0.value.borrow().clone())
    }

    /// In-scope namespace bindings: this element's declarations shadowing
    /// the ancestors'. Returned as (prefix, uri) pairs; the default
    /// namespace uses the empty prefix.
    pub fn in_scope_namespaces(&self) -> Vec<(String, String)> {
        let mut seen: Vec<(String, String)> = Vec::new();
        let mut current = Some(self.clone());
        while let Some(node) = current {
            for ns in node.0.namespaces.borrow().iter() {
                let prefix = ns.local_name().unwrap_or_default();
                if !seen.iter().any(|(p, _)| *p == prefix) {
                    seen.push((prefix, ns.0.value.borrow().clone()));
                }
            }
            current = node.parent();
        }
        seen
    }

    // --- Construction (used by the builders) ---

    pub fn append_child(&self, child: &Node) {
        *child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
        self.0.children.borrow_mut().push(child.clone());
    }

    pub fn add_attribute(&self, attr: &Node) {
        *attr.0.parent.borrow_mut() = Rc::downgrade(&self.0);
        self.0.attributes.borrow_mut().push(attr.clone());
    }

    pub fn add_namespace(&self, prefix: &str, uri: &str) -> Node {
        let ns = Node::new_namespace(prefix, uri);
        *ns.0.parent.borrow_mut() = Rc::downgrade(&self.0);
        self.0.namespaces.borrow_mut().push(ns.clone());
        ns
    }

    pub fn last_child(&self) -> Option<Node> {
        self.0.children.borrow().last().cloned()
    }

    pub fn append_to_value(&self, text: &str) {
        self.0.value.borrow_mut().push_str(text);
    }

    /// Unlinks this node from its parent and drops its subtree. Used by the
    /// streaming handler to release a finished element.
    pub fn detach(&self) {
        if let Some(parent) = self.parent() {
            parent
                .0
                .children
                .borrow_mut()
                .retain(|c| !c.same_node(self));
        }
        *self.0.parent.borrow_mut() = Weak::new();
        self.0.children.borrow_mut().clear();
    }

    pub fn clear_children(&self) {
        self.0.children.borrow_mut().clear();
    }
}

fn collect_text(node: &Node, out: &mut String) {
    for child in node.0.children.borrow().iter() {
        match child.kind() {
            NodeKind::Text => out.push_str(&child.0.value.borrow()),
            NodeKind::Element => collect_text(child, out),
            _ => {}
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.0.kind)
            .field("name", &self.0.name)
            .field("order", &self.0.order.get())
            .finish()
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.same_node(other)
    }
}

impl Eq for Node {}
