//! The schema component model: element and attribute declarations, complex
//! types, and content particles.

use crate::types::SimpleType;
use std::collections::HashMap;
use std::rc::Rc;
use xylem_xdm::{ExpandedName, QName};

#[derive(Debug, Clone)]
pub struct AttributeDecl {
    pub name: ExpandedName,
    pub simple_type: SimpleType,
}

#[derive(Debug, Clone)]
pub struct AttributeUse {
    pub decl: AttributeDecl,
    pub required: bool,
}

/// A content particle: the regular structure of element-only content.
#[derive(Debug, Clone)]
pub enum Particle {
    Element {
        name: ExpandedName,
        min: u32,
        max: Option<u32>,
    },
    Sequence(Vec<Particle>),
    Choice(Vec<Particle>),
}

impl Particle {
    pub fn element(name: ExpandedName) -> Self {
        Particle::Element {
            name,
            min: 1,
            max: Some(1),
        }
    }

    pub fn optional(name: ExpandedName) -> Self {
        Particle::Element {
            name,
            min: 0,
            max: Some(1),
        }
    }

    pub fn repeated(name: ExpandedName) -> Self {
        Particle::Element {
            name,
            min: 0,
            max: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ContentModel {
    Empty,
    Simple(SimpleType),
    ElementOnly(Particle),
    /// Text freely interleaved; listed child elements allowed anywhere.
    Mixed(Vec<ExpandedName>),
}

#[derive(Debug, Clone)]
pub struct ComplexType {
    pub name: Option<QName>,
    pub attributes: HashMap<ExpandedName, AttributeUse>,
    pub content: ContentModel,
}

impl ComplexType {
    pub fn new(content: ContentModel) -> Self {
        Self {
            name: None,
            attributes: HashMap::new(),
            content,
        }
    }

    pub fn with_name(mut self, name: QName) -> Self {
        self.name = Some(name);
        self
    }

    pub fn with_attribute(mut self, decl: AttributeDecl, required: bool) -> Self {
        self.attributes
            .insert(decl.name.clone(), AttributeUse { decl, required });
        self
    }
}

#[derive(Debug, Clone)]
pub enum TypeDef {
    Simple(SimpleType),
    Complex(ComplexType),
}

impl TypeDef {
    /// The annotation attached to validated elements of this type.
    pub fn annotation(&self) -> Option<QName> {
        match self {
            TypeDef::Simple(simple) => Some(simple.name.clone()),
            TypeDef::Complex(complex) => complex.name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ElementDecl {
    pub name: ExpandedName,
    pub type_def: TypeDef,
    pub nillable: bool,
}

impl ElementDecl {
    pub fn new(name: ExpandedName, type_def: TypeDef) -> Self {
        Self {
            name,
            type_def,
            nillable: false,
        }
    }
}

/// A compiled schema set: top-level declarations addressable by expanded
/// name.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    elements: HashMap<ExpandedName, Rc<ElementDecl>>,
    attributes: HashMap<ExpandedName, Rc<AttributeDecl>>,
    types: HashMap<ExpandedName, Rc<TypeDef>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_element(&mut self, decl: ElementDecl) {
        self.elements.insert(decl.name.clone(), Rc::new(decl));
    }

    pub fn add_attribute(&mut self, decl: AttributeDecl) {
        self.attributes.insert(decl.name.clone(), Rc::new(decl));
    }

    pub fn add_type(&mut self, name: ExpandedName, type_def: TypeDef) {
        self.types.insert(name, Rc::new(type_def));
    }

    pub fn element(&self, name: &ExpandedName) -> Option<Rc<ElementDecl>> {
        self.elements.get(name).cloned()
    }

    pub fn attribute(&self, name: &ExpandedName) -> Option<Rc<AttributeDecl>> {
        self.attributes.get(name).cloned()
    }

    pub fn type_def(&self, name: &ExpandedName) -> Option<Rc<TypeDef>> {
        self.types.get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty() && self.attributes.is_empty() && self.types.is_empty()
    }
}
