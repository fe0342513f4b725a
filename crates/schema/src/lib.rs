//! # xylem-schema
//!
//! The schema component model and runtime validator of the Xylem engine:
//! simple types with constraining facets, complex types with content-model
//! automata, and a frame-stack validator that annotates constructed output
//! under the strict/lax/preserve/strip validation modes.

pub mod automaton;
pub mod error;
pub mod model;
pub mod types;
pub mod validator;

pub use automaton::ContentAutomaton;
pub use error::{ERR_ATTRIBUTE, ERR_CONTENT, ERR_ELEMENT, SchemaError};
pub use model::{
    AttributeDecl, AttributeUse, ComplexType, ContentModel, ElementDecl, Particle, Schema,
    TypeDef,
};
pub use types::{PrimitiveType, SimpleType, XS_NAMESPACE, xs_name};
pub use validator::RuntimeValidator;
