//! # Xylem
//!
//! A streaming XML parser paired with a streaming XSLT transformation
//! engine.
//!
//! The facade re-exports the workspace crates:
//!
//! - [`xdm`]: qualified names, typed values, the node model, source
//!   events, event buffers, and the tree builder.
//! - [`serializer`]: the deferred-start-tag output handler family (XML,
//!   HTML, text, buffering, result documents).
//! - [`schema`]: the schema component model and the runtime validator.
//! - [`runtime`]: the XSLT runtime itself — transform context, template
//!   matcher, accumulators, streaming and grounded execution, document
//!   loading.
//!
//! ## Quick start
//!
//! ```rust
//! use std::rc::Rc;
//! use xylem::runtime::{Stylesheet, TransformOptions, Transformer};
//!
//! // An empty stylesheet leaves the built-in rules in charge: the
//! // text-only-copy behavior extracts character data.
//! let stylesheet = Rc::new(Stylesheet::new("3.0"));
//! let mut options = TransformOptions::default();
//! options.output.omit_xml_declaration = true;
//! let transformer = Transformer::new(stylesheet, options).unwrap();
//! let result = transformer.transform_to_string("<a>hello <b>world</b></a>").unwrap();
//! assert_eq!(result, "hello world");
//! ```

pub use xylem_runtime as runtime;
pub use xylem_schema as schema;
pub use xylem_serializer as serializer;
pub use xylem_xdm as xdm;

pub use xylem_runtime::{EngineError, Transformer};
pub use xylem_serializer::{OutputMethod, OutputProperties};
pub use xylem_xdm::{Node, QName, Value};
