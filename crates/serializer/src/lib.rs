//! # xylem-serializer
//!
//! The output-handler family of the Xylem engine. Every handler follows
//! the deferred-start-tag protocol: attributes and namespace declarations
//! accumulate on a pending element until the first event that belongs to
//! its content, at which point the start tag is flushed (with namespace
//! fixup applied).
//!
//! The concrete handlers are resolved from the closed set of output
//! methods: XML, HTML, and text serializers writing to any `io::Write`,
//! plus a buffering handler that records result events for replay and a
//! result-document wrapper carrying character maps.

pub mod buffer_handler;
pub mod error;
pub mod escape;
pub mod handler;
pub mod html;
pub mod pending;
pub mod properties;
pub mod result_document;
pub mod text;
pub mod xml;

pub use buffer_handler::BufferingHandler;
pub use error::SerializeError;
pub use handler::OutputHandler;
pub use html::HtmlSerializer;
pub use pending::{PendingElement, PrefixAllocator};
pub use properties::{OutputMethod, OutputProperties};
pub use result_document::{ResultDocumentHandler, Serializer};
pub use text::TextSerializer;
pub use xml::XmlSerializer;
