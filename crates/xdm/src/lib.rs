//! # xylem-xdm
//!
//! The data model underneath the Xylem transformation engine: qualified
//! names, typed values, the navigable node model, the source-event
//! vocabulary with its SAX-style handler contract, the recording event
//! buffer, and the event-stream tree builder.
//!
//! Everything downstream (the serializers, the schema validator, the XSLT
//! runtime) speaks in these types.

pub mod buffer;
pub mod error;
pub mod event;
pub mod node;
pub mod qname;
pub mod tree;
pub mod value;

pub use buffer::EventBuffer;
pub use error::XdmError;
pub use event::{EventAttribute, SourceEvent, SourceEventHandler};
pub use node::{DtdAttributeType, Node, NodeKind, ValidationMode};
pub use qname::{ExpandedName, QName};
pub use tree::TreeBuilder;
pub use value::{AtomicValue, Item, Value, format_number};
