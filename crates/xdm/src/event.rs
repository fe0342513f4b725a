//! The source-event vocabulary and the handler contract shared by the
//! parser bridge, the tree builder, the event buffer, and the streaming
//! transformation handler.

use crate::node::DtdAttributeType;
use crate::qname::QName;

/// An attribute snapshot carried on a start-element event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventAttribute {
    pub name: QName,
    pub value: String,
    pub dtd_type: DtdAttributeType,
}

impl EventAttribute {
    pub fn new(name: QName, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
            dtd_type: DtdAttributeType::Cdata,
        }
    }

    pub fn with_dtd_type(mut self, dtd_type: DtdAttributeType) -> Self {
        self.dtd_type = dtd_type;
        self
    }
}

/// One structural event of a source document.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    StartDocument,
    EndDocument,
    StartPrefixMapping { prefix: String, uri: String },
    EndPrefixMapping { prefix: String },
    StartElement {
        name: QName,
        attributes: Vec<EventAttribute>,
    },
    EndElement { name: QName },
    Characters(String),
    IgnorableWhitespace(String),
    ProcessingInstruction { target: String, data: String },
    Comment(String),
    SkippedEntity(String),
}

impl SourceEvent {
    pub fn is_start_element(&self) -> bool {
        matches!(self, SourceEvent::StartElement { .. })
    }

    pub fn is_end_element(&self) -> bool {
        matches!(self, SourceEvent::EndElement { .. })
    }

    pub fn element_name(&self) -> Option<&QName> {
        match self {
            SourceEvent::StartElement { name, .. } => Some(name),
            SourceEvent::EndElement { name } => Some(name),
            _ => None,
        }
    }
}

/// SAX-style receiver of source events.
///
/// The guaranteed call sequence is `start_document; (start_prefix_mapping*;
/// start_element; children; end_element; end_prefix_mapping*)*;
/// end_document`, with `comment` arriving on the lexical channel at any
/// point between document start and end.
pub trait SourceEventHandler {
    type Error;

    fn start_document(&mut self) -> Result<(), Self::Error>;
    fn end_document(&mut self) -> Result<(), Self::Error>;

    fn start_prefix_mapping(&mut self, _prefix: &str, _uri: &str) -> Result<(), Self::Error> {
        Ok(())
    }

    fn end_prefix_mapping(&mut self, _prefix: &str) -> Result<(), Self::Error> {
        Ok(())
    }

    fn start_element(
        &mut self,
        name: &QName,
        attributes: &[EventAttribute],
    ) -> Result<(), Self::Error>;
    fn end_element(&mut self, name: &QName) -> Result<(), Self::Error>;

    fn characters(&mut self, text: &str) -> Result<(), Self::Error>;

    fn ignorable_whitespace(&mut self, text: &str) -> Result<(), Self::Error> {
        self.characters(text)
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), Self::Error>;

    fn comment(&mut self, _text: &str) -> Result<(), Self::Error> {
        Ok(())
    }

    fn skipped_entity(&mut self, _name: &str) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Dispatches one recorded event to the matching callback.
    fn dispatch(&mut self, event: &SourceEvent) -> Result<(), Self::Error> {
        match event {
            SourceEvent::StartDocument => self.start_document(),
            SourceEvent::EndDocument => self.end_document(),
            SourceEvent::StartPrefixMapping { prefix, uri } => {
                self.start_prefix_mapping(prefix, uri)
            }
            SourceEvent::EndPrefixMapping { prefix } => self.end_prefix_mapping(prefix),
            SourceEvent::StartElement { name, attributes } => {
                self.start_element(name, attributes)
            }
            SourceEvent::EndElement { name } => self.end_element(name),
            SourceEvent::Characters(text) => self.characters(text),
            SourceEvent::IgnorableWhitespace(text) => self.ignorable_whitespace(text),
            SourceEvent::ProcessingInstruction { target, data } => {
                self.processing_instruction(target, data)
            }
            SourceEvent::Comment(text) => self.comment(text),
            SourceEvent::SkippedEntity(name) => self.skipped_entity(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_classification() {
        let start = SourceEvent::StartElement {
            name: QName::new("div"),
            attributes: vec![],
        };
        assert!(start.is_start_element());
        assert!(!start.is_end_element());
        assert_eq!(start.element_name().unwrap().local_name, "div");

        let end = SourceEvent::EndElement {
            name: QName::new("div"),
        };
        assert!(end.is_end_element());
    }

    #[test]
    fn test_attribute_defaults_to_cdata() {
        let attr = EventAttribute::new(QName::new("class"), "x");
        assert_eq!(attr.dtd_type, DtdAttributeType::Cdata);
        let id = attr.clone().with_dtd_type(DtdAttributeType::Id);
        assert_eq!(id.dtd_type, DtdAttributeType::Id);
    }
}
