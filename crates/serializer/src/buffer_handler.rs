//! Adapts the output-handler contract onto an event buffer.

use crate::error::SerializeError;
use crate::handler::OutputHandler;
use crate::pending::PendingElement;
use xylem_xdm::{EventAttribute, EventBuffer, QName, SourceEvent};

/// Forwards result events into an [`EventBuffer`], performing the
/// deferred-start-tag reordering: namespace declarations become prefix
/// mappings emitted before the single `StartElement` record, which carries
/// the accumulated attribute snapshot.
#[derive(Debug, Default)]
pub struct BufferingHandler {
    buffer: EventBuffer,
    pending: Option<PendingElement>,
}

impl BufferingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finishes recording and hands back the buffer.
    pub fn into_buffer(mut self) -> Result<EventBuffer, SerializeError> {
        self.flush_pending()?;
        self.buffer.stop_recording();
        Ok(self.buffer)
    }

    pub fn buffer(&self) -> &EventBuffer {
        &self.buffer
    }

    /// Flushes any pending element and takes the frozen buffer out,
    /// leaving the handler empty and recording again.
    pub fn take_buffer(&mut self) -> Result<EventBuffer, SerializeError> {
        self.flush_pending()?;
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.stop_recording();
        Ok(buffer)
    }

    fn record(&mut self, event: SourceEvent) -> Result<(), SerializeError> {
        self.buffer
            .record(event)
            .map_err(|e| SerializeError::misuse(e.to_string()))
    }

    fn flush_pending(&mut self) -> Result<(), SerializeError> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        for (prefix, uri) in pending.namespaces() {
            self.record(SourceEvent::StartPrefixMapping {
                prefix: prefix.clone(),
                uri: uri.clone(),
            })?;
        }
        let attributes = pending
            .attributes()
            .map(|(name, value)| EventAttribute::new(name.clone(), value))
            .collect();
        self.record(SourceEvent::StartElement {
            name: pending.name.clone(),
            attributes,
        })
    }
}

impl OutputHandler for BufferingHandler {
    fn start_document(&mut self) -> Result<(), SerializeError> {
        self.record(SourceEvent::StartDocument)
    }

    fn end_document(&mut self) -> Result<(), SerializeError> {
        self.flush_pending()?;
        self.record(SourceEvent::EndDocument)
    }

    fn start_element(&mut self, name: &QName) -> Result<(), SerializeError> {
        self.flush_pending()?;
        self.pending = Some(PendingElement::new(name.clone()));
        Ok(())
    }

    fn end_element(&mut self, name: &QName) -> Result<(), SerializeError> {
        self.flush_pending()?;
        self.record(SourceEvent::EndElement { name: name.clone() })
    }

    fn attribute(&mut self, name: &QName, value: &str) -> Result<(), SerializeError> {
        match &mut self.pending {
            Some(pending) => {
                pending.set_attribute(name.clone(), value);
                Ok(())
            }
            None => Err(SerializeError::misuse(format!(
                "attribute '{}' outside a pending element",
                name
            ))),
        }
    }

    fn namespace(&mut self, prefix: &str, uri: &str) -> Result<(), SerializeError> {
        match &mut self.pending {
            Some(pending) => {
                pending.add_namespace(prefix, uri);
                Ok(())
            }
            None => Err(SerializeError::misuse(
                "namespace declaration outside a pending element",
            )),
        }
    }

    fn characters(&mut self, text: &str) -> Result<(), SerializeError> {
        self.flush_pending()?;
        self.record(SourceEvent::Characters(text.to_string()))
    }

    fn characters_raw(&mut self, text: &str) -> Result<(), SerializeError> {
        // The buffer stores plain character records; rawness is a
        // serializer concern and does not survive buffering.
        self.characters(text)
    }

    fn comment(&mut self, text: &str) -> Result<(), SerializeError> {
        self.flush_pending()?;
        self.record(SourceEvent::Comment(text.to_string()))
    }

    fn processing_instruction(&mut self, target: &str, data: &str)
    -> Result<(), SerializeError> {
        self.flush_pending()?;
        self.record(SourceEvent::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        })
    }

    fn flush(&mut self) -> Result<(), SerializeError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaces_precede_start_element() {
        let mut handler = BufferingHandler::new();
        handler.start_document().unwrap();
        handler.start_element(&QName::new("e")).unwrap();
        handler.namespace("p", "urn:x").unwrap();
        handler.attribute(&QName::new("a"), "1").unwrap();
        handler.characters("body").unwrap();
        handler.end_element(&QName::new("e")).unwrap();
        handler.end_document().unwrap();

        let buffer = handler.into_buffer().unwrap();
        let events = buffer.events();
        assert!(matches!(events[0], SourceEvent::StartDocument));
        assert!(matches!(events[1], SourceEvent::StartPrefixMapping { .. }));
        match &events[2] {
            SourceEvent::StartElement { name, attributes } => {
                assert_eq!(name.local_name, "e");
                assert_eq!(attributes.len(), 1);
                assert_eq!(attributes[0].value, "1");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_empty_element_produces_balanced_pair() {
        let mut handler = BufferingHandler::new();
        handler.start_element(&QName::new("e")).unwrap();
        handler.end_element(&QName::new("e")).unwrap();
        let buffer = handler.into_buffer().unwrap();
        assert_eq!(buffer.len(), 2);
        assert!(buffer.events()[0].is_start_element());
        assert!(buffer.events()[1].is_end_element());
    }

    #[test]
    fn test_comments_are_recorded() {
        let mut handler = BufferingHandler::new();
        handler.start_element(&QName::new("e")).unwrap();
        handler.comment("kept").unwrap();
        handler.end_element(&QName::new("e")).unwrap();
        let buffer = handler.into_buffer().unwrap();
        assert!(
            buffer
                .events()
                .iter()
                .any(|e| matches!(e, SourceEvent::Comment(c) if c == "kept"))
        );
    }

    #[test]
    fn test_buffer_is_frozen_after_into_buffer() {
        let mut handler = BufferingHandler::new();
        handler.characters("x").unwrap();
        let buffer = handler.into_buffer().unwrap();
        assert!(!buffer.is_recording());
    }
}
