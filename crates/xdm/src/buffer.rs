//! A recording, replayable buffer of source events.

use crate::error::XdmError;
use crate::event::{EventAttribute, SourceEvent, SourceEventHandler};
use crate::qname::QName;

/// Records an ordered sequence of structural events and replays it any
/// number of times. Attribute snapshots are copied on record, so later
/// mutation of the originals cannot leak in. Once recording stops the
/// buffer is immutable.
#[derive(Debug, Clone, Default)]
pub struct EventBuffer {
    events: Vec<SourceEvent>,
    frozen: bool,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: SourceEvent) -> Result<(), XdmError> {
        if self.frozen {
            return Err(XdmError::frozen("record() after stop_recording()"));
        }
        self.events.push(event);
        Ok(())
    }

    pub fn stop_recording(&mut self) {
        self.frozen = true;
    }

    pub fn is_recording(&self) -> bool {
        !self.frozen
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Discards all recorded events and resumes recording.
    pub fn clear(&mut self) {
        self.events.clear();
        self.frozen = false;
    }

    pub fn events(&self) -> &[SourceEvent] {
        &self.events
    }

    /// Replays every recorded event, in insertion order.
    pub fn replay<H: SourceEventHandler>(&self, handler: &mut H) -> Result<(), H::Error> {
        for event in &self.events {
            handler.dispatch(event)?;
        }
        Ok(())
    }

    /// Replays everything except document start/end, so content can be
    /// spliced into an already-open destination.
    pub fn replay_content<H: SourceEventHandler>(&self, handler: &mut H) -> Result<(), H::Error> {
        for event in &self.events {
            match event {
                SourceEvent::StartDocument | SourceEvent::EndDocument => {}
                other => handler.dispatch(other)?,
            }
        }
        Ok(())
    }

    /// Concatenation of all character runs, in order.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for event in &self.events {
            match event {
                SourceEvent::Characters(text) | SourceEvent::IgnorableWhitespace(text) => {
                    out.push_str(text)
                }
                _ => {}
            }
        }
        out
    }
}

/// Feeding a buffer as a handler records the incoming stream verbatim.
impl SourceEventHandler for EventBuffer {
    type Error = XdmError;

    fn start_document(&mut self) -> Result<(), XdmError> {
        self.record(SourceEvent::StartDocument)
    }

    fn end_document(&mut self) -> Result<(), XdmError> {
        self.record(SourceEvent::EndDocument)
    }

    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<(), XdmError> {
        self.record(SourceEvent::StartPrefixMapping {
            prefix: prefix.to_string(),
            uri: uri.to_string(),
        })
    }

    fn end_prefix_mapping(&mut self, prefix: &str) -> Result<(), XdmError> {
        self.record(SourceEvent::EndPrefixMapping {
            prefix: prefix.to_string(),
        })
    }

    fn start_element(
        &mut self,
        name: &QName,
        attributes: &[EventAttribute],
    ) -> Result<(), XdmError> {
        self.record(SourceEvent::StartElement {
            name: name.clone(),
            attributes: attributes.to_vec(),
        })
    }

    fn end_element(&mut self, name: &QName) -> Result<(), XdmError> {
        self.record(SourceEvent::EndElement { name: name.clone() })
    }

    fn characters(&mut self, text: &str) -> Result<(), XdmError> {
        self.record(SourceEvent::Characters(text.to_string()))
    }

    fn ignorable_whitespace(&mut self, text: &str) -> Result<(), XdmError> {
        self.record(SourceEvent::IgnorableWhitespace(text.to_string()))
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), XdmError> {
        self.record(SourceEvent::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        })
    }

    fn comment(&mut self, text: &str) -> Result<(), XdmError> {
        self.record(SourceEvent::Comment(text.to_string()))
    }

    fn skipped_entity(&mut self, name: &str) -> Result<(), XdmError> {
        self.record(SourceEvent::SkippedEntity(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_buffer() -> EventBuffer {
        let mut buffer = EventBuffer::new();
        buffer.start_document().unwrap();
        buffer
            .start_element(&QName::new("root"), &[EventAttribute::new(QName::new("x"), "1")])
            .unwrap();
        buffer.characters("hello ").unwrap();
        buffer.characters("world").unwrap();
        buffer.end_element(&QName::new("root")).unwrap();
        buffer.end_document().unwrap();
        buffer.stop_recording();
        buffer
    }

    #[test]
    fn test_replay_preserves_order() {
        let buffer = sample_buffer();
        let mut copy = EventBuffer::new();
        buffer.replay(&mut copy).unwrap();
        assert_eq!(buffer.events(), copy.events());
    }

    #[test]
    fn test_two_replays_are_pointwise_equal() {
        let buffer = sample_buffer();
        let mut first = EventBuffer::new();
        let mut second = EventBuffer::new();
        buffer.replay(&mut first).unwrap();
        buffer.replay(&mut second).unwrap();
        assert_eq!(first.events(), second.events());
    }

    #[test]
    fn test_replay_content_omits_document_events() {
        let buffer = sample_buffer();
        let mut copy = EventBuffer::new();
        buffer.replay_content(&mut copy).unwrap();
        assert!(!copy.events().iter().any(|e| matches!(
            e,
            SourceEvent::StartDocument | SourceEvent::EndDocument
        )));
        assert_eq!(copy.len(), buffer.len() - 2);
    }

    #[test]
    fn test_record_after_stop_is_an_error() {
        let mut buffer = sample_buffer();
        let result = buffer.record(SourceEvent::Characters("late".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_text_content_concatenates_runs() {
        let buffer = sample_buffer();
        assert_eq!(buffer.text_content(), "hello world");
    }

    #[test]
    fn test_clear_resumes_recording() {
        let mut buffer = sample_buffer();
        buffer.clear();
        assert!(buffer.is_recording());
        assert!(buffer.is_empty());
        buffer.characters("again").unwrap();
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_attribute_snapshots_are_copied() {
        let mut buffer = EventBuffer::new();
        let mut attrs = vec![EventAttribute::new(QName::new("a"), "1")];
        buffer.start_element(&QName::new("e"), &attrs).unwrap();
        attrs[0].value = "2".to_string();
        match &buffer.events()[0] {
            SourceEvent::StartElement { attributes, .. } => {
                assert_eq!(attributes[0].value, "1");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
