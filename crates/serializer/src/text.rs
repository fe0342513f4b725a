//! The text output method: character content only, no markup, no escaping.

use crate::error::SerializeError;
use crate::handler::OutputHandler;
use std::io::Write;
use xylem_xdm::QName;

/// Writes only character data. Markup events are accepted and ignored.
/// Adjacent atomic values arriving through the [`atomic_value`]
/// hook are separated by a single space; plain character content never is.
///
/// [`atomic_value`]: OutputHandler::atomic_value
pub struct TextSerializer<W: Write> {
    writer: W,
    last_was_atomic: bool,
}

impl<W: Write> TextSerializer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            last_was_atomic: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> OutputHandler for TextSerializer<W> {
    fn start_document(&mut self) -> Result<(), SerializeError> {
        Ok(())
    }

    fn end_document(&mut self) -> Result<(), SerializeError> {
        self.writer.flush()?;
        Ok(())
    }

    fn start_element(&mut self, _name: &QName) -> Result<(), SerializeError> {
        self.last_was_atomic = false;
        Ok(())
    }

    fn end_element(&mut self, _name: &QName) -> Result<(), SerializeError> {
        self.last_was_atomic = false;
        Ok(())
    }

    fn attribute(&mut self, _name: &QName, _value: &str) -> Result<(), SerializeError> {
        Ok(())
    }

    fn namespace(&mut self, _prefix: &str, _uri: &str) -> Result<(), SerializeError> {
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<(), SerializeError> {
        self.last_was_atomic = false;
        self.writer.write_all(text.as_bytes())?;
        Ok(())
    }

    fn characters_raw(&mut self, text: &str) -> Result<(), SerializeError> {
        self.characters(text)
    }

    fn comment(&mut self, _text: &str) -> Result<(), SerializeError> {
        Ok(())
    }

    fn processing_instruction(&mut self, _target: &str, _data: &str)
    -> Result<(), SerializeError> {
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SerializeError> {
        self.writer.flush()?;
        Ok(())
    }

    fn atomic_value(&mut self, value: &str) -> Result<(), SerializeError> {
        if self.last_was_atomic {
            self.writer.write_all(b" ")?;
        }
        self.writer.write_all(value.as_bytes())?;
        self.last_was_atomic = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(s: TextSerializer<Vec<u8>>) -> String {
        String::from_utf8(s.into_inner()).unwrap()
    }

    #[test]
    fn test_markup_ignored_content_unescaped() {
        let mut s = TextSerializer::new(Vec::new());
        s.start_document().unwrap();
        s.start_element(&QName::new("a")).unwrap();
        s.attribute(&QName::new("x"), "1").unwrap();
        s.characters("1 < 2 & 3").unwrap();
        s.comment("ignored").unwrap();
        s.end_element(&QName::new("a")).unwrap();
        s.end_document().unwrap();
        assert_eq!(output(s), "1 < 2 & 3");
    }

    #[test]
    fn test_adjacent_atomic_values_space_separated() {
        let mut s = TextSerializer::new(Vec::new());
        s.start_document().unwrap();
        s.start_element(&QName::new("a")).unwrap();
        s.atomic_value("1").unwrap();
        s.atomic_value("2").unwrap();
        s.atomic_value("3").unwrap();
        s.end_element(&QName::new("a")).unwrap();
        s.end_document().unwrap();
        assert_eq!(output(s), "1 2 3");
    }

    #[test]
    fn test_characters_reset_atomic_spacing() {
        let mut s = TextSerializer::new(Vec::new());
        s.start_document().unwrap();
        s.atomic_value("1").unwrap();
        s.characters(",").unwrap();
        s.atomic_value("2").unwrap();
        s.end_document().unwrap();
        assert_eq!(output(s), "1,2");
    }
}
