//! Secondary result destinations: method dispatch and character maps.

use crate::error::SerializeError;
use crate::handler::OutputHandler;
use crate::html::HtmlSerializer;
use crate::properties::{OutputMethod, OutputProperties};
use crate::text::TextSerializer;
use crate::xml::XmlSerializer;
use std::collections::HashMap;
use std::io::Write;
use xylem_xdm::{QName, ValidationMode};

/// The closed set of serializers, resolved from the output method.
pub enum Serializer<W: Write> {
    Xml(XmlSerializer<W>),
    Html(HtmlSerializer<W>),
    Text(TextSerializer<W>),
}

impl<W: Write> Serializer<W> {
    pub fn for_properties(props: &OutputProperties, writer: W) -> Self {
        match props.method {
            OutputMethod::Xml => {
                Serializer::Xml(XmlSerializer::with_properties(writer, props.clone()))
            }
            OutputMethod::Html => {
                Serializer::Html(HtmlSerializer::with_properties(writer, props.clone()))
            }
            OutputMethod::Text => Serializer::Text(TextSerializer::new(writer)),
        }
    }

    pub fn into_inner(self) -> W {
        match self {
            Serializer::Xml(s) => s.into_inner(),
            Serializer::Html(s) => s.into_inner(),
            Serializer::Text(s) => s.into_inner(),
        }
    }

    fn inner(&mut self) -> &mut dyn OutputHandler {
        match self {
            Serializer::Xml(s) => s,
            Serializer::Html(s) => s,
            Serializer::Text(s) => s,
        }
    }
}

impl<W: Write> OutputHandler for Serializer<W> {
    fn start_document(&mut self) -> Result<(), SerializeError> {
        self.inner().start_document()
    }

    fn end_document(&mut self) -> Result<(), SerializeError> {
        self.inner().end_document()
    }

    fn start_element(&mut self, name: &QName) -> Result<(), SerializeError> {
        self.inner().start_element(name)
    }

    fn end_element(&mut self, name: &QName) -> Result<(), SerializeError> {
        self.inner().end_element(name)
    }

    fn attribute(&mut self, name: &QName, value: &str) -> Result<(), SerializeError> {
        self.inner().attribute(name, value)
    }

    fn namespace(&mut self, prefix: &str, uri: &str) -> Result<(), SerializeError> {
        self.inner().namespace(prefix, uri)
    }

    fn characters(&mut self, text: &str) -> Result<(), SerializeError> {
        self.inner().characters(text)
    }

    fn characters_raw(&mut self, text: &str) -> Result<(), SerializeError> {
        self.inner().characters_raw(text)
    }

    fn comment(&mut self, text: &str) -> Result<(), SerializeError> {
        self.inner().comment(text)
    }

    fn processing_instruction(&mut self, target: &str, data: &str)
    -> Result<(), SerializeError> {
        self.inner().processing_instruction(target, data)
    }

    fn flush(&mut self) -> Result<(), SerializeError> {
        self.inner().flush()
    }

    fn atomic_value(&mut self, value: &str) -> Result<(), SerializeError> {
        self.inner().atomic_value(value)
    }

    fn set_type_annotation(&mut self, name: &QName) {
        self.inner().set_type_annotation(name)
    }

    fn set_validation_mode(&mut self, mode: ValidationMode) {
        self.inner().set_validation_mode(mode)
    }
}

/// Wraps a destination handler with a per-code-point character map. Mapped
/// characters are written raw (bypassing escaping); everything between them
/// passes through normally. Used for `xsl:result-document` destinations.
pub struct ResultDocumentHandler<H: OutputHandler> {
    inner: H,
    character_map: HashMap<char, String>,
}

impl<H: OutputHandler> ResultDocumentHandler<H> {
    pub fn new(inner: H, character_map: HashMap<char, String>) -> Self {
        Self {
            inner,
            character_map,
        }
    }

    pub fn into_inner(self) -> H {
        self.inner
    }

    fn mapped_characters(&mut self, text: &str) -> Result<(), SerializeError> {
        if self.character_map.is_empty() {
            return self.inner.characters(text);
        }
        let mut run = String::new();
        for c in text.chars() {
            if let Some(replacement) = self.character_map.get(&c) {
                if !run.is_empty() {
                    self.inner.characters(&run)?;
                    run.clear();
                }
                self.inner.characters_raw(replacement)?;
            } else {
                run.push(c);
            }
        }
        if !run.is_empty() {
            self.inner.characters(&run)?;
        }
        Ok(())
    }
}

impl<H: OutputHandler> OutputHandler for ResultDocumentHandler<H> {
    fn start_document(&mut self) -> Result<(), SerializeError> {
        self.inner.start_document()
    }

    fn end_document(&mut self) -> Result<(), SerializeError> {
        self.inner.end_document()
    }

    fn start_element(&mut self, name: &QName) -> Result<(), SerializeError> {
        self.inner.start_element(name)
    }

    fn end_element(&mut self, name: &QName) -> Result<(), SerializeError> {
        self.inner.end_element(name)
    }

    fn attribute(&mut self, name: &QName, value: &str) -> Result<(), SerializeError> {
        self.inner.attribute(name, value)
    }

    fn namespace(&mut self, prefix: &str, uri: &str) -> Result<(), SerializeError> {
        self.inner.namespace(prefix, uri)
    }

    fn characters(&mut self, text: &str) -> Result<(), SerializeError> {
        self.mapped_characters(text)
    }

    fn characters_raw(&mut self, text: &str) -> Result<(), SerializeError> {
        self.inner.characters_raw(text)
    }

    fn comment(&mut self, text: &str) -> Result<(), SerializeError> {
        self.inner.comment(text)
    }

    fn processing_instruction(&mut self, target: &str, data: &str)
    -> Result<(), SerializeError> {
        self.inner.processing_instruction(target, data)
    }

    fn flush(&mut self) -> Result<(), SerializeError> {
        self.inner.flush()
    }

    fn atomic_value(&mut self, value: &str) -> Result<(), SerializeError> {
        self.inner.atomic_value(value)
    }
}
