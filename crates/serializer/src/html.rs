//! The HTML output method.

use crate::error::SerializeError;
use crate::escape::{escape_attribute, escape_text};
use crate::handler::OutputHandler;
use crate::pending::PendingElement;
use crate::properties::OutputProperties;
use std::io::Write;
use xylem_xdm::QName;

/// Elements with no content model and no end tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Attributes serialized as a bare name when their value equals their name
/// (case-insensitively) or is empty.
const BOOLEAN_ATTRIBUTES: &[&str] = &[
    "allowfullscreen", "async", "autofocus", "autoplay", "checked", "controls", "default",
    "defer", "disabled", "formnovalidate", "hidden", "ismap", "loop", "multiple", "muted",
    "nomodule", "novalidate", "open", "readonly", "required", "reversed", "selected",
];

fn is_void(name: &QName) -> bool {
    VOID_ELEMENTS.contains(&name.local_name.to_ascii_lowercase().as_str())
}

fn is_boolean_attribute(name: &QName) -> bool {
    BOOLEAN_ATTRIBUTES.contains(&name.local_name.to_ascii_lowercase().as_str())
}

fn is_raw_text_element(name: &str) -> bool {
    name.eq_ignore_ascii_case("script") || name.eq_ignore_ascii_case("style")
}

struct OpenElement {
    name: QName,
    void: bool,
}

/// Serializes result events as HTML: no XML declaration, void elements
/// without end tags, boolean attributes, unescaped script/style content,
/// and a charset meta element injected into `head` when none is present.
pub struct HtmlSerializer<W: Write> {
    writer: W,
    props: OutputProperties,
    pending: Option<PendingElement>,
    open: Vec<OpenElement>,
    inject_meta: bool,
}

impl<W: Write> HtmlSerializer<W> {
    pub fn new(writer: W) -> Self {
        Self::with_properties(writer, OutputProperties::default())
    }

    pub fn with_properties(writer: W, props: OutputProperties) -> Self {
        Self {
            writer,
            props,
            pending: None,
            open: Vec::new(),
            inject_meta: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn in_raw_text(&self) -> bool {
        self.open
            .last()
            .is_some_and(|e| is_raw_text_element(&e.name.local_name))
    }

    fn maybe_inject_meta(&mut self, next_is_meta: bool) -> Result<(), SerializeError> {
        if self.inject_meta {
            self.inject_meta = false;
            if !next_is_meta {
                self.writer.write_all(
                    format!("<meta charset=\"{}\">", self.props.encoding).as_bytes(),
                )?;
            }
        }
        Ok(())
    }

    fn flush_pending(&mut self) -> Result<(), SerializeError> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        let void = is_void(&pending.name);

        let mut tag = String::new();
        tag.push('<');
        tag.push_str(&pending.name.qualified());
        for (name, value) in pending.attributes() {
            if is_boolean_attribute(name)
                && (value.is_empty() || value.eq_ignore_ascii_case(&name.local_name))
            {
                tag.push(' ');
                tag.push_str(&name.qualified());
            } else {
                tag.push_str(&format!(
                    " {}=\"{}\"",
                    name.qualified(),
                    escape_attribute(value)
                ));
            }
        }
        tag.push('>');
        self.writer.write_all(tag.as_bytes())?;

        if pending.name.local_name.eq_ignore_ascii_case("head") {
            self.inject_meta = true;
        }
        self.open.push(OpenElement {
            name: pending.name,
            void,
        });
        Ok(())
    }
}

impl<W: Write> OutputHandler for HtmlSerializer<W> {
    fn start_document(&mut self) -> Result<(), SerializeError> {
        // HTML output never carries an XML declaration.
        Ok(())
    }

    fn end_document(&mut self) -> Result<(), SerializeError> {
        if self.pending.is_some() || !self.open.is_empty() {
            return Err(SerializeError::misuse("endDocument with open elements"));
        }
        self.writer.flush()?;
        Ok(())
    }

    fn start_element(&mut self, name: &QName) -> Result<(), SerializeError> {
        self.flush_pending()?;
        self.maybe_inject_meta(name.local_name.eq_ignore_ascii_case("meta"))?;
        self.pending = Some(PendingElement::new(name.clone()));
        Ok(())
    }

    fn end_element(&mut self, _name: &QName) -> Result<(), SerializeError> {
        self.flush_pending()?;
        self.maybe_inject_meta(false)?;
        let element = self
            .open
            .pop()
            .ok_or_else(|| SerializeError::misuse("endElement with no open element"))?;
        if !element.void {
            self.writer
                .write_all(format!("</{}>", element.name.qualified()).as_bytes())?;
        }
        Ok(())
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

    fn namespace(&mut self, _prefix: &str, _uri: &str) -> Result<(), SerializeError> {
        if self.pending.is_none() {
            return Err(SerializeError::misuse(
                "namespace declaration outside a pending element",
            ));
        }
        // The HTML method does not serialize namespace declarations.
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<(), SerializeError> {
        self.flush_pending()?;
        self.maybe_inject_meta(false)?;
        if self.in_raw_text() {
            self.writer.write_all(text.as_bytes())?;
        } else {
            self.writer.write_all(escape_text(text).as_bytes())?;
        }
        Ok(())
    }

    fn characters_raw(&mut self, text: &str) -> Result<(), SerializeError> {
        self.flush_pending()?;
        self.maybe_inject_meta(false)?;
        self.writer.write_all(text.as_bytes())?;
        Ok(())
    }

    fn comment(&mut self, text: &str) -> Result<(), SerializeError> {
        self.flush_pending()?;
        self.maybe_inject_meta(false)?;
        self.writer
            .write_all(format!("<!--{}-->", text).as_bytes())?;
        Ok(())
    }

    fn processing_instruction(&mut self, target: &str, data: &str)
    -> Result<(), SerializeError> {
        self.flush_pending()?;
        let pi = if data.is_empty() {
            format!("<?{}>", target)
        } else {
            format!("<?{} {}>", target, data)
        };
        self.writer.write_all(pi.as_bytes())?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SerializeError> {
        self.flush_pending()?;
        self.writer.flush()?;
        Ok(())
    }
}
