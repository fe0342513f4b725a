//! The XML output method.

use crate::error::SerializeError;
use crate::escape::{escape_attribute, escape_text};
use crate::handler::OutputHandler;
use crate::pending::{PendingElement, PrefixAllocator};
use crate::properties::OutputProperties;
use std::io::Write;
use xylem_xdm::QName;

struct OpenElement {
    name: QName,
    had_children: bool,
    had_text: bool,
    scope_size: usize,
}

/// Serializes result events as XML with the deferred-start-tag protocol,
/// minimal escaping, and a namespace-scope stack that suppresses redundant
/// declarations.
pub struct XmlSerializer<W: Write> {
    writer: W,
    props: OutputProperties,
    pending: Option<PendingElement>,
    open: Vec<OpenElement>,
    // Flat stack of in-scope (prefix, uri) bindings; each open element
    // remembers how many entries it contributed.
    scope: Vec<(String, String)>,
    allocator: PrefixAllocator,
    document_started: bool,
}

impl<W: Write> XmlSerializer<W> {
    pub fn new(writer: W) -> Self {
        Self::with_properties(writer, OutputProperties::default())
    }

    pub fn with_properties(writer: W, props: OutputProperties) -> Self {
        Self {
            writer,
            props,
            pending: None,
            open: Vec::new(),
            scope: Vec::new(),
            allocator: PrefixAllocator::new(),
            document_started: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn in_scope(&self, prefix: &str) -> Option<&str> {
        self.scope
            .iter()
            .rev()
            .find(|(p, _)| p == prefix)
            .map(|(_, u)| u.as_str())
    }

    fn write_indent(&mut self, depth: usize) -> Result<(), SerializeError> {
        if self.props.indent {
            self.writer.write_all(b"\n")?;
            for _ in 0..depth {
                self.writer.write_all(b"  ")?;
            }
        }
        Ok(())
    }

    fn parent_allows_indent(&self) -> bool {
        match self.open.last() {
            Some(parent) => !parent.had_text,
            None => self.document_started,
        }
    }

    /// Writes the pending start tag. `self_close` produces an empty
    /// element.
    fn flush_pending(&mut self, self_close: bool) -> Result<(), SerializeError> {
        let Some(mut pending) = self.pending.take() else {
            return Ok(());
        };
        pending.fixup_namespaces(&mut self.allocator);

        let mut declarations: Vec<(String, String)> = Vec::new();
        for (prefix, uri) in pending.namespaces() {
            if self.in_scope(prefix) != Some(uri.as_str()) {
                declarations.push((prefix.clone(), uri.clone()));
            }
        }

        // The element and attribute names must resolve inside the scope
        // being opened; declare whatever is still missing.
        let mut required: Vec<(String, Option<String>)> = Vec::new();
        required.push((
            pending.name.prefix.clone().unwrap_or_default(),
            pending.name.namespace_uri.clone(),
        ));
        for (attr, _) in pending.attributes() {
            if let Some(uri) = &attr.namespace_uri
                && let Some(prefix) = &attr.prefix
            {
                required.push((prefix.clone(), Some(uri.clone())));
            }
        }
        for (prefix, uri) in required {
            match uri {
                Some(uri) => {
                    let declared = declarations
                        .iter()
                        .any(|(p, u)| *p == prefix && *u == uri);
                    if !declared && self.in_scope(&prefix) != Some(uri.as_str()) {
                        declarations.push((prefix, uri));
                    }
                }
                None => {
                    // An unprefixed element in no namespace must not inherit
                    // a default namespace.
                    if prefix.is_empty()
                        && self.in_scope("").is_some_and(|u| !u.is_empty())
                        && !declarations.iter().any(|(p, _)| p.is_empty())
                    {
                        declarations.push((String::new(), String::new()));
                    }
                }
            }
        }

        if self.parent_allows_indent() && !self.open.is_empty() {
            self.write_indent(self.open.len())?;
        }
        if let Some(parent) = self.open.last_mut() {
            parent.had_children = true;
        }

        let mut tag = String::new();
        tag.push('<');
        tag.push_str(&pending.name.qualified());
        for (prefix, uri) in &declarations {
            if prefix.is_empty() {
                tag.push_str(&format!(" xmlns=\"{}\"", escape_attribute(uri)));
            } else {
                tag.push_str(&format!(" xmlns:{}=\"{}\"", prefix, escape_attribute(uri)));
            }
        }
        for (name, value) in pending.attributes() {
            tag.push_str(&format!(
                " {}=\"{}\"",
                name.qualified(),
                escape_attribute(value)
            ));
        }
        if self_close {
            tag.push_str("/>");
            self.writer.write_all(tag.as_bytes())?;
            return Ok(());
        }
        tag.push('>');
        self.writer.write_all(tag.as_bytes())?;

        let scope_size = declarations.len();
        self.scope.extend(declarations);
        self.open.push(OpenElement {
            name: pending.name.clone(),
            had_children: false,
            had_text: false,
            scope_size,
        });
        Ok(())
    }
}

impl<W: Write> OutputHandler for XmlSerializer<W> {
    fn start_document(&mut self) -> Result<(), SerializeError> {
        self.document_started = true;
        if !self.props.omit_xml_declaration {
            let mut decl = format!(
                "<?xml version=\"{}\" encoding=\"{}\"",
                self.props.version, self.props.encoding
            );
            if let Some(standalone) = self.props.standalone {
                decl.push_str(if standalone {
                    " standalone=\"yes\""
                } else {
                    " standalone=\"no\""
                });
            }
            decl.push_str("?>");
            self.writer.write_all(decl.as_bytes())?;
        }
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
        self.flush_pending(false)?;
        self.pending = Some(PendingElement::new(name.clone()));
        Ok(())
    }

    fn end_element(&mut self, _name: &QName) -> Result<(), SerializeError> {
        if self.pending.is_some() {
            return self.flush_pending(true);
        }
        let element = self
            .open
            .pop()
            .ok_or_else(|| SerializeError::misuse("endElement with no open element"))?;
        if element.had_children && !element.had_text {
            self.write_indent(self.open.len())?;
        }
        self.writer
            .write_all(format!("</{}>", element.name.qualified()).as_bytes())?;
        self.scope.truncate(self.scope.len() - element.scope_size);
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
        self.flush_pending(false)?;
        if let Some(top) = self.open.last_mut() {
            top.had_text = true;
        }
        self.writer.write_all(escape_text(text).as_bytes())?;
        Ok(())
    }

    fn characters_raw(&mut self, text: &str) -> Result<(), SerializeError> {
        self.flush_pending(false)?;
        if let Some(top) = self.open.last_mut() {
            top.had_text = true;
        }
        self.writer.write_all(text.as_bytes())?;
        Ok(())
    }

    fn comment(&mut self, text: &str) -> Result<(), SerializeError> {
        self.flush_pending(false)?;
        self.writer
            .write_all(format!("<!--{}-->", text).as_bytes())?;
        Ok(())
    }

    fn processing_instruction(&mut self, target: &str, data: &str)
    -> Result<(), SerializeError> {
        self.flush_pending(false)?;
        let pi = if data.is_empty() {
            format!("<?{}?>", target)
        } else {
            format!("<?{} {}?>", target, data)
        };
        self.writer.write_all(pi.as_bytes())?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SerializeError> {
        self.flush_pending(false)?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::OutputProperties;

    fn serializer() -> XmlSerializer<Vec<u8>> {
        XmlSerializer::with_properties(
            Vec::new(),
            OutputProperties::default().without_declaration(),
        )
    }

    fn output(s: XmlSerializer<Vec<u8>>) -> String {
        String::from_utf8(s.into_inner()).unwrap()
    }

    #[test]
    fn test_declaration_written_by_default() {
        let mut s = XmlSerializer::new(Vec::new());
        s.start_document().unwrap();
        s.start_element(&QName::new("a")).unwrap();
        s.end_element(&QName::new("a")).unwrap();
        s.end_document().unwrap();
        assert_eq!(
            output(s),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><a/>"
        );
    }

    #[test]
    fn test_empty_element_self_closes() {
        let mut s = serializer();
        s.start_document().unwrap();
        s.start_element(&QName::new("a")).unwrap();
        s.attribute(&QName::new("x"), "1").unwrap();
        s.start_element(&QName::new("b")).unwrap();
        s.end_element(&QName::new("b")).unwrap();
        s.end_element(&QName::new("a")).unwrap();
        s.end_document().unwrap();
        assert_eq!(output(s), "<a x=\"1\"><b/></a>");
    }

    #[test]
    fn test_attributes_accumulate_and_replace_while_pending() {
        let mut s = serializer();
        s.start_document().unwrap();
        s.start_element(&QName::new("e")).unwrap();
        s.attribute(&QName::new("a"), "old").unwrap();
        s.attribute(&QName::new("a"), "new").unwrap();
        s.characters("x").unwrap();
        s.end_element(&QName::new("e")).unwrap();
        s.end_document().unwrap();
        assert_eq!(output(s), "<e a=\"new\">x</e>");
    }

    #[test]
    fn test_attribute_after_flush_is_fatal() {
        let mut s = serializer();
        s.start_document().unwrap();
        s.start_element(&QName::new("e")).unwrap();
        s.characters("text").unwrap();
        let result = s.attribute(&QName::new("late"), "v");
        assert!(matches!(result, Err(SerializeError::HandlerMisuse(_))));
    }

    #[test]
    fn test_text_escaping_in_content_and_attributes() {
        let mut s = serializer();
        s.start_document().unwrap();
        s.start_element(&QName::new("e")).unwrap();
        s.attribute(&QName::new("a"), "say \"hi\" & <go>").unwrap();
        s.characters("1 < 2 & 3 > 2").unwrap();
        s.end_element(&QName::new("e")).unwrap();
        s.end_document().unwrap();
        assert_eq!(
            output(s),
            "<e a=\"say &quot;hi&quot; &amp; &lt;go>\">1 &lt; 2 &amp; 3 &gt; 2</e>"
        );
    }

    #[test]
    fn test_namespace_declarations_not_repeated_in_children() {
        let mut s = serializer();
        s.start_document().unwrap();
        let name = QName::with_namespace(Some("p".into()), "root", Some("urn:x".into()));
        s.start_element(&name).unwrap();
        s.namespace("p", "urn:x").unwrap();
        let child = QName::with_namespace(Some("p".into()), "child", Some("urn:x".into()));
        s.start_element(&child).unwrap();
        s.end_element(&child).unwrap();
        s.end_element(&name).unwrap();
        s.end_document().unwrap();
        assert_eq!(
            output(s),
            "<p:root xmlns:p=\"urn:x\"><p:child/></p:root>"
        );
    }

    #[test]
    fn test_undeclared_prefix_is_auto_declared() {
        let mut s = serializer();
        s.start_document().unwrap();
        let name = QName::with_namespace(Some("q".into()), "e", Some("urn:q".into()));
        s.start_element(&name).unwrap();
        s.end_element(&name).unwrap();
        s.end_document().unwrap();
        assert_eq!(output(s), "<q:e xmlns:q=\"urn:q\"/>");
    }

    #[test]
    fn test_namespace_fixup_on_conflicting_prefix() {
        let mut s = serializer();
        s.start_document().unwrap();
        let name = QName::with_namespace(Some("p".into()), "e", Some("urn:mine".into()));
        s.start_element(&name).unwrap();
        s.namespace("p", "urn:other").unwrap();
        s.end_element(&name).unwrap();
        s.end_document().unwrap();
        let text = output(s);
        // The element moved to a fresh prefix bound to its own URI, and
        // every prefix referenced is declared.
        assert!(text.starts_with("<ns1:e "));
        assert!(text.contains("xmlns:p=\"urn:other\""));
        assert!(text.contains("xmlns:ns1=\"urn:mine\""));
    }

    #[test]
    fn test_raw_characters_bypass_escaping() {
        let mut s = serializer();
        s.start_document().unwrap();
        s.start_element(&QName::new("e")).unwrap();
        s.characters_raw("<b>kept</b>").unwrap();
        s.end_element(&QName::new("e")).unwrap();
        s.end_document().unwrap();
        assert_eq!(output(s), "<e><b>kept</b></e>");
    }

    #[test]
    fn test_comment_and_pi() {
        let mut s = serializer();
        s.start_document().unwrap();
        s.start_element(&QName::new("e")).unwrap();
        s.comment(" note ").unwrap();
        s.processing_instruction("go", "now").unwrap();
        s.end_element(&QName::new("e")).unwrap();
        s.end_document().unwrap();
        assert_eq!(output(s), "<e><!-- note --><?go now?></e>");
    }

    #[test]
    fn test_indent_applies_to_element_only_content() {
        let mut s = XmlSerializer::with_properties(
            Vec::new(),
            OutputProperties::default()
                .without_declaration()
                .with_indent(true),
        );
        s.start_document().unwrap();
        s.start_element(&QName::new("r")).unwrap();
        s.start_element(&QName::new("a")).unwrap();
        s.characters("x").unwrap();
        s.end_element(&QName::new("a")).unwrap();
        s.end_element(&QName::new("r")).unwrap();
        s.end_document().unwrap();
        assert_eq!(output(s), "<r>\n  <a>x</a>\n</r>");
    }
}
