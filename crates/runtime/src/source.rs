//! Bridges the quick-xml reader onto the source-event contract, with
//! prefix-mapping tracking and namespace resolution.

use crate::error::EngineError;
use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::Event;
use xylem_xdm::{DtdAttributeType, EventAttribute, QName, SourceEventHandler};

pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Debug, Default)]
struct NamespaceTracker {
    scopes: Vec<Vec<(String, String)>>,
}

impl NamespaceTracker {
    fn push(&mut self, declarations: Vec<(String, String)>) {
        self.scopes.push(declarations);
    }

    fn pop(&mut self) -> Vec<(String, String)> {
        self.scopes.pop().unwrap_or_default()
    }

    fn resolve(&self, prefix: &str) -> Option<String> {
        if prefix == "xml" {
            return Some(XML_NS.to_string());
        }
        for scope in self.scopes.iter().rev() {
            if let Some((_, uri)) = scope.iter().rev().find(|(p, _)| p == prefix) {
                return if uri.is_empty() { None } else { Some(uri.clone()) };
            }
        }
        None
    }
}

fn split_qname(raw: &str) -> (Option<&str>, &str) {
    match raw.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, raw),
    }
}

struct RawElement {
    name: QName,
    attributes: Vec<EventAttribute>,
    declarations: Vec<(String, String)>,
}

fn read_element(
    e: &quick_xml::events::BytesStart<'_>,
    namespaces: &mut NamespaceTracker,
) -> Result<RawElement, EngineError> {
    let mut declarations: Vec<(String, String)> = Vec::new();
    let mut plain: Vec<(String, String)> = Vec::new();

    for attr in e.attributes() {
        let attr = attr.map_err(|e| EngineError::parse(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let raw_value = String::from_utf8_lossy(&attr.value).to_string();
        let value = unescape(&raw_value)
            .map_err(|e| EngineError::parse(e.to_string()))?
            .into_owned();
        if key == "xmlns" {
            declarations.push((String::new(), value));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            declarations.push((prefix.to_string(), value));
        } else {
            plain.push((key, value));
        }
    }

    namespaces.push(declarations.clone());

    let raw_name = String::from_utf8_lossy(e.name().as_ref()).to_string();
    let (prefix, local) = split_qname(&raw_name);
    let uri = namespaces.resolve(prefix.unwrap_or(""));
    let name = QName::with_namespace(prefix.map(str::to_string), local, uri);

    let mut attributes = Vec::new();
    for (key, value) in plain {
        let (attr_prefix, attr_local) = split_qname(&key);
        // Unprefixed attributes are in no namespace.
        let attr_uri = attr_prefix.and_then(|p| namespaces.resolve(p));
        let mut attribute = EventAttribute::new(
            QName::with_namespace(attr_prefix.map(str::to_string), attr_local, attr_uri),
            value,
        );
        if attr_prefix == Some("xml") && attr_local == "id" {
            attribute = attribute.with_dtd_type(DtdAttributeType::Id);
        }
        attributes.push(attribute);
    }

    Ok(RawElement {
        name,
        attributes,
        declarations,
    })
}

/// Parses a complete document, pushing source events into the handler.
/// The emitted sequence follows the contract: prefix mappings enclose the
/// element they are declared on.
pub fn parse_document<H>(xml: &str, handler: &mut H) -> Result<(), EngineError>
where
    H: SourceEventHandler,
    EngineError: From<H::Error>,
{
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut namespaces = NamespaceTracker::default();
    let mut end_stack: Vec<QName> = Vec::new();

    handler.start_document()?;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let element = read_element(e, &mut namespaces)?;
                for (prefix, uri) in &element.declarations {
                    handler.start_prefix_mapping(prefix, uri)?;
                }
                handler.start_element(&element.name, &element.attributes)?;
                end_stack.push(element.name);
            }
            Ok(Event::Empty(ref e)) => {
                let element = read_element(e, &mut namespaces)?;
                for (prefix, uri) in &element.declarations {
                    handler.start_prefix_mapping(prefix, uri)?;
                }
                handler.start_element(&element.name, &element.attributes)?;
                handler.end_element(&element.name)?;
                for (prefix, _) in namespaces.pop().iter().rev() {
                    handler.end_prefix_mapping(prefix)?;
                }
            }
            Ok(Event::End(_)) => {
                let name = end_stack
                    .pop()
                    .ok_or_else(|| EngineError::parse("unbalanced end tag"))?;
                handler.end_element(&name)?;
                for (prefix, _) in namespaces.pop().iter().rev() {
                    handler.end_prefix_mapping(prefix)?;
                }
            }
            Ok(Event::Text(ref e)) => {
                let raw = std::str::from_utf8(e.as_ref())
                    .map_err(|e| EngineError::parse(e.to_string()))?;
                let text = unescape(raw)
                    .map_err(|e| EngineError::parse(e.to_string()))?
                    .into_owned();
                if !text.is_empty() {
                    handler.characters(&text)?;
                }
            }
            Ok(Event::CData(ref e)) => {
                let text = String::from_utf8_lossy(e.as_ref()).to_string();
                handler.characters(&text)?;
            }
            Ok(Event::Comment(ref e)) => {
                let text = String::from_utf8_lossy(e.as_ref()).to_string();
                handler.comment(&text)?;
            }
            Ok(Event::PI(ref e)) => {
                let content = String::from_utf8_lossy(e.as_ref()).to_string();
                let (target, data) = content
                    .split_once(char::is_whitespace)
                    .map(|(t, d)| (t.to_string(), d.trim_start().to_string()))
                    .unwrap_or((content, String::new()));
                handler.processing_instruction(&target, &data)?;
            }
            Ok(Event::Decl(_) | Event::DocType(_)) => {}
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(EngineError::parse(format!(
                    "XML error at byte {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
        }
        buf.clear();
    }

    if !end_stack.is_empty() {
        return Err(EngineError::parse("document ended with open elements"));
    }
    handler.end_document()?;
    Ok(())
}
