//! Schema-directed validation of constructed output, one frame per open
//! element.

use crate::automaton::ContentAutomaton;
use crate::error::{ERR_ATTRIBUTE, ERR_CONTENT, ERR_ELEMENT, SchemaError};
use crate::model::{ContentModel, ElementDecl, Schema, TypeDef};
use crate::types::SimpleType;
use std::rc::Rc;
use xylem_xdm::{ExpandedName, QName, ValidationMode};

struct Frame {
    name: ExpandedName,
    mode: ValidationMode,
    decl: Option<Rc<ElementDecl>>,
    automaton: Option<ContentAutomaton>,
    simple: Option<SimpleType>,
    mixed_allowed: Option<Vec<ExpandedName>>,
    text: String,
    seen_attributes: Vec<ExpandedName>,
}

/// Validates elements as they are constructed. The caller drives it in
/// document order: `add_child_element` on the parent, `start_element` for
/// the child, `validate_attribute` per attribute, `add_text_content` for
/// character runs, `end_element` on close.
///
/// Strict-mode failures are returned as errors; in lax mode a missing
/// declaration skips validation for that element and value errors are
/// reported to the log and swallowed.
pub struct RuntimeValidator {
    schema: Rc<Schema>,
    frames: Vec<Frame>,
}

impl RuntimeValidator {
    pub fn new(schema: Rc<Schema>) -> Self {
        Self {
            schema,
            frames: Vec::new(),
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Resolves the declaration for an element about to open and pushes its
    /// validation frame.
    pub fn start_element(
        &mut self,
        name: &ExpandedName,
        mode: ValidationMode,
    ) -> Result<(), SchemaError> {
        let decl = match mode {
            ValidationMode::Preserve | ValidationMode::Strip => None,
            ValidationMode::Strict | ValidationMode::Lax => {
                let found = self.schema.element(name);
                if found.is_none() && mode == ValidationMode::Strict {
                    return Err(SchemaError::validation(
                        ERR_ELEMENT,
                        format!("no element declaration for '{}'", name),
                    ));
                }
                if found.is_none() {
                    log::debug!("lax validation: no declaration for '{}', skipping", name);
                }
                found
            }
        };

        let (automaton, simple, mixed_allowed) = match decl.as_deref() {
            Some(ElementDecl {
                type_def: TypeDef::Complex(complex),
                ..
            }) => match &complex.content {
                ContentModel::ElementOnly(particle) => {
                    (Some(ContentAutomaton::compile(particle)), None, None)
                }
                ContentModel::Simple(simple) => (None, Some(simple.clone()), None),
                ContentModel::Mixed(allowed) => (None, None, Some(allowed.clone())),
                ContentModel::Empty => (None, None, None),
            },
            Some(ElementDecl {
                type_def: TypeDef::Simple(simple),
                ..
            }) => (None, Some(simple.clone()), None),
            None => (None, None, None),
        };

        self.frames.push(Frame {
            name: name.clone(),
            mode,
            decl,
            automaton,
            simple,
            mixed_allowed,
            text: String::new(),
            seen_attributes: Vec::new(),
        });
        Ok(())
    }

    /// Validates one attribute of the current element, returning the type
    /// annotation to attach to the attribute node.
    pub fn validate_attribute(
        &mut self,
        name: &ExpandedName,
        value: &str,
    ) -> Result<Option<QName>, SchemaError> {
        let Some(frame) = self.frames.last_mut() else {
            return Ok(None);
        };
        frame.seen_attributes.push(name.clone());
        let strict = frame.mode == ValidationMode::Strict;
        let Some(decl) = &frame.decl else {
            return Ok(None);
        };

        let attribute_use = match &decl.type_def {
            TypeDef::Complex(complex) => complex.attributes.get(name),
            TypeDef::Simple(_) => None,
        };
        let Some(attribute_use) = attribute_use else {
            if strict {
                return Err(SchemaError::validation(
                    ERR_ATTRIBUTE,
                    format!("attribute '{}' is not declared on '{}'", name, frame.name),
                ));
            }
            return Ok(None);
        };

        if let Err(err) = attribute_use.decl.simple_type.validate(value) {
            if strict {
                return Err(SchemaError::validation(
                    ERR_ATTRIBUTE,
                    format!("attribute '{}': {}", name, err),
                ));
            }
            log::warn!("lax validation: attribute '{}' invalid: {}", name, err);
            return Ok(None);
        }
        Ok(Some(attribute_use.decl.simple_type.name.clone()))
    }

    /// Advances the current element's content model by one child element.
    pub fn add_child_element(&mut self, name: &ExpandedName) -> Result<(), SchemaError> {
        let Some(frame) = self.frames.last_mut() else {
            return Ok(());
        };
        let strict = frame.mode == ValidationMode::Strict;
        if let Some(automaton) = &mut frame.automaton {
            if !automaton.step(name) {
                if strict {
                    return Err(SchemaError::validation(
                        ERR_CONTENT,
                        format!("element '{}' not allowed here in '{}'", name, frame.name),
                    ));
                }
                log::warn!(
                    "lax validation: element '{}' violates content model of '{}'",
                    name,
                    frame.name
                );
            }
        } else if let Some(allowed) = &frame.mixed_allowed
            && !allowed.contains(name)
        {
            if strict {
                return Err(SchemaError::validation(
                    ERR_CONTENT,
                    format!("element '{}' not allowed in mixed content of '{}'", name, frame.name),
                ));
            }
            log::warn!("lax validation: '{}' not allowed in mixed content", name);
        } else if frame.simple.is_some() && strict {
            return Err(SchemaError::validation(
                ERR_CONTENT,
                format!("element content in simple-typed element '{}'", frame.name),
            ));
        }
        Ok(())
    }

    /// Accumulates character content for simple-content validation.
    pub fn add_text_content(&mut self, text: &str) {
        if let Some(frame) = self.frames.last_mut() {
            frame.text.push_str(text);
        }
    }

    /// Closes the current element: content-model completion, simple-content
    /// validation, required-attribute check. Returns the element's type
    /// annotation.
    pub fn end_element(&mut self) -> Result<Option<QName>, SchemaError> {
        let Some(frame) = self.frames.pop() else {
            return Ok(None);
        };
        let strict = frame.mode == ValidationMode::Strict;

        if let Some(automaton) = &frame.automaton
            && !automaton.is_complete()
        {
            if strict {
                return Err(SchemaError::validation(
                    ERR_CONTENT,
                    format!("content of '{}' is incomplete", frame.name),
                ));
            }
            log::warn!("lax validation: content of '{}' is incomplete", frame.name);
        }

        if let Some(simple) = &frame.simple
            && let Err(err) = simple.validate(&frame.text)
        {
            if strict {
                return Err(SchemaError::validation(
                    ERR_ELEMENT,
                    format!("simple content of '{}': {}", frame.name, err),
                ));
            }
            log::warn!("lax validation: simple content of '{}' invalid", frame.name);
        }

        if let Some(decl) = &frame.decl
            && let TypeDef::Complex(complex) = &decl.type_def
        {
            for (name, attribute_use) in &complex.attributes {
                if attribute_use.required && !frame.seen_attributes.contains(name) {
                    if strict {
                        return Err(SchemaError::validation(
                            ERR_ATTRIBUTE,
                            format!("required attribute '{}' missing on '{}'", name, frame.name),
                        ));
                    }
                    log::warn!("lax validation: required attribute '{}' missing", name);
                }
            }
        }

        Ok(frame.decl.as_ref().and_then(|d| d.type_def.annotation()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttributeDecl, ComplexType, Particle};
    use crate::types::{PrimitiveType, SimpleType};

    fn schema() -> Rc<Schema> {
        let mut schema = Schema::new();
        // <order total="decimal" required> (item+) </order>
        let order_type = ComplexType::new(ContentModel::ElementOnly(Particle::Element {
            name: ExpandedName::local("item"),
            min: 1,
            max: None,
        }))
        .with_attribute(
            AttributeDecl {
                name: ExpandedName::local("total"),
                simple_type: SimpleType::new(PrimitiveType::Decimal),
            },
            true,
        );
        schema.add_element(ElementDecl::new(
            ExpandedName::local("order"),
            TypeDef::Complex(order_type),
        ));
        // <item> integer </item>
        schema.add_element(ElementDecl::new(
            ExpandedName::local("item"),
            TypeDef::Simple(SimpleType::new(PrimitiveType::Integer)),
        ));
        Rc::new(schema)
    }

    #[test]
    fn test_strict_missing_declaration_fails() {
        let mut validator = RuntimeValidator::new(schema());
        let result = validator.start_element(&ExpandedName::local("unknown"), ValidationMode::Strict);
        assert!(matches!(result, Err(SchemaError::Validation { .. })));
    }

    #[test]
    fn test_lax_missing_declaration_skips() {
        let mut validator = RuntimeValidator::new(schema());
        validator
            .start_element(&ExpandedName::local("unknown"), ValidationMode::Lax)
            .unwrap();
        assert_eq!(validator.end_element().unwrap(), None);
    }

    #[test]
    fn test_valid_document_annotations() {
        let mut validator = RuntimeValidator::new(schema());
        validator
            .start_element(&ExpandedName::local("order"), ValidationMode::Strict)
            .unwrap();
        let annotation = validator
            .validate_attribute(&ExpandedName::local("total"), "12.50")
            .unwrap();
        assert_eq!(annotation.unwrap().local_name, "decimal");

        validator.add_child_element(&ExpandedName::local("item")).unwrap();
        validator
            .start_element(&ExpandedName::local("item"), ValidationMode::Strict)
            .unwrap();
        validator.add_text_content("42");
        let item_annotation = validator.end_element().unwrap();
        assert_eq!(item_annotation.unwrap().local_name, "integer");

        let order_annotation = validator.end_element().unwrap();
        assert!(order_annotation.is_none());
    }

    #[test]
    fn test_invalid_attribute_value_strict() {
        let mut validator = RuntimeValidator::new(schema());
        validator
            .start_element(&ExpandedName::local("order"), ValidationMode::Strict)
            .unwrap();
        let result = validator.validate_attribute(&ExpandedName::local("total"), "abc");
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().code(), Some(ERR_ATTRIBUTE));
    }

    #[test]
    fn test_content_model_violation() {
        let mut validator = RuntimeValidator::new(schema());
        validator
            .start_element(&ExpandedName::local("order"), ValidationMode::Strict)
            .unwrap();
        let result = validator.add_child_element(&ExpandedName::local("bogus"));
        assert_eq!(result.unwrap_err().code(), Some(ERR_CONTENT));
    }

    #[test]
    fn test_incomplete_content_at_end() {
        let mut validator = RuntimeValidator::new(schema());
        validator
            .start_element(&ExpandedName::local("order"), ValidationMode::Strict)
            .unwrap();
        validator
            .validate_attribute(&ExpandedName::local("total"), "1.0")
            .unwrap();
        // No <item> child: minOccurs=1 unsatisfied.
        let result = validator.end_element();
        assert_eq!(result.unwrap_err().code(), Some(ERR_CONTENT));
    }

    #[test]
    fn test_invalid_simple_content() {
        let mut validator = RuntimeValidator::new(schema());
        validator
            .start_element(&ExpandedName::local("item"), ValidationMode::Strict)
            .unwrap();
        validator.add_text_content("not a number");
        let result = validator.end_element();
        assert_eq!(result.unwrap_err().code(), Some(ERR_ELEMENT));
    }

    #[test]
    fn test_missing_required_attribute() {
        let mut validator = RuntimeValidator::new(schema());
        validator
            .start_element(&ExpandedName::local("order"), ValidationMode::Strict)
            .unwrap();
        validator.add_child_element(&ExpandedName::local("item")).unwrap();
        validator
            .start_element(&ExpandedName::local("item"), ValidationMode::Strict)
            .unwrap();
        validator.add_text_content("1");
        validator.end_element().unwrap();
        let result = validator.end_element();
        assert_eq!(result.unwrap_err().code(), Some(ERR_ATTRIBUTE));
    }
}
