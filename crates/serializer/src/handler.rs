//! The uniform output-handler contract.

use crate::error::SerializeError;
use xylem_xdm::{QName, ValidationMode};

/// Receiver of result events produced by the transformation.
///
/// Every implementation follows the deferred-start-tag protocol: after
/// [`start_element`](OutputHandler::start_element) the handler is in a
/// pending state during which [`attribute`](OutputHandler::attribute) and
/// [`namespace`](OutputHandler::namespace) calls accumulate on the element.
/// The pending element is flushed by the first call that is neither of
/// those, or by [`end_element`](OutputHandler::end_element) (producing an
/// empty element). Calling `attribute` or `namespace` with no element
/// pending is an illegal sequence and always fails.
pub trait OutputHandler {
    fn start_document(&mut self) -> Result<(), SerializeError>;
    fn end_document(&mut self) -> Result<(), SerializeError>;

    fn start_element(&mut self, name: &QName) -> Result<(), SerializeError>;
    fn end_element(&mut self, name: &QName) -> Result<(), SerializeError>;

    fn attribute(&mut self, name: &QName, value: &str) -> Result<(), SerializeError>;
    fn namespace(&mut self, prefix: &str, uri: &str) -> Result<(), SerializeError>;

    fn characters(&mut self, text: &str) -> Result<(), SerializeError>;

    /// Like `characters` but bypassing all escaping.
    fn characters_raw(&mut self, text: &str) -> Result<(), SerializeError>;

    fn comment(&mut self, text: &str) -> Result<(), SerializeError>;
    fn processing_instruction(&mut self, target: &str, data: &str)
    -> Result<(), SerializeError>;

    fn flush(&mut self) -> Result<(), SerializeError>;

    // --- Optional hooks ---

    /// Emission of an atomized value. Serializers that distinguish atomic
    /// items (the text method's spacing rule) override this; the default
    /// treats it as plain character content.
    fn atomic_value(&mut self, value: &str) -> Result<(), SerializeError> {
        self.characters(value)
    }

    /// Type annotation for the pending element or attribute.
    fn set_type_annotation(&mut self, _name: &QName) {}

    /// Validation mode requested for subsequently constructed content.
    fn set_validation_mode(&mut self, _mode: ValidationMode) {}

    /// Claims this handler for an explicit principal-output destination.
    /// Only the principal gate implements real claiming semantics.
    fn claim_principal(&mut self) -> Result<(), SerializeError> {
        Ok(())
    }
}
