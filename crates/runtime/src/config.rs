//! Transformation options.

use serde::{Deserialize, Serialize};
use xylem_serializer::OutputProperties;
use xylem_xdm::{QName, ValidationMode};

/// How recoverable evaluation errors behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorHandling {
    /// Raise a typed failure and unwind to the top-level transformer.
    #[default]
    Strict,
    /// Coerce to a sentinel, notify the error sink, continue. Only affects
    /// type coercions of XPath 2.0+ stylesheets.
    Silent,
}

/// Recognized transformation options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformOptions {
    pub validation: ValidationMode,
    pub error_handling: ErrorHandling,
    pub output: OutputProperties,
    /// Name of the template to start with instead of matching the root.
    pub initial_template: Option<QName>,
    /// Clark-notation name tests for strip-space declarations.
    pub strip_space: Vec<String>,
    /// Clark-notation name tests for preserve-space declarations.
    pub preserve_space: Vec<String>,
}

impl TransformOptions {
    pub fn with_initial_template(mut self, name: QName) -> Self {
        self.initial_template = Some(name);
        self
    }

    pub fn with_output(mut self, output: OutputProperties) -> Self {
        self.output = output;
        self
    }

    pub fn with_validation(mut self, mode: ValidationMode) -> Self {
        self.validation = mode;
        self
    }

    pub fn with_space_patterns(
        mut self,
        strip: impl IntoIterator<Item = String>,
        preserve: impl IntoIterator<Item = String>,
    ) -> Self {
        self.strip_space = strip.into_iter().collect();
        self.preserve_space = preserve.into_iter().collect();
        self
    }
}
