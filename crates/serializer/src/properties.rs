use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The closed set of output methods a destination can be serialized with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMethod {
    #[default]
    Xml,
    Html,
    Text,
}

/// Serialization parameters for one output destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputProperties {
    pub method: OutputMethod,
    pub encoding: String,
    pub indent: bool,
    pub omit_xml_declaration: bool,
    pub version: String,
    pub standalone: Option<bool>,
    /// Per-code-point replacements applied to character content; the
    /// replacement string is written without escaping.
    pub character_map: HashMap<char, String>,
}

impl Default for OutputProperties {
    fn default() -> Self {
        Self {
            method: OutputMethod::Xml,
            encoding: "UTF-8".to_string(),
            indent: false,
            omit_xml_declaration: false,
            version: "1.0".to_string(),
            standalone: None,
            character_map: HashMap::new(),
        }
    }
}

impl OutputProperties {
    pub fn with_method(mut self, method: OutputMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_indent(mut self, indent: bool) -> Self {
        self.indent = indent;
        self
    }

    pub fn without_declaration(mut self) -> Self {
        self.omit_xml_declaration = true;
        self
    }
}
