//! Simple-type validation for the common XSD primitives with the
//! length/pattern/enumeration facets.

use crate::error::SchemaError;
use regex::Regex;
use xylem_xdm::QName;

pub const XS_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// Builds a QName in the XML Schema namespace.
pub fn xs_name(local: &str) -> QName {
    QName::with_namespace(Some("xs".to_string()), local, Some(XS_NAMESPACE.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    String,
    Boolean,
    Decimal,
    Integer,
    Double,
    Date,
    DateTime,
    AnyUri,
    QName,
    Token,
    Id,
    Idref,
}

impl PrimitiveType {
    fn accepts(&self, lexical: &str) -> bool {
        let trimmed = lexical.trim();
        match self {
            PrimitiveType::String => true,
            PrimitiveType::Boolean => {
                matches!(trimmed, "true" | "false" | "1" | "0")
            }
            PrimitiveType::Decimal => {
                !trimmed.is_empty()
                    && trimmed.parse::<f64>().is_ok()
                    && trimmed
                        .chars()
                        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '+' | '-'))
            }
            PrimitiveType::Integer => trimmed.parse::<i64>().is_ok(),
            PrimitiveType::Double => {
                matches!(trimmed, "INF" | "-INF" | "NaN") || trimmed.parse::<f64>().is_ok()
            }
            PrimitiveType::Date => is_date(trimmed),
            PrimitiveType::DateTime => {
                if let Some((date, time)) = trimmed.split_once('T') {
                    is_date(date) && is_time(time)
                } else {
                    false
                }
            }
            PrimitiveType::AnyUri => !trimmed.contains(char::is_whitespace),
            PrimitiveType::QName => is_qname(trimmed),
            PrimitiveType::Token => trimmed == lexical.trim() && !trimmed.contains("  "),
            PrimitiveType::Id | PrimitiveType::Idref => is_ncname(trimmed),
        }
    }

    fn local_name(&self) -> &'static str {
        match self {
            PrimitiveType::String => "string",
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Decimal => "decimal",
            PrimitiveType::Integer => "integer",
            PrimitiveType::Double => "double",
            PrimitiveType::Date => "date",
            PrimitiveType::DateTime => "dateTime",
            PrimitiveType::AnyUri => "anyURI",
            PrimitiveType::QName => "QName",
            PrimitiveType::Token => "token",
            PrimitiveType::Id => "ID",
            PrimitiveType::Idref => "IDREF",
        }
    }
}

fn is_date(s: &str) -> bool {
    let parts: Vec<&str> = s.splitn(3, '-').collect();
    if s.starts_with('-') || parts.len() != 3 {
        return false;
    }
    parts[0].len() == 4
        && parts[0].chars().all(|c| c.is_ascii_digit())
        && parts[1].len() == 2
        && parts[2].len() >= 2
        && parts[1].parse::<u8>().is_ok_and(|m| (1..=12).contains(&m))
        && parts[2][..2].parse::<u8>().is_ok_and(|d| (1..=31).contains(&d))
}

fn is_time(s: &str) -> bool {
    let bare = s
        .trim_end_matches('Z')
        .split(['+'])
        .next()
        .unwrap_or(s);
    let fields: Vec<&str> = bare.splitn(3, ':').collect();
    fields.len() == 3 && fields.iter().all(|f| f[..2.min(f.len())].parse::<u8>().is_ok())
}

fn is_ncname(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn is_qname(s: &str) -> bool {
    match s.split_once(':') {
        Some((prefix, local)) => is_ncname(prefix) && is_ncname(local),
        None => is_ncname(s),
    }
}

/// A simple type: one primitive plus optional constraining facets.
#[derive(Debug, Clone)]
pub struct SimpleType {
    pub name: QName,
    pub primitive: PrimitiveType,
    pattern: Option<Regex>,
    enumeration: Vec<String>,
    min_length: Option<usize>,
    max_length: Option<usize>,
}

impl SimpleType {
    pub fn new(primitive: PrimitiveType) -> Self {
        Self {
            name: xs_name(primitive.local_name()),
            primitive,
            pattern: None,
            enumeration: Vec::new(),
            min_length: None,
            max_length: None,
        }
    }

    pub fn named(name: QName, primitive: PrimitiveType) -> Self {
        Self {
            name,
            ..Self::new(primitive)
        }
    }

    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, SchemaError> {
        // XSD patterns are implicitly anchored.
        self.pattern = Some(Regex::new(&format!("^(?:{})$", pattern))?);
        Ok(self)
    }

    pub fn with_enumeration(mut self, values: impl IntoIterator<Item = String>) -> Self {
        self.enumeration = values.into_iter().collect();
        self
    }

    pub fn with_length_range(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    pub fn validate(&self, lexical: &str) -> Result<(), SchemaError> {
        let fail = |reason: &str| {
            Err(SchemaError::validation(
                crate::error::ERR_ELEMENT,
                format!("value '{}' is not a valid {}: {}", lexical, self.name, reason),
            ))
        };
        if !self.primitive.accepts(lexical) {
            return fail("lexical form rejected");
        }
        let len = lexical.chars().count();
        if let Some(min) = self.min_length
            && len < min
        {
            return fail("shorter than minLength");
        }
        if let Some(max) = self.max_length
            && len > max
        {
            return fail("longer than maxLength");
        }
        if let Some(pattern) = &self.pattern
            && !pattern.is_match(lexical)
        {
            return fail("pattern facet not matched");
        }
        if !self.enumeration.is_empty() && !self.enumeration.iter().any(|v| v == lexical) {
            return fail("not in enumeration");
        }
        Ok(())
    }
}
