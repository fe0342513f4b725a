//! Whitespace-stripping policy: strip-space and preserve-space name tests
//! in Clark notation.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use xylem_xdm::QName;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
enum UriTest {
    Any,
    None,
    Is(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
enum LocalTest {
    Any,
    Is(String),
}

/// A name test in Clark notation: `{uri}local`, `{*}local`, `{uri}*`, `*`,
/// or a plain `local` for names in no namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NameTest {
    uri: UriTest,
    local: LocalTest,
}

impl NameTest {
    pub fn parse(text: &str) -> Result<Self, EngineError> {
        let text = text.trim();
        if text == "*" {
            return Ok(Self {
                uri: UriTest::Any,
                local: LocalTest::Any,
            });
        }
        if let Some(rest) = text.strip_prefix('{') {
            let (uri, local) = rest
                .split_once('}')
                .ok_or_else(|| EngineError::config(format!("unterminated URI in '{}'", text)))?;
            let uri = match uri {
                "*" => UriTest::Any,
                "" => UriTest::None,
                other => UriTest::Is(other.to_string()),
            };
            let local = match local {
                "*" => LocalTest::Any,
                "" => return Err(EngineError::config(format!("missing local name in '{}'", text))),
                other => LocalTest::Is(other.to_string()),
            };
            return Ok(Self { uri, local });
        }
        if text.is_empty() || text.contains(['{', '}']) {
            return Err(EngineError::config(format!("malformed name test '{}'", text)));
        }
        Ok(Self {
            uri: UriTest::None,
            local: LocalTest::Is(text.to_string()),
        })
    }

    pub fn matches(&self, name: &QName) -> bool {
        let uri_ok = match &self.uri {
            UriTest::Any => true,
            UriTest::None => name.namespace_uri.as_deref().unwrap_or("").is_empty(),
            UriTest::Is(uri) => name.namespace_uri.as_deref() == Some(uri.as_str()),
        };
        let local_ok = match &self.local {
            LocalTest::Any => true,
            LocalTest::Is(local) => name.local_name == *local,
        };
        uri_ok && local_ok
    }

    /// Specificity used when both a strip and a preserve test match is not
    /// needed (preserve always wins), but a more specific test beats `*`
    /// within one list.
    fn specificity(&self) -> u8 {
        let mut score = 0;
        if matches!(self.local, LocalTest::Is(_)) {
            score += 2;
        }
        if matches!(self.uri, UriTest::Is(_) | UriTest::None) {
            score += 1;
        }
        score
    }
}

/// Combined strip/preserve policy. Only whitespace-only text is eligible
/// for stripping, and preserve wins when both lists match an element.
#[derive(Debug, Clone, Default)]
pub struct SpaceStripper {
    strip: Vec<NameTest>,
    preserve: Vec<NameTest>,
}

impl SpaceStripper {
    pub fn new(strip: Vec<NameTest>, preserve: Vec<NameTest>) -> Self {
        Self { strip, preserve }
    }

    pub fn from_patterns(
        strip: &[String],
        preserve: &[String],
    ) -> Result<Self, EngineError> {
        let strip = strip.iter().map(|s| NameTest::parse(s)).collect::<Result<_, _>>()?;
        let preserve = preserve
            .iter()
            .map(|s| NameTest::parse(s))
            .collect::<Result<_, _>>()?;
        Ok(Self { strip, preserve })
    }

    pub fn is_empty(&self) -> bool {
        self.strip.is_empty() && self.preserve.is_empty()
    }

    /// Should whitespace-only text children of `element` be stripped?
    pub fn should_strip(&self, element: &QName) -> bool {
        let best_strip = self
            .strip
            .iter()
            .filter(|t| t.matches(element))
            .map(NameTest::specificity)
            .max();
        let best_preserve = self
            .preserve
            .iter()
            .filter(|t| t.matches(element))
            .map(NameTest::specificity)
            .max();
        match (best_strip, best_preserve) {
            (Some(_), Some(_)) => false,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qn(local: &str) -> QName {
        QName::new(local)
    }

    fn qn_ns(local: &str, uri: &str) -> QName {
        QName::with_namespace(None, local, Some(uri.to_string()))
    }

    #[test]
    fn test_parse_forms() {
        assert!(NameTest::parse("*").is_ok());
        assert!(NameTest::parse("para").is_ok());
        assert!(NameTest::parse("{urn:x}para").is_ok());
        assert!(NameTest::parse("{*}para").is_ok());
        assert!(NameTest::parse("{urn:x}*").is_ok());
        assert!(NameTest::parse("{urn:x").is_err());
        assert!(NameTest::parse("").is_err());
    }

    #[test]
    fn test_wildcard_matches_everything() {
        let test = NameTest::parse("*").unwrap();
        assert!(test.matches(&qn("a")));
        assert!(test.matches(&qn_ns("a", "urn:x")));
    }

    #[test]
    fn test_plain_local_requires_no_namespace() {
        let test = NameTest::parse("para").unwrap();
        assert!(test.matches(&qn("para")));
        assert!(!test.matches(&qn_ns("para", "urn:x")));
    }

    #[test]
    fn test_clark_forms() {
        assert!(NameTest::parse("{urn:x}para").unwrap().matches(&qn_ns("para", "urn:x")));
        assert!(!NameTest::parse("{urn:x}para").unwrap().matches(&qn("para")));
        assert!(NameTest::parse("{*}para").unwrap().matches(&qn_ns("para", "urn:y")));
        assert!(NameTest::parse("{urn:x}*").unwrap().matches(&qn_ns("other", "urn:x")));
    }

    #[test]
    fn test_preserve_wins() {
        let stripper = SpaceStripper::from_patterns(
            &["*".to_string()],
            &["pre".to_string()],
        )
        .unwrap();
        assert!(stripper.should_strip(&qn("r")));
        assert!(stripper.should_strip(&qn("x")));
        assert!(!stripper.should_strip(&qn("pre")));
    }

    #[test]
    fn test_no_patterns_strips_nothing() {
        let stripper = SpaceStripper::default();
        assert!(!stripper.should_strip(&qn("anything")));
    }
}
