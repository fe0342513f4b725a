use serde::{Deserialize, Serialize};
use std::fmt;

/// A qualified XML name: optional prefix, local name, optional namespace URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QName {
    pub prefix: Option<String>,
    pub local_name: String,
    pub namespace_uri: Option<String>,
}

impl QName {
    pub fn new(local_name: impl Into<String>) -> Self {
        Self {
            prefix: None,
            local_name: local_name.into(),
            namespace_uri: None,
        }
    }

    pub fn with_namespace(
        prefix: Option<String>,
        local_name: impl Into<String>,
        namespace_uri: Option<String>,
    ) -> Self {
        Self {
            prefix,
            local_name: local_name.into(),
            namespace_uri,
        }
    }

    /// The lexical form: `prefix:local` when a prefix is present.
    pub fn qualified(&self) -> String {
        match &self.prefix {
            Some(p) if !p.is_empty() => format!("{}:{}", p, self.local_name),
            _ => self.local_name.clone(),
        }
    }

    /// Clark notation: `{uri}local`, or just `local` without a namespace.
    pub fn clark(&self) -> String {
        match &self.namespace_uri {
            Some(uri) if !uri.is_empty() => format!("{{{}}}{}", uri, self.local_name),
            _ => self.local_name.clone(),
        }
    }

    /// Namespace-URI + local-name equality, ignoring the prefix.
    pub fn expanded_eq(&self, other: &QName) -> bool {
        self.local_name == other.local_name && uri_eq(&self.namespace_uri, &other.namespace_uri)
    }

    pub fn expanded(&self) -> ExpandedName {
        ExpandedName::from(self)
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified())
    }
}

fn uri_eq(a: &Option<String>, b: &Option<String>) -> bool {
    let an = a.as_deref().unwrap_or("");
    let bn = b.as_deref().unwrap_or("");
    an == bn
}

/// A prefix-free name used wherever names are compared or used as map keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpandedName {
    pub namespace_uri: Option<String>,
    pub local_name: String,
}

impl ExpandedName {
    pub fn new(namespace_uri: Option<String>, local_name: impl Into<String>) -> Self {
        let uri = namespace_uri.filter(|u| !u.is_empty());
        Self {
            namespace_uri: uri,
            local_name: local_name.into(),
        }
    }

    pub fn local(local_name: impl Into<String>) -> Self {
        Self::new(None, local_name)
    }

    pub fn clark(&self) -> String {
        match &self.namespace_uri {
            Some(uri) => format!("{{{}}}{}", uri, self.local_name),
            None => self.local_name.clone(),
        }
    }
}

impl From<&QName> for ExpandedName {
    fn from(name: &QName) -> Self {
        Self::new(name.namespace_uri.clone(), name.local_name.clone())
    }
}

impl fmt::Display for ExpandedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.clark())
    }
}
