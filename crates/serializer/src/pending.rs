//! Deferred-start-tag state shared by the markup serializers and the
//! buffering handler.

use indexmap::IndexMap;
use xylem_xdm::{ExpandedName, QName};

/// An element whose start tag has not been written yet. Attributes and
/// namespace declarations accumulate here; a duplicate attribute (same
/// namespace URI and local name) replaces the earlier value in place.
#[derive(Debug, Clone)]
pub struct PendingElement {
    pub name: QName,
    attributes: IndexMap<ExpandedName, (QName, String)>,
    namespaces: Vec<(String, String)>,
}

impl PendingElement {
    pub fn new(name: QName) -> Self {
        Self {
            name,
            attributes: IndexMap::new(),
            namespaces: Vec::new(),
        }
    }

    pub fn set_attribute(&mut self, name: QName, value: &str) {
        self.attributes
            .insert(name.expanded(), (name, value.to_string()));
    }

    pub fn add_namespace(&mut self, prefix: &str, uri: &str) {
        if let Some(entry) = self.namespaces.iter_mut().find(|(p, _)| p == prefix) {
            entry.1 = uri.to_string();
        } else {
            self.namespaces.push((prefix.to_string(), uri.to_string()));
        }
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&QName, &str)> {
        self.attributes.values().map(|(n, v)| (n, v.as_str()))
    }

    pub fn namespaces(&self) -> &[(String, String)] {
        &self.namespaces
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    /// Namespace fixup: when the element's own prefix is also declared here
    /// with a *different* URI, the element (and every attribute that used
    /// the old prefix) is moved to a freshly allocated prefix bound to the
    /// element's URI, and the declaration list is rewritten to include the
    /// new binding. The conflicting declaration stays, since it was
    /// explicitly requested.
    pub fn fixup_namespaces(&mut self, allocator: &mut PrefixAllocator) {
        let Some(element_uri) = self.name.namespace_uri.clone() else {
            return;
        };
        let element_prefix = self.name.prefix.clone().unwrap_or_default();
        let conflict = self
            .namespaces
            .iter()
            .any(|(p, u)| *p == element_prefix && *u != element_uri);
        if !conflict {
            return;
        }

        let fresh = allocator.fresh(&self.namespaces);
        let old_prefix = self.name.prefix.clone();
        log::debug!(
            "namespace fixup: '{}' moved from prefix '{}' to '{}'",
            self.name.local_name,
            element_prefix,
            fresh
        );
        self.name.prefix = Some(fresh.clone());

        let renamed: Vec<ExpandedName> = self
            .attributes
            .iter()
            .filter(|(_, (n, _))| {
                n.prefix == old_prefix && n.namespace_uri.as_deref() == Some(element_uri.as_str())
            })
            .map(|(k, _)| k.clone())
            .collect();
        for key in renamed {
            if let Some((name, _)) = self.attributes.get_mut(&key) {
                name.prefix = Some(fresh.clone());
            }
        }

        self.namespaces.push((fresh, element_uri));
    }
}

/// Allocates prefixes that collide with nothing already declared.
#[derive(Debug, Default)]
pub struct PrefixAllocator {
    next: u32,
}

impl PrefixAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self, taken: &[(String, String)]) -> String {
        loop {
            self.next += 1;
            let candidate = format!("ns{}", self.next);
            if !taken.iter().any(|(p, _)| *p == candidate) {
                return candidate;
            }
        }
    }
}
