//! The document loader behind `document()`-style functions: URI
//! resolution, a process-global cache, and tree construction.
//!
//! Node handles are single-transformation values, so the shared cache
//! stores the immutable recorded event stream; each transformation
//! materializes its tree from the cached events through a local memo. The
//! observable contract is a referentially transparent function of
//! (absolute URI, strip config, preserve config).

use crate::error::{EngineError, codes};
use crate::resource::ResourceProvider;
use crate::source;
use crate::space::SpaceStripper;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, OnceLock, RwLock};
use xylem_xdm::{EventBuffer, Node, TreeBuilder};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    uri: String,
    strip: Vec<String>,
    preserve: Vec<String>,
}

fn global_cache() -> &'static RwLock<HashMap<CacheKey, Arc<EventBuffer>>> {
    static CACHE: OnceLock<RwLock<HashMap<CacheKey, Arc<EventBuffer>>>> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

pub struct DocumentLoader {
    provider: Arc<dyn ResourceProvider>,
    strip: Vec<String>,
    preserve: Vec<String>,
    local: RefCell<HashMap<String, Node>>,
}

impl DocumentLoader {
    pub fn new(provider: Arc<dyn ResourceProvider>) -> Self {
        Self {
            provider,
            strip: Vec::new(),
            preserve: Vec::new(),
            local: RefCell::new(HashMap::new()),
        }
    }

    pub fn with_space_patterns(
        mut self,
        strip: impl IntoIterator<Item = String>,
        preserve: impl IntoIterator<Item = String>,
    ) -> Self {
        self.strip = strip.into_iter().collect();
        self.preserve = preserve.into_iter().collect();
        self
    }

    /// Loads a document, returning None when it cannot be retrieved. The
    /// failure is logged; callers wanting FODC0002 use
    /// [`load_or_error`](Self::load_or_error).
    pub fn load(&self, href: &str, base: Option<&str>) -> Option<Node> {
        match self.load_or_error(href, base) {
            Ok(node) => Some(node),
            Err(err) => {
                log::warn!("document('{}') not retrievable: {}", href, err);
                None
            }
        }
    }

    /// Loads a document or fails with FODC0002.
    pub fn load_or_error(&self, href: &str, base: Option<&str>) -> Result<Node, EngineError> {
        let absolute = resolve_uri(href, base);
        if let Some(root) = self.local.borrow().get(&absolute) {
            return Ok(root.clone());
        }

        let events = self.cached_events(&absolute).map_err(|err| {
            EngineError::dynamic(
                codes::DOCUMENT_NOT_FOUND,
                format!("cannot retrieve '{}': {}", absolute, err),
            )
        })?;

        let stripper = SpaceStripper::from_patterns(&self.strip, &self.preserve)?;
        let builder = if stripper.is_empty() {
            TreeBuilder::new()
        } else {
            TreeBuilder::new().with_space_filter(move |name| stripper.should_strip(name))
        };
        let mut builder = builder;
        events.replay(&mut builder)?;
        let root = builder.finish();

        self.local.borrow_mut().insert(absolute, root.clone());
        Ok(root)
    }

    /// The shared fetch+parse step. Racing misses may parse twice; the
    /// second insert simply wins.
    fn cached_events(&self, absolute: &str) -> Result<Arc<EventBuffer>, EngineError> {
        let key = CacheKey {
            uri: absolute.to_string(),
            strip: self.strip.clone(),
            preserve: self.preserve.clone(),
        };
        if let Ok(cache) = global_cache().read()
            && let Some(events) = cache.get(&key)
        {
            log::debug!("document cache hit for '{}'", absolute);
            return Ok(events.clone());
        }

        let bytes = self.provider.load(absolute)?;
        let text = String::from_utf8(bytes)
            .map_err(|e| EngineError::parse(format!("'{}': invalid UTF-8: {}", absolute, e)))?;
        let mut buffer = EventBuffer::new();
        source::parse_document(&text, &mut buffer)?;
        buffer.stop_recording();
        let events = Arc::new(buffer);

        if let Ok(mut cache) = global_cache().write() {
            cache.insert(key, events.clone());
        }
        Ok(events)
    }
}

/// Resolves a reference against a base URI. Absolute references (with a
/// scheme or a leading slash) pass through.
pub fn resolve_uri(href: &str, base: Option<&str>) -> String {
    if href.starts_with('/') || href.contains("://") {
        return href.to_string();
    }
    match base {
        Some(base) => {
            let base_path = Path::new(base);
            let base_dir = base_path.parent().unwrap_or(Path::new(""));
            normalize_path(&base_dir.join(href).to_string_lossy())
        }
        None => href.to_string(),
    }
}

fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }
    if path.starts_with('/') {
        format!("/{}", parts.join("/"))
    } else {
        parts.join("/")
    }
}
