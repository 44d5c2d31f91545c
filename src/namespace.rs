use std::sync::Arc;

use chrono::DateTime;

use super::types::{Property, PropertyRequest};

pub const DAV_URN: &str = "DAV:";

/// Per-namespace element handler. The decoder hands every element it
/// meets to the handler registered for the element's namespace URL;
/// the handler turns a local name into a property request, or character
/// data into a typed value. Values carrying child elements are out of a
/// handler's reach and stay raw.
pub trait ElementHandler: std::fmt::Debug + Send + Sync {
    fn parse_request(&self, local: &str) -> Option<PropertyRequest>;
    fn parse_value(&self, local: &str, text: String) -> Option<Property>;
}

/// The built-in handler for `DAV:`, covering the RFC 4918 live set.
#[derive(Debug)]
pub struct LiveProperties;
impl ElementHandler for LiveProperties {
    fn parse_request(&self, local: &str) -> Option<PropertyRequest> {
        match local {
            "creationdate" => Some(PropertyRequest::CreationDate),
            "displayname" => Some(PropertyRequest::DisplayName),
            "getcontentlanguage" => Some(PropertyRequest::GetContentLanguage),
            "getcontentlength" => Some(PropertyRequest::GetContentLength),
            "getcontenttype" => Some(PropertyRequest::GetContentType),
            "getetag" => Some(PropertyRequest::GetEtag),
            "getlastmodified" => Some(PropertyRequest::GetLastModified),
            "lockdiscovery" => Some(PropertyRequest::LockDiscovery),
            "resourcetype" => Some(PropertyRequest::ResourceType),
            "source" => Some(PropertyRequest::Source),
            "supportedlock" => Some(PropertyRequest::SupportedLock),
            _ => None,
        }
    }

    fn parse_value(&self, local: &str, text: String) -> Option<Property> {
        match local {
            "creationdate" => DateTime::parse_from_rfc3339(text.as_str())
                .ok()
                .map(Property::CreationDate),
            "displayname" => Some(Property::DisplayName(text)),
            "getcontentlanguage" => Some(Property::GetContentLanguage(text)),
            "getcontentlength" => text.parse::<u64>().ok().map(Property::GetContentLength),
            "getcontenttype" => Some(Property::GetContentType(text)),
            "getetag" => Some(Property::GetEtag(text)),
            "getlastmodified" => DateTime::parse_from_rfc2822(text.as_str())
                .ok()
                .map(Property::GetLastModified),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    url: String,
    prefix: String,
    handler: Option<Arc<dyn ElementHandler>>,
}

/// Registry of XML namespace URL -> (assigned prefix, element handler).
///
/// Prefixes are stable for the lifetime of a render or parse pass; new
/// namespaces may be registered between passes. On a prefix collision
/// the registration order decides the generated replacement, so two
/// registries built in the same order assign the same prefixes.
#[derive(Debug, Clone, Default)]
pub struct NamespaceRegistry {
    entries: Vec<Entry>,
}

impl NamespaceRegistry {
    /// An empty registry with `DAV:` pre-registered as `D`.
    pub fn new() -> Self {
        let mut ns = Self::default();
        ns.add_namespace(DAV_URN, "D", Some(Arc::new(LiveProperties)));
        ns
    }

    /// Register `url` under `preferred_prefix`. If the prefix is taken
    /// by another URL, the first free generated letter is assigned
    /// instead, deterministic in registration order. Re-registering a
    /// known URL only replaces its handler when one is given.
    pub fn add_namespace(
        &mut self,
        url: &str,
        preferred_prefix: &str,
        handler: Option<Arc<dyn ElementHandler>>,
    ) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.url == url) {
            if handler.is_some() {
                entry.handler = handler;
            }
            return;
        }

        let taken = self.entries.iter().any(|e| e.prefix == preferred_prefix);
        let prefix = if taken {
            self.generated_prefix()
        } else {
            preferred_prefix.to_string()
        };

        self.entries.push(Entry {
            url: url.to_string(),
            prefix,
            handler,
        });
    }

    // first single letter not in use, numbered prefixes once the
    // alphabet runs out
    fn generated_prefix(&self) -> String {
        let free = |candidate: &str| !self.entries.iter().any(|e| e.prefix == candidate);
        for letter in b'a'..=b'z' {
            let candidate = (letter as char).to_string();
            if free(&candidate) {
                return candidate;
            }
        }
        let mut n = 0usize;
        loop {
            let candidate = format!("ns{}", n);
            if free(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn assigned_prefix(&self, url: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.url == url)
            .map(|e| e.prefix.as_str())
    }

    pub fn parser_handler(&self, url: &str) -> Option<Arc<dyn ElementHandler>> {
        self.entries
            .iter()
            .find(|e| e.url == url)
            .and_then(|e| e.handler.clone())
    }

    pub fn defined_urls(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.url.as_str()).collect()
    }

    /// `xmlns:*` attributes declaring every registered namespace, for
    /// the root element of a rendered document.
    pub fn root_attributes(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|e| (format!("xmlns:{}", e.prefix), e.url.clone()))
            .collect()
    }
}
