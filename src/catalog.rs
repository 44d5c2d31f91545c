//! Property resolution, RFC 4918 sections 9.1 and 9.2.
//!
//! The catalog turns property requests into per-resource propstat
//! groups. Storage stays behind [`ResourceAdapter`]; the catalog only
//! decides which property resolves to what, and with which status.

use chrono::{DateTime, FixedOffset};
use http::status::StatusCode;
use tracing::debug;

use super::conditional::ConditionalSource;
use super::lock::{LockRegistry, ParentChain};
use super::multistatus::{PropStat, Response};
use super::types::{
    AnyProperty, Include, PropFind, PropName, Property, PropertyRequest, PropertyUpdate,
    PropertyUpdateItem, Remove, ResourceKind, Set, Status,
};

/// What the resource layer must answer about a path. Every method is a
/// point query; the catalog never performs storage I/O itself.
pub trait ResourceAdapter {
    /// Map a request URI to the path of an existing resource.
    fn find_resource(&self, uri: &str) -> Option<String>;
    /// The collection holding `path`, `None` for the root.
    fn parent(&self, path: &str) -> Option<String>;
    fn etag(&self, path: &str) -> Option<String>;
    fn length(&self, path: &str) -> Option<u64>;
    fn created(&self, path: &str) -> Option<DateTime<FixedOffset>>;
    fn last_modified(&self, path: &str) -> Option<DateTime<FixedOffset>>;
    fn content_type(&self, path: &str) -> Option<String>;
    fn content_language(&self, path: &str) -> Option<String>;
    fn display_name(&self, path: &str) -> Option<String>;
    fn is_collection(&self, path: &str) -> bool;
    /// Member paths of a collection, empty for non-collections.
    fn collection_elements(&self, path: &str) -> Vec<String>;
}

impl<A: ResourceAdapter> ParentChain for A {
    fn parent_of(&self, path: &str) -> Option<String> {
        self.parent(path)
    }
}

/// Optional hook deciding the fate of PROPPATCH mutations. Returning
/// `None` falls back to the catalog default of 409 per property.
pub trait PatchOverride {
    fn set(&self, _path: &str, _prop: &Property) -> Option<Status> {
        None
    }
    fn remove(&self, _path: &str, _prop: &PropertyRequest) -> Option<Status> {
        None
    }
}

/// Ties a resource adapter and the lock registry together for `If`
/// header evaluation.
pub struct RegistrySource<'a, A: ResourceAdapter> {
    pub adapter: &'a A,
    pub locks: &'a LockRegistry,
}

impl<A: ResourceAdapter> ConditionalSource for RegistrySource<'_, A> {
    fn resolve(&self, uri: &str) -> Option<String> {
        self.adapter.find_resource(uri)
    }

    fn etag_of(&self, path: &str) -> Option<String> {
        self.adapter.etag(path)
    }

    fn token_allowed(&self, path: &str, token: &str) -> bool {
        self.locks.is_access_allowed(self.adapter, path, Some(token))
    }

    fn holds(&self, path: &str, token: &str) -> bool {
        self.locks
            .locks_on(path)
            .iter()
            .any(|lock| lock.token() == token)
    }
}

pub struct PropertyCatalog<'a, A: ResourceAdapter> {
    adapter: &'a A,
    locks: &'a LockRegistry,
    overrides: Option<&'a dyn PatchOverride>,
}

impl<'a, A: ResourceAdapter> PropertyCatalog<'a, A> {
    pub fn new(adapter: &'a A, locks: &'a LockRegistry) -> Self {
        Self {
            adapter,
            locks,
            overrides: None,
        }
    }

    pub fn with_overrides(mut self, overrides: &'a dyn PatchOverride) -> Self {
        self.overrides = Some(overrides);
        self
    }

    /// Resolve one requested property against `path`: a valued entry
    /// under 200, or the echoed name under 404.
    pub fn resolve(&self, path: &str, request: &PropertyRequest) -> (Status, AnyProperty) {
        use PropertyRequest as Pr;
        let value = match request {
            Pr::CreationDate => self.adapter.created(path).map(Property::CreationDate),
            // the root resource exposes no display name
            Pr::DisplayName => self
                .adapter
                .parent(path)
                .and_then(|_| self.adapter.display_name(path))
                .map(Property::DisplayName),
            Pr::GetContentLanguage => self
                .adapter
                .content_language(path)
                .map(Property::GetContentLanguage),
            Pr::GetContentLength => self.adapter.length(path).map(Property::GetContentLength),
            Pr::GetContentType => self
                .adapter
                .content_type(path)
                .map(Property::GetContentType),
            Pr::GetEtag => self.adapter.etag(path).map(Property::GetEtag),
            Pr::GetLastModified => self
                .adapter
                .last_modified(path)
                .map(Property::GetLastModified),
            Pr::LockDiscovery => Some(Property::LockDiscovery(self.locks.discovery(path))),
            Pr::ResourceType => Some(Property::ResourceType(
                if self.adapter.is_collection(path) {
                    vec![ResourceKind::Collection]
                } else {
                    vec![]
                },
            )),
            Pr::Source => None,
            Pr::SupportedLock => Some(Property::SupportedLock(self.locks.supported_lock())),
            Pr::Extension { .. } => None,
        };

        match value {
            Some(property) => (Status(StatusCode::OK), AnyProperty::Value(property)),
            None => (
                Status(StatusCode::NOT_FOUND),
                AnyProperty::Request(request.clone()),
            ),
        }
    }

    /// The allprop set for `path`. Collections carry no content
    /// length.
    pub fn default_set(&self, path: &str) -> Vec<PropertyRequest> {
        use PropertyRequest as Pr;
        let mut set = vec![Pr::CreationDate, Pr::DisplayName, Pr::GetContentLanguage];
        if !self.adapter.is_collection(path) {
            set.push(Pr::GetContentLength);
        }
        set.extend([
            Pr::GetContentType,
            Pr::GetEtag,
            Pr::GetLastModified,
            Pr::LockDiscovery,
            Pr::ResourceType,
            Pr::SupportedLock,
        ]);
        set
    }

    /// Answer a PROPFIND body for one resource.
    pub fn propfind(&self, path: &str, request: &PropFind) -> Response {
        match request {
            PropFind::PropName => {
                let names = self
                    .default_set(path)
                    .into_iter()
                    .map(AnyProperty::Request)
                    .collect();
                let mut response = Response::new(path);
                response.propstats.push(PropStat {
                    prop: names,
                    status: Status(StatusCode::OK),
                });
                response
            }
            PropFind::AllProp(include) => {
                let mut set = self.default_set(path);
                if let Some(Include(more)) = include {
                    for request in more {
                        if !set.contains(request) {
                            set.push(request.clone());
                        }
                    }
                }
                self.resolve_all(path, &set)
            }
            PropFind::Prop(PropName(requested)) => self.resolve_all(path, requested),
        }
    }

    fn resolve_all(&self, path: &str, requested: &[PropertyRequest]) -> Response {
        let mut response = Response::new(path);
        for request in requested {
            let (status, prop) = self.resolve(path, request);
            push_grouped(&mut response.propstats, status, prop);
        }
        debug!(
            path,
            groups = response.propstats.len(),
            "resolved propfind"
        );
        response
    }

    /// Answer a PROPPATCH body for one resource. Every mutation is
    /// judged on its own; the echoed props are name-only.
    pub fn patch(&self, path: &str, update: &PropertyUpdate) -> Response {
        let mut response = Response::new(path);
        for item in &update.0 {
            match item {
                PropertyUpdateItem::Set(Set(values)) => {
                    for property in &values.0 {
                        let status = self
                            .overrides
                            .and_then(|o| o.set(path, property))
                            .unwrap_or(Status(StatusCode::CONFLICT));
                        push_grouped(
                            &mut response.propstats,
                            status,
                            AnyProperty::Request(property.to_request()),
                        );
                    }
                }
                PropertyUpdateItem::Remove(Remove(names)) => {
                    for request in &names.0 {
                        let status = self
                            .overrides
                            .and_then(|o| o.remove(path, request))
                            .unwrap_or(Status(StatusCode::CONFLICT));
                        push_grouped(
                            &mut response.propstats,
                            status,
                            AnyProperty::Request(request.clone()),
                        );
                    }
                }
            }
        }
        response
    }
}

/// Append `prop` to the propstat carrying `status`, keeping the order
/// statuses first appeared in.
fn push_grouped(propstats: &mut Vec<PropStat>, status: Status, prop: AnyProperty) {
    match propstats.iter_mut().find(|ps| ps.status == status) {
        Some(group) => group.prop.push(prop),
        None => propstats.push(PropStat {
            prop: vec![prop],
            status,
        }),
    }
}
