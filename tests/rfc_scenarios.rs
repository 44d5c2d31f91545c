use std::collections::HashMap;

use chrono::{DateTime, FixedOffset};
use http::status::StatusCode;
use quick_xml::events::Event;
use quick_xml::reader::NsReader;

use davcore::catalog::{PropertyCatalog, RegistrySource, ResourceAdapter};
use davcore::conditional::evaluate;
use davcore::error::LockError;
use davcore::lock::LockRegistry;
use davcore::multistatus::MultiStatusBuilder;
use davcore::namespace::{NamespaceRegistry, DAV_URN};
use davcore::types::{
    AnyProperty, Depth, Href, LockInfo, LockScope, LockType, PropFind, PropName, PropertyRequest,
    Status, Timeout,
};
use davcore::xml::Reader;

#[derive(Default)]
struct Entry {
    etag: Option<String>,
    length: Option<u64>,
    collection: bool,
}

#[derive(Default)]
struct MemAdapter {
    entries: HashMap<String, Entry>,
}

impl MemAdapter {
    fn file(mut self, path: &str, etag: &str, length: u64) -> Self {
        self.entries.insert(
            path.to_string(),
            Entry {
                etag: Some(etag.to_string()),
                length: Some(length),
                collection: false,
            },
        );
        self
    }

    fn collection(mut self, path: &str, etag: &str) -> Self {
        self.entries.insert(
            path.to_string(),
            Entry {
                etag: Some(etag.to_string()),
                length: None,
                collection: true,
            },
        );
        self
    }
}

impl ResourceAdapter for MemAdapter {
    fn find_resource(&self, uri: &str) -> Option<String> {
        self.entries.contains_key(uri).then(|| uri.to_string())
    }
    fn parent(&self, path: &str) -> Option<String> {
        let trimmed = path.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(0) if trimmed.len() > 1 => Some("/".to_string()),
            Some(idx) => Some(trimmed[..idx].to_string()),
            _ => None,
        }
    }
    fn etag(&self, path: &str) -> Option<String> {
        self.entries.get(path).and_then(|e| e.etag.clone())
    }
    fn length(&self, path: &str) -> Option<u64> {
        self.entries.get(path).and_then(|e| e.length)
    }
    fn created(&self, _path: &str) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339("1997-12-01T17:42:21-08:00").ok()
    }
    fn last_modified(&self, _path: &str) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc2822("Mon, 12 Jan 1998 09:25:56 GMT").ok()
    }
    fn content_type(&self, path: &str) -> Option<String> {
        self.entries
            .get(path)
            .filter(|e| !e.collection)
            .map(|_| "text/plain".to_string())
    }
    fn content_language(&self, _path: &str) -> Option<String> {
        None
    }
    fn display_name(&self, path: &str) -> Option<String> {
        path.trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|n| !n.is_empty())
            .map(str::to_string)
    }
    fn is_collection(&self, path: &str) -> bool {
        self.entries.get(path).map(|e| e.collection).unwrap_or(false)
    }
    fn collection_elements(&self, path: &str) -> Vec<String> {
        let base = format!("{}/", path.trim_end_matches('/'));
        let mut members: Vec<String> = self
            .entries
            .keys()
            .filter(|k| {
                k.strip_prefix(&base)
                    .map(|rest| !rest.is_empty() && !rest.contains('/'))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        members.sort();
        members
    }
}

fn read<N: davcore::xml::QRead<N>>(src: &str) -> N {
    let mut rdr = Reader::new(NsReader::from_reader(src.as_bytes())).unwrap();
    rdr.find::<N>().unwrap()
}

// Scenario A: an etag match on an unlocked resource satisfies the
// header without submitting anything.
#[test]
fn etag_only_condition_on_unlocked_resource() {
    let adapter = MemAdapter::default().file("/doc", "W/\"abc\"", 3);
    let locks = LockRegistry::new();
    let source = RegistrySource {
        adapter: &adapter,
        locks: &locks,
    };

    let result = evaluate(Some("(<urn:x> [W/\"abc\"])"), "/doc", None, &source).unwrap();
    assert!(result.satisfied);
    assert_eq!(result.matched_main_token, None);
}

// Scenario B: the real token is submitted even though another group
// names a wrong one.
#[test]
fn real_token_recorded_across_groups() {
    let adapter = MemAdapter::default().file("/doc", "\"v1\"", 3);
    let locks = LockRegistry::new();
    let lock = locks.create(
        LockType::Write,
        LockScope::Exclusive,
        None,
        Timeout::Seconds(3600),
        Depth::Zero,
    );
    let token = lock.token().to_string();
    locks.lock(lock, "/doc").unwrap();

    let source = RegistrySource {
        adapter: &adapter,
        locks: &locks,
    };
    let header = format!("(<urn:wrong>) (<{}>)", token);
    let result = evaluate(Some(&header), "/doc", None, &source).unwrap();
    assert!(result.satisfied);
    assert_eq!(result.matched_main_token.as_deref(), Some(token.as_str()));
}

// Scenario C: LOCK body parsed, granted once, refused twice.
#[test]
fn exclusive_lock_grant_and_conflict() {
    let body = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:lockinfo xmlns:D='DAV:'>
    <D:lockscope><D:exclusive/></D:lockscope>
    <D:locktype><D:write/></D:locktype>
</D:lockinfo>"#;
    let info: LockInfo = read(body);
    assert_eq!(info.lockscope, LockScope::Exclusive);

    let locks = LockRegistry::new();
    let lock = locks.create(
        info.locktype,
        info.lockscope,
        info.owner.clone(),
        Timeout::Seconds(3600),
        Depth::Zero,
    );
    locks.lock(lock, "/res").unwrap();

    let second = locks.create(
        info.locktype,
        info.lockscope,
        info.owner,
        Timeout::Seconds(3600),
        Depth::Zero,
    );
    assert!(matches!(
        locks.lock(second, "/res"),
        Err(LockError::Conflict(_))
    ));
}

// Depth inheritance across the parent chain, both directions.
#[test]
fn lock_depth_governs_member_access() {
    let adapter = MemAdapter::default()
        .collection("/col", "\"c\"")
        .file("/col/a.txt", "\"a\"", 1);
    let locks = LockRegistry::new();

    let infinity = locks.create(
        LockType::Write,
        LockScope::Exclusive,
        None,
        Timeout::Infinite,
        Depth::Infinity,
    );
    let token = infinity.token().to_string();
    locks.lock(infinity, "/col").unwrap();

    assert!(locks.is_access_allowed(&adapter, "/col/a.txt", Some(&token)));
    assert!(!locks.is_access_allowed(&adapter, "/col/a.txt", None));

    assert!(locks.unlock("/col", &token));
    assert!(!locks.unlock("/col", &token));

    let zero = locks.create(
        LockType::Write,
        LockScope::Exclusive,
        None,
        Timeout::Infinite,
        Depth::Zero,
    );
    let token = zero.token().to_string();
    locks.lock(zero, "/col").unwrap();

    assert!(locks.is_access_allowed(&adapter, "/col/a.txt", None));
    assert!(locks.is_access_allowed(&adapter, "/col", Some(&token)));
    assert!(!locks.is_access_allowed(&adapter, "/col", None));
}

// Scenario D: allprop over a collection and its members.
#[test]
fn allprop_propfind_over_collection() {
    let adapter = MemAdapter::default()
        .collection("/col", "\"c\"")
        .file("/col/a.txt", "\"a\"", 7)
        .file("/col/b.txt", "\"b\"", 9);
    let locks = LockRegistry::new();
    let catalog = PropertyCatalog::new(&adapter, &locks);

    let request = PropFind::AllProp(None);
    let mut builder = MultiStatusBuilder::new(NamespaceRegistry::new());
    builder.push(catalog.propfind("/col", &request));
    for member in adapter.collection_elements("/col") {
        builder.push(catalog.propfind(&member, &request));
    }

    let col = &builder.responses()[0];
    let ok = col
        .propstats
        .iter()
        .find(|ps| ps.status == Status(StatusCode::OK))
        .expect("an OK group");
    let names: Vec<PropertyRequest> = ok
        .prop
        .iter()
        .map(|p| match p {
            AnyProperty::Value(v) => v.to_request(),
            AnyProperty::Request(r) => r.clone(),
        })
        .collect();
    for expected in [
        PropertyRequest::DisplayName,
        PropertyRequest::GetEtag,
        PropertyRequest::LockDiscovery,
        PropertyRequest::ResourceType,
        PropertyRequest::SupportedLock,
    ] {
        assert!(names.contains(&expected), "missing {:?}", expected);
    }
    assert!(!names.contains(&PropertyRequest::GetContentLength));

    let (status, body) = builder.render(false).unwrap();
    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert!(body.contains("<D:href>/col/a.txt</D:href>"));
    assert!(body.contains("<D:getcontentlength>9</D:getcontentlength>"));
}

// Scenario E: one defined response renders as a bare prop fragment.
#[test]
fn single_response_collapses_to_prop_fragment() {
    let adapter = MemAdapter::default().file("/doc.txt", "\"d1\"", 4);
    let locks = LockRegistry::new();
    let catalog = PropertyCatalog::new(&adapter, &locks);

    let request = PropFind::Prop(PropName(vec![
        PropertyRequest::GetEtag,
        PropertyRequest::SupportedLock,
    ]));
    let mut builder = MultiStatusBuilder::new(NamespaceRegistry::new());
    builder.push(catalog.propfind("/doc.txt", &request));

    let (status, body) = builder.render(false).unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("<?xml"));
    assert!(body.contains(r#"<D:prop xmlns:D="DAV:">"#));
    assert!(!body.contains("multistatus"));
    assert!(body.contains("<D:getetag>\"d1\"</D:getetag>"));

    // an unresolved property still collapses, its name merged in empty
    let request = PropFind::Prop(PropName(vec![
        PropertyRequest::GetEtag,
        PropertyRequest::GetContentLanguage,
    ]));
    let mut builder = MultiStatusBuilder::new(NamespaceRegistry::new());
    builder.push(catalog.propfind("/doc.txt", &request));

    let (status, body) = builder.render(false).unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<D:getetag>\"d1\"</D:getetag>"));
    assert!(body.contains("<D:getcontentlanguage/>"));

    // two resources always get the envelope
    let mut builder = MultiStatusBuilder::new(NamespaceRegistry::new());
    builder.push(catalog.propfind("/doc.txt", &request));
    builder.push(catalog.propfind("/doc.txt", &request));
    let (status, body) = builder.render(false).unwrap();
    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert!(body.contains("<D:multistatus"));
    assert!(body.contains("HTTP/1.1 404 Not Found"));
}

// Rendered prop names survive a pass through the request grammar.
#[test]
fn rendered_props_reparse_as_names() {
    let adapter = MemAdapter::default()
        .file("/a", "\"a\"", 1)
        .file("/b", "\"b\"", 2)
        .file("/c", "\"c\"", 3);
    let locks = LockRegistry::new();
    let catalog = PropertyCatalog::new(&adapter, &locks);

    let request = PropFind::Prop(PropName(vec![PropertyRequest::GetEtag]));
    let mut builder = MultiStatusBuilder::new(NamespaceRegistry::new());
    for path in ["/a", "/b", "/c"] {
        builder.push(catalog.propfind(path, &request));
    }
    let (_, body) = builder.render(false).unwrap();

    let mut rdr = Reader::new(NsReader::from_reader(body.as_bytes())).unwrap();
    while rdr.maybe_open(DAV_URN, "multistatus").unwrap().is_none() {
        rdr.skip().unwrap();
    }
    let mut parsed = Vec::new();
    loop {
        let entered = loop {
            if rdr.maybe_open(DAV_URN, "response").unwrap().is_some() {
                break true;
            }
            if matches!(rdr.peek(), Event::End(_)) {
                break false;
            }
            rdr.skip().unwrap();
        };
        if !entered {
            break;
        }

        let _href = rdr.find::<Href>().unwrap();
        while rdr.maybe_open(DAV_URN, "propstat").unwrap().is_none() {
            rdr.skip().unwrap();
        }
        parsed.push(rdr.find::<PropName>().unwrap());
        rdr.close().unwrap();
        rdr.close().unwrap();
    }
    assert_eq!(parsed.len(), 3);
    for names in parsed {
        assert_eq!(names, PropName(vec![PropertyRequest::GetEtag]));
    }
}

// Determinism: same inputs, same result, call after call.
#[test]
fn evaluation_is_repeatable() {
    let adapter = MemAdapter::default()
        .file("/doc", "\"v\"", 1)
        .file("/other", "\"o\"", 1);
    let locks = LockRegistry::new();
    let lock = locks.create(
        LockType::Write,
        LockScope::Shared,
        None,
        Timeout::Infinite,
        Depth::Zero,
    );
    let token = lock.token().to_string();
    locks.lock(lock, "/other").unwrap();

    let source = RegistrySource {
        adapter: &adapter,
        locks: &locks,
    };
    let header = format!("([\"v\"]) </other> (<{}>)", token);
    let first = evaluate(Some(&header), "/doc", None, &source).unwrap();
    for _ in 0..10 {
        let again = evaluate(Some(&header), "/doc", None, &source).unwrap();
        assert_eq!(first, again);
    }
    assert!(first.satisfied);
    assert!(first.cleared_resources.contains("/other"));
}

// Lockdiscovery renders through PROPFIND with the granted token.
#[test]
fn lockdiscovery_exposes_active_lock() {
    let adapter = MemAdapter::default().file("/doc", "\"v\"", 1);
    let locks = LockRegistry::new();
    let lock = locks.create(
        LockType::Write,
        LockScope::Exclusive,
        None,
        Timeout::Seconds(600),
        Depth::Zero,
    );
    let token = lock.token().to_string();
    locks.lock(lock, "/doc").unwrap();

    let catalog = PropertyCatalog::new(&adapter, &locks);
    let mut builder = MultiStatusBuilder::new(NamespaceRegistry::new());
    builder.push(catalog.propfind(
        "/doc",
        &PropFind::Prop(PropName(vec![PropertyRequest::LockDiscovery])),
    ));

    let (status, body) = builder.render(true).unwrap();
    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert!(body.contains("<D:activelock>"));
    assert!(body.contains(&format!("<D:href>{}</D:href>", token)));
    assert!(body.contains("<D:lockroot>"));
}
