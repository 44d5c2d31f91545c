use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset};

use super::error::ParsingError;

/// 14.4. depth XML Element / Depth request header
///
/// Value: "0" | "1" | "infinity"
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}
impl Depth {
    /// Parse a `Depth:` request header value.
    pub fn from_header(raw: &str) -> Result<Self, ParsingError> {
        match raw.trim() {
            "0" => Ok(Depth::Zero),
            "1" => Ok(Depth::One),
            "infinity" => Ok(Depth::Infinity),
            _ => Err(ParsingError::InvalidValue),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "infinity",
        }
    }
}

/// 14.29. timeout XML Element / Timeout request header
///
/// TimeType = ("Second-" DAVTimeOutVal | "Infinite")
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Timeout {
    Seconds(u32),
    Infinite,
}
impl Timeout {
    const SEC_PFX: &'static str = "Second-";

    /// Parse a `Timeout:` request header value.
    pub fn from_header(raw: &str) -> Result<Self, ParsingError> {
        match raw.trim() {
            "Infinite" => Ok(Timeout::Infinite),
            seconds => match seconds.strip_prefix(Self::SEC_PFX) {
                Some(secs) => Ok(Timeout::Seconds(secs.parse::<u32>()?)),
                None => Err(ParsingError::InvalidValue),
            },
        }
    }

    /// Deadline of a lock granted at `granted`, `None` meaning never.
    pub fn validity(&self, granted: Instant) -> Option<Instant> {
        match self {
            Timeout::Infinite => None,
            Timeout::Seconds(secs) => granted.checked_add(Duration::from_secs(*secs as u64)),
        }
    }

    /// Remaining lifetime as seen from `now`, for lockdiscovery bodies.
    pub fn remaining(&self, granted: Instant, now: Instant) -> Timeout {
        match self.validity(granted) {
            None => Timeout::Infinite,
            Some(deadline) => {
                Timeout::Seconds(deadline.saturating_duration_since(now).as_secs() as u32)
            }
        }
    }
}

/// 14.13. lockscope XML Element
///
/// <!ELEMENT lockscope (exclusive | shared) >
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LockScope {
    Exclusive,
    Shared,
}

/// 14.15. locktype XML Element
///
/// Only the write lock exists in RFC 4918.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LockType {
    Write,
}

/// 14.7. href XML Element
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Href(pub String);

/// 14.17. owner XML Element
///
/// Client-supplied contact information for a lock creator, treated as a
/// dead value: either plain text, an href, or nothing usable.
#[derive(Debug, PartialEq, Clone)]
pub enum Owner {
    Txt(String),
    Href(Href),
    Unknown,
}

/// 14.10. lockentry XML Element
#[derive(Debug, PartialEq, Clone)]
pub struct LockEntry {
    pub lockscope: LockScope,
    pub locktype: LockType,
}

/// 14.11. lockinfo XML Element (LOCK request body)
///
/// <!ELEMENT lockinfo (lockscope, locktype, owner?) >
#[derive(Debug, PartialEq, Clone)]
pub struct LockInfo {
    pub lockscope: LockScope,
    pub locktype: LockType,
    pub owner: Option<Owner>,
}

/// 14.14. locktoken XML Element
#[derive(Debug, PartialEq, Clone)]
pub struct LockToken(pub Href);

/// 14.12. lockroot XML Element
#[derive(Debug, PartialEq, Clone)]
pub struct LockRoot(pub Href);

/// 14.1. activelock XML Element
///
/// <!ELEMENT activelock (lockscope, locktype, depth, owner?, timeout?,
///           locktoken?, lockroot)>
#[derive(Debug, PartialEq, Clone)]
pub struct ActiveLock {
    pub lockscope: LockScope,
    pub locktype: LockType,
    pub depth: Depth,
    pub owner: Option<Owner>,
    pub timeout: Option<Timeout>,
    pub locktoken: Option<LockToken>,
    pub lockroot: LockRoot,
}

/// 14.28. status XML Element
///
/// Rendered as a full status line, `HTTP/1.1 200 OK`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Status(pub http::status::StatusCode);

/// 14.25. responsedescription XML Element
#[derive(Debug, PartialEq, Clone)]
pub struct ResponseDescription(pub String);

/// 14.3. collection XML Element, inside resourcetype
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ResourceKind {
    Collection,
}

/// One `link` entry of the RFC 2518 `source` property.
#[derive(Debug, PartialEq, Clone)]
pub struct SourceLink {
    pub src: Href,
    pub dst: Href,
}

/// The name of a property, as it appears in request bodies. A closed
/// enumeration: anything outside the RFC 4918 live set is carried as
/// `Extension` with its namespace URL and local name.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum PropertyRequest {
    CreationDate,
    DisplayName,
    GetContentLanguage,
    GetContentLength,
    GetContentType,
    GetEtag,
    GetLastModified,
    LockDiscovery,
    ResourceType,
    Source,
    SupportedLock,
    Extension { ns: String, name: String },
}

/// A property with its value, as rendered into responses or submitted
/// in a PROPPATCH set.
#[derive(Debug, PartialEq, Clone)]
pub enum Property {
    /// 15.1, RFC 3339 date-time
    CreationDate(DateTime<FixedOffset>),
    /// 15.2
    DisplayName(String),
    /// 15.3
    GetContentLanguage(String),
    /// 15.4
    GetContentLength(u64),
    /// 15.5
    GetContentType(String),
    /// 15.6, value kept verbatim including quotes and weak marker
    GetEtag(String),
    /// 15.7, RFC 2822 date
    GetLastModified(DateTime<FixedOffset>),
    /// 15.8
    LockDiscovery(Vec<ActiveLock>),
    /// 15.9
    ResourceType(Vec<ResourceKind>),
    /// RFC 2518 13.10
    Source(Vec<SourceLink>),
    /// 15.10
    SupportedLock(Vec<LockEntry>),
    /// Registered or unknown namespace element, character data only.
    Extension { ns: String, name: String, text: String },
}
impl Property {
    /// The request-side name of this value, used when a value must be
    /// echoed back name-only (PROPPATCH failures, propname).
    pub fn to_request(&self) -> PropertyRequest {
        match self {
            Property::CreationDate(_) => PropertyRequest::CreationDate,
            Property::DisplayName(_) => PropertyRequest::DisplayName,
            Property::GetContentLanguage(_) => PropertyRequest::GetContentLanguage,
            Property::GetContentLength(_) => PropertyRequest::GetContentLength,
            Property::GetContentType(_) => PropertyRequest::GetContentType,
            Property::GetEtag(_) => PropertyRequest::GetEtag,
            Property::GetLastModified(_) => PropertyRequest::GetLastModified,
            Property::LockDiscovery(_) => PropertyRequest::LockDiscovery,
            Property::ResourceType(_) => PropertyRequest::ResourceType,
            Property::Source(_) => PropertyRequest::Source,
            Property::SupportedLock(_) => PropertyRequest::SupportedLock,
            Property::Extension { ns, name, .. } => PropertyRequest::Extension {
                ns: ns.clone(),
                name: name.clone(),
            },
        }
    }
}

/// Either a name-only property (requests, propname answers) or a valued
/// one.
#[derive(Debug, PartialEq, Clone)]
pub enum AnyProperty {
    Request(PropertyRequest),
    Value(Property),
}

/// 14.18. prop XML Element, names only
#[derive(Debug, PartialEq, Clone)]
pub struct PropName(pub Vec<PropertyRequest>);

/// 14.18. prop XML Element, with values
#[derive(Debug, PartialEq, Clone)]
pub struct PropValue(pub Vec<Property>);

/// 14.8. include XML Element
#[derive(Debug, PartialEq, Clone)]
pub struct Include(pub Vec<PropertyRequest>);

/// 14.20. propfind XML Element (PROPFIND request body)
///
/// <!ELEMENT propfind ( propname | (allprop, include?) | prop ) >
#[derive(Debug, PartialEq, Clone)]
pub enum PropFind {
    PropName,
    AllProp(Option<Include>),
    Prop(PropName),
}

/// 14.19. propertyupdate XML Element (PROPPATCH request body)
///
/// <!ELEMENT propertyupdate (remove | set)+ >
#[derive(Debug, PartialEq, Clone)]
pub struct PropertyUpdate(pub Vec<PropertyUpdateItem>);

#[derive(Debug, PartialEq, Clone)]
pub enum PropertyUpdateItem {
    Remove(Remove),
    Set(Set),
}

/// 14.23. remove XML Element
#[derive(Debug, PartialEq, Clone)]
pub struct Remove(pub PropName);

/// 14.26. set XML Element
#[derive(Debug, PartialEq, Clone)]
pub struct Set(pub PropValue);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_header() {
        assert_eq!(Depth::from_header("0").unwrap(), Depth::Zero);
        assert_eq!(Depth::from_header(" infinity ").unwrap(), Depth::Infinity);
        assert!(Depth::from_header("2").is_err());
    }

    #[test]
    fn timeout_header() {
        assert_eq!(Timeout::from_header("Infinite").unwrap(), Timeout::Infinite);
        assert_eq!(
            Timeout::from_header("Second-604800").unwrap(),
            Timeout::Seconds(604800)
        );
        assert!(Timeout::from_header("Minute-5").is_err());
        assert!(Timeout::from_header("Second-x").is_err());
    }

    #[test]
    fn timeout_validity() {
        let granted = Instant::now();
        assert_eq!(Timeout::Infinite.validity(granted), None);
        let deadline = Timeout::Seconds(30).validity(granted).unwrap();
        assert_eq!(deadline.duration_since(granted), Duration::from_secs(30));
    }

    #[test]
    fn timeout_remaining_counts_down() {
        let granted = Instant::now();
        let later = granted + Duration::from_secs(10);
        match Timeout::Seconds(60).remaining(granted, later) {
            Timeout::Seconds(secs) => assert!(secs <= 50),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
