use quick_xml::events::{BytesText, Event};
use quick_xml::Error as QError;

use super::multistatus::{Multistatus, PropStat, Response};
use super::namespace::DAV_URN;
use super::types::*;
use super::xml::{IWrite, QWrite, Writer};

// ---- helpers

fn text_element(
    xml: &mut Writer<impl IWrite>,
    url: &str,
    name: &str,
    text: &str,
) -> Result<(), QError> {
    let start = xml.create_ns_element(url, name);
    let end = start.to_end().into_owned();
    xml.q.write_event(Event::Start(start))?;
    xml.q.write_event(Event::Text(BytesText::new(text)))?;
    xml.q.write_event(Event::End(end))?;
    Ok(())
}

fn dav_text(xml: &mut Writer<impl IWrite>, name: &str, text: &str) -> Result<(), QError> {
    text_element(xml, DAV_URN, name, text)
}

/// Container element holding a list of children, rendered as an empty
/// element when the list is.
fn dav_children<W: IWrite, N: QWrite>(
    xml: &mut Writer<W>,
    name: &str,
    children: &[N],
) -> Result<(), QError> {
    let start = xml.create_dav_element(name);
    if children.is_empty() {
        return xml.q.write_event(Event::Empty(start));
    }
    let end = start.to_end().into_owned();
    xml.q.write_event(Event::Start(start))?;
    for child in children {
        child.qwrite(xml)?;
    }
    xml.q.write_event(Event::End(end))?;
    Ok(())
}

// ---- multistatus rendering

impl QWrite for Multistatus {
    fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("multistatus");
        let end = start.to_end().into_owned();

        xml.q.write_event(Event::Start(start))?;
        for response in &self.responses {
            response.qwrite(xml)?;
        }
        if let Some(description) = &self.responsedescription {
            description.qwrite(xml)?;
        }
        xml.q.write_event(Event::End(end))?;
        Ok(())
    }
}

impl QWrite for Response {
    fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("response");
        let end = start.to_end().into_owned();

        xml.q.write_event(Event::Start(start))?;
        self.href.qwrite(xml)?;
        for href in &self.additional_hrefs {
            href.qwrite(xml)?;
        }
        match &self.status {
            Some(status) => status.qwrite(xml)?,
            None => {
                for propstat in &self.propstats {
                    propstat.qwrite(xml)?;
                }
            }
        }
        if let Some(description) = &self.responsedescription {
            description.qwrite(xml)?;
        }
        xml.q.write_event(Event::End(end))?;
        Ok(())
    }
}

impl QWrite for PropStat {
    fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("propstat");
        let end = start.to_end().into_owned();

        xml.q.write_event(Event::Start(start))?;
        dav_children(xml, "prop", &self.prop)?;
        self.status.qwrite(xml)?;
        xml.q.write_event(Event::End(end))?;
        Ok(())
    }
}

impl QWrite for Status {
    fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let txt = format!(
            "HTTP/1.1 {} {}",
            self.0.as_u16(),
            self.0.canonical_reason().unwrap_or("No reason")
        );
        dav_text(xml, "status", &txt)
    }
}

impl QWrite for ResponseDescription {
    fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        dav_text(xml, "responsedescription", &self.0)
    }
}

impl QWrite for Href {
    fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        dav_text(xml, "href", &self.0)
    }
}

// ---- properties

impl QWrite for AnyProperty {
    fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        match self {
            Self::Request(request) => request.qwrite(xml),
            Self::Value(value) => value.qwrite(xml),
        }
    }
}

impl QWrite for PropertyRequest {
    fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        use PropertyRequest::*;
        let (url, name) = match self {
            CreationDate => (DAV_URN, "creationdate"),
            DisplayName => (DAV_URN, "displayname"),
            GetContentLanguage => (DAV_URN, "getcontentlanguage"),
            GetContentLength => (DAV_URN, "getcontentlength"),
            GetContentType => (DAV_URN, "getcontenttype"),
            GetEtag => (DAV_URN, "getetag"),
            GetLastModified => (DAV_URN, "getlastmodified"),
            LockDiscovery => (DAV_URN, "lockdiscovery"),
            ResourceType => (DAV_URN, "resourcetype"),
            Source => (DAV_URN, "source"),
            SupportedLock => (DAV_URN, "supportedlock"),
            Extension { ns, name } => (ns.as_str(), name.as_str()),
        };
        let start = xml.create_ns_element(url, name);
        xml.q.write_event(Event::Empty(start))
    }
}

impl QWrite for Property {
    fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        use Property::*;
        match self {
            CreationDate(date) => dav_text(xml, "creationdate", &date.to_rfc3339()),
            DisplayName(name) => dav_text(xml, "displayname", name),
            GetContentLanguage(lang) => dav_text(xml, "getcontentlanguage", lang),
            GetContentLength(len) => dav_text(xml, "getcontentlength", &len.to_string()),
            GetContentType(mime) => dav_text(xml, "getcontenttype", mime),
            GetEtag(etag) => dav_text(xml, "getetag", etag),
            GetLastModified(date) => dav_text(xml, "getlastmodified", &date.to_rfc2822()),
            LockDiscovery(many) => dav_children(xml, "lockdiscovery", many),
            ResourceType(kinds) => dav_children(xml, "resourcetype", kinds),
            Source(links) => dav_children(xml, "source", links),
            SupportedLock(entries) => dav_children(xml, "supportedlock", entries),
            Extension { ns, name, text } => {
                if text.is_empty() {
                    let start = xml.create_ns_element(ns, name);
                    xml.q.write_event(Event::Empty(start))
                } else {
                    text_element(xml, ns, name, text)
                }
            }
        }
    }
}

impl QWrite for ResourceKind {
    fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        match self {
            Self::Collection => {
                let start = xml.create_dav_element("collection");
                xml.q.write_event(Event::Empty(start))
            }
        }
    }
}

impl QWrite for SourceLink {
    fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("link");
        let end = start.to_end().into_owned();
        xml.q.write_event(Event::Start(start))?;
        dav_text(xml, "src", &self.src.0)?;
        dav_text(xml, "dst", &self.dst.0)?;
        xml.q.write_event(Event::End(end))?;
        Ok(())
    }
}

// ---- locks

impl QWrite for ActiveLock {
    fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("activelock");
        let end = start.to_end().into_owned();

        xml.q.write_event(Event::Start(start))?;
        self.lockscope.qwrite(xml)?;
        self.locktype.qwrite(xml)?;
        self.depth.qwrite(xml)?;
        if let Some(owner) = &self.owner {
            owner.qwrite(xml)?;
        }
        if let Some(timeout) = &self.timeout {
            timeout.qwrite(xml)?;
        }
        if let Some(locktoken) = &self.locktoken {
            locktoken.qwrite(xml)?;
        }
        self.lockroot.qwrite(xml)?;
        xml.q.write_event(Event::End(end))?;
        Ok(())
    }
}

impl QWrite for LockEntry {
    fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("lockentry");
        let end = start.to_end().into_owned();

        xml.q.write_event(Event::Start(start))?;
        self.lockscope.qwrite(xml)?;
        self.locktype.qwrite(xml)?;
        xml.q.write_event(Event::End(end))?;
        Ok(())
    }
}

impl QWrite for LockScope {
    fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("lockscope");
        let end = start.to_end().into_owned();

        xml.q.write_event(Event::Start(start))?;
        let scope = match self {
            Self::Exclusive => xml.create_dav_element("exclusive"),
            Self::Shared => xml.create_dav_element("shared"),
        };
        xml.q.write_event(Event::Empty(scope))?;
        xml.q.write_event(Event::End(end))?;
        Ok(())
    }
}

impl QWrite for LockType {
    fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("locktype");
        let end = start.to_end().into_owned();

        xml.q.write_event(Event::Start(start))?;
        let Self::Write = self;
        let write = xml.create_dav_element("write");
        xml.q.write_event(Event::Empty(write))?;
        xml.q.write_event(Event::End(end))?;
        Ok(())
    }
}

impl QWrite for Depth {
    fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        dav_text(xml, "depth", self.as_str())
    }
}

impl QWrite for Timeout {
    fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let txt = match self {
            Self::Seconds(secs) => format!("Second-{}", secs),
            Self::Infinite => "Infinite".to_string(),
        };
        dav_text(xml, "timeout", &txt)
    }
}

impl QWrite for Owner {
    fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("owner");
        match self {
            Self::Unknown => xml.q.write_event(Event::Empty(start)),
            Self::Txt(txt) => {
                let end = start.to_end().into_owned();
                xml.q.write_event(Event::Start(start))?;
                xml.q.write_event(Event::Text(BytesText::new(txt)))?;
                xml.q.write_event(Event::End(end))?;
                Ok(())
            }
            Self::Href(href) => {
                let end = start.to_end().into_owned();
                xml.q.write_event(Event::Start(start))?;
                href.qwrite(xml)?;
                xml.q.write_event(Event::End(end))?;
                Ok(())
            }
        }
    }
}

impl QWrite for LockToken {
    fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("locktoken");
        let end = start.to_end().into_owned();

        xml.q.write_event(Event::Start(start))?;
        self.0.qwrite(xml)?;
        xml.q.write_event(Event::End(end))?;
        Ok(())
    }
}

impl QWrite for LockRoot {
    fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("lockroot");
        let end = start.to_end().into_owned();

        xml.q.write_event(Event::Start(start))?;
        self.0.qwrite(xml)?;
        xml.q.write_event(Event::End(end))?;
        Ok(())
    }
}
