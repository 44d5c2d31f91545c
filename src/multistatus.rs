use http::status::StatusCode;
use quick_xml::events::{BytesDecl, Event};

use super::namespace::NamespaceRegistry;
use super::types::{AnyProperty, Href, Property, PropertyRequest, ResponseDescription, Status};
use super::xml::{QWrite, Writer};

/// Content type of every rendered document, bare prop fragments
/// included.
pub const XML_CONTENT_TYPE: &str = "text/xml; charset=\"utf-8\"";

/// 14.22. propstat XML Element
#[derive(Debug, PartialEq, Clone)]
pub struct PropStat {
    pub prop: Vec<AnyProperty>,
    pub status: Status,
}

/// 14.24. response XML Element
///
/// Either a bare status (failed destinations, locked members) or a list
/// of propstat blocks, never both.
#[derive(Debug, PartialEq, Clone)]
pub struct Response {
    pub href: Href,
    pub additional_hrefs: Vec<Href>,
    pub status: Option<Status>,
    pub propstats: Vec<PropStat>,
    pub responsedescription: Option<ResponseDescription>,
}

impl Response {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: Href(href.into()),
            additional_hrefs: Vec::new(),
            status: None,
            propstats: Vec::new(),
            responsedescription: None,
        }
    }

    /// A response is defined when it carries propstat groups rather
    /// than a bare status. Only defined responses may collapse to a
    /// prop fragment.
    pub fn is_defined(&self) -> bool {
        self.status.is_none() && !self.propstats.is_empty()
    }
}

/// 13. Multi-Status Response
#[derive(Debug, PartialEq, Clone)]
pub struct Multistatus {
    pub responses: Vec<Response>,
    pub responsedescription: Option<ResponseDescription>,
}

/// Accumulates per-resource responses and renders them in one pass.
///
/// Namespace declarations always sit on the root element. Extension
/// properties whose namespace was never registered get one assigned
/// just before rendering, so prefixes stay stable across the document.
pub struct MultiStatusBuilder {
    namespaces: NamespaceRegistry,
    responses: Vec<Response>,
}

impl MultiStatusBuilder {
    pub fn new(namespaces: NamespaceRegistry) -> Self {
        Self {
            namespaces,
            responses: Vec::new(),
        }
    }

    pub fn namespaces(&mut self) -> &mut NamespaceRegistry {
        &mut self.namespaces
    }

    pub fn push(&mut self, response: Response) {
        self.responses.push(response);
    }

    /// Start a fresh response for `href` and hand it out for filling.
    pub fn response(&mut self, href: impl Into<String>) -> &mut Response {
        self.responses.push(Response::new(href));
        // just pushed, cannot be empty
        let last = self.responses.len() - 1;
        &mut self.responses[last]
    }

    /// Like [`Self::response`] with the href joined from a collection
    /// base and a member name.
    pub fn response_relative(&mut self, base: &str, member: &str) -> &mut Response {
        let href = format!(
            "{}/{}",
            base.trim_end_matches('/'),
            member.trim_start_matches('/')
        );
        self.response(href)
    }

    pub fn responses(&self) -> &[Response] {
        &self.responses
    }

    fn single_defined(&self) -> Option<&Response> {
        match self.responses.as_slice() {
            [only] if only.is_defined() => Some(only),
            _ => None,
        }
    }

    /// Render the accumulated responses.
    ///
    /// A single fully-defined response collapses to a bare `prop`
    /// fragment served with 200 unless `force_multistatus` is set;
    /// everything else becomes a 207 multistatus envelope.
    pub fn render(&self, force_multistatus: bool) -> Result<(StatusCode, String), quick_xml::Error> {
        let mut ns = self.namespaces.clone();
        for response in &self.responses {
            for propstat in &response.propstats {
                for prop in &propstat.prop {
                    let url = match prop {
                        AnyProperty::Request(PropertyRequest::Extension { ns, .. }) => ns,
                        AnyProperty::Value(Property::Extension { ns, .. }) => ns,
                        _ => continue,
                    };
                    ns.add_namespace(url, "e", None);
                }
            }
        }

        let mut buffer = Vec::new();
        let status = {
            let q = quick_xml::writer::Writer::new_with_indent(&mut buffer, b' ', 4);
            let mut xml = Writer::new(q, ns);
            xml.q
                .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

            match self.single_defined() {
                Some(response) if !force_multistatus => {
                    let start = xml.create_dav_element("prop");
                    let end = start.to_end().into_owned();
                    xml.q.write_event(Event::Start(start))?;
                    for propstat in &response.propstats {
                        for prop in &propstat.prop {
                            prop.qwrite(&mut xml)?;
                        }
                    }
                    xml.q.write_event(Event::End(end))?;
                    StatusCode::OK
                }
                _ => {
                    let multistatus = Multistatus {
                        responses: self.responses.clone(),
                        responsedescription: None,
                    };
                    multistatus.qwrite(&mut xml)?;
                    StatusCode::MULTI_STATUS
                }
            }
        };

        let body = String::from_utf8(buffer)
            .map_err(|e| quick_xml::Error::NonDecodable(Some(e.utf8_error())))?;
        Ok((status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defined_response() {
        let mut response = Response::new("/docs/memo.txt");
        assert!(!response.is_defined());

        response.propstats.push(PropStat {
            prop: vec![AnyProperty::Value(Property::DisplayName("memo".into()))],
            status: Status(StatusCode::OK),
        });
        assert!(response.is_defined());

        // 404-tagged groups do not undefine a response
        response.propstats.push(PropStat {
            prop: vec![AnyProperty::Request(PropertyRequest::GetContentLanguage)],
            status: Status(StatusCode::NOT_FOUND),
        });
        assert!(response.is_defined());

        response.propstats.clear();
        response.status = Some(Status(StatusCode::LOCKED));
        assert!(!response.is_defined());
    }

    #[test]
    fn relative_hrefs() {
        let mut builder = MultiStatusBuilder::new(NamespaceRegistry::new());
        builder.response_relative("/container/", "front.html");
        builder.response_relative("/container", "/deep/");
        assert_eq!(builder.responses()[0].href, Href("/container/front.html".into()));
        assert_eq!(builder.responses()[1].href, Href("/container/deep/".into()));
    }
}
