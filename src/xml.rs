use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;

use super::error::ParsingError;
use super::namespace::{NamespaceRegistry, DAV_URN};

// This core is synchronous by design: one task per connection, no
// suspension points, so plain std::io bounds are enough.
pub trait IWrite: std::io::Write {}
impl<T: std::io::Write> IWrite for T {}
pub trait IRead: std::io::BufRead {}
impl<T: std::io::BufRead> IRead for T {}

// Serialization/Deserialization traits
pub trait QWrite {
    fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), quick_xml::Error>;
}
pub trait QRead<T> {
    fn qread(xml: &mut Reader<impl IRead>) -> Result<T, ParsingError>;
}

// ---------------

/// Transform a Rust object into an XML stream of characters
pub struct Writer<T: IWrite> {
    pub q: quick_xml::writer::Writer<T>,
    ns: NamespaceRegistry,
    ns_to_apply: Vec<(String, String)>,
}
impl<T: IWrite> Writer<T> {
    /// The registry decides every prefix; its declarations are applied
    /// to the first element created through this writer.
    pub fn new(q: quick_xml::writer::Writer<T>, ns: NamespaceRegistry) -> Self {
        let ns_to_apply = ns.root_attributes();
        Self { q, ns, ns_to_apply }
    }

    pub fn create_dav_element(&mut self, name: &str) -> BytesStart<'static> {
        self.create_ns_element(DAV_URN, name)
    }

    pub fn create_ns_element(&mut self, url: &str, name: &str) -> BytesStart<'static> {
        let mut start = match self.ns.assigned_prefix(url) {
            Some(prefix) => BytesStart::new(format!("{}:{}", prefix, name)),
            None => {
                // unregistered namespace, declare it inline
                let mut start = BytesStart::new(name.to_string());
                if !url.is_empty() {
                    start.push_attribute(("xmlns", url));
                }
                start
            }
        };
        if !self.ns_to_apply.is_empty() {
            start.extend_attributes(
                self.ns_to_apply
                    .iter()
                    .map(|(k, n)| (k.as_str(), n.as_str())),
            );
            self.ns_to_apply.clear()
        }
        start
    }
}

/// Transform an XML stream of characters into a Rust object
pub struct Reader<T: IRead> {
    pub rdr: NsReader<T>,
    ns: NamespaceRegistry,
    cur: Event<'static>,
    parents: Vec<Event<'static>>,
    buf: Vec<u8>,
}
impl<T: IRead> Reader<T> {
    pub fn new(rdr: NsReader<T>) -> Result<Self, ParsingError> {
        Self::with_namespaces(rdr, NamespaceRegistry::new())
    }

    pub fn with_namespaces(
        mut rdr: NsReader<T>,
        ns: NamespaceRegistry,
    ) -> Result<Self, ParsingError> {
        let mut buf: Vec<u8> = vec![];
        let cur = rdr.read_event_into(&mut buf)?.into_owned();
        let parents = vec![];
        buf.clear();
        Ok(Self {
            cur,
            parents,
            rdr,
            ns,
            buf,
        })
    }

    pub fn namespaces(&self) -> &NamespaceRegistry {
        &self.ns
    }

    /// read one more tag
    fn next(&mut self) -> Result<Event<'static>, ParsingError> {
        let evt = self.rdr.read_event_into(&mut self.buf)?.into_owned();
        self.buf.clear();
        Ok(std::mem::replace(&mut self.cur, evt))
    }

    /// skip a node at current level
    pub fn skip(&mut self) -> Result<Event<'static>, ParsingError> {
        match &self.cur {
            Event::Start(b) => {
                let _span = self.rdr.read_to_end_into(b.to_end().name(), &mut self.buf)?;
                self.next()
            }
            Event::End(_) => Err(ParsingError::WrongToken),
            Event::Eof => Err(ParsingError::Eof),
            _ => self.next(),
        }
    }

    /// check if this is the desired tag
    fn is_tag(&self, ns: &str, key: &str) -> bool {
        let qname = match self.peek() {
            Event::Start(bs) | Event::Empty(bs) => bs.name(),
            Event::End(be) => be.name(),
            _ => return false,
        };

        let (extr_ns, local) = self.rdr.resolve_element(qname);

        if local.into_inner() != key.as_bytes() {
            return false;
        }

        match extr_ns {
            ResolveResult::Bound(v) => v.into_inner() == ns.as_bytes(),
            _ => false,
        }
    }

    /// namespace URL and local name of the current element, if any
    pub fn qualified(&self) -> Option<(String, String)> {
        let qname = match self.peek() {
            Event::Start(bs) | Event::Empty(bs) => bs.name(),
            _ => return None,
        };

        let (extr_ns, local) = self.rdr.resolve_element(qname);
        let local = std::str::from_utf8(local.into_inner()).ok()?.to_string();
        let ns = match extr_ns {
            ResolveResult::Bound(v) => std::str::from_utf8(v.into_inner()).ok()?.to_string(),
            _ => String::new(),
        };
        Some((ns, local))
    }

    pub fn parent_has_child(&self) -> bool {
        matches!(self.parents.last(), Some(Event::Start(_)) | None)
    }

    fn ensure_parent_has_child(&self) -> Result<(), ParsingError> {
        match self.parent_has_child() {
            true => Ok(()),
            false => Err(ParsingError::Recoverable),
        }
    }

    pub fn peek(&self) -> &Event<'static> {
        &self.cur
    }

    pub fn tag_string(&mut self) -> Result<String, ParsingError> {
        self.ensure_parent_has_child()?;

        let mut acc = String::new();
        loop {
            match self.peek() {
                Event::CData(unescaped) => {
                    acc.push_str(std::str::from_utf8(unescaped.as_ref())?);
                    self.next()?
                }
                Event::Text(escaped) => {
                    acc.push_str(escaped.unescape()?.as_ref());
                    self.next()?
                }
                Event::End(_) | Event::Start(_) | Event::Empty(_) => return Ok(acc),
                _ => self.next()?,
            };
        }
    }

    pub fn maybe_read<N: QRead<N>>(
        &mut self,
        t: &mut Option<N>,
        dirty: &mut bool,
    ) -> Result<(), ParsingError> {
        if !self.parent_has_child() {
            return Ok(());
        }

        match N::qread(self) {
            Ok(v) => {
                *t = Some(v);
                *dirty = true;
                Ok(())
            }
            Err(ParsingError::Recoverable) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn find<N: QRead<N>>(&mut self) -> Result<N, ParsingError> {
        self.ensure_parent_has_child()?;

        loop {
            // Try parse
            match N::qread(self) {
                Err(ParsingError::Recoverable) => (),
                otherwise => return otherwise,
            }

            // If recovered, skip the element
            self.skip()?;
        }
    }

    pub fn maybe_find<N: QRead<N>>(&mut self) -> Result<Option<N>, ParsingError> {
        // We can't find anything inside a self-closed tag
        if !self.parent_has_child() {
            return Ok(None);
        }

        loop {
            // Try parse
            match N::qread(self) {
                Err(ParsingError::Recoverable) => (),
                otherwise => return otherwise.map(Some),
            }

            // Skip or stop
            match self.peek() {
                Event::End(_) => return Ok(None),
                _ => self.skip()?,
            };
        }
    }

    pub fn collect<N: QRead<N>>(&mut self) -> Result<Vec<N>, ParsingError> {
        let mut acc = Vec::new();
        if !self.parent_has_child() {
            return Ok(acc);
        }

        loop {
            match N::qread(self) {
                Err(ParsingError::Recoverable) => match self.peek() {
                    Event::End(_) => return Ok(acc),
                    _ => {
                        self.skip()?;
                    }
                },
                Ok(v) => acc.push(v),
                Err(e) => return Err(e),
            }
        }
    }

    pub fn open(&mut self, ns: &str, key: &str) -> Result<Event<'static>, ParsingError> {
        let evt = match self.peek() {
            // a self-closed tag is virtually opened so that close() can
            // consume it as the matching end
            Event::Empty(_) if self.is_tag(ns, key) => self.cur.clone(),
            Event::Start(_) if self.is_tag(ns, key) => self.next()?,
            _ => return Err(ParsingError::Recoverable),
        };

        self.parents.push(evt.clone());
        Ok(evt)
    }

    /// open the current element whatever its name, for namespace
    /// dispatch of extension elements
    pub fn open_any(&mut self) -> Result<Event<'static>, ParsingError> {
        let evt = match self.peek() {
            Event::Empty(_) => self.cur.clone(),
            Event::Start(_) => self.next()?,
            _ => return Err(ParsingError::Recoverable),
        };

        self.parents.push(evt.clone());
        Ok(evt)
    }

    pub fn maybe_open(&mut self, ns: &str, key: &str) -> Result<Option<Event<'static>>, ParsingError> {
        match self.open(ns, key) {
            Ok(v) => Ok(Some(v)),
            Err(ParsingError::Recoverable) => Ok(None),
            Err(e) => Err(e),
        }
    }

    // find stop tag
    pub fn close(&mut self) -> Result<Event<'static>, ParsingError> {
        // Handle the empty case
        if !self.parent_has_child() {
            self.parents.pop();
            return self.next();
        }

        // Handle the start/end case
        loop {
            match self.peek() {
                Event::End(_) => {
                    self.parents.pop();
                    return self.next();
                }
                _ => self.skip()?,
            };
        }
    }
}
