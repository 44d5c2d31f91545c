use quick_xml::events::Event;
use quick_xml::reader::NsReader;

use super::error::ParsingError;
use super::namespace::{NamespaceRegistry, DAV_URN};
use super::types::*;
use super::xml::{IRead, QRead, Reader};

// ---- ROOT ----

/// Propfind request
impl QRead<PropFind> for PropFind {
    fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "propfind")?;
        let propfind = loop {
            // allprop
            if xml.maybe_open(DAV_URN, "allprop")?.is_some() {
                xml.close()?;
                let includ = xml.maybe_find::<Include>()?;
                break PropFind::AllProp(includ);
            }

            // propname
            if xml.maybe_open(DAV_URN, "propname")?.is_some() {
                xml.close()?;
                break PropFind::PropName;
            }

            // prop
            let (mut maybe_prop, mut dirty) = (None, false);
            xml.maybe_read::<PropName>(&mut maybe_prop, &mut dirty)?;
            if let Some(prop) = maybe_prop {
                break PropFind::Prop(prop);
            }

            // not found, skipping
            xml.skip()?;
        };
        xml.close()?;

        Ok(propfind)
    }
}

/// PROPPATCH request
impl QRead<PropertyUpdate> for PropertyUpdate {
    fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "propertyupdate")?;
        let collected_items = xml.collect::<PropertyUpdateItem>()?;
        xml.close()?;
        if collected_items.is_empty() {
            return Err(ParsingError::MissingChild);
        }
        Ok(PropertyUpdate(collected_items))
    }
}

/// LOCK request
impl QRead<LockInfo> for LockInfo {
    fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "lockinfo")?;
        let (mut m_scope, mut m_type, mut owner) = (None, None, None);
        loop {
            let mut dirty = false;
            xml.maybe_read::<LockScope>(&mut m_scope, &mut dirty)?;
            xml.maybe_read::<LockType>(&mut m_type, &mut dirty)?;
            xml.maybe_read::<Owner>(&mut owner, &mut dirty)?;

            if !dirty {
                match xml.peek() {
                    Event::End(_) => break,
                    _ => xml.skip()?,
                };
            }
        }
        xml.close()?;
        match (m_scope, m_type) {
            (Some(lockscope), Some(locktype)) => Ok(LockInfo {
                lockscope,
                locktype,
                owner,
            }),
            _ => Err(ParsingError::MissingChild),
        }
    }
}

/// An absent or unreadable PROPFIND body must be treated as allprop.
pub fn propfind_from_body(body: &[u8], ns: NamespaceRegistry) -> PropFind {
    Reader::with_namespaces(NsReader::from_reader(body), ns)
        .and_then(|mut rdr| rdr.find::<PropFind>())
        .unwrap_or(PropFind::AllProp(None))
}

// ---- INNER XML ----

impl QRead<PropertyUpdateItem> for PropertyUpdateItem {
    fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        match Remove::qread(xml) {
            Err(ParsingError::Recoverable) => (),
            otherwise => return otherwise.map(PropertyUpdateItem::Remove),
        }
        Set::qread(xml).map(PropertyUpdateItem::Set)
    }
}

impl QRead<Remove> for Remove {
    fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "remove")?;
        let propname = xml.find::<PropName>()?;
        xml.close()?;
        Ok(Remove(propname))
    }
}

impl QRead<Set> for Set {
    fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "set")?;
        let propvalue = xml.find::<PropValue>()?;
        xml.close()?;
        Ok(Set(propvalue))
    }
}

impl QRead<Include> for Include {
    fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "include")?;
        let acc = xml.collect::<PropertyRequest>()?;
        xml.close()?;
        Ok(Include(acc))
    }
}

impl QRead<PropName> for PropName {
    fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "prop")?;
        let acc = xml.collect::<PropertyRequest>()?;
        xml.close()?;
        Ok(PropName(acc))
    }
}

impl QRead<PropValue> for PropValue {
    fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "prop")?;
        let acc = xml.collect::<Property>()?;
        xml.close()?;
        Ok(PropValue(acc))
    }
}

/// Property names dispatch through the namespace registry: the handler
/// registered for the element's namespace maps the local name to a
/// request kind, anything else is carried as an extension name.
impl QRead<PropertyRequest> for PropertyRequest {
    fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        let (ns, local) = match xml.qualified() {
            Some(qualified) => qualified,
            None => return Err(ParsingError::Recoverable),
        };

        let known = xml
            .namespaces()
            .parser_handler(&ns)
            .and_then(|handler| handler.parse_request(&local));

        xml.open_any()?;
        xml.close()?;
        Ok(known.unwrap_or(PropertyRequest::Extension { ns, name: local }))
    }
}

/// Property values follow the same dispatch. Handlers only see
/// character data; mixed content degrades to a raw extension value.
impl QRead<Property> for Property {
    fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        let (ns, local) = match xml.qualified() {
            Some(qualified) => qualified,
            None => return Err(ParsingError::Recoverable),
        };

        xml.open_any()?;
        let text = match xml.parent_has_child() {
            true => xml.tag_string()?,
            false => String::new(),
        };
        xml.close()?;

        let known = xml
            .namespaces()
            .parser_handler(&ns)
            .and_then(|handler| handler.parse_value(&local, text.clone()));

        Ok(known.unwrap_or(Property::Extension { ns, name: local, text }))
    }
}

impl QRead<LockScope> for LockScope {
    fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "lockscope")?;

        let lockscope = loop {
            if xml.maybe_open(DAV_URN, "exclusive")?.is_some() {
                xml.close()?;
                break LockScope::Exclusive;
            }

            if xml.maybe_open(DAV_URN, "shared")?.is_some() {
                xml.close()?;
                break LockScope::Shared;
            }

            xml.skip()?;
        };

        xml.close()?;
        Ok(lockscope)
    }
}

impl QRead<LockType> for LockType {
    fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "locktype")?;

        let locktype = loop {
            if xml.maybe_open(DAV_URN, "write")?.is_some() {
                xml.close()?;
                break LockType::Write;
            }

            xml.skip()?;
        };

        xml.close()?;
        Ok(locktype)
    }
}

impl QRead<Owner> for Owner {
    fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "owner")?;

        let mut owner = Owner::Unknown;
        loop {
            match xml.peek() {
                Event::Text(_) | Event::CData(_) => {
                    let txt = xml.tag_string()?;
                    if matches!(owner, Owner::Unknown) {
                        owner = Owner::Txt(txt);
                    }
                }
                Event::Start(_) | Event::Empty(_) => match Href::qread(xml) {
                    Ok(href) => {
                        owner = Owner::Href(href);
                    }
                    Err(ParsingError::Recoverable) => {
                        xml.skip()?;
                    }
                    Err(e) => return Err(e),
                },
                Event::End(_) => break,
                _ => {
                    xml.skip()?;
                }
            }
        }
        xml.close()?;
        Ok(owner)
    }
}

impl QRead<Href> for Href {
    fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "href")?;
        let url = xml.tag_string()?;
        xml.close()?;
        Ok(Href(url))
    }
}
