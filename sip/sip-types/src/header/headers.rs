use super::{DecodeValues, DynNamed, ExtendValues, HeaderError};
use crate::header::name::Name;
use crate::header::ConstNamed;
use bytesstr::BytesStr;
use std::iter::once;
use std::mem::take;
use std::{fmt, slice};

/// Headers is simple container for SIP-Message headers.
/// The headers are stored unparsed as [BytesStr] under their respective [Name].
///
/// Internally it is a `Vec`-backed multimap to keep insertion order
#[derive(Debug, Default)]
pub struct Headers {
    entries: Vec<Entry>,
}

/// One or multiple values stored under a single header name
#[derive(Debug, PartialEq)]
pub enum OneOrMore {
    One(BytesStr),
    More(Vec<BytesStr>),
}

impl OneOrMore {
    pub fn push(&mut self, value: BytesStr) {
        match self {
            OneOrMore::One(existing) => {
                let existing = take(existing);
                *self = OneOrMore::More(vec![existing, value]);
            }
            OneOrMore::More(vec) => vec.push(value),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            OneOrMore::One(_) => false,
            OneOrMore::More(values) => values.is_empty(),
        }
    }

    fn decode<H: DecodeValues>(&self, name: &Name) -> Result<H, HeaderError> {
        match &self {
            OneOrMore::One(v) => H::decode(&mut once(v)),
            OneOrMore::More(v) => H::decode(&mut v.iter()),
        }
        .map(|(_, h)| h)
        .map_err(|err| HeaderError::malformed(name.clone(), err))
    }
}

#[derive(Debug)]
struct Entry {
    name: Name,
    values: OneOrMore,
}

impl Headers {
    /// Returns a new empty [Headers]
    #[inline]
    pub const fn new() -> Self {
        Headers {
            entries: Vec::new(),
        }
    }

    /// Returns a new empty [Headers] with the specified capacity
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Headers {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Returns whether any header is stored under `name`
    #[inline]
    pub fn contains(&self, name: &Name) -> bool {
        self.entries.iter().any(|entry| &entry.name == name)
    }

    /// Insert a raw header value
    ///
    /// # Example
    ///
    /// ```
    /// use sip_types::{Headers, Name};
    /// use sip_types::header::typed::MaxForwards;
    ///
    /// let mut headers = Headers::new();
    ///
    /// headers.insert(Name::MAX_FORWARDS, "70");
    ///
    /// assert_eq!(headers.get_named::<MaxForwards>().unwrap(), MaxForwards(70));
    /// ```
    #[inline]
    pub fn insert<N, V>(&mut self, name: N, value: V)
    where
        N: Into<Name>,
        V: Into<BytesStr>,
    {
        let name = name.into();

        if let Some(Entry { values, .. }) = self.entry_mut(&name) {
            values.push(value.into());
        } else {
            self.entries.push(Entry {
                name,
                values: OneOrMore::One(value.into()),
            });
        }
    }

    /// Insert a raw header value at the front of the message
    #[inline]
    pub fn insert_front<N, V>(&mut self, name: N, value: V)
    where
        N: Into<Name>,
        V: Into<BytesStr>,
    {
        let name = name.into();

        if let Some(Entry { values, .. }) = self.entry_mut(&name) {
            values.push(value.into());
        } else {
            self.entries.insert(
                0,
                Entry {
                    name,
                    values: OneOrMore::One(value.into()),
                },
            );
        }
    }

    /// Prints the header into one or more [BytesStr] and stores them
    ///
    /// # Example
    ///
    /// ```
    /// use sip_types::Headers;
    /// use sip_types::header::typed::MaxForwards;
    ///
    /// let mut headers = Headers::new();
    ///
    /// headers.insert_named(&MaxForwards(70));
    ///
    /// assert_eq!(headers.to_string(), "Max-Forwards: 70\r\n");
    /// ```
    #[inline]
    pub fn insert_named<H>(&mut self, header: &H)
    where
        H: DynNamed + ExtendValues,
    {
        let name = header.name();

        if let Some(Entry { values, .. }) = self.entry_mut(&name) {
            header.extend_values(Default::default(), values);
        } else {
            let values = header.create_values(Default::default());

            if !values.is_empty() {
                self.entries.push(Entry { name, values });
            }
        }
    }

    /// Like [`Headers::insert_named`] but stores the header
    /// (if not already present) at the start of the message
    ///
    /// # Example
    ///
    /// ```
    /// use sip_types::Headers;
    /// use sip_types::header::typed::{Expires, MaxForwards};
    ///
    /// let mut headers = Headers::new();
    ///
    /// headers.insert_named(&Expires(120));
    /// headers.insert_named_front(&MaxForwards(70));
    ///
    /// assert_eq!(headers.to_string(), "Max-Forwards: 70\r\nExpires: 120\r\n");
    /// ```
    #[inline]
    pub fn insert_named_front<H>(&mut self, header: &H)
    where
        H: DynNamed + ExtendValues,
    {
        let name = header.name();

        if let Some(Entry { values, .. }) = self.entry_mut(&name) {
            header.extend_values(Default::default(), values);
        } else {
            let values = header.create_values(Default::default());

            if !values.is_empty() {
                self.entries.insert(0, Entry { name, values });
            }
        }
    }

    /// Returns a parsed header `H` stored under its constant name
    ///
    /// # Example
    ///
    /// ```
    /// use sip_types::Headers;
    /// use sip_types::header::typed::Expires;
    ///
    /// let mut headers = Headers::new();
    ///
    /// headers.insert_named(&Expires(120));
    ///
    /// assert_eq!(headers.get_named::<Expires>().unwrap(), Expires(120));
    /// ```
    #[inline]
    pub fn get_named<H>(&self) -> Result<H, HeaderError>
    where
        H: ConstNamed + DecodeValues,
    {
        match self.try_get_named() {
            Some(res) => res,
            None => Err(HeaderError::missing(H::NAME)),
        }
    }

    /// Returns a parsed header `H`. Returns `None` instead of an HeaderError if the header is not present.
    #[inline]
    pub fn try_get_named<H>(&self) -> Option<Result<H, HeaderError>>
    where
        H: ConstNamed + DecodeValues,
    {
        let entry = self.entry(&H::NAME)?;

        Some(entry.values.decode(&entry.name))
    }

    /// Returns a parsed header `H` stored under the given `name`
    #[inline]
    pub fn get<H>(&self, name: Name) -> Result<H, HeaderError>
    where
        H: DecodeValues,
    {
        match self.entry(&name) {
            Some(entry) => entry.values.decode(&entry.name),
            None => Err(HeaderError::missing(name)),
        }
    }

    /// Returns a parsed header `H` and removes it from the map.
    ///
    /// If a header is present but errors during parsing the error will be discarded and None returned.
    #[inline]
    pub fn take_named<H>(&mut self) -> Option<H>
    where
        H: ConstNamed + DecodeValues,
    {
        let entry = remove_where(&mut self.entries, |Entry { name, .. }| name == &H::NAME)?;

        entry.values.decode(&entry.name).ok()
    }

    /// Takes a closure which edits a header.
    ///
    /// # Example
    ///
    /// ```
    /// use sip_types::Headers;
    /// use sip_types::header::typed::Expires;
    ///
    /// let mut headers = Headers::new();
    ///
    /// headers.insert_named(&Expires(120));
    ///
    /// headers.edit_named(|expires: &mut Expires| expires.0 = 240).unwrap();
    ///
    /// assert_eq!(headers.get_named::<Expires>().unwrap(), Expires(240));
    /// ```
    #[inline]
    pub fn edit_named<H, F>(&mut self, edit: F) -> Result<(), HeaderError>
    where
        H: ConstNamed + DecodeValues + ExtendValues,
        F: FnOnce(&mut H),
    {
        let entry = self
            .entry_mut(&H::NAME)
            .ok_or(HeaderError::missing(H::NAME))?;

        let mut header = entry.values.decode(&entry.name)?;

        (edit)(&mut header);

        let values = header.create_values(Default::default());

        if values.is_empty() {
            self.remove(&H::NAME);
        } else {
            entry.values = values;
        }

        Ok(())
    }

    /// Remove all headers with the given `name`, returning their raw values
    #[inline]
    pub fn remove(&mut self, name: &Name) -> Option<Vec<BytesStr>> {
        match remove_where(&mut self.entries, |Entry { name: n, .. }| name == n)?.values {
            OneOrMore::One(v) => Some(vec![v]),
            OneOrMore::More(v) => Some(v),
        }
    }

    /// Clones all headers with `name` into another [Headers], keeping their order.
    #[inline]
    pub fn clone_into(&self, dest: &mut Self, name: Name) -> Result<(), HeaderError> {
        let Entry { values, .. } = self
            .entry(&name)
            .ok_or_else(|| HeaderError::missing(name.clone()))?;

        match values {
            OneOrMore::One(val) => {
                dest.insert(name, val.clone());
            }
            OneOrMore::More(values) => {
                for val in values {
                    dest.insert(name.clone(), val.clone());
                }
            }
        }

        Ok(())
    }

    /// Returns an iterator over [Name] and [BytesStr] pairs in the map.
    pub fn iter(&self) -> impl Iterator<Item = (&Name, &BytesStr)> + '_ {
        struct Iter<'s> {
            entries: slice::Iter<'s, Entry>,
            current: Option<(&'s Name, slice::Iter<'s, BytesStr>)>,
        }

        impl<'s> Iterator for Iter<'s> {
            type Item = (&'s Name, &'s BytesStr);

            fn next(&mut self) -> Option<Self::Item> {
                if let Some((name, iter)) = &mut self.current {
                    if let Some(val) = iter.next() {
                        return Some((name, val));
                    } else {
                        self.current = None;
                    }
                }

                let entry = self.entries.next()?;

                match &entry.values {
                    OneOrMore::One(val) => Some((&entry.name, val)),
                    OneOrMore::More(values) => {
                        let mut iter = values.iter();
                        let ret = iter.next()?;

                        self.current = Some((&entry.name, iter));

                        Some((&entry.name, ret))
                    }
                }
            }
        }

        Iter {
            entries: self.entries.iter(),
            current: None,
        }
    }

    fn entry(&self, n: &Name) -> Option<&Entry> {
        self.entries.iter().find(|Entry { name, .. }| name == n)
    }

    fn entry_mut(&mut self, n: &Name) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|Entry { name, .. }| name == n)
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.iter() {
            write!(f, "{}: {}\r\n", name.as_print_str(), value)?;
        }

        Ok(())
    }
}

impl Extend<(Name, BytesStr)> for Headers {
    fn extend<T: IntoIterator<Item = (Name, BytesStr)>>(&mut self, iter: T) {
        for (name, value) in iter {
            self.insert(name, value);
        }
    }
}

fn remove_where<T, F>(vec: &mut Vec<T>, f: F) -> Option<T>
where
    F: Fn(&T) -> bool,
{
    vec.iter().position(|item| f(item)).map(|i| vec.remove(i))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::header::typed::MaxForwards;

    #[test]
    fn header_insert_named() {
        let mut headers = Headers::new();

        headers.insert_named(&MaxForwards(70));

        assert_eq!(headers.entries.len(), 1);
        assert_eq!(headers.entries[0].name, Name::MAX_FORWARDS);
        assert_eq!(
            headers.entries[0].values,
            OneOrMore::One(BytesStr::from_static("70"))
        );
    }

    #[test]
    fn header_insert_raw_twice() {
        let mut headers = Headers::new();

        headers.insert(Name::MAX_FORWARDS, "70");
        headers.insert(Name::MAX_FORWARDS, "70");

        assert_eq!(headers.entries.len(), 1);
        assert_eq!(
            headers.entries[0].values,
            OneOrMore::More(vec![
                BytesStr::from_static("70"),
                BytesStr::from_static("70")
            ])
        );
    }

    #[test]
    fn header_remove() {
        let mut headers = Headers::new();
        headers.insert(Name::MAX_FORWARDS, "70");

        assert_eq!(headers.remove(&Name::MAX_FORWARDS).unwrap().len(), 1);

        headers.insert(Name::MAX_FORWARDS, "70");
        headers.insert(Name::MAX_FORWARDS, "70");
        headers.insert(Name::MAX_FORWARDS, "70");

        assert_eq!(headers.remove(&Name::MAX_FORWARDS).unwrap().len(), 3);
    }

    #[test]
    fn header_take() {
        let mut headers = Headers::new();
        headers.insert(Name::MAX_FORWARDS, "70");

        let max_fwd: MaxForwards = headers.take_named().unwrap();

        assert!(headers.entries.is_empty());
        assert_eq!(max_fwd.0, 70);
    }

    #[test]
    fn header_get_compact_alias() {
        let mut headers = Headers::new();
        headers.insert("l", "42");

        use crate::header::typed::ContentLength;

        let len: ContentLength = headers.get_named().unwrap();

        assert_eq!(len.0, 42);
    }

    #[test]
    fn header_clone_into() {
        let mut headers1 = Headers::new();
        headers1.insert(Name::MAX_FORWARDS, "70");
        headers1.insert(Name::MAX_FORWARDS, "80");

        let mut headers2 = Headers::new();
        headers2.insert(Name::MAX_FORWARDS, "90");

        headers1
            .clone_into(&mut headers2, Name::MAX_FORWARDS)
            .unwrap();

        assert_eq!(headers1.entries.len(), 1);
        assert_eq!(headers2.entries.len(), 1);

        assert_eq!(
            headers2.entries[0].values,
            OneOrMore::More(vec![
                BytesStr::from_static("90"),
                BytesStr::from_static("70"),
                BytesStr::from_static("80")
            ])
        )
    }

    #[test]
    fn header_iter_keeps_order() {
        let mut headers = Headers::new();
        headers.insert(Name::MAX_FORWARDS, "70");

        headers.insert(
            Name::VIA,
            "SIP/2.0/UDP 192.168.123.222;branch=z9hG4bK123abc",
        );

        headers.insert(Name::CALL_ID, "abc123");

        headers.insert(
            Name::VIA,
            "SIP/2.0/UDP 192.168.123.223;branch=z9hG4bK1234ab",
        );

        let mut iter = headers.iter();

        let (name, value) = iter.next().unwrap();
        assert_eq!(name, &Name::MAX_FORWARDS);
        assert_eq!(value, "70");

        let (name, value) = iter.next().unwrap();
        assert_eq!(name, &Name::VIA);
        assert_eq!(value, "SIP/2.0/UDP 192.168.123.222;branch=z9hG4bK123abc");

        let (name, value) = iter.next().unwrap();
        assert_eq!(name, &Name::VIA);
        assert_eq!(value, "SIP/2.0/UDP 192.168.123.223;branch=z9hG4bK1234ab");

        let (name, value) = iter.next().unwrap();
        assert_eq!(name, &Name::CALL_ID);
        assert_eq!(value, "abc123");

        assert!(iter.next().is_none());
    }
}
