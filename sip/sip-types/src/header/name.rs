use bytesstr::BytesStr;

/// Represents a SIP-Header's name. It is used as key inside [Headers].
///
/// [Headers]: crate::Headers
#[derive(Debug, Clone)]
pub struct Name(Repr);

impl Name {
    /// Creates a new custom Name that is not implemented as constant.
    ///
    /// This function takes 2 parameters;
    ///
    /// - `name`: a string which would be the printed version of the Name.
    /// - `parse_strs`: A list of strings that are case-insensitively matched against names inside a message.
    ///
    /// A custom Name should only be used for lookups, to insert an unimplemented Name into a map
    /// use [Name::unknown].
    pub const fn custom(name: &'static str, parse_strs: &'static [&'static str]) -> Self {
        Self(Repr::Custom(BytesStr::from_static(name), parse_strs))
    }

    /// Returns a Name which contains the name
    ///
    /// This function will be called by parsers when they
    /// encounter a name not implemented by this library.
    pub const fn unknown(name: BytesStr) -> Self {
        Self(Repr::Unknown(name))
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        let other_print_str = other.as_print_str();

        if self == other_print_str {
            return true;
        }

        other
            .as_parse_strs()
            .map(|strs| strs.iter().any(|&str| self.eq(str)))
            .unwrap_or_default()
    }
}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        if self.as_print_str().eq_ignore_ascii_case(other) {
            return true;
        }

        self.as_parse_strs()
            .map(|strs| strs.iter().any(|str| str.eq_ignore_ascii_case(other)))
            .unwrap_or_default()
    }
}

impl<T> From<T> for Name
where
    T: Into<BytesStr> + AsRef<[u8]>,
{
    fn from(name: T) -> Self {
        Name::from_bytes(name)
    }
}

macro_rules! header_names {
    ($($(#[$comments:meta])* $print:literal, $ident:ident, [$($parse:literal),+], $konst:ident;)+) => {
        #[derive(Debug, Clone)]
        enum Repr {
            $($ident,)+
            Unknown(BytesStr),
            Custom(BytesStr, &'static [&'static str]),
        }

        static NAMES: &[(&'static str, Name)] = &[
            $($( ($parse, Name::$konst), )*)*
        ];

        impl Name {
            $(
            $(#[$comments])*
            pub const $konst: Name = Name(Repr::$ident);
            )+

            fn from_bytes(name: impl Into<BytesStr> + AsRef<[u8]>) -> Name {
                let slice: &[u8] = name.as_ref();

                for (parse, name) in NAMES {
                    if parse.as_bytes().eq_ignore_ascii_case(slice) {
                        return name.clone();
                    }
                }

                Name::unknown(name.into())
            }

            pub fn as_print_str(&self) -> &str {
                match &self.0 {
                    $(Repr::$ident => $print,)*
                    Repr::Unknown(name) => name.as_ref(),
                    Repr::Custom(name, _) => name.as_ref(),
                }
            }

            pub const fn as_parse_strs(&self) -> Option<&[&str]> {
                match &self.0 {
                    $(
                    Repr::$ident => Some(&[$($parse),*]),
                    )+
                    Repr::Unknown(_) => None,
                    Repr::Custom(_, parse_strs) => Some(parse_strs),
                }
            }
        }
    };
}

header_names! {
    /// [[RFC3261, Section 20.5](https://tools.ietf.org/html/rfc3261#section-20.5)]
    "Allow",                Allow,              ["allow"],                  ALLOW;

    /// [[RFC3261, Section 20.7](https://tools.ietf.org/html/rfc3261#section-20.7)]
    "Authorization",        Authorization,      ["authorization"],          AUTHORIZATION;

    /// [[RFC3261, Section 20.8](https://tools.ietf.org/html/rfc3261#section-20.8)]
    "Call-ID",              CallID,             ["call-id", "i"],           CALL_ID;

    /// [[RFC3261, Section 20.10](https://tools.ietf.org/html/rfc3261#section-20.10)]
    "Contact",              Contact,            ["contact", "m"],           CONTACT;

    /// [[RFC3261, Section 20.12](https://tools.ietf.org/html/rfc3261#section-20.12)]
    "Content-Encoding",     ContentEncoding,    ["content-encoding", "e"],  CONTENT_ENCODING;

    /// [[RFC3261, Section 20.14](https://tools.ietf.org/html/rfc3261#section-20.14)]
    "Content-Length",       ContentLength,      ["content-length", "l"],    CONTENT_LENGTH;

    /// [[RFC3261, Section 20.15](https://tools.ietf.org/html/rfc3261#section-20.15)]
    "Content-Type",         ContentType,        ["content-type", "c"],      CONTENT_TYPE;

    /// [[RFC3261, Section 20.16](https://tools.ietf.org/html/rfc3261#section-20.16)]
    "CSeq",                 CSeq,               ["cseq"],                   CSEQ;

    /// [[RFC3261, Section 20.19](https://tools.ietf.org/html/rfc3261#section-20.19)]
    "Expires",              Expires,            ["expires"],                EXPIRES;

    /// [[RFC3261, Section 20.20](https://tools.ietf.org/html/rfc3261#section-20.20)]
    "From",                 From,               ["from", "f"],              FROM;

    /// [[RFC3261, Section 20.22](https://tools.ietf.org/html/rfc3261#section-20.22)]
    "Max-Forwards",         MaxForwards,        ["max-forwards"],           MAX_FORWARDS;

    /// [[RFC3261, Section 20.27](https://tools.ietf.org/html/rfc3261#section-20.27)]
    "Proxy-Authenticate",   ProxyAuthenticate,  ["proxy-authenticate"],     PROXY_AUTHENTICATE;

    /// [[RFC3261, Section 20.28](https://tools.ietf.org/html/rfc3261#section-20.28)]
    "Proxy-Authorization",  ProxyAuthorization, ["proxy-authorization"],    PROXY_AUTHORIZATION;

    /// [[RFC3261, Section 20.30](https://tools.ietf.org/html/rfc3261#section-20.30)]
    "Record-Route",         RecordRoute,        ["record-route"],           RECORD_ROUTE;

    /// [[RFC3261, Section 20.34](https://tools.ietf.org/html/rfc3261#section-20.34)]
    "Route",                Route,              ["route"],                  ROUTE;

    /// [[RFC3261, Section 20.36](https://tools.ietf.org/html/rfc3261#section-20.36)]
    "Subject",              Subject,            ["subject", "s"],           SUBJECT;

    /// [[RFC3261, Section 20.37](https://tools.ietf.org/html/rfc3261#section-20.37)]
    "Supported",            Supported,          ["supported", "k"],         SUPPORTED;

    /// [[RFC3261, Section 20.39](https://tools.ietf.org/html/rfc3261#section-20.39)]
    "To",                   To,                 ["to", "t"],                TO;

    /// [[RFC3261, Section 20.41](https://tools.ietf.org/html/rfc3261#section-20.41)]
    "User-Agent",           UserAgent,          ["user-agent"],             USER_AGENT;

    /// [[RFC3261, Section 20.42](https://tools.ietf.org/html/rfc3261#section-20.42)]
    "Via",                  Via,                ["via", "v"],               VIA;

    /// [[RFC3261, Section 20.44](https://tools.ietf.org/html/rfc3261#section-20.44)]
    "WWW-Authenticate",     WWWAuthenticate,    ["www-authenticate"],       WWW_AUTHENTICATE;
}

#[cfg(test)]
mod test {
    use super::*;

    macro_rules! test_eq {
        ($name1:expr; $name2:expr;) => {{
            let name1 = $name1;
            let name2 = $name2;

            assert_eq!(name1, name2);
            assert_eq!(name2, name1);
        }};
    }

    #[test]
    fn name_eq() {
        test_eq! {
            Name::VIA;
            Name::unknown(BytesStr::from_static("Via"));
        }

        test_eq! {
            Name::VIA;
            Name::custom("v", &["via", "v"]);
        }

        test_eq! {
            Name::unknown(BytesStr::from_static("v"));
            Name::custom("Via", &["via", "v"]);
        }
    }

    #[test]
    fn name_compact_forms() {
        assert_eq!(Name::from("t"), Name::TO);
        assert_eq!(Name::from("f"), Name::FROM);
        assert_eq!(Name::from("m"), Name::CONTACT);
        assert_eq!(Name::from("i"), Name::CALL_ID);
        assert_eq!(Name::from("v"), Name::VIA);
        assert_eq!(Name::from("l"), Name::CONTENT_LENGTH);
        assert_eq!(Name::from("c"), Name::CONTENT_TYPE);
    }
}
