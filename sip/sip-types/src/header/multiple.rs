//! `Vec<H>` implementations to decode and print list-capable headers
//!
//! A header list may be spread over multiple lines, comma-separated inside
//! a single line, or any mix of both. Decoding re-parses the remaining
//! input after each comma.

use crate::header::headers::OneOrMore;
use crate::header::name::Name;
use crate::header::{ConstNamed, DecodeValues, ExtendValues, HeaderParse};
use crate::print::PrintCtx;
use bytesstr::BytesStr;

impl<H: ConstNamed> ConstNamed for Vec<H> {
    const NAME: Name = H::NAME;
}

impl<H: HeaderParse> DecodeValues for Vec<H> {
    fn decode<'i, I>(values: &mut I) -> anyhow::Result<(&'i str, Self)>
    where
        I: Iterator<Item = &'i BytesStr>,
    {
        let mut vec = Vec::new();

        for value in values {
            let mut i = value.as_str().trim();

            if i.is_empty() {
                continue;
            }

            loop {
                let (rem, header) = match H::parse(value.as_ref(), i) {
                    Ok(ok) => ok,
                    Err(e) if vec.is_empty() => {
                        return Err(anyhow::anyhow!("{e}"));
                    }
                    Err(_) => break,
                };

                vec.push(header);

                let rem = rem.trim_start();

                if let Some(rem) = rem.strip_prefix(',') {
                    i = rem.trim_start();
                } else {
                    break;
                }
            }
        }

        Ok(("", vec))
    }
}

impl<H: ExtendValues> ExtendValues for Vec<H> {
    fn extend_values(&self, ctx: PrintCtx<'_>, values: &mut OneOrMore) {
        for header in self {
            header.extend_values(ctx, values);
        }
    }

    fn create_values(&self, ctx: PrintCtx<'_>) -> OneOrMore {
        let mut iter = self.iter();

        let Some(first) = iter.next() else {
            return OneOrMore::More(Vec::new());
        };

        let mut values = first.create_values(ctx);

        for header in iter {
            header.extend_values(ctx, &mut values);
        }

        values
    }
}

#[cfg(test)]
mod test {
    use crate::header::typed::Route;
    use crate::Headers;
    use crate::Name;

    #[test]
    fn csv_and_multiline_mix() {
        let mut headers = Headers::new();
        headers.insert(Name::ROUTE, "<sip:p1.example.com;lr>, <sip:p2.example.com;lr>");
        headers.insert(Name::ROUTE, "<sip:p3.example.com;lr>");

        let routes: Vec<Route> = headers.get_named().unwrap();

        assert_eq!(routes.len(), 3);
    }

    #[test]
    fn empty_value_skipped() {
        let mut headers = Headers::new();
        headers.insert(Name::ROUTE, "");
        headers.insert(Name::ROUTE, "<sip:p1.example.com;lr>");

        let routes: Vec<Route> = headers.get_named().unwrap();

        assert_eq!(routes.len(), 1);
    }
}
