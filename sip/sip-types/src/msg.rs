//! Contains SIP message parts and the incremental message-head parser

use crate::code::Code;
use crate::method::Method;
use crate::parse::{token, whitespace};
use crate::print::{AppendCtx, Print, PrintCtx};
use crate::uri::SipUri;
use crate::Name;
use bytes::Bytes;
use bytesstr::BytesStr;
use internal::ws;
use internal::IResult;
use memchr::memchr;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while};
use nom::character::complete::char;
use nom::combinator::{map, map_res, opt};
use nom::sequence::{preceded, separated_pair, terminated, tuple};
use nom::AsChar;
use std::fmt;
use std::str::FromStr;

fn not_newline(c: char) -> bool {
    !matches!(c, '\n' | '\r')
}

/// Represents a header `header-name: header-value` line inside a message
///
/// When using [`PullParser`] to extract lines from a SIP message this type should be used to
/// parse the [`Name`] and remaining value from it.
pub struct Line {
    pub name: Name,
    pub value: BytesStr,
}

impl Line {
    pub fn parse<'i>(src: &'i Bytes, i: &'i str) -> IResult<&'i str, Self> {
        map(
            ws((take_while(token), char(':'), |i| Ok(("", i)))),
            |(name, _, value): (&str, _, &str)| Line {
                name: BytesStr::from_parse(src, name).into(),
                value: BytesStr::from_parse(src, value.trim()),
            },
        )(i)
    }
}

/// The leading line of any SIP message
#[derive(Debug, Clone)]
pub enum MessageLine {
    Request(RequestLine),
    Response(StatusLine),
}

impl MessageLine {
    /// Returns a function which parses the leading line of a sip message,
    /// anchoring sliced strings inside `src`.
    pub fn parse(src: &Bytes) -> impl Fn(&str) -> IResult<&str, Self> + '_ {
        move |i| {
            alt((
                map(StatusLine::parse(src), MessageLine::Response),
                map(RequestLine::parse(src), MessageLine::Request),
            ))(i)
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self, Self::Request(..))
    }

    pub fn request_method(&self) -> Option<&Method> {
        match self {
            MessageLine::Request(line) => Some(&line.method),
            MessageLine::Response(_) => None,
        }
    }
}

impl Print for MessageLine {
    fn print(&self, f: &mut fmt::Formatter<'_>, ctx: PrintCtx<'_>) -> fmt::Result {
        use std::fmt::Display;

        match &self {
            MessageLine::Request(l) => l.print(f, ctx),
            MessageLine::Response(l) => l.fmt(f),
        }
    }
}

/// The leading line of a SIP request message
#[derive(Debug, Clone)]
pub struct RequestLine {
    pub method: Method,
    pub uri: SipUri,
}

impl Print for RequestLine {
    fn print(&self, f: &mut fmt::Formatter<'_>, mut ctx: PrintCtx<'_>) -> fmt::Result {
        ctx.uri = Some(crate::print::UriContext::ReqUri);
        write!(f, "{} {} SIP/2.0", self.method, self.uri.print_ctx(ctx))
    }
}

impl RequestLine {
    pub(crate) fn parse(src: &Bytes) -> impl Fn(&str) -> IResult<&str, Self> + '_ {
        move |i| {
            map(
                separated_pair(
                    Method::parse(src),
                    take_while(whitespace),
                    terminated(
                        SipUri::parse(src),
                        tuple((take_while(whitespace), tag("SIP/2.0"))),
                    ),
                ),
                |(method, uri)| RequestLine { method, uri },
            )(i)
        }
    }
}

/// The leading line of a SIP response message
#[derive(Debug, Clone)]
pub struct StatusLine {
    pub code: Code,
    pub reason: Option<BytesStr>,
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIP/2.0 {}", self.code.into_u16())?;

        if let Some(reason) = &self.reason {
            write!(f, " {}", reason)?;
        }

        Ok(())
    }
}

impl StatusLine {
    pub(crate) fn parse(src: &Bytes) -> impl Fn(&str) -> IResult<&str, Self> + '_ {
        move |i| {
            map(
                preceded(
                    tuple((tag("SIP/2.0"), take_while(whitespace))),
                    tuple((
                        map_res(take_while(char::is_dec_digit), u16::from_str),
                        take_while(whitespace),
                        opt(take_while(not_newline)),
                    )),
                ),
                move |(code, _, reason): (_, _, Option<&str>)| -> StatusLine {
                    StatusLine {
                        code: Code::from(code),
                        reason: reason.and_then(|reason| match reason.trim() {
                            "" => None,
                            s => Some(BytesStr::from_parse(src, s)),
                        }),
                    }
                },
            )(i)
        }
    }
}

/// Error returned by [`PullParser`] when it cannot produce another line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineError {
    /// The input ends before the message head is complete. More input is
    /// needed, the parser state may be kept.
    Incomplete,

    /// A line was terminated by a bare LF instead of CRLF
    LoneLf,
}

/// Simple pull parser which returns all lines of a SIP message head.
///
/// Lines MUST be terminated with `\r\n`; a bare `\n` is rejected with
/// [`LineError::LoneLf`]. A `\r\n` followed by a space or tab continues the
/// previous header line (folding). The empty line terminating the head is
/// consumed and ends the iteration.
///
/// # Examples
///
/// ```
/// use sip_types::msg::PullParser;
///
/// let msg = b"OPTIONS sip:user@example.com SIP/2.0\r\n\
/// Max-Forwards: 70\r\n\
/// Via: SIP/2.0/UDP 192.0.2.1;branch=z9hG4bKkdjuw\r\n\
/// l: 0\r\n\
/// \r\n";
///
/// let mut parser = PullParser::new(msg, 0);
///
/// assert_eq!(parser.next(), Some(Ok(&b"OPTIONS sip:user@example.com SIP/2.0"[..])));
/// assert_eq!(parser.next(), Some(Ok(&b"Max-Forwards: 70"[..])));
/// assert_eq!(parser.next(), Some(Ok(&b"Via: SIP/2.0/UDP 192.0.2.1;branch=z9hG4bKkdjuw"[..])));
/// assert_eq!(parser.next(), Some(Ok(&b"l: 0"[..])));
/// assert_eq!(parser.next(), None);
/// assert_eq!(parser.head_end(), msg.len());
/// ```
///
/// The parser also detects incomplete message heads, which is used by the
/// streaming transports to wait for more input.
///
/// ```
/// use sip_types::msg::{LineError, PullParser};
///
/// let msg = b"OPTIONS sip:user@example.com SIP/2.0\r\n\
/// To: sip:user@example.com\r\nFrom: caller<si";
///
/// let mut parser = PullParser::new(msg, 0);
///
/// assert_eq!(parser.next(), Some(Ok(&b"OPTIONS sip:user@example.com SIP/2.0"[..])));
/// assert_eq!(parser.next(), Some(Ok(&b"To: sip:user@example.com"[..])));
/// assert_eq!(parser.next(), Some(Err(LineError::Incomplete)));
/// ```
#[derive(Clone)]
pub struct PullParser<'i> {
    input: &'i [u8],
    progress: usize,
}

impl<'i> PullParser<'i> {
    /// Returns a new PullParser with input and progress
    pub fn new(input: &'i [u8], progress: usize) -> Self {
        Self { input, progress }
    }

    /// Returns the index of the first byte after the message head.
    /// Only valid after the parser returned None.
    pub fn head_end(&self) -> usize {
        self.progress
    }

    /// Returns the current progress.
    ///
    /// Saving the parser progress when encountering a incomplete message inside a streaming
    /// transport avoids having to parse the same lines multiple times.
    pub fn progress(&self) -> usize {
        self.progress
    }

    /// Perform a dry run of the parser to check if the input is a complete message head
    pub fn check_complete(&mut self) -> Result<(), LineError> {
        for res in self {
            let _ = res?;
        }

        Ok(())
    }
}

impl<'i> Iterator for PullParser<'i> {
    type Item = Result<&'i [u8], LineError>;

    fn next(&mut self) -> Option<Self::Item> {
        let line_begin = self.progress;

        let mut search_from = line_begin;

        loop {
            let nl = match memchr(b'\n', &self.input[search_from..]) {
                None => return Some(Err(LineError::Incomplete)),
                Some(nl) => search_from + nl,
            };

            if nl == line_begin || self.input[nl - 1] != b'\r' {
                return Some(Err(LineError::LoneLf));
            }

            let line = &self.input[line_begin..nl - 1];

            if line.is_empty() {
                // empty line terminates the message head
                self.progress = nl + 1;
                return None;
            }

            match self.input.get(nl + 1) {
                // cannot tell yet if the next line is a continuation
                None => return Some(Err(LineError::Incomplete)),
                // whitespace after the newline folds the lines together
                Some(b' ') | Some(b'\t') => search_from = nl + 1,
                Some(_) => {
                    self.progress = nl + 1;
                    return Some(Ok(line));
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pull_parser_lone_lf() {
        let msg = b"OPTIONS sip:user@example.com SIP/2.0\nVia: SIP/2.0/UDP 192.0.2.1\r\n\r\n";

        let mut parser = PullParser::new(msg, 0);

        assert_eq!(parser.next(), Some(Err(LineError::LoneLf)));
    }

    #[test]
    fn pull_parser_folded_line() {
        let msg = b"INVITE sip:user@example.com SIP/2.0\r\n\
Subject: first part,\r\n\tsecond part\r\n\
\r\n";

        let mut parser = PullParser::new(msg, 0);

        assert_eq!(
            parser.next(),
            Some(Ok(&b"INVITE sip:user@example.com SIP/2.0"[..]))
        );
        assert_eq!(
            parser.next(),
            Some(Ok(&b"Subject: first part,\r\n\tsecond part"[..]))
        );
        assert_eq!(parser.next(), None);
        assert_eq!(parser.head_end(), msg.len());
    }

    #[test]
    fn pull_parser_body_offset() {
        let msg = b"SIP/2.0 200 OK\r\nl: 4\r\n\r\nbody";

        let mut parser = PullParser::new(msg, 0);

        assert!(parser.next().unwrap().is_ok());
        assert!(parser.next().unwrap().is_ok());
        assert!(parser.next().is_none());

        assert_eq!(&msg[parser.head_end()..], b"body");
    }

    #[test]
    fn message_line_request() {
        let input = BytesStr::from_static("INVITE sip:bob@example.com SIP/2.0");

        let (rem, line) = MessageLine::parse(input.as_ref())(&input).unwrap();

        assert!(rem.is_empty());
        assert!(line.is_request());
        assert_eq!(line.request_method(), Some(&Method::INVITE));
    }

    #[test]
    fn message_line_response() {
        let input = BytesStr::from_static("SIP/2.0 180 Ringing");

        let (rem, line) = MessageLine::parse(input.as_ref())(&input).unwrap();

        assert!(rem.is_empty());
        assert!(!line.is_request());

        match line {
            MessageLine::Response(status) => {
                assert_eq!(status.code, Code::RINGING);
                assert_eq!(status.reason.unwrap(), "Ringing");
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn request_line_round_trip() {
        let input = BytesStr::from_static("INVITE sip:bob@example.com;transport=tcp SIP/2.0");

        let (_, line) = RequestLine::parse(input.as_ref())(&input).unwrap();

        assert_eq!(line.default_print_ctx().to_string(), input.as_str());
    }
}
