//! Parsing of complete message buffers as received on datagram or
//! message-framed transports

use bytes::Bytes;
use internal::Finish;
use sip_types::header::typed::ContentLength;
use sip_types::msg::{Line, LineError, MessageLine, PullParser};
use sip_types::Headers;
use std::str::from_utf8;

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("invalid message")]
    InvalidMessage,
    #[error("header line not terminated with CRLF")]
    LineNoCrlf,
}

pub(crate) enum CompleteItem {
    /// CRLF keep-alive, recognised and silently discarded
    KeepAlive,

    Message {
        line: MessageLine,
        headers: Headers,
        body: Bytes,
        buffer: Bytes,
    },
}

/// Parse one complete message from `bytes`.
///
/// Absence of a Content-Length header is tolerated here, the body is taken
/// as the remainder of the buffer. Streaming transports cannot do that and
/// use their own framing decoder instead.
pub(crate) fn parse_complete(bytes: &[u8]) -> Result<CompleteItem, Error> {
    if bytes == b"\r\n\r\n" || bytes == b"\r\n" {
        return Ok(CompleteItem::KeepAlive);
    }

    let buffer = Bytes::copy_from_slice(bytes);

    let mut parser = PullParser::new(&buffer, 0);

    let mut message_line = None;
    let mut headers = Headers::new();

    for item in &mut parser {
        let line = match item {
            Ok(line) => line,
            Err(LineError::Incomplete) => {
                log::warn!("incoming SIP message is incomplete");
                return Err(Error::InvalidMessage);
            }
            Err(LineError::LoneLf) => {
                log::warn!("incoming SIP message contains a line without CRLF ending");
                return Err(Error::LineNoCrlf);
            }
        };

        let line = from_utf8(line).map_err(|_| {
            log::warn!("incoming SIP message contained invalid UTF8 in header line");
            Error::InvalidMessage
        })?;

        if message_line.is_none() {
            match MessageLine::parse(&buffer)(line) {
                Ok((_, line)) => {
                    message_line = Some(line);
                }
                Err(_) => {
                    log::warn!(
                        "incoming SIP message contained invalid Request/Status Line: {:?}",
                        line
                    );
                    return Err(Error::InvalidMessage);
                }
            }
        } else {
            match Line::parse(&buffer, line).finish() {
                Ok((_, line)) => headers.insert(line.name, line.value),
                Err(e) => {
                    log::warn!("incoming SIP message has malformed header line, {}", e);
                    return Err(Error::InvalidMessage);
                }
            }
        }
    }

    let head_end = parser.head_end();

    // look for optional content-length header
    let body = match headers.get_named::<ContentLength>() {
        Ok(len) => {
            if len.0 == 0 {
                Bytes::new()
            } else if buffer.len() >= head_end + len.0 {
                buffer.slice(head_end..head_end + len.0)
            } else {
                log::warn!("incoming SIP message has an incomplete body");
                return Err(Error::InvalidMessage);
            }
        }
        Err(_) => {
            log::trace!("no valid content-length given, guessing body length from datagram");

            if head_end == buffer.len() {
                Bytes::new()
            } else {
                buffer.slice(head_end..)
            }
        }
    };

    Ok(CompleteItem::Message {
        line: message_line.ok_or(Error::InvalidMessage)?,
        headers,
        body,
        buffer,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn keep_alive() {
        assert!(matches!(parse_complete(b"\r\n\r\n"), Ok(CompleteItem::KeepAlive)));
        assert!(matches!(parse_complete(b"\r\n"), Ok(CompleteItem::KeepAlive)));
    }

    #[test]
    fn complete_without_content_length() {
        let msg = b"OPTIONS sip:test@localhost SIP/2.0\r\n\
Via: SIP/2.0/UDP 10.0.0.0;branch=z9hG4bKabc\r\n\
\r\nsome-body";

        match parse_complete(msg).unwrap() {
            CompleteItem::Message { line, body, .. } => {
                assert!(line.is_request());
                assert_eq!(&body[..], b"some-body");
            }
            _ => panic!("expected message"),
        }
    }

    #[test]
    fn lone_lf_rejected() {
        let msg = b"OPTIONS sip:test@localhost SIP/2.0\nVia: SIP/2.0/UDP 10.0.0.0\r\n\r\n";

        assert!(matches!(parse_complete(msg), Err(Error::LineNoCrlf)));
    }

    #[test]
    fn body_length_from_content_length() {
        let msg = b"SIP/2.0 200 OK\r\nContent-Length: 4\r\n\r\nbodyTRAILING";

        match parse_complete(msg).unwrap() {
            CompleteItem::Message { body, .. } => assert_eq!(&body[..], b"body"),
            _ => panic!("expected message"),
        }
    }
}
