use bytes::{Buf, Bytes, BytesMut};
use internal::Finish;
use sip_types::msg::{Line, LineError, MessageLine, PullParser};
use sip_types::Headers;
use std::io;
use std::mem::replace;
use std::str::{from_utf8, Utf8Error};
use tokio_util::codec::Decoder;

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)]
    Io(io::Error),
    #[error("receiving message too large")]
    MessageTooLarge,
    #[error("received message is malformed")]
    Malformed,
    #[error("header line not terminated with CRLF")]
    LineNoCrlf,
    #[error("message on stream transport is missing a content-length header")]
    MissingContentLength,
}

impl From<Utf8Error> for Error {
    fn from(_: Utf8Error) -> Self {
        Self::Malformed
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Self::Io(error)
    }
}

pub(crate) struct DecodedMessage {
    pub(crate) line: MessageLine,
    pub(crate) headers: Headers,
    pub(crate) body: Bytes,

    pub(crate) buffer: Bytes,
}

/// Incremental framing of SIP messages on a byte stream.
///
/// A read may carry a partial message head, exactly one message, multiple
/// messages back to back or anything in between; this decoder owns the
/// partial state per connection.
pub(crate) struct StreamingDecoder {
    head_progress: usize,

    /// Content-Length seen while scanning the message head. Must be kept
    /// across calls, the scan resumes mid-head and will not revisit the
    /// header line.
    content_len: Option<usize>,
}

impl StreamingDecoder {
    pub(crate) fn new() -> Self {
        Self {
            head_progress: 0,
            content_len: None,
        }
    }
}

impl Decoder for StreamingDecoder {
    type Item = DecodedMessage;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // strip CRLF keep-alives between messages
        while src.starts_with(b"\r\n") {
            src.advance(2);
            self.head_progress = 0;
            self.content_len = None;
        }

        if src.is_empty() {
            return Ok(None);
        }

        let mut parser = PullParser::new(src, self.head_progress);

        for line in &mut parser {
            match line {
                Ok(line) => {
                    // try to find the content-length field
                    // so the complete message size can be calculated
                    let mut split = line.splitn(2, |&c| c == b':');

                    if let Some(name) = split.next() {
                        if name.eq_ignore_ascii_case(b"content-length")
                            || name.eq_ignore_ascii_case(b"l")
                        {
                            let value = split.next().ok_or(Error::Malformed)?;
                            let value = from_utf8(value)?;

                            let len = value
                                .trim()
                                .parse::<usize>()
                                .map_err(|_| Error::Malformed)?;

                            if len > (u16::MAX as usize) {
                                return Err(Error::MessageTooLarge);
                            }

                            self.content_len = Some(len);
                        }
                    }
                }
                Err(LineError::Incomplete) => {
                    // do not buffer a message head larger than that
                    if src.len() > 4096 {
                        src.clear();
                        return Err(Error::MessageTooLarge);
                    }

                    // cannot parse the complete message head yet
                    self.head_progress = parser.progress();
                    return Ok(None);
                }
                Err(LineError::LoneLf) => {
                    src.clear();
                    return Err(Error::LineNoCrlf);
                }
            }
        }

        // parser completed without errors
        // message head is complete

        // streams do not allow guessing the body length from framing
        let content_len = self.content_len.ok_or(Error::MissingContentLength)?;

        // Calculate the complete message size
        let expected_complete_message_size = parser.head_end() + content_len;

        // if the message is not completely inside the buffer, allocate the rest
        // and return
        if src.len() < expected_complete_message_size {
            src.reserve(expected_complete_message_size - src.len());
            return Ok(None);
        }

        // copy remaining bytes into new buffer
        let new_src = BytesMut::from(&src[expected_complete_message_size..]);

        // Truncate all bytes which are not related
        // to the current message and are stored inside new_src
        src.truncate(expected_complete_message_size);

        // freeze buffer
        let src_bytes = replace(src, new_src).freeze();

        // reset state
        self.head_progress = 0;
        self.content_len = None;

        // reset parser
        parser = PullParser::new(&src_bytes, 0);

        // Now properly parse the message
        let mut message_line = None;
        let mut headers = Headers::new();

        for item in &mut parser {
            let item = item.expect("got error when input was already checked");

            let line = from_utf8(item)?;

            if message_line.is_none() {
                match MessageLine::parse(&src_bytes)(line) {
                    Ok((_, line)) => message_line = Some(line),
                    Err(_) => return Err(Error::Malformed),
                }
            } else {
                match Line::parse(&src_bytes, line).finish() {
                    Ok((_, line)) => headers.insert(line.name, line.value),
                    Err(e) => {
                        log::error!("Incoming SIP message has malformed header line, {}", e);
                    }
                }
            }
        }

        let head_end = parser.head_end();

        // slice remaining bytes
        let body = src_bytes.slice(head_end..head_end + content_len);
        debug_assert_eq!(content_len, body.len());

        Ok(Some(DecodedMessage {
            line: message_line.ok_or(Error::Malformed)?,
            headers,
            body,
            buffer: src_bytes,
        }))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn invite_with_body(body_len: usize) -> Vec<u8> {
        let body = "x".repeat(body_len);

        format!(
            "INVITE sip:bob@example.com SIP/2.0\r\n\
Via: SIP/2.0/TCP 192.0.2.1;branch=z9hG4bKabc\r\n\
Content-Length: {}\r\n\
\r\n{}",
            body_len, body
        )
        .into_bytes()
    }

    #[test]
    fn single_message() {
        let mut decoder = StreamingDecoder::new();
        let mut src = BytesMut::from(&invite_with_body(5)[..]);

        let msg = decoder.decode(&mut src).unwrap().unwrap();

        assert!(msg.line.is_request());
        assert_eq!(msg.body.len(), 5);
        assert!(src.is_empty());
    }

    #[test]
    fn one_byte_fragments() {
        let mut decoder = StreamingDecoder::new();
        let mut src = BytesMut::new();

        let input = invite_with_body(3119);

        let mut decoded = None;

        for &b in &input {
            src.extend_from_slice(&[b]);

            if let Some(msg) = decoder.decode(&mut src).unwrap() {
                decoded = Some(msg);
            }
        }

        let msg = decoded.expect("message decoded after last byte");

        assert_eq!(msg.body.len(), 3119);
        assert!(msg.body.iter().all(|&b| b == b'x'));
    }

    #[test]
    fn back_to_back_messages() {
        let sdp = "v=0\r\n".repeat(36); // 180 bytes
        let sdp = &sdp[..180];

        let trying = "SIP/2.0 100 Trying\r\n\
Via: SIP/2.0/TCP 192.0.2.1;branch=z9hG4bKabc\r\n\
Content-Length: 0\r\n\r\n";

        let ok = format!(
            "SIP/2.0 200 OK\r\n\
Via: SIP/2.0/TCP 192.0.2.1;branch=z9hG4bKabc\r\n\
Content-Length: {}\r\n\r\n{}",
            sdp.len(),
            sdp
        );

        let mut src = BytesMut::from(format!("{}{}", trying, ok).as_bytes());

        let mut decoder = StreamingDecoder::new();

        let first = decoder.decode(&mut src).unwrap().unwrap();
        assert!(!first.line.is_request());
        assert!(first.body.is_empty());

        let second = decoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(second.body, sdp.as_bytes());
    }

    #[test]
    fn keep_alive_between_messages() {
        let mut src = BytesMut::from(&b"\r\n\r\n"[..]);
        src.extend_from_slice(&invite_with_body(0));

        let mut decoder = StreamingDecoder::new();

        let msg = decoder.decode(&mut src).unwrap().unwrap();
        assert!(msg.line.is_request());
    }

    #[test]
    fn missing_content_length_is_an_error() {
        let msg = b"INVITE sip:bob@example.com SIP/2.0\r\n\
Via: SIP/2.0/TCP 192.0.2.1;branch=z9hG4bKabc\r\n\
\r\n";

        let mut decoder = StreamingDecoder::new();
        let mut src = BytesMut::from(&msg[..]);

        assert!(matches!(
            decoder.decode(&mut src),
            Err(Error::MissingContentLength)
        ));
    }

    #[test]
    fn compact_content_length() {
        let msg = b"SIP/2.0 200 OK\r\n\
Via: SIP/2.0/TCP 192.0.2.1;branch=z9hG4bKabc\r\n\
l: 2\r\n\r\nok";

        let mut decoder = StreamingDecoder::new();
        let mut src = BytesMut::from(&msg[..]);

        let msg = decoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(&msg.body[..], b"ok");
    }
}
