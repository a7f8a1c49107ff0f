use std::fmt;
use std::str::FromStr;

type Repr = u16;

/// Code is a representation of an SIP-Code encoded in an u16
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Code(Repr);

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tuple = f.debug_tuple("Code");
        tuple.field(&self.0);
        if let Some(text) = self.text() {
            tuple.field(&text);
        }
        tuple.finish()
    }
}

/// CodeKind represents the kind of SIP-Code for broader Code handling
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum CodeKind {
    /// Represents code 100..=199
    Provisional,

    /// Represents code 200..=299
    Success,

    /// Represents code 300..=399
    Redirection,

    /// Represents code 400..=499
    RequestFailure,

    /// Represents code 500..=599
    ServerFailure,

    /// Represents code 600..=699
    GlobalFailure,

    /// Represents all other codes
    Custom,
}

impl Code {
    /// Returns the [CodeKind] of the code
    ///
    /// # Example
    ///
    /// ```
    /// use sip_types::{Code, CodeKind};
    ///
    /// let code = Code::from(200);
    ///
    /// assert_eq!(code.kind(), CodeKind::Success);
    /// ```
    #[inline]
    pub fn kind(self) -> CodeKind {
        match self.0 {
            100..=199 => CodeKind::Provisional,
            200..=299 => CodeKind::Success,
            300..=399 => CodeKind::Redirection,
            400..=499 => CodeKind::RequestFailure,
            500..=599 => CodeKind::ServerFailure,
            600..=699 => CodeKind::GlobalFailure,
            _ => CodeKind::Custom,
        }
    }

    /// Returns the number that the code represents
    pub fn into_u16(self) -> Repr {
        self.0
    }
}

impl FromStr for Code {
    type Err = <Repr as FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Code(Repr::from_str(s)?))
    }
}

impl From<Repr> for Code {
    fn from(r: Repr) -> Code {
        Code(r)
    }
}

macro_rules! codes {
    ($($(#[$comments:meta])* [$code:expr => $name:ident, $text:literal];)*) => {
        impl Code {
            /// Returns the default response-text for a known Code
            pub fn text(self) -> Option<&'static str> {
                match self.0 {
                    $($code => Some($text),)*
                    _ => None
                }
            }

            $(
            $(#[$comments])*
            pub const $name: Code = Code($code);
            )*
        }
    };
}

codes! {
    // ==== PROVISIONAL 1XX ====

    /// 100 Trying
    [100 => TRYING, "Trying"];

    /// 180 Ringing
    [180 => RINGING, "Ringing"];

    /// 181 Call Is Being Forwarded
    [181 => CALL_IS_BEING_FORWARDED, "Call Is Being Forwarded"];

    /// 182 Queued
    [182 => QUEUED, "Queued"];

    /// 183 Session Progress
    [183 => SESSION_PROGRESS, "Session Progress"];

    // ==== SUCCESS 2XX ====

    /// 200 OK
    [200 => OK, "OK"];

    /// 202 Accepted
    [202 => ACCEPTED, "Accepted"];

    // ==== REDIRECTION 3XX ====

    /// 300 Multiple Choices
    [300 => MULTIPLE_CHOICES, "Multiple Choices"];

    /// 301 Moved Permanently
    [301 => MOVED_PERMANENTLY, "Moved Permanently"];

    /// 302 Moved Temporarily
    [302 => MOVED_TEMPORARILY, "Moved Temporarily"];

    /// 305 Use Proxy
    [305 => USE_PROXY, "Use Proxy"];

    /// 380 Alternative Service
    [380 => ALTERNATIVE_SERVICE, "Alternative Service"];

    // ==== REQUEST FAILURE 4XX ====

    /// 400 Bad Request
    [400 => BAD_REQUEST, "Bad Request"];

    /// 401 Unauthorized
    [401 => UNAUTHORIZED, "Unauthorized"];

    /// 402 Payment Required
    [402 => PAYMENT_REQUIRED, "Payment Required"];

    /// 403 Forbidden
    [403 => FORBIDDEN, "Forbidden"];

    /// 404 Not Found
    [404 => NOT_FOUND, "Not Found"];

    /// 405 Method Not Allowed
    [405 => METHOD_NOT_ALLOWED, "Method Not Allowed"];

    /// 406 Not Acceptable
    [406 => NOT_ACCEPTABLE, "Not Acceptable"];

    /// 407 Proxy Authentication Required
    [407 => PROXY_AUTHENTICATION_REQUIRED, "Proxy Authentication Required"];

    /// 408 Request Timeout
    [408 => REQUEST_TIMEOUT, "Request Timeout"];

    /// 410 Gone
    [410 => GONE, "Gone"];

    /// 413 Request Entity Too Large
    [413 => REQUEST_ENTITY_TOO_LARGE, "Request Entity Too Large"];

    /// 414 Request-URI Too Long
    [414 => REQUEST_URI_TOO_LONG, "Request-URI Too Long"];

    /// 415 Unsupported Media Type
    [415 => UNSUPPORTED_MEDIA_TYPE, "Unsupported Media Type"];

    /// 416 Unsupported URI Scheme
    [416 => UNSUPPORTED_URI_SCHEME, "Unsupported URI Scheme"];

    /// 420 Bad Extension
    [420 => BAD_EXTENSION, "Bad Extension"];

    /// 421 Extension Required
    [421 => EXTENSION_REQUIRED, "Extension Required"];

    /// 423 Interval Too Brief
    [423 => INTERVAL_TOO_BRIEF, "Interval Too Brief"];

    /// 480 Temporarily Unavailable
    [480 => TEMPORARILY_UNAVAILABLE, "Temporarily Unavailable"];

    /// 481 Call/Transaction Does Not Exist
    [481 => CALL_OR_TRANSACTION_DOES_NOT_EXIST, "Call/Transaction Does Not Exist"];

    /// 482 Loop Detected
    [482 => LOOP_DETECTED, "Loop Detected"];

    /// 483 Too Many Hops
    [483 => TOO_MANY_HOPS, "Too Many Hops"];

    /// 484 Address Incomplete
    [484 => ADDRESS_INCOMPLETE, "Address Incomplete"];

    /// 485 Ambiguous
    [485 => AMBIGUOUS, "Ambiguous"];

    /// 486 Busy Here
    [486 => BUSY_HERE, "Busy Here"];

    /// 487 Request Terminated
    [487 => REQUEST_TERMINATED, "Request Terminated"];

    /// 488 Not Acceptable Here
    [488 => NOT_ACCEPTABLE_HERE, "Not Acceptable Here"];

    /// 491 Request Pending
    [491 => REQUEST_PENDING, "Request Pending"];

    /// 493 Undecipherable
    [493 => UNDECIPHERABLE, "Undecipherable"];

    // ==== SERVER FAILURE 5XX ====

    /// 500 Server Internal Error
    [500 => SERVER_INTERNAL_ERROR, "Server Internal Error"];

    /// 501 Not Implemented
    [501 => NOT_IMPLEMENTED, "Not Implemented"];

    /// 502 Bad Gateway
    [502 => BAD_GATEWAY, "Bad Gateway"];

    /// 503 Service Unavailable
    [503 => SERVICE_UNAVAILABLE, "Service Unavailable"];

    /// 504 Server Time-out
    [504 => SERVER_TIMEOUT, "Server Time-out"];

    /// 505 Version Not Supported
    [505 => VERSION_NOT_SUPPORTED, "Version Not Supported"];

    /// 513 Message Too Large
    [513 => MESSAGE_TOO_LARGE, "Message Too Large"];

    // ==== GLOBAL FAILURE 6XX ====

    /// 600 Busy Everywhere
    [600 => BUSY_EVERYWHERE, "Busy Everywhere"];

    /// 603 Decline
    [603 => DECLINE, "Decline"];

    /// 604 Does Not Exist Anywhere
    [604 => DOES_NOT_EXIST_ANYWHERE, "Does Not Exist Anywhere"];

    /// 606 Not Acceptable
    [606 => NOT_ACCEPTABLE_606, "Not Acceptable"];
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn code_kind() {
        assert_eq!(Code::TRYING.kind(), CodeKind::Provisional);
        assert_eq!(Code::OK.kind(), CodeKind::Success);
        assert_eq!(Code::BAD_REQUEST.kind(), CodeKind::RequestFailure);
        assert_eq!(Code::from(700).kind(), CodeKind::Custom);
    }

    #[test]
    fn code_text() {
        assert_eq!(Code::REQUEST_TERMINATED.text(), Some("Request Terminated"));
        assert_eq!(Code::from(299).text(), None);
    }
}
