//! Typed header implementations

mod allow;
mod call_id;
mod contact;
mod content;
mod cseq;
mod expires;
mod from_to;
mod max_fwd;
mod routing;
mod via;

pub use allow::Allow;
pub use call_id::CallID;
pub use contact::Contact;
pub use content::{ContentLength, ContentType};
pub use cseq::CSeq;
pub use expires::Expires;
pub use from_to::{From, FromTo, To};
pub use max_fwd::MaxForwards;
pub use routing::{RecordRoute, Route, Routing};
pub use via::Via;
