#![forbid(unsafe_code)]

#[macro_use]
mod macros;
pub mod print;
pub mod uri;
mod code;
pub mod header;
pub mod host;
mod method;
pub mod msg;
pub(crate) mod parse;

pub use code::Code;
pub use code::CodeKind;

pub use method::Method;

pub use header::headers::Headers;
pub use header::name::Name;

#[doc(hidden)]
pub mod _private_reexport {
    pub use anyhow;
    pub use bytes::Bytes;
    pub use internal::{IResult, ParseError};
    pub use nom;
}
