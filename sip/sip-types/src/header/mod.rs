//! Contains everything header related

use crate::print::PrintCtx;
use anyhow::Context;
use bytes::Bytes;
use bytesstr::BytesStr;
use headers::OneOrMore;
use internal::{Finish, IResult};
use name::Name;

mod error;
pub mod headers;
pub mod multiple;
pub(crate) mod name;

pub use error::HeaderError;

// ==== PARSE TRAITS ====

/// Assign a constant header name to a type.
///
/// Is used by [`Headers`](headers::Headers)'s `(get/take)_named` API so no
/// name has to be provided by the caller.
pub trait ConstNamed {
    const NAME: Name;
}

/// Decode a header from one or more values. Used to parse headers from [`Headers`](headers::Headers).
pub trait DecodeValues: Sized {
    /// Decode a header from a iterator of [`BytesStr`].
    ///
    /// Implementations should assume that `values` will always yield at least one value
    fn decode<'i, I>(values: &mut I) -> anyhow::Result<(&'i str, Self)>
    where
        I: Iterator<Item = &'i BytesStr>;
}

/// Simplified parse trait which plays nicer with nom parsers. Should be implemented
/// by any header that only cares about a single header value.
pub trait HeaderParse: Sized {
    fn parse<'i>(src: &'i Bytes, i: &'i str) -> IResult<&'i str, Self>;
}

// ==== PRINT TRAITS ====

/// Assign a dynamic header name to a type.
/// Used for [`Headers`](headers::Headers)'s `insert_named(_front)` API.
///
/// Can be used for enum holding different header variants.
pub trait DynNamed {
    fn name(&self) -> Name;
}

impl<T: ConstNamed> DynNamed for T {
    fn name(&self) -> Name {
        T::NAME
    }
}

/// Insert a header type into [`Headers`](headers::Headers).
pub trait ExtendValues {
    /// Called when there already existing values.
    ///
    /// Implementations may want to override or extend
    /// `values`, depending on the type of header.
    fn extend_values(&self, ctx: PrintCtx<'_>, values: &mut OneOrMore);

    /// Called when there are no existing values.
    ///
    /// Must generate header value to be inserted into [`Headers`](headers::Headers).
    fn create_values(&self, ctx: PrintCtx<'_>) -> OneOrMore;
}

// ==== BLANKET IMPL ====

impl<H: HeaderParse> DecodeValues for H {
    fn decode<'i, I>(values: &mut I) -> anyhow::Result<(&'i str, Self)>
    where
        I: Iterator<Item = &'i BytesStr>,
    {
        let value = values.next().context("no items in values")?;

        H::parse(value.as_ref(), value.as_str())
            .finish()
            .map_err(|e| e.into_inner())
    }
}

pub mod typed;
