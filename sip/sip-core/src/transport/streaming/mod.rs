//! Shared implementation of connection oriented byte-stream transports

mod decode;
mod generalized;

pub(crate) use decode::StreamingDecoder;
pub use generalized::{
    StreamingFactory, StreamingListener, StreamingListenerBuilder, StreamingTransport,
};
