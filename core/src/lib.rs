//! A crate to read and write NDEF records on NFC tags through a reader delegate.

#[cfg(not(feature = "tracing"))]
macro_rules! debug {
    ($($t: tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! info {
    ($($t: tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! warn {
    ($($t: tt)*) => {};
}

#[cfg(feature = "pcsc")]
pub mod pcsc;

pub mod form;
pub mod ndef;
pub mod nfc;
pub mod record;
pub mod render;
pub mod session;
pub mod type4;
pub mod write;

pub use record::{Record, RecordType, TagMessage};
pub use session::Session;
pub use write::WriteRequest;
