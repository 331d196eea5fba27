//! Wire-level primitives shared by every transport: the byte-buffer cursor codec, the
//! 8-byte message header, CRC-32 framing validation, and stateful message assembly.

pub mod buffer;
pub mod crc;
pub mod error;
pub mod header;
pub mod message;

pub use buffer::{ReadCursor, WriteCursor};
pub use error::{WireError, WireResult};
pub use header::Header;
pub use message::Message;
