//! AMS Protocol - Wire protocol for data server communication
//!
//! This crate provides the request/response types, command codes,
//! protocol versioning and the length-delimited codec shared by the
//! data server (amsd) and its clients.

pub mod codec;
pub mod command;
pub mod message;
pub mod version;

pub use codec::{decode_frame, encode_frame, CodecError, JsonCodec, MAX_FRAME_SIZE};
pub use command::{Command, UnknownCommand};
pub use message::{Request, Response};
pub use version::ProtocolVersion;
