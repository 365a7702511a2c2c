//! Wire protocol
//!
//! Newline-delimited JSON requests and responses, multiplexed over one
//! connection by request id.

pub mod codec;
pub mod message;

pub use codec::{decode_json, FrameCodec, FrameReader, DEFAULT_MAX_FRAME_SIZE, DEFAULT_MAX_RESPONSE_SIZE};
pub use message::{Call, Outcome, Reply, Request, Response, BAD_REQUEST};
