//! mg_proto — wire framing, command messages, and sealed envelopes
//!
//! The request/response protocol is line-of-sight simple: a 3-byte frame
//! header (type byte + big-endian u16 length), JSON command payloads, and
//! HTTP-flavored numeric status codes. Anything larger than one frame is
//! split into a multipart sequence whose declared total is verified on
//! reassembly.
//!
//! # Modules
//! - `frame`    — the byte-level codec, generic over async streams
//! - `message`  — Request/Response JSON types and status codes
//! - `envelope` — DeliveryTag sealing/opening and the envelope file format

pub mod envelope;
pub mod error;
pub mod frame;
pub mod message;

pub use envelope::{DeliveryTag, SealedDeliveryTag, SealedEnvelope};
pub use error::ProtoError;
pub use frame::MAX_MSG_SIZE;
pub use message::{Request, Response};
