//! Envelope wire model and codec.
//!
//! Every record on the topic passes through here twice:
//! 1. `codec::decode()` — transport payload → typed `Envelope`
//! 2. `codec::encode()` — composed `OutboundReply` → transport payload
//!
//! Decoding never fails. Anything unparseable degrades to `MessageKind::Unknown`
//! with the raw text as content.

pub mod codec;
pub mod types;

pub use codec::{decode, encode};
pub use types::{Envelope, EnvelopeMeta, MessageKind, OutboundReply, RawPayload};
