//! # eio-core
//!
//! Wire vocabulary shared by every engine crate.
//!
//! - **Packets**: [`Packet`] tagged by [`PacketType`] with an optional [`Payload`]
//! - **Codec**: single-packet frames and batched polling payloads, see [`codec`]
//! - **Protocol**: [`ProtocolVersion`] (`EIO=3` / `EIO=4`) and [`TransportKind`]
//! - **Handshake**: the [`OpenPacket`] record sent in the `open` packet
//! - **IDs**: unguessable [`SessionId`]s
//! - **Logging**: `tracing` subscriber initialisation

#![deny(unsafe_code)]

pub mod codec;
pub mod errors;
pub mod handshake;
pub mod ids;
pub mod logging;
pub mod packet;
pub mod protocol;

pub use codec::{
    Frame, check_frame, check_payload, decode_frame, decode_payload, encode_frame, encode_payload,
};
pub use errors::{DecodeError, EncodeError};
pub use handshake::OpenPacket;
pub use ids::SessionId;
pub use packet::{Packet, PacketType, Payload};
pub use protocol::{ProtocolVersion, TransportKind};
