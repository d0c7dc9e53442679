//! The [`Packet`] value: addressing, body, and the exact bytes that travel.

use serde::{Deserialize, Serialize};

use crate::{Address, PacketBody, PacketType};

/// A typed packet together with its encoded frame.
///
/// Packets are immutable. Only [`PacketFactory`](crate::PacketFactory)
/// constructs them, either from structured arguments or by parsing a frame,
/// so `data()` is always the frame that corresponds to the typed fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    source: Address,
    destination: Address,
    body: PacketBody,
    data: Vec<u8>,
}

impl Packet {
    pub(crate) fn new(
        source: Address,
        destination: Address,
        body: PacketBody,
        data: Vec<u8>,
    ) -> Self {
        Self {
            source,
            destination,
            body,
            data,
        }
    }

    pub fn source(&self) -> Address {
        self.source
    }

    pub fn destination(&self) -> Address {
        self.destination
    }

    pub fn body(&self) -> &PacketBody {
        &self.body
    }

    pub fn packet_type(&self) -> PacketType {
        self.body.packet_type()
    }

    /// The encoded frame, ready to hand to a transport.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns `true` for reachability probes.
    pub fn is_echo(&self) -> bool {
        self.body.is_echo()
    }
}

/// Serialized shape of a packet before sealing.
#[derive(Serialize, Deserialize)]
pub(crate) struct Wire<B> {
    pub(crate) src: Address,
    pub(crate) dst: Address,
    pub(crate) body: B,
}
