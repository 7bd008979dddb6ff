// Copyright (c) 2024, The QuicFuscate Project Authors.
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions are
// met:
//
//     * Redistributions of source code must retain the above copyright
//       notice, this list of conditions and the following disclaimer.
//
//     * Redistributions in binary form must reproduce the above
//       copyright notice, this list of conditions and the following disclaimer
//       in the documentation and/or other materials provided with the
//       distribution.
//
//     * Neither the name of the copyright holder nor the names of its
//       contributors may be used to endorse or promote products derived from
//       this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS
// "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT
// LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR
// A PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT
// OWNER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT
// LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE,
// DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY
// THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT
// (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE
// OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

use super::gf_tables::Field;
use crate::error::{Result, SncError};

/// Bytes used by the generation id on the wire (big-endian `u32`).
pub const GID_BYTES: usize = 4;

/// A coded packet: one linear combination of a generation's symbols.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub gid: u32,
    /// One field element per generation member, in `symbols_of` order.
    pub coefficients: Vec<u8>,
    pub payload: Vec<u8>,
    pub field: Field,
}

/// Out-of-band agreement between producer and consumer on packet shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketLayout {
    pub generation_size: usize,
    pub payload_size: usize,
    pub field: Field,
}

impl PacketLayout {
    pub fn new(generation_size: usize, payload_size: usize, field: Field) -> Self {
        Self {
            generation_size,
            payload_size,
            field,
        }
    }

    pub fn coefficient_bytes(&self) -> usize {
        match self.field {
            Field::Binary => self.generation_size.div_ceil(8),
            Field::Gf256 => self.generation_size,
        }
    }

    pub fn wire_len(&self) -> usize {
        GID_BYTES + self.coefficient_bytes() + self.payload_size
    }

    /// Checks that an in-memory packet has exactly this layout's shape.
    pub fn check(&self, pkt: &Packet) -> Result<()> {
        if pkt.field != self.field {
            return Err(SncError::MalformedPacket(format!(
                "field {:?} does not match session field {:?}",
                pkt.field, self.field
            )));
        }
        if pkt.coefficients.len() != self.generation_size {
            return Err(SncError::MalformedPacket(format!(
                "expected {} coefficients, got {}",
                self.generation_size,
                pkt.coefficients.len()
            )));
        }
        if pkt.payload.len() != self.payload_size {
            return Err(SncError::MalformedPacket(format!(
                "expected {} payload bytes, got {}",
                self.payload_size,
                pkt.payload.len()
            )));
        }
        if let Some(c) = pkt.coefficients.iter().find(|&&c| !self.field.contains(c)) {
            return Err(SncError::MalformedPacket(format!(
                "coefficient {c} outside {:?}",
                self.field
            )));
        }
        Ok(())
    }
}

impl Packet {
    /// Whether the coefficient vector is all zero. Such a packet carries no
    /// information.
    pub fn is_zero(&self) -> bool {
        self.coefficients.iter().all(|&c| c == 0)
    }

    /// Serializes the packet for transmission.
    /// Frame format: <gid (4, BE)> <coefficients> <payload>
    pub fn serialize(&self, layout: &PacketLayout) -> Result<Vec<u8>> {
        layout.check(self)?;
        let mut out = Vec::with_capacity(layout.wire_len());
        out.extend_from_slice(&self.gid.to_be_bytes());
        match layout.field {
            Field::Binary => {
                let start = out.len();
                out.resize(start + layout.coefficient_bytes(), 0);
                for (i, &c) in self.coefficients.iter().enumerate() {
                    if c != 0 {
                        out[start + i / 8] |= 1 << (i % 8);
                    }
                }
            }
            Field::Gf256 => out.extend_from_slice(&self.coefficients),
        }
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// Exact inverse of [`Packet::serialize`].
    pub fn deserialize(buf: &[u8], layout: &PacketLayout) -> Result<Self> {
        if buf.len() != layout.wire_len() {
            return Err(SncError::MalformedPacket(format!(
                "expected {} bytes, got {}",
                layout.wire_len(),
                buf.len()
            )));
        }
        let (gid_bytes, rest) = buf.split_at(GID_BYTES);
        let (coeff_bytes, payload) = rest.split_at(layout.coefficient_bytes());
        let gid = u32::from_be_bytes([gid_bytes[0], gid_bytes[1], gid_bytes[2], gid_bytes[3]]);

        let coefficients = match layout.field {
            Field::Binary => {
                let g = layout.generation_size;
                if g % 8 != 0 {
                    let tail = coeff_bytes[coeff_bytes.len() - 1] >> (g % 8);
                    if tail != 0 {
                        return Err(SncError::MalformedPacket(
                            "padding bits set in coefficient vector".into(),
                        ));
                    }
                }
                (0..g).map(|i| (coeff_bytes[i / 8] >> (i % 8)) & 1).collect()
            }
            Field::Gf256 => coeff_bytes.to_vec(),
        };

        Ok(Packet {
            gid,
            coefficients,
            payload: payload.to_vec(),
            field: layout.field,
        })
    }
}
