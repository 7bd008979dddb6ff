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

//! Recoding at intermediate nodes: fresh combinations of buffered packets,
//! produced without decoding them first.

use super::packet::{Packet, PacketLayout};
use super::params::Parameters;
use crate::error::{Result, SncError};
use crate::telemetry;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Which generation the next recoded packet is drawn from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecodeSchedule {
    /// Any generation, buffered or not.
    Trivial,
    /// Any generation with at least one buffered packet.
    Random,
    /// The generation with the most received-but-unforwarded packets.
    Mlpi,
}

pub struct Recoder {
    layout: PacketLayout,
    capacity: usize,
    buffers: Vec<VecDeque<Packet>>,
    received: Vec<usize>,
    scheduled: Vec<usize>,
    rng: StdRng,
}

impl Recoder {
    pub fn new(params: &Parameters, capacity: usize) -> Result<Self> {
        Self::from_rng(params, capacity, StdRng::from_entropy())
    }

    pub fn with_seed(params: &Parameters, capacity: usize, seed: u64) -> Result<Self> {
        Self::from_rng(params, capacity, StdRng::seed_from_u64(seed))
    }

    fn from_rng(params: &Parameters, capacity: usize, rng: StdRng) -> Result<Self> {
        if capacity == 0 {
            return Err(SncError::InvalidParameter(
                "recoder buffer capacity must be > 0".into(),
            ));
        }
        let count = params.generation_count();
        Ok(Self {
            layout: params.packet_layout(),
            capacity,
            buffers: (0..count).map(|_| VecDeque::with_capacity(capacity)).collect(),
            received: vec![0; count],
            scheduled: vec![0; count],
            rng,
        })
    }

    /// Buffers a packet, evicting the oldest one of its generation when full.
    pub fn buffer_packet(&mut self, pkt: &Packet) -> Result<()> {
        self.layout.check(pkt)?;
        let gid = pkt.gid as usize;
        let Some(buffer) = self.buffers.get_mut(gid) else {
            return Err(SncError::MalformedPacket(format!(
                "generation {gid} out of range"
            )));
        };
        if buffer.len() == self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(pkt.clone());
        self.received[gid] += 1;
        Ok(())
    }

    pub fn buffered(&self, gid: usize) -> usize {
        self.buffers.get(gid).map_or(0, VecDeque::len)
    }

    /// Returns `None` when the scheduled generation has nothing buffered.
    pub fn recode_packet(&mut self, schedule: RecodeSchedule) -> Option<Packet> {
        let gid = self.pick(schedule)?;
        let buffer = &self.buffers[gid];
        if buffer.is_empty() {
            return None;
        }

        let field = self.layout.field;
        let mut weights = vec![0u8; buffer.len()];
        while weights.iter().all(|&w| w == 0) {
            for w in weights.iter_mut() {
                *w = if field.order() == 2 {
                    self.rng.gen::<bool>() as u8
                } else {
                    self.rng.gen()
                };
            }
        }

        let mut coefficients = vec![0u8; self.layout.generation_size];
        let mut payload = vec![0u8; self.layout.payload_size];
        for (pkt, &w) in buffer.iter().zip(&weights) {
            field.mul_add_region(&mut coefficients, &pkt.coefficients, w);
            field.mul_add_region(&mut payload, &pkt.payload, w);
        }
        self.scheduled[gid] += 1;
        telemetry::PACKETS_RECODED.inc();

        Some(Packet {
            gid: gid as u32,
            coefficients,
            payload,
            field,
        })
    }

    fn pick(&mut self, schedule: RecodeSchedule) -> Option<usize> {
        match schedule {
            RecodeSchedule::Trivial => Some(self.rng.gen_range(0..self.buffers.len())),
            RecodeSchedule::Random => {
                let ready: Vec<usize> = (0..self.buffers.len())
                    .filter(|&g| !self.buffers[g].is_empty())
                    .collect();
                if ready.is_empty() {
                    None
                } else {
                    Some(ready[self.rng.gen_range(0..ready.len())])
                }
            }
            RecodeSchedule::Mlpi => (0..self.buffers.len())
                .filter(|&g| !self.buffers[g].is_empty())
                .max_by_key(|&g| {
                    (
                        self.received[g] as isize - self.scheduled[g] as isize,
                        std::cmp::Reverse(g),
                    )
                }),
        }
    }
}
