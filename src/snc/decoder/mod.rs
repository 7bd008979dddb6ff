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

//! Incremental decoders sharing one contract: feed packets with
//! [`Decoder::process_packet`] until [`Decoder::finished`], then
//! [`Decoder::recover`] the source bytes.

pub mod bd;
pub mod cbd;
pub mod gg;
pub mod oa;
pub(crate) mod running_matrix;

pub use bd::BdDecoder;
pub use cbd::CbdDecoder;
pub use gg::GgDecoder;
pub use oa::OaDecoder;

use super::generation::GenerationManager;
use super::packet::Packet;
use super::params::Parameters;
use crate::error::{Result, SncError};
use crate::telemetry;
use log::warn;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DecoderKind {
    /// Gaussian elimination per generation.
    #[default]
    Gg,
    /// Overlap-aware: per generation first, then one global system.
    Oa,
    /// Band decoder.
    Bd,
    /// Compact band decoder.
    Cbd,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DecoderOptions {
    pub kind: DecoderKind,
    /// OA only: extra packets to wait for before switching to global elimination.
    pub allowed_overhead: usize,
}

/// Per-generation progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerationState {
    Empty,
    Collecting { rank: usize },
    Complete,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DecoderStats {
    pub received: u64,
    pub innovative: u64,
    pub non_innovative: u64,
    pub malformed: u64,
    /// Packets ignored because the grouping does not suit the decoder.
    pub discarded: u64,
    /// Finite-field operations spent so far.
    pub operations: u64,
}

pub enum Decoder {
    Gg(GgDecoder),
    Oa(OaDecoder),
    Bd(BdDecoder),
    Cbd(CbdDecoder),
}

impl Decoder {
    pub fn new(params: &Parameters, kind: DecoderKind) -> Result<Self> {
        Self::with_options(
            params,
            DecoderOptions {
                kind,
                ..DecoderOptions::default()
            },
        )
    }

    pub fn with_options(params: &Parameters, options: DecoderOptions) -> Result<Self> {
        Ok(match options.kind {
            DecoderKind::Gg => Decoder::Gg(GgDecoder::new(params)?),
            DecoderKind::Oa => Decoder::Oa(OaDecoder::new(params, options.allowed_overhead)?),
            DecoderKind::Bd => Decoder::Bd(BdDecoder::new(params)?),
            DecoderKind::Cbd => Decoder::Cbd(CbdDecoder::new(params)?),
        })
    }

    pub fn kind(&self) -> DecoderKind {
        match self {
            Decoder::Gg(_) => DecoderKind::Gg,
            Decoder::Oa(_) => DecoderKind::Oa,
            Decoder::Bd(_) => DecoderKind::Bd,
            Decoder::Cbd(_) => DecoderKind::Cbd,
        }
    }

    /// Ingests one packet. A packet that does not fit the session is rejected
    /// with `MalformedPacket` before it touches any decoding state.
    pub fn process_packet(&mut self, pkt: &Packet) -> Result<()> {
        telemetry::PACKETS_PROCESSED.inc();
        if let Err(e) = self.check(pkt) {
            self.stats_mut().malformed += 1;
            telemetry::PACKETS_MALFORMED.inc();
            warn!("discarding packet: {}", e);
            return Err(e);
        }
        match self {
            Decoder::Gg(d) => d.process(pkt),
            Decoder::Oa(d) => d.process(pkt),
            Decoder::Bd(d) => d.process(pkt),
            Decoder::Cbd(d) => d.process(pkt),
        }
    }

    fn check(&self, pkt: &Packet) -> Result<()> {
        let params = self.generations().params();
        params.packet_layout().check(pkt)?;
        if pkt.gid as usize >= params.generation_count() {
            return Err(SncError::MalformedPacket(format!(
                "generation {} out of range (0..{})",
                pkt.gid,
                params.generation_count()
            )));
        }
        Ok(())
    }

    pub fn finished(&self) -> bool {
        match self {
            Decoder::Gg(d) => d.finished(),
            Decoder::Oa(d) => d.finished(),
            Decoder::Bd(d) => d.finished(),
            Decoder::Cbd(d) => d.finished(),
        }
    }

    /// The decoded source bytes.
    pub fn recover(&self) -> Result<Vec<u8>> {
        self.generations().materialize()
    }

    /// Degrees of freedom held: known symbols plus pending independent rows.
    pub fn rank(&self) -> usize {
        match self {
            Decoder::Gg(d) => d.rank(),
            Decoder::Oa(d) => d.rank(),
            Decoder::Bd(d) => d.rank(),
            Decoder::Cbd(d) => d.rank(),
        }
    }

    pub fn generation_state(&self, gid: usize) -> Result<GenerationState> {
        if gid >= self.generations().generation_count() {
            return Err(SncError::InvalidParameter(format!("no generation {gid}")));
        }
        Ok(match self {
            Decoder::Gg(d) => d.generation_state(gid),
            Decoder::Oa(d) => d.generation_state(gid),
            Decoder::Bd(d) => d.generation_state(gid),
            Decoder::Cbd(d) => d.generation_state(gid),
        })
    }

    pub fn generations(&self) -> &GenerationManager {
        match self {
            Decoder::Gg(d) => d.generations(),
            Decoder::Oa(d) => d.local().generations(),
            Decoder::Bd(d) => d.generations(),
            Decoder::Cbd(d) => d.generations(),
        }
    }

    pub fn params(&self) -> &Parameters {
        self.generations().params()
    }

    pub fn stats(&self) -> DecoderStats {
        match self {
            Decoder::Gg(d) => d.stats,
            Decoder::Oa(d) => d.local().stats,
            Decoder::Bd(d) => *d.stats(),
            Decoder::Cbd(d) => *d.stats(),
        }
    }

    fn stats_mut(&mut self) -> &mut DecoderStats {
        match self {
            Decoder::Gg(d) => &mut d.stats,
            Decoder::Oa(d) => &mut d.local_mut().stats,
            Decoder::Bd(d) => d.stats_mut(),
            Decoder::Cbd(d) => d.stats_mut(),
        }
    }

    /// Packets received per source symbol.
    pub fn overhead(&self) -> f64 {
        self.stats().received as f64 / self.params().symbol_count() as f64
    }

    /// Field operations per source byte.
    pub fn cost(&self) -> f64 {
        let params = self.params();
        self.stats().operations as f64
            / params.symbol_count() as f64
            / params.payload_size() as f64
    }
}
