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

//! # Sparse Network Coding (SNC)
//!
//! Source data is cut into fixed-size symbols, the symbols are grouped into
//! (possibly overlapping) generations, and every coded packet is a random
//! linear combination of one generation's symbols over GF(2) or GF(2^8).
//! Packets can be lost, reordered or recoded in transit; any receiver that
//! collects enough independent combinations recovers the data.
//!
//! ```text
//! Parameters -> GenerationManager -> Encoder -> Packet -> Decoder -> bytes
//! ```
//!
//! The decoder is selected per session from four strategies (see
//! [`DecoderKind`]). Random codes pair naturally with `Gg`/`Oa`, band codes
//! with `Bd`/`Cbd`.

pub mod chunk;
pub mod decoder;
pub mod encoder;
pub mod generation;
pub mod gf_tables;
pub mod packet;
pub mod params;
pub mod recoder;

pub use chunk::{
    verify_copy, write_atomically, ChunkConfig, ChunkDriver, ChunkReport, SessionTemplate,
};
pub use decoder::{Decoder, DecoderKind, DecoderOptions, DecoderStats, GenerationState};
pub use encoder::{CoefficientDistribution, Encoder, EncoderOptions, SchedulePolicy};
pub use generation::GenerationManager;
pub use gf_tables::{init_gf_tables, Field};
pub use packet::{Packet, PacketLayout};
pub use params::{CodeFamily, ParameterSet, Parameters, SessionInfo};
pub use recoder::{RecodeSchedule, Recoder};

use crate::error::Result;
use log::debug;

/// Encoding side of a session: the loaded source plus encoder state.
pub struct Session {
    generations: GenerationManager,
    encoder: Encoder,
}

impl Session {
    pub fn new(params: &Parameters) -> Result<Self> {
        Self::with_encoder(params, Encoder::new(EncoderOptions::default()))
    }

    pub fn with_seed(params: &Parameters, options: EncoderOptions, seed: u64) -> Result<Self> {
        Self::with_encoder(params, Encoder::with_seed(options, seed))
    }

    pub fn with_encoder(params: &Parameters, encoder: Encoder) -> Result<Self> {
        init_gf_tables();
        let generations = GenerationManager::new(params)?;
        debug!(
            "session: {} symbols, {} generations of {}",
            params.symbol_count(),
            params.generation_count(),
            params.generation_size()
        );
        Ok(Self {
            generations,
            encoder,
        })
    }

    pub fn load_source(&mut self, buffer: &[u8], offset: usize) -> Result<()> {
        self.generations.load(buffer, offset)
    }

    pub fn generate_packet(&mut self) -> Packet {
        self.encoder.generate_packet(&self.generations)
    }

    pub fn generations(&self) -> &GenerationManager {
        &self.generations
    }

    pub fn params(&self) -> &Parameters {
        self.generations.params()
    }
}

/// Validates `set` and opens an encoding session for it.
pub fn create_session(set: ParameterSet) -> Result<Session> {
    Session::new(&Parameters::new(set)?)
}

pub fn create_decoder(params: &Parameters, kind: DecoderKind) -> Result<Decoder> {
    init_gf_tables();
    Decoder::new(params, kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SncError;

    #[test]
    fn create_session_rejects_bad_parameters() {
        let err = create_session(ParameterSet::default()).err();
        assert!(matches!(err, Some(SncError::InvalidParameter(_))));
    }

    #[test]
    fn session_feeds_decoder_over_the_wire() {
        let set = ParameterSet {
            data_size: 3000,
            payload_size: 100,
            generation_size: 10,
            band_size: 5,
            code: CodeFamily::Band,
            field: Field::Gf256,
            ..ParameterSet::default()
        };
        let src: Vec<u8> = (0..3100u32).map(|i| (i % 241) as u8).collect();
        let mut session = create_session(set).unwrap();
        session.load_source(&src, 100).unwrap();
        let params = session.params().clone();
        let layout = params.packet_layout();
        let mut dec = create_decoder(&params, DecoderKind::Bd).unwrap();
        while !dec.finished() {
            let raw = session.generate_packet().serialize(&layout).unwrap();
            dec.process_packet(&Packet::deserialize(&raw, &layout).unwrap())
                .unwrap();
        }
        assert_eq!(dec.recover().unwrap(), &src[100..]);
    }
}
