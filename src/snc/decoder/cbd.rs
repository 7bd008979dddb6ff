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

use super::bd::{band_generation_state, finalize_all, BandEliminator, BandRow};
use super::{DecoderStats, GenerationState};
use crate::error::Result;
use crate::snc::generation::GenerationManager;
use crate::snc::gf_tables::Field;
use crate::snc::packet::Packet;
use crate::snc::params::Parameters;
use crate::telemetry;
use log::{debug, info};

enum RowStorage {
    /// One bit per coefficient, LSB-first within each word.
    Bits(Vec<u64>),
    /// Bytes up to the last nonzero coefficient.
    Bytes(Vec<u8>),
}

/// Band row stored in compressed form.
pub(super) struct CompactRow {
    storage: RowStorage,
    message: Vec<u8>,
}

impl CompactRow {
    #[cfg(test)]
    fn span(&self) -> usize {
        match &self.storage {
            RowStorage::Bits(words) => words.len() * 64,
            RowStorage::Bytes(bytes) => bytes.len(),
        }
    }
}

impl BandRow for CompactRow {
    fn from_dense(field: Field, dense: &[u8], message: Vec<u8>) -> Self {
        let len = dense.iter().rposition(|&c| c != 0).map_or(0, |p| p + 1);
        let storage = match field {
            Field::Binary => {
                let mut words = vec![0u64; len.div_ceil(64)];
                for (i, &c) in dense[..len].iter().enumerate() {
                    if c & 1 == 1 {
                        words[i / 64] |= 1 << (i % 64);
                    }
                }
                RowStorage::Bits(words)
            }
            Field::Gf256 => RowStorage::Bytes(dense[..len].to_vec()),
        };
        Self { storage, message }
    }

    fn eliminate_into(&self, field: Field, window: &mut [u8], c: u8) -> u64 {
        match &self.storage {
            RowStorage::Bits(words) => {
                let mut work = 0;
                for (w, &word) in words.iter().enumerate() {
                    let mut bits = word;
                    while bits != 0 {
                        let i = w * 64 + bits.trailing_zeros() as usize;
                        window[i] ^= c & 1;
                        bits &= bits - 1;
                        work += 1;
                    }
                }
                work
            }
            RowStorage::Bytes(bytes) => {
                field.mul_add_region(window, bytes, c);
                bytes.len() as u64
            }
        }
    }

    fn coefficient(&self, offset: usize) -> u8 {
        match &self.storage {
            RowStorage::Bits(words) => words
                .get(offset / 64)
                .map_or(0, |w| ((w >> (offset % 64)) & 1) as u8),
            RowStorage::Bytes(bytes) => bytes.get(offset).copied().unwrap_or(0),
        }
    }

    fn clear(&mut self, offset: usize) {
        match &mut self.storage {
            RowStorage::Bits(words) => {
                if let Some(w) = words.get_mut(offset / 64) {
                    *w &= !(1 << (offset % 64));
                }
            }
            RowStorage::Bytes(bytes) => {
                if let Some(c) = bytes.get_mut(offset) {
                    *c = 0;
                }
            }
        }
    }

    fn message(&self) -> &[u8] {
        &self.message
    }

    fn message_mut(&mut self) -> &mut [u8] {
        &mut self.message
    }
}

/// Compact band decoder.
///
/// Same elimination as [`super::BdDecoder`], with rows compressed. Groupings
/// that are not banded fall back to full-width rows, so a mismatched stream
/// still decodes, just without the memory bound.
pub struct CbdDecoder {
    generations: GenerationManager,
    elim: BandEliminator<CompactRow>,
    naive: bool,
    stats: DecoderStats,
}

impl CbdDecoder {
    pub fn new(params: &Parameters) -> Result<Self> {
        let generations = GenerationManager::new(params)?;
        let naive = !generations.is_banded();
        let reach = if naive {
            info!("compact band decoder falling back to full-width rows");
            params.symbol_count()
        } else {
            params.generation_size()
        };
        Ok(Self {
            elim: BandEliminator::new(params.field(), params.symbol_count(), reach),
            generations,
            naive,
            stats: DecoderStats::default(),
        })
    }

    pub(super) fn process(&mut self, pkt: &Packet) -> Result<()> {
        self.stats.received += 1;
        if self.finished() {
            self.stats.non_innovative += 1;
            telemetry::PACKETS_NON_INNOVATIVE.inc();
            return Ok(());
        }

        let members = self.generations.members(pkt.gid as usize);
        let (start, window) = if self.naive {
            let mut window = vec![0u8; self.generations.symbol_count()];
            for (&sym, &c) in members.iter().zip(&pkt.coefficients) {
                window[sym] = c;
            }
            (0, window)
        } else {
            (members[0], pkt.coefficients.clone())
        };

        let innovative =
            self.elim
                .insert(start, window, pkt.payload.clone(), &mut self.stats.operations)?;
        if innovative {
            self.stats.innovative += 1;
        } else {
            self.stats.non_innovative += 1;
            telemetry::PACKETS_NON_INNOVATIVE.inc();
        }

        if self.elim.is_complete() {
            debug!("compact band system full rank, back-substituting");
            finalize_all(
                &mut self.generations,
                self.elim.solve(&mut self.stats.operations),
            );
        }
        Ok(())
    }

    pub fn finished(&self) -> bool {
        self.generations.finalized_count() == self.generations.symbol_count()
    }

    pub fn rank(&self) -> usize {
        if self.finished() {
            self.generations.symbol_count()
        } else {
            self.elim.dof()
        }
    }

    pub fn generation_state(&self, gid: usize) -> GenerationState {
        band_generation_state(&self.generations, self.finished(), |c| self.elim.has_pivot(c), gid)
    }

    pub fn generations(&self) -> &GenerationManager {
        &self.generations
    }

    pub(super) fn stats(&self) -> &DecoderStats {
        &self.stats
    }

    pub(super) fn stats_mut(&mut self) -> &mut DecoderStats {
        &mut self.stats
    }
}
