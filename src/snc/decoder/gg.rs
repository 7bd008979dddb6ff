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

use super::running_matrix::RunningMatrix;
use super::{DecoderStats, GenerationState};
use crate::error::Result;
use crate::snc::generation::GenerationManager;
use crate::snc::packet::Packet;
use crate::snc::params::Parameters;
use crate::telemetry;
use log::debug;
use std::collections::VecDeque;

/// Generation-by-generation Gaussian elimination.
///
/// Each generation keeps its own [`RunningMatrix`]. When one completes, its
/// symbols are pinned in every sibling that shares them, which may complete
/// those in turn.
pub struct GgDecoder {
    pub(super) generations: GenerationManager,
    pub(super) matrices: Vec<RunningMatrix>,
    pub(super) complete: Vec<bool>,
    /// Highest rank each generation has reached. Pinning and the overlap-aware
    /// merge shrink the matrices, reported progress must not.
    peak: Vec<usize>,
    pub(super) stats: DecoderStats,
}

impl GgDecoder {
    pub fn new(params: &Parameters) -> Result<Self> {
        let generations = GenerationManager::new(params)?;
        let matrices = (0..generations.generation_count())
            .map(|gid| RunningMatrix::new(params.field(), generations.members(gid).len()))
            .collect();
        Ok(Self {
            complete: vec![false; generations.generation_count()],
            peak: vec![0; generations.generation_count()],
            generations,
            matrices,
            stats: DecoderStats::default(),
        })
    }

    pub(super) fn process(&mut self, pkt: &Packet) -> Result<()> {
        self.stats.received += 1;
        let gid = pkt.gid as usize;
        if self.complete[gid] {
            self.stats.non_innovative += 1;
            telemetry::PACKETS_NON_INNOVATIVE.inc();
            return Ok(());
        }

        let (coefficients, message) = self.mask_known(pkt);
        if self.matrices[gid].insert(coefficients, message, &mut self.stats.operations)? {
            self.peak[gid] = self.peak[gid].max(self.matrices[gid].rank());
            self.stats.innovative += 1;
        } else {
            self.stats.non_innovative += 1;
            telemetry::PACKETS_NON_INNOVATIVE.inc();
        }

        if self.matrices[gid].is_complete() {
            self.complete_generations(gid)?;
        }
        Ok(())
    }

    /// Copies the packet with every already-finalized symbol substituted out.
    pub(super) fn mask_known(&mut self, pkt: &Packet) -> (Vec<u8>, Vec<u8>) {
        let field = self.generations.params().field();
        let mut coefficients = pkt.coefficients.clone();
        let mut message = pkt.payload.clone();
        for (pos, &sym) in self.generations.members(pkt.gid as usize).iter().enumerate() {
            let c = coefficients[pos];
            if c != 0 && self.generations.is_finalized(sym) {
                field.mul_add_region(&mut message, self.generations.symbol(sym), c);
                coefficients[pos] = 0;
                self.stats.operations += message.len() as u64;
            }
        }
        (coefficients, message)
    }

    /// Decodes `first` and then every generation that completes as a
    /// consequence, in discovery order.
    fn complete_generations(&mut self, first: usize) -> Result<()> {
        let field = self.generations.params().field();
        let mut pending = VecDeque::from([first]);
        while let Some(gid) = pending.pop_front() {
            if self.complete[gid] {
                continue;
            }
            self.complete[gid] = true;
            telemetry::GENERATIONS_COMPLETED.inc();
            let solved = self.matrices[gid].solve(&mut self.stats.operations);
            self.matrices[gid] = RunningMatrix::new(field, 0);

            let mut fresh = Vec::with_capacity(solved.len());
            for (pos, value) in solved {
                let sym = self.generations.members(gid)[pos];
                if self.generations.finalize(sym, &value) {
                    fresh.push(sym);
                }
            }
            debug!(
                "generation {} decoded, {} new symbols, {}/{} known",
                gid,
                fresh.len(),
                self.generations.finalized_count(),
                self.generations.symbol_count()
            );
            for sym in fresh {
                self.pin_everywhere(sym, &mut pending)?;
            }
        }
        Ok(())
    }

    fn pin_everywhere(&mut self, sym: usize, pending: &mut VecDeque<usize>) -> Result<()> {
        let GgDecoder {
            generations,
            matrices,
            complete,
            peak,
            stats,
        } = self;
        for &(gid, pos) in generations.memberships(sym) {
            if complete[gid] {
                continue;
            }
            matrices[gid].pin(pos, generations.symbol(sym), &mut stats.operations)?;
            peak[gid] = peak[gid].max(matrices[gid].rank());
            if matrices[gid].is_complete() {
                pending.push_back(gid);
            }
        }
        Ok(())
    }

    pub fn finished(&self) -> bool {
        self.generations.finalized_count() == self.generations.symbol_count()
    }

    /// Known symbols plus the rows held by generations still collecting.
    pub fn rank(&self) -> usize {
        self.generations.finalized_count()
            + self
                .matrices
                .iter()
                .zip(&self.complete)
                .filter(|(_, done)| !**done)
                .map(|(m, _)| m.rank())
                .sum::<usize>()
    }

    pub fn generation_state(&self, gid: usize) -> GenerationState {
        if self.complete[gid] {
            GenerationState::Complete
        } else {
            match self.peak[gid].max(self.matrices[gid].rank()) {
                0 => GenerationState::Empty,
                rank => GenerationState::Collecting { rank },
            }
        }
    }

    pub fn generations(&self) -> &GenerationManager {
        &self.generations
    }
}
