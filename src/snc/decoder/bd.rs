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

use super::{DecoderStats, GenerationState};
use crate::error::Result;
use crate::snc::generation::GenerationManager;
use crate::snc::gf_tables::Field;
use crate::snc::packet::Packet;
use crate::snc::params::Parameters;
use crate::telemetry;
use log::{debug, warn};

/// Storage for one pivot row of a band system. Offsets are relative to the
/// row's pivot column, so offset 0 is the (unit) diagonal.
pub(super) trait BandRow: Sized {
    fn from_dense(field: Field, dense: &[u8], message: Vec<u8>) -> Self;
    /// `window[i] += c * row[i]` over the row's span. Returns the work done.
    fn eliminate_into(&self, field: Field, window: &mut [u8], c: u8) -> u64;
    fn coefficient(&self, offset: usize) -> u8;
    fn clear(&mut self, offset: usize);
    fn message(&self) -> &[u8];
    fn message_mut(&mut self) -> &mut [u8];
}

/// Row with its band slice stored verbatim.
pub(super) struct DenseRow {
    coefficients: Vec<u8>,
    message: Vec<u8>,
}

impl BandRow for DenseRow {
    fn from_dense(_field: Field, dense: &[u8], message: Vec<u8>) -> Self {
        Self {
            coefficients: dense.to_vec(),
            message,
        }
    }

    fn eliminate_into(&self, field: Field, window: &mut [u8], c: u8) -> u64 {
        field.mul_add_region(window, &self.coefficients, c);
        self.coefficients.len() as u64
    }

    fn coefficient(&self, offset: usize) -> u8 {
        self.coefficients.get(offset).copied().unwrap_or(0)
    }

    fn clear(&mut self, offset: usize) {
        if let Some(c) = self.coefficients.get_mut(offset) {
            *c = 0;
        }
    }

    fn message(&self) -> &[u8] {
        &self.message
    }

    fn message_mut(&mut self) -> &mut [u8] {
        &mut self.message
    }
}

/// Global upper-triangular system whose rows never reach more than `reach`
/// columns past their pivot.
pub(super) struct BandEliminator<R> {
    field: Field,
    reach: usize,
    rows: Vec<Option<R>>,
    dof: usize,
}

impl<R: BandRow> BandEliminator<R> {
    pub fn new(field: Field, symbols: usize, reach: usize) -> Self {
        Self {
            field,
            reach,
            rows: (0..symbols).map(|_| None).collect(),
            dof: 0,
        }
    }

    pub fn dof(&self) -> usize {
        self.dof
    }

    pub fn is_complete(&self) -> bool {
        self.dof == self.rows.len()
    }

    pub fn has_pivot(&self, col: usize) -> bool {
        self.rows[col].is_some()
    }

    /// Eliminates a row whose nonzeros lie in `[start, start + window.len())`.
    /// The window grows on demand but never past `reach` beyond the column
    /// being eliminated.
    pub fn insert(
        &mut self,
        start: usize,
        mut window: Vec<u8>,
        mut message: Vec<u8>,
        ops: &mut u64,
    ) -> Result<bool> {
        let field = self.field;
        let limit = self.rows.len() - start;
        let mut off = 0;
        while off < window.len() {
            let c = window[off];
            if c == 0 {
                off += 1;
                continue;
            }
            let col = start + off;
            let span = (off + self.reach).min(limit);
            if window.len() < span {
                window.resize(span, 0);
            }
            match &self.rows[col] {
                Some(row) => {
                    *ops += row.eliminate_into(field, &mut window[off..span], c);
                    field.mul_add_region(&mut message, row.message(), c);
                    *ops += message.len() as u64;
                }
                None => {
                    debug_assert!(window[span..].iter().all(|&x| x == 0));
                    let inv = field.inv(c)?;
                    let dense = &mut window[off..span];
                    field.scale_region(dense, inv);
                    field.scale_region(&mut message, inv);
                    *ops += (dense.len() + message.len()) as u64;
                    self.rows[col] = Some(R::from_dense(field, dense, message));
                    self.dof += 1;
                    return Ok(true);
                }
            }
            off += 1;
        }
        Ok(false)
    }

    /// Back-substitution from the last column. Only valid once complete.
    pub fn solve(&mut self, ops: &mut u64) -> Vec<Vec<u8>> {
        let field = self.field;
        for col in (0..self.rows.len()).rev() {
            let (head, tail) = self.rows.split_at_mut(col);
            let Some(pivot) = tail[0].as_ref() else {
                continue;
            };
            let first = col.saturating_sub(self.reach.saturating_sub(1));
            for (i, slot) in head.iter_mut().enumerate().skip(first) {
                let Some(row) = slot.as_mut() else { continue };
                let c = row.coefficient(col - i);
                if c != 0 {
                    field.mul_add_region(row.message_mut(), pivot.message(), c);
                    row.clear(col - i);
                    *ops += pivot.message().len() as u64;
                }
            }
        }
        self.dof = 0;
        self.rows
            .iter_mut()
            .map(|r| r.take().map(|row| row.message().to_vec()).unwrap_or_default())
            .collect()
    }
}

/// Band decoder: one global triangular system in symbol order, each row kept
/// as a dense slice of at most `generation_size` coefficients.
pub struct BdDecoder {
    generations: GenerationManager,
    elim: BandEliminator<DenseRow>,
    banded: bool,
    stats: DecoderStats,
}

impl BdDecoder {
    pub fn new(params: &Parameters) -> Result<Self> {
        let generations = GenerationManager::new(params)?;
        let banded = generations.is_banded();
        if !banded {
            warn!(
                "band decoder paired with a non-banded {:?} grouping; packets will be discarded",
                params.code()
            );
        }
        Ok(Self {
            elim: BandEliminator::new(
                params.field(),
                params.symbol_count(),
                params.generation_size(),
            ),
            generations,
            banded,
            stats: DecoderStats::default(),
        })
    }

    pub(super) fn process(&mut self, pkt: &Packet) -> Result<()> {
        self.stats.received += 1;
        if !self.banded {
            self.stats.discarded += 1;
            return Ok(());
        }
        if self.finished() {
            self.stats.non_innovative += 1;
            telemetry::PACKETS_NON_INNOVATIVE.inc();
            return Ok(());
        }

        let start = self.generations.members(pkt.gid as usize)[0];
        let innovative = self.elim.insert(
            start,
            pkt.coefficients.clone(),
            pkt.payload.clone(),
            &mut self.stats.operations,
        )?;
        if innovative {
            self.stats.innovative += 1;
        } else {
            self.stats.non_innovative += 1;
            telemetry::PACKETS_NON_INNOVATIVE.inc();
        }

        if self.elim.is_complete() {
            debug!("band system full rank, back-substituting");
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

pub(super) fn finalize_all(generations: &mut GenerationManager, values: Vec<Vec<u8>>) {
    for (sym, value) in values.into_iter().enumerate() {
        generations.finalize(sym, &value);
    }
    for _ in 0..generations.generation_count() {
        telemetry::GENERATIONS_COMPLETED.inc();
    }
}

pub(super) fn band_generation_state(
    generations: &GenerationManager,
    finished: bool,
    has_pivot: impl Fn(usize) -> bool,
    gid: usize,
) -> GenerationState {
    if finished {
        return GenerationState::Complete;
    }
    let members = generations.members(gid);
    match members.iter().filter(|&&c| has_pivot(c)).count() {
        0 => GenerationState::Empty,
        rank if rank == members.len() => GenerationState::Complete,
        rank => GenerationState::Collecting { rank },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_stays_within_reach() {
        let f = Field::Gf256;
        let mut elim: BandEliminator<DenseRow> = BandEliminator::new(f, 6, 3);
        let mut ops = 0;
        assert!(elim.insert(0, vec![1, 2, 3], vec![7], &mut ops).unwrap());
        // same leading column forces elimination into columns 1..3
        assert!(elim.insert(0, vec![1, 5, 0], vec![9], &mut ops).unwrap());
        assert!(elim.has_pivot(1));
        assert!(!elim.insert(0, vec![1, 2, 3], vec![7], &mut ops).unwrap());
        assert_eq!(elim.dof(), 2);
    }
}
