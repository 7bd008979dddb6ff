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

use super::gg::GgDecoder;
use super::running_matrix::RunningMatrix;
use super::GenerationState;
use crate::error::Result;
use crate::snc::packet::Packet;
use crate::snc::params::Parameters;
use crate::telemetry;
use log::{debug, info};
use std::collections::VecDeque;

/// Overlap-aware decoder.
///
/// Runs the per-generation decoder until the rows it holds could, in total,
/// determine every remaining symbol. At that point the rows of all unfinished
/// generations are merged into one system over the unknown symbols, with the
/// column order chosen by peeling with inactivation so that most rows drop in
/// as pivots without fill-in. Later packets go straight into that system.
pub struct OaDecoder {
    local: GgDecoder,
    allowed_overhead: usize,
    global: Option<GlobalSystem>,
}

struct GlobalSystem {
    /// position -> symbol
    columns: Vec<usize>,
    /// symbol -> position, for symbols unknown when the system was built
    position: Vec<Option<usize>>,
    matrix: RunningMatrix,
}

impl OaDecoder {
    pub fn new(params: &Parameters, allowed_overhead: usize) -> Result<Self> {
        Ok(Self {
            local: GgDecoder::new(params)?,
            allowed_overhead,
            global: None,
        })
    }

    pub(super) fn process(&mut self, pkt: &Packet) -> Result<()> {
        if self.global.is_some() {
            return self.process_global(pkt);
        }
        self.local.process(pkt)?;
        if !self.finished() && self.ready_for_global() {
            self.build_global()?;
        }
        Ok(())
    }

    fn ready_for_global(&self) -> bool {
        let n = self.local.generations.symbol_count();
        self.local.stats.received as usize >= n + self.allowed_overhead && self.local.rank() >= n
    }

    fn build_global(&mut self) -> Result<()> {
        let gm = &self.local.generations;
        let field = gm.params().field();
        let n = gm.symbol_count();

        let unknown: Vec<usize> = (0..n).filter(|&s| !gm.is_finalized(s)).collect();
        let mut index = vec![None; n];
        for (i, &s) in unknown.iter().enumerate() {
            index[s] = Some(i);
        }

        // Rows over unknown-symbol indices, lowest generation first.
        let mut rows: Vec<(Vec<(usize, u8)>, Vec<u8>)> = Vec::new();
        for gid in 0..gm.generation_count() {
            if self.local.complete[gid] {
                continue;
            }
            let members = gm.members(gid);
            for (_, row) in self.local.matrices[gid].take_rows() {
                let sparse = row
                    .coefficients
                    .iter()
                    .enumerate()
                    .filter(|&(_, &c)| c != 0)
                    .filter_map(|(pos, &c)| index[members[pos]].map(|u| (u, c)))
                    .collect();
                rows.push((sparse, row.message));
            }
        }

        let supports: Vec<Vec<usize>> = rows
            .iter()
            .map(|(r, _)| r.iter().map(|&(u, _)| u).collect())
            .collect();
        let order = inactivation_order(unknown.len(), &supports);

        let mut position = vec![None; n];
        let mut columns = Vec::with_capacity(order.len());
        for (pos, &u) in order.iter().enumerate() {
            position[unknown[u]] = Some(pos);
            columns.push(unknown[u]);
        }

        let mut matrix = RunningMatrix::new(field, columns.len());
        let ops = &mut self.local.stats.operations;
        for (sparse, message) in rows {
            let mut dense = vec![0u8; columns.len()];
            for (u, c) in sparse {
                if let Some(pos) = position[unknown[u]] {
                    dense[pos] = c;
                }
            }
            matrix.insert(dense, message, ops)?;
        }
        info!(
            "switching to global elimination: {} unknown symbols, rank {}",
            columns.len(),
            matrix.rank()
        );

        self.global = Some(GlobalSystem {
            columns,
            position,
            matrix,
        });
        self.finish_if_complete()
    }

    fn process_global(&mut self, pkt: &Packet) -> Result<()> {
        self.local.stats.received += 1;
        if self.finished() {
            self.local.stats.non_innovative += 1;
            telemetry::PACKETS_NON_INNOVATIVE.inc();
            return Ok(());
        }
        let (coefficients, message) = self.local.mask_known(pkt);
        let Some(global) = self.global.as_mut() else {
            return Ok(());
        };

        let mut dense = vec![0u8; global.columns.len()];
        for (pos, &sym) in self.local.generations.members(pkt.gid as usize).iter().enumerate() {
            if coefficients[pos] != 0 {
                if let Some(p) = global.position[sym] {
                    dense[p] = coefficients[pos];
                }
            }
        }
        if global
            .matrix
            .insert(dense, message, &mut self.local.stats.operations)?
        {
            self.local.stats.innovative += 1;
        } else {
            self.local.stats.non_innovative += 1;
            telemetry::PACKETS_NON_INNOVATIVE.inc();
        }
        self.finish_if_complete()
    }

    fn finish_if_complete(&mut self) -> Result<()> {
        let Some(global) = self.global.as_mut() else {
            return Ok(());
        };
        if !global.matrix.is_complete() {
            return Ok(());
        }
        for (pos, value) in global.matrix.solve(&mut self.local.stats.operations) {
            self.local.generations.finalize(global.columns[pos], &value);
        }
        for done in self.local.complete.iter_mut().filter(|d| !**d) {
            *done = true;
            telemetry::GENERATIONS_COMPLETED.inc();
        }
        debug!("global system solved");
        Ok(())
    }

    pub fn finished(&self) -> bool {
        self.local.finished()
    }

    pub fn rank(&self) -> usize {
        match &self.global {
            Some(g) if !self.finished() => {
                self.local.generations.finalized_count() + g.matrix.rank()
            }
            _ => self.local.rank(),
        }
    }

    pub fn generation_state(&self, gid: usize) -> GenerationState {
        self.local.generation_state(gid)
    }

    pub(super) fn local(&self) -> &GgDecoder {
        &self.local
    }

    pub(super) fn local_mut(&mut self) -> &mut GgDecoder {
        &mut self.local
    }
}

/// Column order for a sparse system, as indices into `0..width`.
///
/// Columns pinned down by a row with a single remaining active entry are
/// peeled off first; when no such row exists, the active column touching the
/// most unassigned rows is inactivated (lowest index on ties). Peeled columns
/// come first in reverse peel order, inactive ones last, which makes every
/// peeled row upper-triangular in the resulting order.
pub(crate) fn inactivation_order(width: usize, rows: &[Vec<usize>]) -> Vec<usize> {
    let mut col_rows: Vec<Vec<usize>> = vec![Vec::new(); width];
    for (r, cols) in rows.iter().enumerate() {
        for &c in cols {
            col_rows[c].push(r);
        }
    }
    let mut weight: Vec<usize> = col_rows.iter().map(Vec::len).collect();
    let mut degree: Vec<usize> = rows.iter().map(Vec::len).collect();
    let mut active = vec![true; width];
    let mut assigned = vec![false; rows.len()];
    let mut ripple: VecDeque<usize> = (0..rows.len()).filter(|&r| degree[r] == 1).collect();

    let mut peeled = Vec::new();
    let mut inactive = Vec::new();
    let mut remaining = width;

    while remaining > 0 {
        let col = match ripple.pop_front() {
            Some(r) => {
                if assigned[r] || degree[r] != 1 {
                    continue;
                }
                let Some(col) = rows[r].iter().copied().find(|&c| active[c]) else {
                    continue;
                };
                assigned[r] = true;
                for &c in &rows[r] {
                    weight[c] -= 1;
                }
                peeled.push(col);
                col
            }
            None => {
                let mut best: Option<usize> = None;
                for c in (0..width).filter(|&c| active[c]) {
                    if best.map_or(true, |b| weight[c] > weight[b]) {
                        best = Some(c);
                    }
                }
                let Some(col) = best else { break };
                inactive.push(col);
                col
            }
        };

        active[col] = false;
        remaining -= 1;
        for &r in &col_rows[col] {
            if !assigned[r] {
                degree[r] -= 1;
                if degree[r] == 1 {
                    ripple.push_back(r);
                }
            }
        }
    }

    peeled.reverse();
    peeled.extend(inactive);
    peeled
}
