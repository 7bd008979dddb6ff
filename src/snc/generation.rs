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

//! Grouping of source symbols into generations, plus the symbol store that
//! encoders read from and decoders fill in.

use super::params::{CodeFamily, Parameters};
use crate::error::{Result, SncError};
use log::debug;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;

pub struct GenerationManager {
    params: Parameters,
    /// Ascending symbol indices per generation.
    members: Vec<Vec<usize>>,
    /// symbol -> (generation, position inside that generation)
    memberships: Vec<Vec<(usize, usize)>>,
    /// Positions, inside each generation, of the symbols it introduces.
    base: Vec<Vec<usize>>,
    storage: Vec<u8>,
    finalized: Vec<bool>,
    finalized_count: usize,
}

impl GenerationManager {
    pub fn new(params: &Parameters) -> Result<Self> {
        let members = group_symbols(params);
        let n = params.symbol_count();
        let base: Vec<Vec<usize>> = members
            .iter()
            .enumerate()
            .map(|(gid, m)| {
                base_block(params, gid)
                    .into_iter()
                    .filter_map(|sym| m.binary_search(&sym).ok())
                    .collect()
            })
            .collect();

        let mut memberships = vec![Vec::new(); n];
        for (gid, syms) in members.iter().enumerate() {
            for (pos, &sym) in syms.iter().enumerate() {
                memberships[sym].push((gid, pos));
            }
        }
        if let Some(sym) = memberships.iter().position(|m| m.is_empty()) {
            return Err(SncError::InvalidParameter(format!(
                "symbol {sym} is not covered by any generation"
            )));
        }
        debug!(
            "grouped {} symbols into {} generations ({:?})",
            n,
            members.len(),
            params.code()
        );

        Ok(Self {
            params: params.clone(),
            members,
            memberships,
            base,
            storage: vec![0u8; n * params.payload_size()],
            finalized: vec![false; n],
            finalized_count: 0,
        })
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn generation_count(&self) -> usize {
        self.members.len()
    }

    pub fn symbol_count(&self) -> usize {
        self.finalized.len()
    }

    /// Symbol indices of a generation, ascending.
    pub fn symbols_of(&self, gid: usize) -> Result<&[usize]> {
        self.members
            .get(gid)
            .map(Vec::as_slice)
            .ok_or_else(|| SncError::InvalidParameter(format!("no generation {gid}")))
    }

    pub(crate) fn members(&self, gid: usize) -> &[usize] {
        &self.members[gid]
    }

    /// Positions of the generation's base block in `symbols_of(gid)` order.
    /// Over all generations the base blocks cover every symbol.
    pub(crate) fn base_positions(&self, gid: usize) -> &[usize] {
        &self.base[gid]
    }

    /// Generations a symbol belongs to, with its position in each.
    pub fn memberships(&self, symbol: usize) -> &[(usize, usize)] {
        &self.memberships[symbol]
    }

    /// True when every generation is a run of consecutive symbols.
    pub fn is_banded(&self) -> bool {
        self.members
            .iter()
            .all(|m| m.windows(2).all(|w| w[1] == w[0] + 1))
    }

    /// Copies `data_size` bytes starting at `offset` into symbol storage.
    /// The tail of the last symbol is zero-padded.
    pub fn load(&mut self, buffer: &[u8], offset: usize) -> Result<()> {
        let len = self.params.data_size();
        let available = buffer.len().saturating_sub(offset);
        if available < len {
            return Err(SncError::InvalidParameter(format!(
                "source holds {available} bytes past offset {offset}, session needs {len}"
            )));
        }
        self.storage[..len].copy_from_slice(&buffer[offset..offset + len]);
        self.storage[len..].iter_mut().for_each(|b| *b = 0);
        self.finalized.iter_mut().for_each(|f| *f = true);
        self.finalized_count = self.finalized.len();
        Ok(())
    }

    pub fn symbol(&self, idx: usize) -> &[u8] {
        let p = self.params.payload_size();
        &self.storage[idx * p..(idx + 1) * p]
    }

    pub fn is_finalized(&self, idx: usize) -> bool {
        self.finalized[idx]
    }

    pub fn finalized_count(&self) -> usize {
        self.finalized_count
    }

    /// Stores a decoded symbol. Returns false if it was already known.
    pub(crate) fn finalize(&mut self, idx: usize, data: &[u8]) -> bool {
        if self.finalized[idx] {
            return false;
        }
        let p = self.params.payload_size();
        self.storage[idx * p..(idx + 1) * p].copy_from_slice(&data[..p]);
        self.finalized[idx] = true;
        self.finalized_count += 1;
        true
    }

    /// Reassembles the first `data_size` bytes.
    pub fn materialize(&self) -> Result<Vec<u8>> {
        if self.finalized_count < self.finalized.len() {
            return Err(SncError::IncompleteRecovery {
                recovered: self.finalized_count,
                total: self.finalized.len(),
            });
        }
        Ok(self.storage[..self.params.data_size()].to_vec())
    }
}

/// Symbols generation `gid` is the first to introduce. The last band window
/// also takes the tail that clipping left to it.
fn base_block(params: &Parameters, gid: usize) -> Vec<usize> {
    let n = params.symbol_count();
    let b = params.band_size();
    match params.code() {
        CodeFamily::Band => {
            let lo = gid * b;
            let hi = if gid + 1 == params.generation_count() {
                n
            } else {
                (lo + b).min(n)
            };
            (lo..hi).collect()
        }
        CodeFamily::Random | CodeFamily::WindWrap => (0..b).map(|j| (gid * b + j) % n).collect(),
    }
}

fn group_symbols(params: &Parameters) -> Vec<Vec<usize>> {
    let n = params.symbol_count();
    let g = params.generation_size();
    let b = params.band_size();
    let count = params.generation_count();

    match params.code() {
        CodeFamily::Band => (0..count)
            .map(|i| {
                let lead = (i * b).min(n - g);
                (lead..lead + g).collect()
            })
            .collect(),
        CodeFamily::WindWrap => (0..count)
            .map(|i| {
                let mut m: Vec<usize> = (0..g).map(|j| (i * b + j) % n).collect();
                m.sort_unstable();
                m
            })
            .collect(),
        CodeFamily::Random => {
            let mut rng = StdRng::seed_from_u64(params.seed());
            let mut in_generation = vec![false; n];
            (0..count)
                .map(|i| {
                    let mut m: Vec<usize> = (0..b).map(|j| (i * b + j) % n).collect();
                    if g > b {
                        m.iter().for_each(|&s| in_generation[s] = true);
                        let candidates: Vec<usize> =
                            (0..n).filter(|&s| !in_generation[s]).collect();
                        m.extend(
                            index::sample(&mut rng, candidates.len(), g - b)
                                .into_iter()
                                .map(|k| candidates[k]),
                        );
                        m.iter().for_each(|&s| in_generation[s] = false);
                    }
                    m.sort_unstable();
                    m
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snc::params::ParameterSet;

    fn params(n: usize, g: usize, b: usize, code: CodeFamily, overlap: bool) -> Parameters {
        Parameters::new(ParameterSet {
            data_size: n * 8,
            payload_size: 8,
            generation_size: g,
            band_size: b,
            code,
            overlap,
            seed: 42,
            ..ParameterSet::default()
        })
        .unwrap()
    }

    #[test]
    fn band_windows_clip_to_end() {
        let gm = GenerationManager::new(&params(100, 20, 8, CodeFamily::Band, true)).unwrap();
        assert_eq!(gm.generation_count(), 11);
        assert_eq!(gm.symbols_of(0).unwrap(), (0..20).collect::<Vec<_>>().as_slice());
        assert_eq!(gm.symbols_of(10).unwrap(), (80..100).collect::<Vec<_>>().as_slice());
        assert!(gm.is_banded());
        assert!(gm.symbols_of(11).is_err());
    }

    #[test]
    fn random_generations_overlap_and_cover() {
        let p = params(100, 24, 10, CodeFamily::Random, true);
        let gm = GenerationManager::new(&p).unwrap();
        assert_eq!(gm.generation_count(), 10);
        for gid in 0..gm.generation_count() {
            let m = gm.symbols_of(gid).unwrap();
            assert_eq!(m.len(), 24);
            assert!(m.windows(2).all(|w| w[0] < w[1]));
        }
        for s in 0..100 {
            assert!(!gm.memberships(s).is_empty());
        }
        assert!(!gm.is_banded());

        // same seed, same grouping
        let again = GenerationManager::new(&p).unwrap();
        assert_eq!(again.members, gm.members);
    }

    #[test]
    fn disjoint_random_wraps_last_block() {
        let gm = GenerationManager::new(&params(10, 4, 2, CodeFamily::Random, false)).unwrap();
        assert_eq!(gm.generation_count(), 3);
        assert_eq!(gm.symbols_of(2).unwrap(), &[0, 1, 8, 9]);
    }

    #[test]
    fn windwrap_wraps_around() {
        let gm = GenerationManager::new(&params(10, 4, 3, CodeFamily::WindWrap, true)).unwrap();
        assert_eq!(gm.generation_count(), 4);
        assert_eq!(gm.symbols_of(3).unwrap(), &[0, 1, 2, 9]);
    }

    #[test]
    fn base_blocks_cover_every_symbol() {
        for (code, overlap) in [
            (CodeFamily::Random, true),
            (CodeFamily::Random, false),
            (CodeFamily::Band, true),
            (CodeFamily::WindWrap, true),
        ] {
            let gm = GenerationManager::new(&params(103, 20, 8, code, overlap)).unwrap();
            let mut seen = vec![0usize; 103];
            for gid in 0..gm.generation_count() {
                let m = gm.symbols_of(gid).unwrap();
                for &pos in gm.base_positions(gid) {
                    seen[m[pos]] += 1;
                }
            }
            assert!(seen.iter().all(|&c| c >= 1), "{code:?} overlap={overlap}");
        }

        // 100 = 10 * 10: the random base blocks partition the symbols
        let gm = GenerationManager::new(&params(100, 20, 10, CodeFamily::Random, true)).unwrap();
        let mut seen = vec![0usize; 100];
        for gid in 0..gm.generation_count() {
            assert_eq!(gm.base_positions(gid).len(), 10);
            for &pos in gm.base_positions(gid) {
                seen[gm.symbols_of(gid).unwrap()[pos]] += 1;
            }
        }
        assert!(seen.iter().all(|&c| c == 1));
    }

    #[test]
    fn load_and_materialize() {
        let p = Parameters::new(ParameterSet {
            data_size: 21,
            payload_size: 8,
            generation_size: 2,
            band_size: 1,
            ..ParameterSet::default()
        })
        .unwrap();
        let mut gm = GenerationManager::new(&p).unwrap();
        assert!(matches!(
            gm.materialize(),
            Err(SncError::IncompleteRecovery { recovered: 0, total: 3 })
        ));
        let src: Vec<u8> = (0..30).collect();
        gm.load(&src, 4).unwrap();
        assert_eq!(gm.symbol(2), &[20, 21, 22, 23, 24, 0, 0, 0]);
        assert_eq!(gm.materialize().unwrap(), src[4..25].to_vec());
        assert!(gm.load(&src, 10).is_err());
    }
}
