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

use super::generation::GenerationManager;
use super::gf_tables::Field;
use super::packet::Packet;
use crate::telemetry;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Order in which generations are picked for the next packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchedulePolicy {
    #[default]
    RoundRobin,
    Random,
}

/// Distribution of coefficient draws.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CoefficientDistribution {
    /// Every entry uniform over the field.
    #[default]
    Uniform,
    /// Every entry nonzero with probability `density`, nonzero values uniform.
    Sparse,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderOptions {
    pub schedule: SchedulePolicy,
    pub coefficients: CoefficientDistribution,
    /// Only read for `Sparse`, in (0, 1].
    pub density: f64,
    /// Send each generation's base block uncoded before any coded packet.
    pub systematic: bool,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            schedule: SchedulePolicy::RoundRobin,
            coefficients: CoefficientDistribution::Uniform,
            density: 0.5,
            systematic: false,
        }
    }
}

impl EncoderOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.coefficients == CoefficientDistribution::Sparse
            && !(self.density > 0.0 && self.density <= 1.0)
        {
            return Err(format!("density must lie in (0, 1], got {}", self.density));
        }
        Ok(())
    }
}

/// Packet generator. Holds only scheduling state; symbol storage is borrowed
/// from the [`GenerationManager`] on every call.
pub struct Encoder {
    options: EncoderOptions,
    cursor: usize,
    uncoded_sent: Vec<usize>,
    rng: StdRng,
}

impl Encoder {
    pub fn new(options: EncoderOptions) -> Self {
        Self::from_rng(options, StdRng::from_entropy())
    }

    /// Reproducible encoder, mainly for tests and benchmarks.
    pub fn with_seed(options: EncoderOptions, seed: u64) -> Self {
        Self::from_rng(options, StdRng::seed_from_u64(seed))
    }

    fn from_rng(options: EncoderOptions, rng: StdRng) -> Self {
        Self {
            options,
            cursor: 0,
            uncoded_sent: Vec::new(),
            rng,
        }
    }

    pub fn options(&self) -> &EncoderOptions {
        &self.options
    }

    pub fn generate_packet(&mut self, generations: &GenerationManager) -> Packet {
        let params = generations.params();
        let field = params.field();
        let gid = self.next_generation(generations.generation_count());
        let members = generations.members(gid);
        let base = generations.base_positions(gid);

        let coefficients = match self.next_uncoded(gid, base.len()) {
            Some(k) => {
                let mut unit = vec![0u8; members.len()];
                unit[base[k]] = 1;
                unit
            }
            None => self.draw_coefficients(field, members.len()),
        };

        let mut payload = vec![0u8; params.payload_size()];
        for (&sym, &c) in members.iter().zip(&coefficients) {
            field.mul_add_region(&mut payload, generations.symbol(sym), c);
        }
        telemetry::PACKETS_GENERATED.inc();

        Packet {
            gid: gid as u32,
            coefficients,
            payload,
            field,
        }
    }

    fn next_generation(&mut self, count: usize) -> usize {
        match self.options.schedule {
            SchedulePolicy::RoundRobin => {
                let gid = self.cursor % count;
                self.cursor = (gid + 1) % count;
                gid
            }
            SchedulePolicy::Random => self.rng.gen_range(0..count),
        }
    }

    fn next_uncoded(&mut self, gid: usize, limit: usize) -> Option<usize> {
        if !self.options.systematic {
            return None;
        }
        if self.uncoded_sent.len() <= gid {
            self.uncoded_sent.resize(gid + 1, 0);
        }
        let sent = self.uncoded_sent[gid];
        if sent < limit {
            self.uncoded_sent[gid] += 1;
            Some(sent)
        } else {
            None
        }
    }

    /// Draws a coefficient vector, resampling the all-zero vector.
    fn draw_coefficients(&mut self, field: Field, len: usize) -> Vec<u8> {
        let mut coes = vec![0u8; len];
        let density = self.options.density.clamp(f64::MIN_POSITIVE, 1.0);
        loop {
            for c in coes.iter_mut() {
                *c = match (self.options.coefficients, field) {
                    (CoefficientDistribution::Uniform, Field::Binary) => self.rng.gen::<bool>() as u8,
                    (CoefficientDistribution::Uniform, Field::Gf256) => self.rng.gen(),
                    (CoefficientDistribution::Sparse, _) if !self.rng.gen_bool(density) => 0,
                    (CoefficientDistribution::Sparse, Field::Binary) => 1,
                    (CoefficientDistribution::Sparse, Field::Gf256) => self.rng.gen_range(1..=255),
                };
            }
            if coes.iter().any(|&c| c != 0) {
                return coes;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snc::params::{ParameterSet, Parameters};

    fn loaded(field: Field) -> GenerationManager {
        let params = Parameters::new(ParameterSet {
            data_size: 16 * 12,
            payload_size: 16,
            generation_size: 4,
            band_size: 2,
            field,
            ..ParameterSet::default()
        })
        .unwrap();
        let mut gm = GenerationManager::new(&params).unwrap();
        let src: Vec<u8> = (0..192).map(|i| (i * 31 % 251) as u8).collect();
        gm.load(&src, 0).unwrap();
        gm
    }

    #[test]
    fn round_robin_visits_every_generation() {
        let gm = loaded(Field::Gf256);
        let mut enc = Encoder::with_seed(EncoderOptions::default(), 1);
        let gids: Vec<u32> = (0..12).map(|_| enc.generate_packet(&gm).gid).collect();
        assert_eq!(gids, vec![0, 1, 2, 3, 4, 5, 0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn payload_is_weighted_sum() {
        let gm = loaded(Field::Gf256);
        let mut enc = Encoder::with_seed(EncoderOptions::default(), 2);
        for _ in 0..20 {
            let pkt = enc.generate_packet(&gm);
            assert!(!pkt.is_zero());
            let mut expect = vec![0u8; 16];
            for (&sym, &c) in gm.members(pkt.gid as usize).iter().zip(&pkt.coefficients) {
                for (e, s) in expect.iter_mut().zip(gm.symbol(sym)) {
                    *e ^= Field::Gf256.mul(c, *s);
                }
            }
            assert_eq!(pkt.payload, expect);
        }
    }

    #[test]
    fn binary_draws_are_bits_and_never_zero() {
        let gm = loaded(Field::Binary);
        let opts = EncoderOptions {
            coefficients: CoefficientDistribution::Sparse,
            density: 0.05,
            schedule: SchedulePolicy::Random,
            ..EncoderOptions::default()
        };
        let mut enc = Encoder::with_seed(opts, 3);
        for _ in 0..200 {
            let pkt = enc.generate_packet(&gm);
            assert!(pkt.coefficients.iter().all(|&c| c <= 1));
            assert!(!pkt.is_zero());
            assert!((pkt.gid as usize) < gm.generation_count());
        }
    }

    #[test]
    fn systematic_prefix_is_uncoded() {
        let gm = loaded(Field::Gf256);
        let opts = EncoderOptions {
            systematic: true,
            ..EncoderOptions::default()
        };
        let mut enc = Encoder::with_seed(opts, 4);
        // two rounds of uncoded packets, one per base symbol
        for round in 0..2 {
            for gid in 0..6 {
                let pkt = enc.generate_packet(&gm);
                assert_eq!(pkt.gid as usize, gid);
                assert_eq!(pkt.coefficients.iter().filter(|&&c| c != 0).count(), 1);
                let pos = gm.base_positions(gid)[round];
                assert_eq!(pkt.coefficients[pos], 1);
                assert_eq!(pkt.payload, gm.symbol(gm.members(gid)[pos]));
            }
        }
    }

    #[test]
    fn systematic_rounds_cover_every_symbol() {
        let params = Parameters::new(ParameterSet {
            data_size: 100 * 8,
            payload_size: 8,
            generation_size: 20,
            band_size: 10,
            field: Field::Binary,
            ..ParameterSet::default()
        })
        .unwrap();
        let mut gm = GenerationManager::new(&params).unwrap();
        let src: Vec<u8> = (0..800).map(|i| (i * 7 % 253) as u8).collect();
        gm.load(&src, 0).unwrap();

        let opts = EncoderOptions {
            systematic: true,
            ..EncoderOptions::default()
        };
        let mut enc = Encoder::with_seed(opts, 5);
        let mut seen = vec![0usize; 100];
        for _ in 0..params.generation_count() * 10 {
            let pkt = enc.generate_packet(&gm);
            let hot: Vec<usize> = (0..pkt.coefficients.len())
                .filter(|&i| pkt.coefficients[i] != 0)
                .collect();
            assert_eq!(hot.len(), 1);
            let sym = gm.members(pkt.gid as usize)[hot[0]];
            assert_eq!(pkt.payload, gm.symbol(sym));
            seen[sym] += 1;
        }
        assert!(seen.iter().all(|&c| c == 1), "{seen:?}");
    }

    #[test]
    fn sparse_density_validated() {
        let opts = EncoderOptions {
            coefficients: CoefficientDistribution::Sparse,
            density: 0.0,
            ..EncoderOptions::default()
        };
        assert!(opts.validate().is_err());
        assert!(EncoderOptions::default().validate().is_ok());
    }
}
