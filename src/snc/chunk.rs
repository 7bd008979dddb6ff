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

//! Segment-by-segment encode/decode of large inputs.

use super::decoder::{Decoder, DecoderOptions, DecoderStats};
use super::encoder::EncoderOptions;
use super::gf_tables::Field;
use super::packet::Packet;
use super::params::{CodeFamily, ParameterSet, Parameters};
use super::Session;
use crate::error::{Result, SncError};
use crate::telemetry;
use log::{debug, error, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Session knobs shared by every segment; `data_size` comes from the segment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionTemplate {
    pub loss_tolerance: f64,
    pub payload_size: usize,
    pub generation_size: usize,
    pub band_size: usize,
    pub code: CodeFamily,
    pub field: Field,
    pub overlap: bool,
    pub seed: u64,
}

impl Default for SessionTemplate {
    fn default() -> Self {
        let d = ParameterSet::default();
        Self {
            loss_tolerance: d.loss_tolerance,
            payload_size: d.payload_size,
            generation_size: d.generation_size,
            band_size: d.band_size,
            code: d.code,
            field: d.field,
            overlap: d.overlap,
            seed: d.seed,
        }
    }
}

impl SessionTemplate {
    /// Checks the knobs against the smallest session that uses them unclamped.
    pub fn validate(&self) -> Result<()> {
        Parameters::new(ParameterSet {
            data_size: self.generation_size.saturating_mul(self.payload_size),
            loss_tolerance: self.loss_tolerance,
            payload_size: self.payload_size,
            generation_size: self.generation_size,
            band_size: self.band_size,
            code: self.code,
            field: self.field,
            overlap: self.overlap,
            seed: self.seed,
        })
        .map(|_| ())
    }

    /// Parameters for a segment of `data_size` bytes. Generation and band
    /// sizes shrink to fit segments with fewer symbols than a generation.
    pub fn parameters(&self, data_size: usize, segment: usize) -> Result<Parameters> {
        let symbols = data_size.div_ceil(self.payload_size.max(1));
        let generation_size = self.generation_size.min(symbols);
        let band_size = self.band_size.min(generation_size);
        if generation_size != self.generation_size {
            debug!(
                "segment {}: generation size clamped to {} symbols",
                segment, generation_size
            );
        }
        Parameters::new(ParameterSet {
            data_size,
            loss_tolerance: self.loss_tolerance,
            payload_size: self.payload_size,
            generation_size,
            band_size,
            code: self.code,
            field: self.field,
            overlap: self.overlap,
            seed: self.seed.wrapping_add(segment as u64),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    pub segment_size: usize,
    /// Probability that the simulated channel drops a packet.
    pub erasure_rate: f64,
    /// Packet bound per segment, as a multiple of the redundancy budget.
    pub max_overhead: f64,
    /// Push every packet through serialize/deserialize.
    pub wire: bool,
    /// Process segments on the rayon pool.
    pub parallel: bool,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            segment_size: 5_120_000,
            erasure_rate: 0.0,
            max_overhead: 8.0,
            wire: true,
            parallel: false,
        }
    }
}

impl ChunkConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.segment_size == 0 {
            return Err("segment_size must be > 0".into());
        }
        if !(0.0..1.0).contains(&self.erasure_rate) {
            return Err(format!(
                "erasure_rate must lie in [0, 1), got {}",
                self.erasure_rate
            ));
        }
        if !(self.max_overhead >= 1.0) {
            return Err(format!(
                "max_overhead must be >= 1, got {}",
                self.max_overhead
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SegmentReport {
    pub index: usize,
    pub offset: usize,
    pub len: usize,
    pub packets_sent: usize,
    pub stats: DecoderStats,
    pub overhead: f64,
    pub cost: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChunkReport {
    pub data: Vec<u8>,
    pub segments: Vec<SegmentReport>,
}

pub struct ChunkDriver {
    template: SessionTemplate,
    encoder: EncoderOptions,
    decoder: DecoderOptions,
    config: ChunkConfig,
}

impl ChunkDriver {
    pub fn new(
        template: SessionTemplate,
        encoder: EncoderOptions,
        decoder: DecoderOptions,
        config: ChunkConfig,
    ) -> Self {
        Self {
            template,
            encoder,
            decoder,
            config,
        }
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Codes `source` segment by segment and returns the concatenated
    /// recovery. The first failing segment aborts the run.
    pub fn run(&self, source: &[u8]) -> Result<ChunkReport> {
        if source.is_empty() {
            return Err(SncError::InvalidParameter("empty source".into()));
        }
        self.config.validate().map_err(SncError::InvalidParameter)?;
        let segments: Vec<(usize, &[u8])> = source
            .chunks(self.config.segment_size)
            .enumerate()
            .collect();
        info!(
            "coding {} bytes in {} segment(s) of up to {} bytes",
            source.len(),
            segments.len(),
            self.config.segment_size
        );

        let results: Vec<(Vec<u8>, SegmentReport)> = if self.config.parallel {
            segments
                .par_iter()
                .map(|&(index, bytes)| self.run_segment(index, bytes))
                .collect::<Result<_>>()?
        } else {
            segments
                .iter()
                .map(|&(index, bytes)| self.run_segment(index, bytes))
                .collect::<Result<_>>()?
        };

        let mut data = Vec::with_capacity(source.len());
        let mut reports = Vec::with_capacity(results.len());
        for (bytes, report) in results {
            data.extend_from_slice(&bytes);
            reports.push(report);
        }
        Ok(ChunkReport {
            data,
            segments: reports,
        })
    }

    fn run_segment(&self, index: usize, bytes: &[u8]) -> Result<(Vec<u8>, SegmentReport)> {
        let params = self.template.parameters(bytes.len(), index)?;
        let seed = params.seed();
        let mut session = Session::with_seed(&params, self.encoder, seed)?;
        session.load_source(bytes, 0)?;
        let mut decoder = Decoder::with_options(&params, self.decoder)?;
        let mut channel = StdRng::seed_from_u64(seed.rotate_left(32));
        let layout = params.packet_layout();
        let limit = (params.redundancy_budget() as f64 * self.config.max_overhead).ceil() as usize;

        let mut sent = 0usize;
        while !decoder.finished() {
            if sent >= limit {
                error!(
                    "segment {} stalled after {} packets (rank {}/{})",
                    index,
                    sent,
                    decoder.rank(),
                    params.symbol_count()
                );
                return Err(SncError::Stalled {
                    segment: index,
                    packets: sent,
                });
            }
            let pkt = session.generate_packet();
            sent += 1;
            if self.config.erasure_rate > 0.0 && channel.gen_bool(self.config.erasure_rate) {
                continue;
            }
            if self.config.wire {
                let raw = pkt.serialize(&layout)?;
                decoder.process_packet(&Packet::deserialize(&raw, &layout)?)?;
            } else {
                decoder.process_packet(&pkt)?;
            }
        }

        let data = decoder.recover()?;
        telemetry::SEGMENTS_RECOVERED.inc();
        info!(
            "segment {}: {} bytes recovered, overhead {:.3}, cost {:.3}",
            index,
            data.len(),
            decoder.overhead(),
            decoder.cost()
        );
        let report = SegmentReport {
            index,
            offset: index * self.config.segment_size,
            len: bytes.len(),
            packets_sent: sent,
            stats: decoder.stats(),
            overhead: decoder.overhead(),
            cost: decoder.cost(),
        };
        Ok((data, report))
    }

    /// Reads `input`, runs it through [`ChunkDriver::run`] and writes the
    /// recovery to `output` atomically.
    pub fn run_file(&self, input: &Path, output: &Path) -> Result<ChunkReport> {
        let source = fs::read(input)?;
        let report = self.run(&source)?;
        write_atomically(output, &report.data)?;
        Ok(report)
    }
}

/// Compares the SHA-256 digests of two files and returns the shared hex
/// digest, or [`SncError::DigestMismatch`] if they differ.
pub fn verify_copy(original: &Path, copy: &Path) -> Result<String> {
    let expected = hex::encode(Sha256::digest(fs::read(original)?));
    let actual = hex::encode(Sha256::digest(fs::read(copy)?));
    if expected != actual {
        return Err(SncError::DigestMismatch { expected, actual });
    }
    Ok(actual)
}

/// Writes to `<path>.part` and renames it into place. On failure nothing is
/// left at `path` or at the part file.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut part = path.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);
    let written = fs::write(&part, bytes).and_then(|_| fs::rename(&part, path));
    if let Err(e) = written {
        let _ = fs::remove_file(&part);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snc::decoder::DecoderKind;

    fn driver(segment_size: usize, erasure_rate: f64) -> ChunkDriver {
        ChunkDriver::new(
            SessionTemplate {
                payload_size: 64,
                generation_size: 16,
                band_size: 8,
                seed: 3,
                ..SessionTemplate::default()
            },
            EncoderOptions::default(),
            DecoderOptions::default(),
            ChunkConfig {
                segment_size,
                erasure_rate,
                ..ChunkConfig::default()
            },
        )
    }

    #[test]
    fn short_tail_segment_is_clamped() {
        let p = SessionTemplate::default().parameters(3000, 4).unwrap();
        assert_eq!(p.symbol_count(), 3);
        assert_eq!(p.generation_size(), 3);
        assert_eq!(p.seed(), 4);
    }

    #[test]
    fn segments_concatenate_in_order() {
        let src: Vec<u8> = (0..10_000u32).map(|i| (i % 253) as u8).collect();
        let report = driver(4096, 0.0).run(&src).unwrap();
        assert_eq!(report.data, src);
        assert_eq!(report.segments.len(), 3);
        assert_eq!(report.segments[2].offset, 8192);
        assert_eq!(report.segments[2].len, 10_000 - 8192);
    }

    #[test]
    fn erasures_only_cost_packets() {
        let src: Vec<u8> = (0..5000u32).map(|i| (i * 17 % 256) as u8).collect();
        let lossless = driver(8192, 0.0).run(&src).unwrap();
        let lossy = driver(8192, 0.3).run(&src).unwrap();
        assert_eq!(lossy.data, src);
        assert!(lossy.segments[0].packets_sent > lossless.segments[0].packets_sent);
    }

    #[test]
    fn mismatched_decoder_stalls() {
        let src = vec![7u8; 4096];
        let d = ChunkDriver::new(
            SessionTemplate {
                payload_size: 64,
                generation_size: 16,
                band_size: 8,
                ..SessionTemplate::default()
            },
            EncoderOptions::default(),
            DecoderOptions {
                kind: DecoderKind::Bd,
                ..DecoderOptions::default()
            },
            ChunkConfig {
                max_overhead: 1.0,
                ..ChunkConfig::default()
            },
        );
        assert!(matches!(
            d.run(&src),
            Err(SncError::Stalled { segment: 0, .. })
        ));
    }

    #[test]
    fn config_validation() {
        assert!(SessionTemplate::default().validate().is_ok());
        let narrow = SessionTemplate {
            band_size: 65,
            ..SessionTemplate::default()
        };
        assert!(narrow.validate().is_err());
        assert!(ChunkConfig::default().validate().is_ok());
        let bad = ChunkConfig {
            erasure_rate: 1.0,
            ..ChunkConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
