//! Session parameters and the metadata derived from them.

use super::gf_tables::Field;
use super::packet::PacketLayout;
use crate::error::{Result, SncError};
use serde::{Deserialize, Serialize};

/// How source symbols are grouped into generations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CodeFamily {
    /// Base blocks of `band_size` symbols, optionally topped up with random
    /// foreign symbols to `generation_size`.
    #[default]
    #[serde(rename = "rand")]
    Random,
    /// Sliding windows of `generation_size` consecutive symbols, stride `band_size`.
    #[serde(rename = "band")]
    Band,
    /// Like `Band`, but windows wrap past the last symbol instead of clipping.
    #[serde(rename = "windwrap")]
    WindWrap,
}

/// Raw session knobs, validated by [`Parameters::new`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    /// Bytes of source data coded in this session.
    pub data_size: usize,
    /// Expected loss probability, in (0, 1). Sizes the redundancy budget.
    pub loss_tolerance: f64,
    /// Bytes per symbol and per coded payload.
    pub payload_size: usize,
    /// Symbols per generation, `1..=symbol_count`.
    pub generation_size: usize,
    /// Base block (Random) or stride (Band, WindWrap), `1..=generation_size`.
    /// Ignored by Random codes without overlap.
    pub band_size: usize,
    pub code: CodeFamily,
    pub field: Field,
    /// Random codes only: let generations overlap beyond their base block.
    pub overlap: bool,
    /// Seeds the Random grouping; encoder and decoder must agree on it.
    pub seed: u64,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            data_size: 0,
            loss_tolerance: 0.01,
            payload_size: 1280,
            generation_size: 64,
            band_size: 32,
            code: CodeFamily::Random,
            field: Field::Binary,
            overlap: true,
            seed: 0,
        }
    }
}

/// Immutable, validated parameter set.
#[derive(Clone, Debug, PartialEq)]
pub struct Parameters {
    set: ParameterSet,
    symbol_count: usize,
    generation_count: usize,
}

/// Derived session metadata, as printed by the CLI.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionInfo {
    pub data_size: usize,
    pub symbol_count: usize,
    pub generation_count: usize,
    pub generation_size: usize,
    pub band_size: usize,
    pub payload_size: usize,
    pub code: CodeFamily,
    pub field: Field,
    pub wire_len: usize,
    pub redundancy_budget: usize,
}

impl Parameters {
    pub fn new(set: ParameterSet) -> Result<Self> {
        if set.data_size == 0 {
            return Err(SncError::InvalidParameter("data_size must be > 0".into()));
        }
        if !(set.loss_tolerance > 0.0 && set.loss_tolerance < 1.0) {
            return Err(SncError::InvalidParameter(format!(
                "loss_tolerance must lie in (0, 1), got {}",
                set.loss_tolerance
            )));
        }
        if set.payload_size == 0 {
            return Err(SncError::InvalidParameter("payload_size must be > 0".into()));
        }
        if set.generation_size == 0 {
            return Err(SncError::InvalidParameter(
                "generation_size must be > 0".into(),
            ));
        }
        if set.band_size == 0 {
            return Err(SncError::InvalidParameter("band_size must be > 0".into()));
        }
        let symbol_count = set.data_size.div_ceil(set.payload_size);
        if set.generation_size > symbol_count {
            return Err(SncError::InvalidParameter(format!(
                "generation_size {} exceeds symbol count {}",
                set.generation_size, symbol_count
            )));
        }
        let reads_band = set.overlap || set.code != CodeFamily::Random;
        if reads_band && set.band_size > set.generation_size {
            return Err(SncError::InvalidParameter(format!(
                "band_size {} exceeds generation_size {}",
                set.band_size, set.generation_size
            )));
        }

        let g = set.generation_size;
        let generation_count = match set.code {
            CodeFamily::Band => (symbol_count - g).div_ceil(set.band_size) + 1,
            CodeFamily::Random if !set.overlap => symbol_count.div_ceil(g),
            CodeFamily::Random | CodeFamily::WindWrap => symbol_count.div_ceil(set.band_size),
        };
        if generation_count > u32::MAX as usize {
            return Err(SncError::InvalidParameter(format!(
                "{generation_count} generations do not fit a 32-bit id"
            )));
        }

        Ok(Self {
            set,
            symbol_count,
            generation_count,
        })
    }

    pub fn set(&self) -> &ParameterSet {
        &self.set
    }

    pub fn data_size(&self) -> usize {
        self.set.data_size
    }

    pub fn loss_tolerance(&self) -> f64 {
        self.set.loss_tolerance
    }

    pub fn payload_size(&self) -> usize {
        self.set.payload_size
    }

    pub fn generation_size(&self) -> usize {
        self.set.generation_size
    }

    /// Effective base block or stride. Non-overlapping Random codes use whole
    /// generations as their base block.
    pub fn band_size(&self) -> usize {
        match self.set.code {
            CodeFamily::Random if !self.set.overlap => self.set.generation_size,
            _ => self.set.band_size,
        }
    }

    pub fn code(&self) -> CodeFamily {
        self.set.code
    }

    pub fn field(&self) -> Field {
        self.set.field
    }

    pub fn overlap(&self) -> bool {
        self.set.overlap
    }

    pub fn seed(&self) -> u64 {
        self.set.seed
    }

    #[must_use]
    pub fn symbol_count(&self) -> usize {
        self.symbol_count
    }

    #[must_use]
    pub fn generation_count(&self) -> usize {
        self.generation_count
    }

    /// Packets a sender should expect to emit for the session to complete
    /// under the configured loss tolerance.
    #[must_use]
    pub fn redundancy_budget(&self) -> usize {
        let base = (self.set.generation_size * self.generation_count) as f64;
        (base * (1.0 + self.set.loss_tolerance)).ceil() as usize
    }

    #[must_use]
    pub fn packet_layout(&self) -> PacketLayout {
        PacketLayout::new(self.set.generation_size, self.set.payload_size, self.set.field)
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            data_size: self.set.data_size,
            symbol_count: self.symbol_count,
            generation_count: self.generation_count,
            generation_size: self.set.generation_size,
            band_size: self.band_size(),
            payload_size: self.set.payload_size,
            code: self.set.code,
            field: self.set.field,
            wire_len: self.packet_layout().wire_len(),
            redundancy_budget: self.redundancy_budget(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(data_size: usize) -> ParameterSet {
        ParameterSet {
            data_size,
            ..ParameterSet::default()
        }
    }

    #[test]
    fn symbol_count_rounds_up() {
        let p = Parameters::new(ParameterSet {
            generation_size: 48,
            ..set(65536)
        })
        .unwrap();
        assert_eq!(p.symbol_count(), 52);
        assert_eq!(p.generation_count(), 2);
    }

    #[test]
    fn band_generation_count() {
        let p = Parameters::new(ParameterSet {
            data_size: 100 * 16,
            payload_size: 16,
            generation_size: 20,
            band_size: 8,
            code: CodeFamily::Band,
            ..ParameterSet::default()
        })
        .unwrap();
        // ceil((100 - 20) / 8) + 1
        assert_eq!(p.generation_count(), 11);
    }

    #[test]
    fn disjoint_random_uses_generation_as_block() {
        let p = Parameters::new(ParameterSet {
            data_size: 100 * 16,
            payload_size: 16,
            generation_size: 32,
            band_size: 8,
            overlap: false,
            ..ParameterSet::default()
        })
        .unwrap();
        assert_eq!(p.band_size(), 32);
        assert_eq!(p.generation_count(), 4);

        let wide = Parameters::new(ParameterSet {
            data_size: 100 * 16,
            payload_size: 16,
            generation_size: 16,
            band_size: 32,
            overlap: false,
            ..ParameterSet::default()
        })
        .unwrap();
        assert_eq!(wide.band_size(), 16);
        assert_eq!(wide.generation_count(), 7);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let bad = [
            ParameterSet { data_size: 0, ..set(1) },
            ParameterSet { loss_tolerance: 0.0, ..set(1 << 20) },
            ParameterSet { loss_tolerance: 1.0, ..set(1 << 20) },
            ParameterSet { loss_tolerance: f64::NAN, ..set(1 << 20) },
            ParameterSet { payload_size: 0, ..set(1 << 20) },
            ParameterSet { generation_size: 0, ..set(1 << 20) },
            ParameterSet { band_size: 0, ..set(1 << 20) },
            ParameterSet { band_size: 65, ..set(1 << 20) },
            ParameterSet { band_size: 65, code: CodeFamily::Band, overlap: false, ..set(1 << 20) },
            ParameterSet { generation_size: 64, ..set(1280 * 10) },
        ];
        for s in bad {
            assert!(
                matches!(Parameters::new(s.clone()), Err(SncError::InvalidParameter(_))),
                "{s:?}"
            );
        }
    }

    #[test]
    fn redundancy_budget_scales_with_loss() {
        let p = Parameters::new(ParameterSet {
            generation_size: 48,
            loss_tolerance: 0.5,
            ..set(65536)
        })
        .unwrap();
        assert_eq!(p.redundancy_budget(), 144);
        assert_eq!(p.info().wire_len, 4 + 6 + 1280);
    }
}
