// SparseNC Library
//
// Sparse network coding over GF(2) and GF(2^8): generation management,
// packet encoding, recoding, four incremental decoders and a chunked driver
// for large inputs, plus the configuration, logging and metrics around them.

pub mod app_config;
pub mod error;
pub mod logger;
pub mod snc;
pub mod telemetry;

pub use error::{Result, SncError};
