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

use crate::error::{Result, SncError};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

// --- GF(2^8) Table Initialization ---

const GF_ORDER: usize = 256;
const IRREDUCIBLE_POLY: u16 = 0x11D; // x^8 + x^4 + x^3 + x^2 + 1

struct GfTables {
    log: [u8; GF_ORDER],
    exp: [u8; GF_ORDER * 2],
    mul: Vec<[u8; GF_ORDER]>,
}

impl GfTables {
    fn build() -> Self {
        let mut log = [0u8; GF_ORDER];
        let mut exp = [0u8; GF_ORDER * 2];
        let mut x: u16 = 1;
        for i in 0..255 {
            exp[i] = x as u8;
            exp[i + 255] = x as u8; // wrap-around so log sums need no modulo
            log[x as usize] = i as u8;
            x <<= 1;
            if x >= 256 {
                x ^= IRREDUCIBLE_POLY;
            }
        }

        let mut mul = vec![[0u8; GF_ORDER]; GF_ORDER];
        for a in 1..GF_ORDER {
            for b in 1..GF_ORDER {
                mul[a][b] = exp[log[a] as usize + log[b] as usize];
            }
        }
        Self { log, exp, mul }
    }
}

lazy_static! {
    static ref TABLES: GfTables = GfTables::build();
}

/// Forces construction of the GF(2^8) tables. Calling it is optional but keeps
/// the one-off cost out of the first packet.
pub fn init_gf_tables() {
    lazy_static::initialize(&TABLES);
}

#[inline(always)]
pub(crate) fn gf_mul_table(a: u8, b: u8) -> u8 {
    TABLES.mul[a as usize][b as usize]
}

#[inline(always)]
fn gf_inv_table(a: u8) -> u8 {
    TABLES.exp[255 - TABLES.log[a as usize] as usize]
}

/// `dst[i] ^= src[i]` over the common prefix.
#[inline]
pub fn xor_region(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= *s;
    }
}

/// `dst[i] += c * src[i]` in GF(2^8).
#[inline]
pub fn gf_mul_add_region(dst: &mut [u8], src: &[u8], c: u8) {
    match c {
        0 => {}
        1 => xor_region(dst, src),
        _ => {
            let row = &TABLES.mul[c as usize];
            for (d, s) in dst.iter_mut().zip(src) {
                *d ^= row[*s as usize];
            }
        }
    }
}

/// `dst[i] = c * dst[i]` in GF(2^8).
#[inline]
pub fn gf_scale_region(dst: &mut [u8], c: u8) {
    match c {
        0 => dst.iter_mut().for_each(|d| *d = 0),
        1 => {}
        _ => {
            let row = &TABLES.mul[c as usize];
            for d in dst.iter_mut() {
                *d = row[*d as usize];
            }
        }
    }
}

/// Coefficient field of a session.
///
/// Payload bytes are always combined bytewise. Over `Binary` the only
/// coefficients are 0 and 1, so a combination is a plain XOR of payloads and
/// the same elimination code serves both widths.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    #[default]
    Binary,
    Gf256,
}

impl Field {
    /// Bits per coefficient on the wire.
    pub fn bits(self) -> usize {
        match self {
            Field::Binary => 1,
            Field::Gf256 => 8,
        }
    }

    pub fn order(self) -> usize {
        match self {
            Field::Binary => 2,
            Field::Gf256 => GF_ORDER,
        }
    }

    /// Whether `a` is an element of this field.
    pub fn contains(self, a: u8) -> bool {
        match self {
            Field::Binary => a <= 1,
            Field::Gf256 => true,
        }
    }

    #[inline(always)]
    pub fn add(self, a: u8, b: u8) -> u8 {
        a ^ b
    }

    #[inline(always)]
    pub fn mul(self, a: u8, b: u8) -> u8 {
        match self {
            Field::Binary => a & b & 1,
            Field::Gf256 => gf_mul_table(a, b),
        }
    }

    #[inline]
    pub fn inv(self, a: u8) -> Result<u8> {
        if a == 0 {
            return Err(SncError::DivideByZero);
        }
        match self {
            Field::Binary => Ok(1),
            Field::Gf256 => Ok(gf_inv_table(a)),
        }
    }

    #[inline]
    pub fn div(self, a: u8, b: u8) -> Result<u8> {
        Ok(self.mul(a, self.inv(b)?))
    }

    /// `dst += c * src`, elementwise.
    #[inline]
    pub fn mul_add_region(self, dst: &mut [u8], src: &[u8], c: u8) {
        match self {
            Field::Binary => {
                if c & 1 == 1 {
                    xor_region(dst, src);
                }
            }
            Field::Gf256 => gf_mul_add_region(dst, src, c),
        }
    }

    /// `dst = c * dst`, elementwise.
    #[inline]
    pub fn scale_region(self, dst: &mut [u8], c: u8) {
        match self {
            Field::Binary => {
                if c & 1 == 0 {
                    dst.iter_mut().for_each(|d| *d = 0);
                }
            }
            Field::Gf256 => gf_scale_region(dst, c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gf_mul_shift(mut a: u8, mut b: u8) -> u8 {
        let mut res = 0u8;
        while b != 0 {
            if b & 1 != 0 {
                res ^= a;
            }
            let carry = a & 0x80;
            a <<= 1;
            if carry != 0 {
                a ^= IRREDUCIBLE_POLY as u8;
            }
            b >>= 1;
        }
        res
    }

    #[test]
    fn table_matches_shift_multiply() {
        init_gf_tables();
        for a in 0..=255u8 {
            for b in 0..=255u8 {
                assert_eq!(gf_mul_table(a, b), gf_mul_shift(a, b), "{a} * {b}");
            }
        }
    }

    #[test]
    fn inverse_round_trip() {
        for a in 1..=255u8 {
            let inv = Field::Gf256.inv(a).unwrap();
            assert_eq!(Field::Gf256.mul(a, inv), 1);
        }
        assert!(matches!(Field::Gf256.inv(0), Err(SncError::DivideByZero)));
        assert!(matches!(Field::Binary.inv(0), Err(SncError::DivideByZero)));
        assert_eq!(Field::Binary.inv(1).unwrap(), 1);
    }

    #[test]
    fn binary_is_and_xor() {
        let f = Field::Binary;
        assert_eq!(f.mul(1, 1), 1);
        assert_eq!(f.mul(1, 0), 0);
        assert_eq!(f.add(1, 1), 0);
        assert_eq!(f.div(1, 1).unwrap(), 1);
        assert!(f.contains(1));
        assert!(!f.contains(2));
    }

    #[test]
    fn region_ops_agree_with_scalar() {
        let src: Vec<u8> = (0..64).map(|i| (i * 7 + 3) as u8).collect();
        let mut dst: Vec<u8> = (0..64).map(|i| (i * 13) as u8).collect();
        let before = dst.clone();
        Field::Gf256.mul_add_region(&mut dst, &src, 0x53);
        for i in 0..64 {
            assert_eq!(dst[i], before[i] ^ gf_mul_shift(0x53, src[i]));
        }

        let mut scaled = src.clone();
        Field::Gf256.scale_region(&mut scaled, 0x1d);
        for i in 0..64 {
            assert_eq!(scaled[i], gf_mul_shift(0x1d, src[i]));
        }

        let mut x = before.clone();
        Field::Binary.mul_add_region(&mut x, &src, 1);
        Field::Binary.mul_add_region(&mut x, &src, 1);
        assert_eq!(x, before);
    }
}
