//! Table driven approximation of `exp(-x)` for non-negative `x`.
//!
//! The argument is converted to `f32` and split into its binary exponent and the
//! top 7, middle 8 and low 8 bits of the mantissa. `exp(-x)` is then the product
//! of three precomputed factors. Arguments below 1/32 use a short Taylor series
//! and arguments of 32 and above return zero.

use std::sync::LazyLock;

use crate::sim::constants::FAST_EXP_MAX_TAYLOR;

/// Number of binary exponents covered by the tables: x in [2^-5, 2^5).
const NUM_EXP: usize = 10;
/// Offset between the biased `f32` exponent and the table exponent index.
const EXP_OFFSET: i32 = 122;

struct ExpTables {
    /// exp(-2^(l-5) * (1 + j/2^7)) for the top 7 mantissa bits.
    top: Vec<[f64; NUM_EXP]>,
    /// exp(-2^(l-5) * j/2^15) and exp(-2^(l-5) * j/2^23) for the two low bytes.
    low: Vec<[[f64; NUM_EXP]; 2]>,
}

static TABLES: LazyLock<ExpTables> = LazyLock::new(|| {
    let top = (0..128)
        .map(|j| {
            std::array::from_fn(|l| {
                let scale = 2f64.powi(l as i32 - 5);
                (-scale * (1. + j as f64 / 128.)).exp()
            })
        })
        .collect();
    let low = (0..256)
        .map(|j| {
            [15, 23].map(|shift| {
                std::array::from_fn(|l| {
                    let scale = 2f64.powi(l as i32 - 5);
                    (-scale * j as f64 / 2f64.powi(shift)).exp()
                })
            })
        })
        .collect();
    ExpTables { top, low }
});

/// Approximates `exp(-negarg)`.
///
/// Zero, negative and NaN arguments are evaluated exactly.
pub fn fast_exp(negarg: f64) -> f64 {
    if !(negarg > 0.) {
        return (-negarg).exp();
    }

    let bits = (negarg as f32).to_bits();
    let l = ((bits >> 23) & 0xff) as i32 - EXP_OFFSET;

    if l < 0 {
        let mut result = 1.;
        for i in (1..=FAST_EXP_MAX_TAYLOR).rev() {
            result = 1. - negarg * result / i as f64;
        }
        return result;
    }
    if l as usize >= NUM_EXP {
        return 0.;
    }

    let l = l as usize;
    let mantissa = bits & 0x7f_ffff;
    let j0 = (mantissa >> 16) as usize;
    let j1 = ((mantissa >> 8) & 0xff) as usize;
    let j2 = (mantissa & 0xff) as usize;

    let t = &*TABLES;
    t.top[j0][l] * t.low[j1][0][l] * t.low[j2][1][l]
}
