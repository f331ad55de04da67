// Chroma
// Copyright (c) 2026 The Project Chroma Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `demod` module performs the per-sample quadrature demodulation of the composite
//! signal into Y, I, and Q.
//!
//! The incoming sample is multiplied by the PLL's sine and cosine references and low-passed
//! to recover the colour-difference components. Luma is the input delayed by the filter group
//! delay, with the reconstructed carrier added back in to cancel the chroma ripple. With the
//! line comb enabled, the demodulator input is the half-difference against the same column of
//! the previous line, which cancels luma and passes the alternating-phase subcarrier.

use chroma_core::dsp::coeffs;
use chroma_core::dsp::filter::Filter;

use crate::pll::BurstPll;
use crate::sync::TICKS_PER_LINE;

/// Gain applied to the demodulated colour-difference components.
///
/// The value is empirical; it matches the reference levels produced by the demodulation and
/// filter chain below.
pub const CHROMA_GAIN: f64 = 2.5;

/// Luma delay compensating the chroma filter group delay, in samples.
const LUMA_DELAY: usize = 17;

/// One demodulated pixel.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Yiq {
    pub y: f64,
    pub i: f64,
    pub q: f64,
}

pub struct ChromaDemod {
    f_i: Filter,
    f_q: Filter,
    f_post: Option<Filter>,
    delay: [f64; LUMA_DELAY],
    comb_ring: Option<Vec<f64>>,
}

impl ChromaDemod {
    /// Instantiate a demodulator.
    ///
    /// `line_comb` enables the one-line composite comb; `luma_post` enables the in-band
    /// low-pass over reconstructed luma.
    pub fn new(line_comb: bool, luma_post: bool) -> ChromaDemod {
        ChromaDemod {
            f_i: coeffs::filter("chroma_1_3mhz_b30"),
            f_q: coeffs::filter("chroma_1_3mhz_b30"),
            f_post: if luma_post { Some(coeffs::filter("luma_4_2mhz_b7")) } else { None },
            delay: [0.0; LUMA_DELAY],
            comb_ring: if line_comb { Some(vec![0.0; TICKS_PER_LINE as usize]) } else { None },
        }
    }

    /// Zero the comb ring, e.g. at a field boundary.
    pub fn reset_comb(&mut self) {
        if let Some(ring) = &mut self.comb_ring {
            ring.iter_mut().for_each(|v| *v = 0.0);
        }
    }

    /// Demodulate one sample at stream position `counter`, `lastsync` ticks into the line.
    pub fn feed(&mut self, dn: f64, counter: u64, lastsync: i64, pll: &BurstPll) -> Yiq {
        // The comb takes the half-difference against the previous line at the same column.
        // Adjacent lines carry the subcarrier in antiphase, so the difference cancels luma
        // and keeps chroma at full amplitude.
        let chroma_in = match &mut self.comb_ring {
            Some(ring) if lastsync >= 0 => {
                let x = (lastsync as usize) % ring.len();
                let prev = ring[x];
                ring[x] = dn;
                (dn - prev) / 2.0
            }
            _ => dn,
        };

        let q = self.f_q.feed(chroma_in * pll.cos_at(counter));
        let i = self.f_i.feed(-chroma_in * pll.sin_at(counter));

        let mut y = dn;
        if counter > LUMA_DELAY as u64 {
            y = self.delay[(counter % LUMA_DELAY as u64) as usize];
        }
        self.delay[(counter % LUMA_DELAY as u64) as usize] = dn;

        // Reinsert the carrier three samples back to cancel the chroma still riding on the
        // delayed luma.
        let iadj = i * 2.0 * pll.cos_at(counter.wrapping_add(5));
        let qadj = q * 2.0 * pll.sin_at(counter.wrapping_add(5));
        y += iadj + qadj;

        if let Some(post) = &mut self.f_post {
            y = post.feed(y);
        }

        Yiq { y, i: CHROMA_GAIN * i, q: CHROMA_GAIN * q }
    }
}
