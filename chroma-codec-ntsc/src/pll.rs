// Chroma
// Copyright (c) 2026 The Project Chroma Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `pll` module locks the local subcarrier reference to the colour burst.
//!
//! Each line carries 8 to 9 cycles of the 3.58 MHz subcarrier after HSYNC. Within the burst
//! window the incoming samples are multiplied by the local sine and cosine references and
//! low-passed to quadrature components; the pair with the largest magnitude during the window
//! is kept. At the end of the window the phase error is folded into the reference phase and
//! the frequency multiplier is re-estimated. A burst whose magnitude falls outside the lock
//! window leaves the previous estimates in place.

use std::f64::consts::PI;

use chroma_core::dsp::coeffs;
use chroma_core::dsp::filter::Filter;
use log::debug;

use crate::sync::TICKS_PER_LINE;

/// Samples per subcarrier cycle at the 8 x Fsc capture rate.
pub const SAMPLES_PER_CYCLE: usize = 8;

/// Minimum burst magnitude accepted for a phase update.
pub const BURST_LEVEL_MIN: f64 = 0.02;

/// Maximum burst magnitude accepted for a phase update.
pub const BURST_LEVEL_MAX: f64 = 0.10;

// Sanity band for the frequency multiplier under normal tracking.
const ADJFREQ_MIN: f64 = 0.95;
const ADJFREQ_MAX: f64 = 1.05;

/// Time-base estimation strategy.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TbcMode {
    /// Derive the frequency multiplier from the tracked line length.
    Hsync,
    /// Derive the frequency multiplier from the burst phase error itself.
    Cburst,
}

pub struct BurstPll {
    phase: f64,
    adjfreq: f64,
    level: f64,
    phased: bool,
    reliable: bool,
    tbc: TbcMode,
    f_synci: Filter,
    f_syncq: Filter,
    peak: f64,
    peak_i: f64,
    peak_q: f64,
    sin_tab: [f64; SAMPLES_PER_CYCLE],
    cos_tab: [f64; SAMPLES_PER_CYCLE],
    burst_start: i64,
    burst_end: i64,
}

impl BurstPll {
    /// Instantiate a PLL with the burst window `[burst_start, burst_end)`, in ticks after
    /// HSYNC.
    pub fn new(burst_start: u32, burst_end: u32) -> BurstPll {
        let mut pll = BurstPll {
            phase: 0.0,
            adjfreq: 1.0,
            level: 0.0,
            phased: false,
            reliable: true,
            tbc: TbcMode::Hsync,
            f_synci: coeffs::filter("burst_0_6mhz_b65"),
            f_syncq: coeffs::filter("burst_0_6mhz_b65"),
            peak: 0.0,
            peak_i: 0.0,
            peak_q: 0.0,
            sin_tab: [0.0; SAMPLES_PER_CYCLE],
            cos_tab: [0.0; SAMPLES_PER_CYCLE],
            burst_start: i64::from(burst_start),
            burst_end: i64::from(burst_end),
        };
        pll.regen_tables();
        pll
    }

    pub fn set_tbc_mode(&mut self, tbc: TbcMode) {
        self.tbc = tbc;
    }

    /// Feed one sample at stream position `counter`, `lastsync` ticks after the last HSYNC.
    ///
    /// `igap` and `line_len` are the tracker's most recent inter-sync gap and corrected
    /// line-length estimate.
    pub fn observe(&mut self, dn: f64, counter: u64, lastsync: i64, igap: i64, line_len: f64) {
        if lastsync >= self.burst_start && lastsync < self.burst_end {
            let q = self.f_syncq.feed(dn * self.cos_at(counter));
            let i = self.f_synci.feed(-dn * self.sin_at(counter));

            let mag = (i * i + q * q).sqrt();
            if mag > self.peak {
                self.peak = mag;
                self.peak_i = i;
                self.peak_q = q;
            }
        }

        if lastsync == self.burst_end && igap > 1700 && igap < 1900 {
            self.end_of_burst(igap, line_len);
        }
    }

    /// Fold the held peak into the phase and frequency estimates.
    fn end_of_burst(&mut self, igap: i64, line_len: f64) {
        let fc = self.peak_q;
        let fci = self.peak_i;
        let level = self.peak;

        self.level = level;
        self.peak = 0.0;
        self.peak_i = 0.0;
        self.peak_q = 0.0;

        if level < BURST_LEVEL_MIN || level > BURST_LEVEL_MAX {
            // No usable burst; carry the previous phase and frequency.
            self.reliable = false;
            return;
        }

        let mut padj = fci.atan2((fc * fc + fci * fci).sqrt());

        if fc > 0.0 {
            if igap > TICKS_PER_LINE {
                padj = PI / 2.0 - padj;
            }
            else {
                padj = -PI / 2.0 - padj;
            }
        }

        self.phase -= padj * std::f64::consts::SQRT_2;
        while self.phase <= -PI {
            self.phase += 2.0 * PI;
        }
        while self.phase > PI {
            self.phase -= 2.0 * PI;
        }

        self.regen_tables();
        self.phased = true;

        let adjfreq = match self.tbc {
            TbcMode::Hsync => TICKS_PER_LINE as f64 / line_len,
            TbcMode::Cburst => {
                TICKS_PER_LINE as f64 / (TICKS_PER_LINE as f64 + padj * (PI / 2.0))
            }
        };

        if adjfreq >= ADJFREQ_MIN && adjfreq <= ADJFREQ_MAX {
            self.adjfreq = adjfreq;
            self.reliable = true;
        }
        else {
            debug!("frequency multiplier {} out of band; carrying prior estimate", adjfreq);
            self.reliable = false;
        }
    }

    fn regen_tables(&mut self) {
        for e in 0..SAMPLES_PER_CYCLE {
            let angle = self.phase + 2.0 * PI * (e as f64 / SAMPLES_PER_CYCLE as f64);
            self.cos_tab[e] = angle.cos();
            self.sin_tab[e] = angle.sin();
        }
    }

    /// The local cosine reference at stream position `n`.
    pub fn cos_at(&self, n: u64) -> f64 {
        self.cos_tab[(n % SAMPLES_PER_CYCLE as u64) as usize]
    }

    /// The local sine reference at stream position `n`.
    pub fn sin_at(&self, n: u64) -> f64 {
        self.sin_tab[(n % SAMPLES_PER_CYCLE as u64) as usize]
    }

    /// Reference phase offset, in radians, always in `(-pi, pi]`.
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Normalized frequency multiplier; 1.0 is nominal.
    pub fn adjfreq(&self) -> f64 {
        self.adjfreq
    }

    /// Magnitude of the last held burst peak.
    pub fn level(&self) -> f64 {
        self.level
    }

    /// Whether the most recent line produced an in-band burst and frequency estimate.
    pub fn line_reliable(&self) -> bool {
        self.reliable
    }

    /// Take the updated `(adjfreq, phase)` pair if a phase update happened since the last
    /// call.
    pub fn take_phased(&mut self) -> Option<(f64, f64)> {
        if self.phased {
            self.phased = false;
            Some((self.adjfreq, self.phase))
        }
        else {
            None
        }
    }
}
