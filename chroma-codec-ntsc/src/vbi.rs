// Chroma
// Copyright (c) 2026 The Project Chroma Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `vbi` module recovers data carried in the vertical blanking interval.
//!
//! Three services are decoded from normalized line samples: the white flag marking the first
//! field of a film frame, 24-bit Philips codes (picture numbers, chapter markers, lead-in
//! status), and the closed-caption byte pair on line 21.

/// Normalized level above which a sample counts as a "one" for flag and code detection.
const MARK_LEVEL: f64 = 0.8;

/// Samples above [`MARK_LEVEL`] required for a white flag.
const WHITE_FLAG_MIN_SAMPLES: usize = 600;

/// First tick of the Philips code bit cells.
const PHILIPS_START: usize = 160;

/// Width of one Philips bit cell, in ticks.
const PHILIPS_BIT_TICKS: usize = 57;

// Closed captions: 16 data bits follow the clock run-in and start bits, low-pass enough that
// sampling each bit cell at its centre suffices.
const CC_DATA_START: usize = 420;
const CC_BIT_TICKS: f64 = 56.875;
const CC_LEVEL: f64 = 0.35;

/// Detect the white flag: a line that is mostly at peak white.
pub fn white_flag(line: &[f64]) -> bool {
    let mut count = 0;

    for &s in line {
        if s > MARK_LEVEL {
            count += 1;
            if count > WHITE_FLAG_MIN_SAMPLES {
                return true;
            }
        }
    }

    false
}

/// Decode a 24-bit Philips code from a VBI line.
///
/// Each mark whose leading edge lands inside the acceptance region of bit cell `b` sets bit
/// `23 - b`. Returns `None` when no mark decodes to a set bit.
pub fn philips_code(line: &[f64]) -> Option<u32> {
    let mut run = 0usize;
    let mut code = 0u32;

    for (i, &s) in line.iter().enumerate() {
        if s > MARK_LEVEL {
            run += 1;
            continue;
        }

        if run > 0 {
            let first_one = (i - run) as i64 - PHILIPS_START as i64;
            let bit = first_one.div_euclid(PHILIPS_BIT_TICKS as i64);
            let offset = first_one - bit * PHILIPS_BIT_TICKS as i64;

            if bit >= 0 && bit < 24 && offset > 10 && offset < 50 {
                code |= 1 << (23 - bit);
            }
        }
        run = 0;
    }

    if code != 0 {
        Some(code)
    }
    else {
        None
    }
}

/// Whether a Philips code is a lead-in status code.
///
/// Lead-in codes mark the start of a disc side; like the white flag, they restart the frame
/// pairing.
pub fn is_lead_in(code: u32) -> bool {
    matches!(code & 0x00ff_0000, 0x00f8_0000 | 0x00fa_0000 | 0x00f0_0000)
}

/// Recover the two closed-caption bytes from line 21.
///
/// Sixteen bits are sampled at cell centres following the clock run-in, least significant
/// first, seven data bits plus odd parity per byte. Returns `None` unless both parity checks
/// pass.
pub fn closed_caption(line: &[f64]) -> Option<(u8, u8)> {
    let mut bits = [false; 16];

    for (k, bit) in bits.iter_mut().enumerate() {
        let idx = CC_DATA_START + ((k as f64 + 0.5) * CC_BIT_TICKS) as usize;
        if idx >= line.len() {
            return None;
        }
        *bit = line[idx] > CC_LEVEL;
    }

    let mut bytes = [0u8; 2];
    for (b, byte) in bytes.iter_mut().enumerate() {
        for k in 0..8 {
            if bits[8 * b + k] {
                *byte |= 1 << k;
            }
        }
    }

    // Both bytes carry odd parity.
    if bytes[0].count_ones() % 2 == 1 && bytes[1].count_ones() % 2 == 1 {
        Some((bytes[0], bytes[1]))
    }
    else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::sync::TICKS_PER_LINE;

    fn blank_line() -> Vec<f64> {
        vec![0.3; TICKS_PER_LINE as usize]
    }

    #[test]
    fn verify_white_flag_detection() {
        let mut line = blank_line();
        for s in line.iter_mut().skip(300).take(700) {
            *s = 0.9;
        }
        assert!(white_flag(&line));

        let mut short = blank_line();
        for s in short.iter_mut().skip(300).take(300) {
            *s = 0.9;
        }
        assert!(!white_flag(&short));
    }

    #[test]
    fn verify_philips_code_round_trip() {
        let code = 0x00f8_123a;

        let mut line = blank_line();
        for cell in 0..24 {
            if code & (1 << (23 - cell)) == 0 {
                continue;
            }
            let start = PHILIPS_START + cell * PHILIPS_BIT_TICKS + 20;
            for s in line.iter_mut().skip(start).take(25) {
                *s = 0.9;
            }
        }

        assert_eq!(philips_code(&line), Some(code));
    }

    #[test]
    fn verify_empty_line_has_no_philips_code() {
        assert_eq!(philips_code(&blank_line()), None);
    }

    #[test]
    fn verify_lead_in_codes() {
        assert!(is_lead_in(0x00f8_0123));
        assert!(is_lead_in(0x00fa_0000));
        assert!(is_lead_in(0x00f0_4567));

        // Picture numbers and chapter markers are not lead-in codes.
        assert!(!is_lead_in(0x00f1_2345));
        assert!(!is_lead_in(0x0088_0001));
    }

    #[test]
    fn verify_closed_caption_round_trip() {
        // 'C' (0x43) and '1' (0x31), both already odd parity over seven data bits.
        let (b0, b1) = (0x43u8, 0x31u8);

        let mut line = vec![0.05; TICKS_PER_LINE as usize];
        for k in 0..16 {
            let byte = if k < 8 { b0 } else { b1 };
            if byte & (1 << (k % 8)) != 0 {
                let start = CC_DATA_START + (k as f64 * CC_BIT_TICKS) as usize;
                let end = CC_DATA_START + ((k as f64 + 1.0) * CC_BIT_TICKS) as usize;
                for s in line.iter_mut().take(end).skip(start) {
                    *s = 0.6;
                }
            }
        }

        assert_eq!(closed_caption(&line), Some((b0, b1)));
    }

    #[test]
    fn verify_closed_caption_requires_parity() {
        // All-high data decodes to 0xff twice: even number of ones, parity fails.
        let line = vec![0.6; TICKS_PER_LINE as usize];
        assert_eq!(closed_caption(&line), None);
    }
}
