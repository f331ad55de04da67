// Chroma
// Copyright (c) 2026 The Project Chroma Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `rgb` module converts the decoded YIQ frame buffer into 16-bit RGB output.
//!
//! Luma is normalized against the black and white IRE reference levels from the metadata,
//! optionally against the 75% white point, then the colour-difference components are matrixed
//! in and the result is clamped and scaled to the full 16-bit range.

use chroma_core::decoder::{CombConfig, DecoderConfig};

use crate::demod::Yiq;
use crate::sync::SAMPLE_SCALE;

fn clamp(v: f64, low: f64, high: f64) -> f64 {
    if v < low {
        low
    }
    else if v > high {
        high
    }
    else {
        v
    }
}

/// Convert a full YIQ frame buffer to interleaved 16-bit RGB triplets.
///
/// When `motion` is provided, the motion metric replaces the red channel.
pub fn convert(
    frame: &[Yiq],
    motion: Option<&[f64]>,
    dconf: &DecoderConfig,
    config: &CombConfig,
) -> Vec<u16> {
    let video = &dconf.video;

    let black = f64::from(video.black16b_ire) / SAMPLE_SCALE;
    let white = f64::from(video.white16b_ire) / SAMPLE_SCALE;

    let mut range = white - black;
    if !config.white_point_100 {
        range *= 0.75;
    }

    let mut out = Vec::with_capacity(frame.len() * 3);

    for (p, px) in frame.iter().enumerate() {
        let y = (px.y - black) / range;

        let (i, q) = if config.black_and_white {
            (0.0, 0.0)
        }
        else {
            (px.i / range, px.q / range)
        };

        let mut r = (y * 1.164) + (1.596 * i);
        let g = (y * 1.164) - (0.813 * i) - (q * 0.391);
        let b = (y * 1.164) + (q * 2.018);

        if let Some(motion) = motion {
            r = motion[p] * 4.0;
        }

        out.push((clamp(r, 0.0, 1.0) * 65535.0).round() as u16);
        out.push((clamp(g, 0.0, 1.0) * 65535.0).round() as u16);
        out.push((clamp(b, 0.0, 1.0) * 65535.0).round() as u16);
    }

    out
}
