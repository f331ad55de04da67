// Chroma
// Copyright (c) 2026 The Project Chroma Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]
// The following lints are allowed in all Chroma crates. Please see the workspace Cargo.toml for
// their justification.
#![allow(clippy::comparison_chain)]
#![allow(clippy::excessive_precision)]
#![allow(clippy::identity_op)]
#![allow(clippy::manual_range_contains)]

//! NTSC composite decoders for LaserDisc captures.
//!
//! [`NtscDecoder`] recovers full colour through the 2D line comb, optionally extended with
//! the motion-gated 3D temporal comb. [`MonoDecoder`] runs the same luma path with chroma
//! zeroed. Both implement [`FrameDecoder`] and are driven by the decoder pool.

use std::sync::atomic::{AtomicBool, Ordering};

use chroma_core::decoder::{
    CombConfig, DecodeWorker, DecoderConfig, FrameDecoder, OutputFrame, SourceField,
};
use chroma_core::errors::{config_error, unsupported_error, Result};
use chroma_core::meta::VideoParameters;

pub mod comb;
pub mod demod;
pub mod mono;
pub mod pll;
pub mod rgb;
pub mod sync;
pub mod vbi;

use comb::Comb;
use mono::Mono;

fn check_video_parameters(video: &VideoParameters) -> Result<()> {
    if video.is_source_pal {
        return unsupported_error("ntsc: decoder requires an NTSC source");
    }

    // The sync and subcarrier constants assume an 8 x Fsc capture; other rates would need
    // rescaled acceptance bands.
    let ratio = f64::from(video.sample_rate) / f64::from(video.fsc);
    if (ratio - 8.0).abs() > 0.1 {
        return config_error("ntsc: sample rate must be 8 x fsc");
    }

    Ok(())
}

/// The NTSC colour decoder.
pub struct NtscDecoder {
    config: CombConfig,
    dconf: Option<DecoderConfig>,
}

impl NtscDecoder {
    pub fn new(config: CombConfig) -> NtscDecoder {
        NtscDecoder { config, dconf: None }
    }
}

impl FrameDecoder for NtscDecoder {
    fn configure(&mut self, video: &VideoParameters) -> Result<()> {
        check_video_parameters(video)?;

        self.dconf = Some(DecoderConfig::new(
            video.clone(),
            comb::FIRST_ACTIVE_FIELD_LINE as u32,
            comb::OUTPUT_ROWS,
        )?);

        Ok(())
    }

    fn look_behind(&self) -> usize {
        // One frame warms the sync tracker and PLL; in 3D mode it also supplies the
        // previous-frame chroma.
        1
    }

    fn make_worker(&self) -> Box<dyn DecodeWorker> {
        let dconf = self.dconf.clone().expect("configure must be called before make_worker");
        Box::new(NtscWorker { config: self.config, dconf })
    }
}

struct NtscWorker {
    config: CombConfig,
    dconf: DecoderConfig,
}

impl DecodeWorker for NtscWorker {
    fn decode_frames(
        &mut self,
        fields: &[SourceField],
        start: usize,
        end: usize,
        abort: &AtomicBool,
    ) -> Result<Vec<OutputFrame>> {
        // Fresh decode state per window keeps the output independent of scheduling; the
        // look-behind pairs are decoded and discarded to warm it up.
        let mut comb = Comb::new(self.dconf.clone(), self.config);
        let mut out = Vec::with_capacity((end - start) / 2);

        let mut i = 0;
        while i + 1 < fields.len() && i < end {
            if abort.load(Ordering::SeqCst) {
                break;
            }

            let frame = comb.decode_frame(&fields[i], &fields[i + 1])?;
            if i >= start {
                out.push(OutputFrame { data: frame.data, flags: frame.flags, vbi: frame.vbi });
            }
            i += 2;
        }

        Ok(out)
    }
}

/// The luma-only decoder.
///
/// Runs the sync path only: no burst tracking, no chroma demodulation.
pub struct MonoDecoder {
    config: CombConfig,
    dconf: Option<DecoderConfig>,
}

impl MonoDecoder {
    pub fn new() -> MonoDecoder {
        let config = CombConfig { black_and_white: true, ..Default::default() };
        MonoDecoder { config, dconf: None }
    }
}

impl Default for MonoDecoder {
    fn default() -> Self {
        MonoDecoder::new()
    }
}

impl FrameDecoder for MonoDecoder {
    fn configure(&mut self, video: &VideoParameters) -> Result<()> {
        check_video_parameters(video)?;

        self.dconf = Some(DecoderConfig::new(
            video.clone(),
            comb::FIRST_ACTIVE_FIELD_LINE as u32,
            comb::OUTPUT_ROWS,
        )?);

        Ok(())
    }

    fn look_behind(&self) -> usize {
        // One frame warms the sync tracker.
        1
    }

    fn make_worker(&self) -> Box<dyn DecodeWorker> {
        let dconf = self.dconf.clone().expect("configure must be called before make_worker");
        Box::new(MonoWorker { config: self.config, dconf })
    }
}

struct MonoWorker {
    config: CombConfig,
    dconf: DecoderConfig,
}

impl DecodeWorker for MonoWorker {
    fn decode_frames(
        &mut self,
        fields: &[SourceField],
        start: usize,
        end: usize,
        abort: &AtomicBool,
    ) -> Result<Vec<OutputFrame>> {
        let mut mono = Mono::new(self.dconf.clone(), self.config);
        let mut out = Vec::with_capacity((end - start) / 2);

        let mut i = 0;
        while i + 1 < fields.len() && i < end {
            if abort.load(Ordering::SeqCst) {
                break;
            }

            let frame = mono.decode_frame(&fields[i], &fields[i + 1])?;
            if i >= start {
                out.push(OutputFrame { data: frame.data, flags: frame.flags, vbi: frame.vbi });
            }
            i += 2;
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ntsc_video() -> VideoParameters {
        VideoParameters {
            number_of_sequential_fields: 4,
            is_source_pal: false,
            colour_burst_start: 170,
            colour_burst_end: 270,
            active_video_start: 252,
            active_video_end: 1796,
            white16b_ire: 51200,
            black16b_ire: 16384,
            field_width: 1820,
            field_height: 263,
            sample_rate: 28636363,
            fsc: 3579545,
            is_mapped: false,
        }
    }

    #[test]
    fn verify_configure_accepts_ntsc() {
        let mut decoder = NtscDecoder::new(CombConfig::default());
        assert!(decoder.configure(&ntsc_video()).is_ok());
    }

    #[test]
    fn verify_configure_rejects_pal() {
        let mut video = ntsc_video();
        video.is_source_pal = true;

        let mut decoder = NtscDecoder::new(CombConfig::default());
        assert!(decoder.configure(&video).is_err());
    }

    #[test]
    fn verify_configure_rejects_other_sample_rates() {
        let mut video = ntsc_video();
        video.sample_rate = 14_318_181;

        let mut decoder = NtscDecoder::new(CombConfig::default());
        assert!(decoder.configure(&video).is_err());
    }
}
