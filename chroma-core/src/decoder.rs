// Chroma
// Copyright (c) 2026 The Project Chroma Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `decoder` module defines the interface between the decoder pool and the decoders.
//!
//! A decoder is configured once with the source video parameters, reports how many frames of
//! look-behind and look-ahead its algorithm requires, and then constructs one worker per pool
//! thread. Workers receive contiguous windows of source fields and produce frames; the pool
//! takes care of scheduling and output ordering.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use bitflags::bitflags;

use crate::errors::{config_error, Result};
use crate::meta::{FieldMeta, VideoParameters};

bitflags! {
    /// Status flags attached to a decoded frame.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct FrameFlags: u32 {
        /// Synchronization or burst lock was lost while decoding the frame. The frame was
        /// emitted with black fill.
        const LOW_CONFIDENCE = 1 << 0;
        /// One or both source fields were padding inserted by the mapping stage.
        const PADDED = 1 << 1;
        /// The white flag was present on an early field line.
        const WHITE_FLAG = 1 << 2;
    }
}

/// VBI data recovered while decoding a frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameVbi {
    /// A Philips code read from the vertical interval, if any.
    pub philips_code: Option<u32>,
    /// Closed-caption byte pair recovered from line 21, if any.
    pub closed_caption: Option<(u8, u8)>,
}

/// One source field: its metadata record paired with its samples.
#[derive(Clone)]
pub struct SourceField {
    pub seq: usize,
    pub meta: FieldMeta,
    pub samples: Arc<Vec<u16>>,
}

/// One decoded output frame: 16-bit RGB triplets covering the active region.
pub struct OutputFrame {
    pub data: Vec<u16>,
    pub flags: FrameFlags,
    pub vbi: FrameVbi,
}

/// Options common to the composite decoders.
#[derive(Copy, Clone, Debug)]
pub struct CombConfig {
    /// Emit luma only, with zeroed chroma.
    pub black_and_white: bool,
    /// Scale output against the 100% white point; when false the 75% reference is used.
    pub white_point_100: bool,
    /// Enable the field-delayed temporal comb.
    pub use_3d: bool,
    /// Substitute the motion metric for the red channel.
    pub show_optical_flow_map: bool,
}

impl Default for CombConfig {
    fn default() -> Self {
        CombConfig {
            black_and_white: false,
            white_point_100: true,
            use_3d: false,
            show_optical_flow_map: false,
        }
    }
}

/// Output geometry derived from the source video parameters at configure time.
#[derive(Clone, Debug)]
pub struct DecoderConfig {
    pub video: VideoParameters,
    /// First active frame row mapped from the field line numbering.
    pub first_active_field_line: u32,
    /// Active frame rows in the output.
    pub output_rows: u32,
}

impl DecoderConfig {
    pub fn new(
        video: VideoParameters,
        first_active_field_line: u32,
        output_rows: u32,
    ) -> Result<DecoderConfig> {
        if video.active_video_end <= video.active_video_start {
            return config_error("decoder: empty active video region");
        }
        if video.active_video_end > video.field_width {
            return config_error("decoder: active video region exceeds the field width");
        }
        if output_rows / 2 + first_active_field_line > video.field_height {
            return config_error("decoder: active lines exceed the field height");
        }

        Ok(DecoderConfig { video, first_active_field_line, output_rows })
    }

    /// Output width in pixels.
    pub fn output_width(&self) -> usize {
        (self.video.active_video_end - self.video.active_video_start) as usize
    }

    /// Output height in rows.
    pub fn output_height(&self) -> usize {
        self.output_rows as usize
    }
}

/// A frame decoder.
///
/// The pool calls [`FrameDecoder::configure`] with the source video parameters, then calls
/// [`FrameDecoder::make_worker`] once per thread. State shared by every worker belongs on the
/// decoder; per-thread state belongs on the worker.
pub trait FrameDecoder: Send + Sync {
    /// Configure the decoder. Returns an error if the source video is not compatible.
    fn configure(&mut self, video: &VideoParameters) -> Result<()>;

    /// The number of frames the decoder needs to see into the past.
    fn look_behind(&self) -> usize {
        0
    }

    /// The number of frames the decoder needs to see into the future.
    fn look_ahead(&self) -> usize {
        0
    }

    /// Construct a worker. Must be called after a successful `configure`.
    fn make_worker(&self) -> Box<dyn DecodeWorker>;
}

/// Per-thread decode state.
pub trait DecodeWorker: Send {
    /// Decode a window of fields into frames.
    ///
    /// Fields `[0, start)` are look-behind context: they are decoded to warm internal state
    /// and their output is discarded. Fields `[start, end)` are decoded into the returned
    /// frames, two fields per frame. Fields past `end` are look-ahead context.
    ///
    /// Implementations poll `abort` at each frame boundary and return early once it is
    /// raised, possibly with fewer frames than requested; the pool discards the partial
    /// result.
    ///
    /// Given identical field windows, two workers must produce bit-identical frames; all
    /// decode state is re-derived from the window.
    fn decode_frames(
        &mut self,
        fields: &[SourceField],
        start: usize,
        end: usize,
        abort: &AtomicBool,
    ) -> Result<Vec<OutputFrame>>;
}
