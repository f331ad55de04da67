// Chroma
// Copyright (c) 2026 The Project Chroma Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `mono` module decodes luma only.
//!
//! The mono path runs the sync tracker, the luma delay line, and the in-band luma low-pass,
//! but no burst PLL and no chroma demodulation; chroma is identically zero. VBI recovery
//! still applies, since the white flag and Philips codes are luma signals.

use chroma_core::decoder::{CombConfig, DecoderConfig, FrameFlags, FrameVbi, SourceField};
use chroma_core::dsp::coeffs;
use chroma_core::dsp::filter::Filter;
use chroma_core::errors::{decode_error, Result};
use log::debug;

use crate::comb::DecodedFrame;
use crate::demod::Yiq;
use crate::rgb;
use crate::sync::{LineKind, SyncEvent, SyncTracker, SAMPLE_SCALE};
use crate::vbi;

/// Luma delay matching the colour path's group-delay compensation.
const LUMA_DELAY: usize = 17;

pub struct Mono {
    config: CombConfig,
    dconf: DecoderConfig,
    sync: SyncTracker,
    post: Filter,
    delay: [f64; LUMA_DELAY],
    frame: Vec<Yiq>,
    line_samples: Vec<f64>,
    white_flag: bool,
    philips: Option<u32>,
    closed_caption: Option<(u8, u8)>,
    sync_lost: bool,
}

impl Mono {
    pub fn new(dconf: DecoderConfig, config: CombConfig) -> Mono {
        let pixels = dconf.output_width() * dconf.output_height();

        Mono {
            config,
            sync: SyncTracker::new(),
            post: coeffs::filter("luma_4_2mhz_b7"),
            delay: [0.0; LUMA_DELAY],
            frame: vec![Yiq::default(); pixels],
            line_samples: Vec::with_capacity(2200),
            white_flag: false,
            philips: None,
            closed_caption: None,
            sync_lost: false,
            dconf,
        }
    }

    /// Decode one field pair into a luma-only frame.
    pub fn decode_frame(
        &mut self,
        first: &SourceField,
        second: &SourceField,
    ) -> Result<DecodedFrame> {
        self.begin_frame();

        self.feed_field(first)?;
        self.feed_field(second)?;

        let mut flags = FrameFlags::default();

        if first.meta.pad || second.meta.pad {
            flags |= FrameFlags::PADDED;
        }
        if self.white_flag {
            flags |= FrameFlags::WHITE_FLAG;
        }

        if self.sync.take_field_invalid() || self.sync_lost {
            debug!("frame starting at field {} emitted as black after sync loss", first.seq);
            flags |= FrameFlags::LOW_CONFIDENCE;
            self.frame.iter_mut().for_each(|px| *px = Yiq::default());
            self.post = coeffs::filter("luma_4_2mhz_b7");
            self.delay = [0.0; LUMA_DELAY];
        }

        let data = rgb::convert(&self.frame, None, &self.dconf, &self.config);

        Ok(DecodedFrame {
            data,
            flags,
            vbi: FrameVbi { philips_code: self.philips, closed_caption: self.closed_caption },
        })
    }

    fn begin_frame(&mut self) {
        self.frame.iter_mut().for_each(|px| *px = Yiq::default());
        self.white_flag = false;
        self.philips = None;
        self.closed_caption = None;
        self.sync_lost = false;
    }

    fn feed_field(&mut self, field: &SourceField) -> Result<()> {
        let video = self.dconf.video.clone();
        let width = video.field_width as usize;
        let height = video.field_height as usize;

        if field.samples.len() != width * height {
            return decode_error("mono: field sample count does not match the video parameters");
        }

        let black = f64::from(video.black16b_ire) / SAMPLE_SCALE;

        for line in 0..height {
            let spans = field.meta.dropouts_on_line(line as u32, &video);
            let row = &field.samples[line * width..(line + 1) * width];

            for (x, &raw) in row.iter().enumerate() {
                let mut dn = f64::from(raw) / SAMPLE_SCALE;

                for span in &spans {
                    if (x as u32) >= span.startx && (x as u32) < span.endx {
                        dn = black;
                        break;
                    }
                }

                self.feed_sample(dn);
            }
        }

        Ok(())
    }

    fn feed_sample(&mut self, sample: f64) {
        let events = self.sync.feed(sample);
        let dn = self.sync.dn();

        for ev in events {
            self.handle_event(ev);
        }

        if self.line_samples.len() < 2200 {
            self.line_samples.push(dn);
        }

        let counter = self.sync.counter();
        let lastsync = self.sync.lastsync();

        let mut y = dn;
        if counter > LUMA_DELAY as u64 {
            y = self.delay[(counter % LUMA_DELAY as u64) as usize];
        }
        self.delay[(counter % LUMA_DELAY as u64) as usize] = dn;

        let y = self.post.feed(y);

        let Some(parity) = self.sync.field_parity()
        else {
            return;
        };

        let cfline = self.sync.cfline();
        let first_line = self.dconf.first_active_field_line as i32;
        if cfline < first_line {
            return;
        }

        let width = self.dconf.output_width();
        let av_start = i64::from(self.dconf.video.active_video_start);

        if lastsync > av_start && lastsync < av_start + width as i64 {
            let row = ((cfline - first_line + 1) * 2) as usize + parity as usize;
            let col = (lastsync - av_start) as usize;

            if row < self.dconf.output_height() {
                self.frame[row * width + col].y = y;
            }
        }
    }

    fn handle_event(&mut self, ev: SyncEvent) {
        match ev {
            SyncEvent::LineStart { line, kind } => {
                if kind != LineKind::Synthesized {
                    if line >= 0 && line <= 3 && !self.white_flag
                        && vbi::white_flag(&self.line_samples)
                    {
                        self.white_flag = true;
                        self.sync.resync_field_count();
                    }
                    if line >= 6 && line <= 8 && self.philips.is_none() {
                        self.philips = vbi::philips_code(&self.line_samples);
                        if self.philips.map_or(false, vbi::is_lead_in) {
                            self.sync.resync_field_count();
                        }
                    }
                    if line >= 11 && line <= 12 && self.closed_caption.is_none() {
                        self.closed_caption = vbi::closed_caption(&self.line_samples);
                    }
                }
                self.line_samples.clear();
            }
            SyncEvent::FieldBoundary { parity, frame_complete } => {
                debug!("field boundary, parity {}, frame complete {}", parity, frame_complete);
            }
            SyncEvent::SyncLoss => {
                self.sync_lost = true;
            }
        }
    }
}
