// Chroma
// Copyright (c) 2026 The Project Chroma Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `comb` module decodes field pairs into full frames.
//!
//! Each source field is streamed sample by sample through the sync tracker, the burst PLL,
//! and the quadrature demodulator; demodulated pixels inside the active region land in an
//! interlaced YIQ frame buffer. In 3D mode the chroma of low-motion pixels is taken from the
//! previous frame, guided by a box-averaged luma-difference metric. The finished buffer is
//! converted to 16-bit RGB covering the active region.

use chroma_core::decoder::{CombConfig, DecoderConfig, FrameFlags, FrameVbi, SourceField};
use chroma_core::errors::{decode_error, Result};
use log::debug;

use crate::demod::{ChromaDemod, Yiq};
use crate::pll::BurstPll;
use crate::rgb;
use crate::sync::{LineKind, SyncEvent, SyncTracker, SAMPLE_SCALE};
use crate::vbi;

/// Field line (cfline) of the first line written to the frame buffer.
pub const FIRST_ACTIVE_FIELD_LINE: i32 = 16;

/// Interlaced rows in the output frame.
pub const OUTPUT_ROWS: u32 = 480;

/// Base per-pixel luma-difference accepted as "no motion", at the nominal 20 IRE burst.
const MOTION_THRESHOLD: f64 = 0.1;

/// Chroma lands this many columns after its luma.
const CHROMA_OFFSET: usize = 8;

/// A decoded frame before it is handed back to the pool.
pub struct DecodedFrame {
    pub data: Vec<u16>,
    pub flags: FrameFlags,
    pub vbi: FrameVbi,
}

pub struct Comb {
    config: CombConfig,
    dconf: DecoderConfig,
    sync: SyncTracker,
    pll: BurstPll,
    demod: ChromaDemod,
    frame: Vec<Yiq>,
    prev_frame: Vec<Yiq>,
    have_prev: bool,
    motion: Vec<f64>,
    line_samples: Vec<f64>,
    white_flag: bool,
    philips: Option<u32>,
    closed_caption: Option<(u8, u8)>,
    sync_lost: bool,
}

impl Comb {
    pub fn new(dconf: DecoderConfig, config: CombConfig) -> Comb {
        let burst_start = dconf.video.colour_burst_start;
        let burst_end = dconf.video.colour_burst_end;
        let pixels = dconf.output_width() * dconf.output_height();

        Comb {
            config,
            sync: SyncTracker::new(),
            pll: BurstPll::new(burst_start, burst_end),
            demod: ChromaDemod::new(true, true),
            frame: vec![Yiq::default(); pixels],
            prev_frame: vec![Yiq::default(); pixels],
            have_prev: false,
            motion: vec![0.0; pixels],
            line_samples: Vec::with_capacity(2200),
            white_flag: false,
            philips: None,
            closed_caption: None,
            sync_lost: false,
            dconf,
        }
    }

    /// Decode one field pair into a frame.
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
            // Unrecoverable sync loss: emit the frame as black and start the next one with
            // cleared filter state.
            debug!("frame starting at field {} emitted as black after sync loss", first.seq);
            flags |= FrameFlags::LOW_CONFIDENCE;
            self.frame.iter_mut().for_each(|px| *px = Yiq::default());
            self.demod = ChromaDemod::new(true, true);
        }
        else if self.config.use_3d {
            self.apply_3d(first, second);
        }

        if self.config.use_3d {
            self.prev_frame.copy_from_slice(&self.frame);
            self.have_prev = true;
        }

        let motion = if self.config.show_optical_flow_map { Some(&self.motion[..]) } else { None };
        let data = rgb::convert(&self.frame, motion, &self.dconf, &self.config);

        Ok(DecodedFrame {
            data,
            flags,
            vbi: FrameVbi { philips_code: self.philips, closed_caption: self.closed_caption },
        })
    }

    fn begin_frame(&mut self) {
        self.frame.iter_mut().for_each(|px| *px = Yiq::default());
        self.motion.iter_mut().for_each(|m| *m = 0.0);
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
            return decode_error("comb: field sample count does not match the video parameters");
        }

        let black = f64::from(video.black16b_ire) / SAMPLE_SCALE;

        for line in 0..height {
            let spans = field.meta.dropouts_on_line(line as u32, &video);
            let row = &field.samples[line * width..(line + 1) * width];

            for (x, &raw) in row.iter().enumerate() {
                let mut dn = f64::from(raw) / SAMPLE_SCALE;

                // Corrupted intervals are forced to black level; a masked burst fails the
                // PLL lock window and the prior phase estimate carries.
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

        self.pll.observe(dn, counter, lastsync, self.sync.igap(), self.sync.line_len());

        if let Some((adjfreq, phase)) = self.pll.take_phased() {
            log::trace!(
                "line {}: burst level {:.4}, phase {:.4}, adjfreq {:.5}",
                self.sync.cfline(),
                self.pll.level(),
                phase,
                adjfreq
            );
        }

        let px = self.demod.feed(dn, counter, lastsync, &self.pll);

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
                let base = row * width;
                self.frame[base + col].y = px.y;
                if col + CHROMA_OFFSET < width {
                    self.frame[base + col + CHROMA_OFFSET].i = px.i;
                    self.frame[base + col + CHROMA_OFFSET].q = px.q;
                }
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
                        // The white flag marks the first field of a film frame.
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
                self.demod.reset_comb();
            }
            SyncEvent::SyncLoss => {
                self.sync_lost = true;
            }
        }
    }

    /// Substitute previous-frame chroma where the scene is static.
    ///
    /// The motion metric is the absolute luma difference against the previous frame,
    /// averaged over a 5x5 window. The acceptance threshold scales with the median burst
    /// amplitude of the source fields.
    fn apply_3d(&mut self, first: &SourceField, second: &SourceField) {
        if !self.have_prev {
            return;
        }

        let width = self.dconf.output_width();
        let rows = self.dconf.output_height();

        let burst_ire = {
            let mean = (first.meta.median_burst_ire + second.meta.median_burst_ire) / 2.0;
            if mean > 0.0 {
                mean
            }
            else {
                20.0
            }
        };
        let threshold = MOTION_THRESHOLD * (burst_ire / 20.0);

        // Box-average as two separable passes: horizontal 5-wide means, then vertical.
        let mut blurred = vec![0.0; width * rows];

        for row in 0..rows {
            for col in 0..width {
                let lo = col.saturating_sub(2);
                let hi = (col + 2).min(width - 1);

                let mut acc = 0.0;
                for c in lo..=hi {
                    let p = row * width + c;
                    acc += (self.frame[p].y - self.prev_frame[p].y).abs();
                }
                blurred[row * width + col] = acc / (hi - lo + 1) as f64;
            }
        }

        for col in 0..width {
            for row in 0..rows {
                let lo = row.saturating_sub(2);
                let hi = (row + 2).min(rows - 1);

                let mut acc = 0.0;
                for r in lo..=hi {
                    acc += blurred[r * width + col];
                }
                self.motion[row * width + col] = acc / (hi - lo + 1) as f64;
            }
        }

        for (p, px) in self.frame.iter_mut().enumerate() {
            if self.motion[p] < threshold {
                px.i = self.prev_frame[p].i;
                px.q = self.prev_frame[p].q;
            }
        }
    }
}
