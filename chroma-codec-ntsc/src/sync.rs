// Chroma
// Copyright (c) 2026 The Project Chroma Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `sync` module tracks horizontal and vertical synchronization in the sample stream.
//!
//! The tracker consumes one normalized sample at a time and reports line boundaries, field
//! boundaries, and sync loss as events. Line classification is driven by the gap between
//! successive HSYNC detections; accepted gaps feed a low-pass filter whose output is the
//! corrected line-length estimate used by the burst PLL in HSYNC time-base mode.

use chroma_core::dsp::coeffs;
use chroma_core::dsp::filter::Filter;
use log::debug;
use smallvec::SmallVec;

/// Nominal samples per line at the 8 x Fsc capture rate.
pub const TICKS_PER_LINE: i64 = 1820;

/// Divisor mapping raw 16-bit samples onto the voltage-like 0.0 (sync tip) to 1.0 (peak
/// white) range.
pub const SAMPLE_SCALE: f64 = 62000.0;

/// Normalized level below which a sample votes "low" for sync detection.
pub const SYNC_LOW: f64 = 0.1;

/// Normalized level above which a sample votes for sync release.
const SYNC_HIGH: f64 = 0.2;

const SYNC_WINDOW: usize = 32;
const SYNC_DETECT_VOTES: usize = 24;
const SYNC_RELEASE_VOTES: usize = 16;

// Inter-sync gap acceptance bands, in ticks.
const HALF_LINE_MIN: i64 = 880;
const HALF_LINE_MAX: i64 = 940;
const LINE_MIN: i64 = 1800;
const LINE_MAX: i64 = 1840;

/// Field line count at which an equalization gap is taken as the vertical blank.
const VBLANK_SENTINEL: i32 = 253;

/// Ticks without an HSYNC before one is synthesized.
const WATCHDOG_TICKS: i64 = TICKS_PER_LINE + 260;

/// Consecutive anomalous lines tolerated before declaring sync loss.
const MAX_ANOMALOUS_RUN: u32 = 10;

/// Tracking state, derived from the detector counters.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SyncState {
    /// No horizontal lock yet, or lock was abandoned.
    Searching,
    /// Inside an HSYNC pulse.
    InSync,
    /// Between the trailing edge of HSYNC and the end of the burst window.
    PostSync,
    /// In the visible portion of a line.
    LineActive,
    /// In the vertical equalization region.
    VerticalBlank,
}

/// Classification of a completed line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LineKind {
    /// The inter-sync gap fell in the horizontal acceptance band.
    Normal,
    /// The gap fell in the vertical equalization band.
    HalfLine,
    /// The gap fell outside both bands; excluded from PLL and line-length tracking.
    Anomalous,
    /// No HSYNC arrived; the watchdog synthesized the boundary.
    Synthesized,
}

/// An event reported while feeding samples.
#[derive(Copy, Clone, Debug)]
pub enum SyncEvent {
    /// An HSYNC was found (or synthesized); the line numbered `line` is complete.
    LineStart { line: i32, kind: LineKind },
    /// The vertical blank was reached and the field parity is known.
    FieldBoundary { parity: u8, frame_complete: bool },
    /// Horizontal lock could not be held; the tracker reset to `Searching`.
    SyncLoss,
}

pub type SyncEvents = SmallVec<[SyncEvent; 2]>;

pub struct SyncTracker {
    window: [f64; SYNC_WINDOW],
    line_memory: Vec<f64>,
    counter: u64,
    lastsync: i64,
    cfline: i32,
    igap: i64,
    in_sync: bool,
    state: SyncState,
    field: i32,
    field_count: i32,
    line_len: Filter,
    anomalous_run: u32,
    field_invalid: bool,
    dn: f64,
}

impl SyncTracker {
    pub fn new() -> SyncTracker {
        let mut line_len = coeffs::filter("hsync_b8");
        for _ in 0..9 {
            line_len.feed(TICKS_PER_LINE as f64);
        }

        SyncTracker {
            window: [0.0; SYNC_WINDOW],
            line_memory: vec![0.0; TICKS_PER_LINE as usize],
            counter: 0,
            lastsync: -1,
            cfline: -1,
            igap: -1,
            in_sync: false,
            state: SyncState::Searching,
            field: -1,
            field_count: 0,
            line_len,
            anomalous_run: 0,
            field_invalid: false,
            dn: 0.0,
        }
    }

    /// Restore the tracker to its initial state.
    pub fn reset(&mut self) {
        *self = SyncTracker::new();
    }

    /// Advance by one normalized sample.
    pub fn feed(&mut self, raw: f64) -> SyncEvents {
        let mut events = SyncEvents::new();

        // Dropout shielding: an implausibly low sample in a region where no sync is expected
        // is replaced by the sample one line back, or failing that a value just above the
        // sync threshold.
        let mut dn = raw;
        if dn == 0.0 || (dn < SYNC_LOW && !self.expect_sync()) {
            dn = self.line_memory[(self.counter % TICKS_PER_LINE as u64) as usize];
            if dn < SYNC_LOW && !self.expect_sync() {
                dn = 0.101;
            }
        }
        self.line_memory[(self.counter % TICKS_PER_LINE as u64) as usize] = dn;
        self.dn = dn;

        self.counter += 1;
        if self.lastsync >= 0 {
            self.lastsync += 1;
        }

        self.window[(self.counter % SYNC_WINDOW as u64) as usize] = dn;

        if !self.in_sync {
            let low = self.window.iter().filter(|&&v| v < SYNC_LOW).count();
            if self.expect_sync() && low >= SYNC_DETECT_VOTES {
                self.on_sync(&mut events);
            }
        }
        else {
            let high = self.window.iter().filter(|&&v| v > SYNC_HIGH).count();
            if high >= SYNC_RELEASE_VOTES {
                self.in_sync = false;
            }
        }

        // Watchdog: jump to the next line when an HSYNC fails to arrive.
        if self.lastsync == WATCHDOG_TICKS {
            self.lastsync -= TICKS_PER_LINE;
            if self.cfline >= 0 {
                self.cfline += 1;
            }
            debug!("synthesized HSYNC at line {}", self.cfline);
            events.push(SyncEvent::LineStart { line: self.cfline, kind: LineKind::Synthesized });
            self.note_anomalous(&mut events);
        }

        self.state = self.derive_state();

        events
    }

    /// Handle an HSYNC detection: classify the line that just ended and restart the gap
    /// counter. Classification uses the gap recorded at the previous detection.
    fn on_sync(&mut self, events: &mut SyncEvents) {
        let completed = self.cfline;

        if self.igap > HALF_LINE_MIN && self.igap < HALF_LINE_MAX {
            if self.cfline >= VBLANK_SENTINEL {
                if self.cfline == VBLANK_SENTINEL + 1 {
                    self.field = 1;
                    self.field_count += 1;
                }
                else if self.field >= 0 {
                    self.field = 0;
                    self.field_count += 1;
                }

                let frame_complete = self.field_count >= 2;
                if frame_complete {
                    self.field_count = 0;
                }

                if self.field >= 0 {
                    events.push(SyncEvent::FieldBoundary {
                        parity: self.field as u8,
                        frame_complete,
                    });
                }
            }

            self.cfline = 0;
            self.anomalous_run = 0;
            events.push(SyncEvent::LineStart { line: completed, kind: LineKind::HalfLine });
        }
        else {
            let kind = if self.igap > LINE_MIN && self.igap < LINE_MAX {
                self.line_len.feed(self.igap as f64);
                self.anomalous_run = 0;
                LineKind::Normal
            }
            else if self.igap >= 0 {
                self.note_anomalous(events);
                LineKind::Anomalous
            }
            else {
                // First detection; there is no gap to judge yet.
                LineKind::Normal
            };

            if self.cfline >= 0 {
                self.cfline += 1;
            }
            events.push(SyncEvent::LineStart { line: completed, kind });
        }

        self.igap = self.lastsync;
        while self.igap > 3500 {
            self.igap -= TICKS_PER_LINE;
        }

        self.lastsync = 0;
        self.in_sync = true;
    }

    fn note_anomalous(&mut self, events: &mut SyncEvents) {
        self.anomalous_run += 1;

        if self.anomalous_run > MAX_ANOMALOUS_RUN {
            debug!("sync lost after {} consecutive anomalous lines", self.anomalous_run);

            self.field_invalid = true;
            self.in_sync = false;
            self.lastsync = -1;
            self.cfline = -1;
            self.igap = -1;
            self.field = -1;
            self.field_count = 0;
            self.anomalous_run = 0;

            events.push(SyncEvent::SyncLoss);
        }
    }

    /// Whether an HSYNC is plausible at the current stream position.
    fn expect_sync(&self) -> bool {
        if self.in_sync || self.cfline <= 0 {
            return true;
        }
        if self.lastsync > 1700 {
            return true;
        }
        if self.cfline >= 250 && self.lastsync > 850 && self.lastsync < 980 {
            return true;
        }

        false
    }

    fn derive_state(&self) -> SyncState {
        if self.in_sync {
            SyncState::InSync
        }
        else if self.lastsync < 0 {
            SyncState::Searching
        }
        else if self.cfline >= 0 && self.cfline < 10 {
            SyncState::VerticalBlank
        }
        else if self.lastsync <= 270 {
            SyncState::PostSync
        }
        else {
            SyncState::LineActive
        }
    }

    /// The last sample, after dropout shielding.
    pub fn dn(&self) -> f64 {
        self.dn
    }

    /// Samples consumed so far.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Ticks since the last HSYNC, or -1 before the first.
    pub fn lastsync(&self) -> i64 {
        self.lastsync
    }

    /// Current field line number, or -1 before the first vertical blank.
    pub fn cfline(&self) -> i32 {
        self.cfline
    }

    /// The gap recorded at the most recent detection.
    pub fn igap(&self) -> i64 {
        self.igap
    }

    /// The corrected line-length estimate.
    pub fn line_len(&self) -> f64 {
        self.line_len.peek()
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Field parity, once the vertical counter has disambiguated it.
    pub fn field_parity(&self) -> Option<u8> {
        if self.field >= 0 {
            Some(self.field as u8)
        }
        else {
            None
        }
    }

    /// Restart frame pairing so that the next field boundary opens a new frame.
    ///
    /// Driven by VBI marks that identify the first field of a film frame, such as the white
    /// flag and lead-in Philips codes.
    pub fn resync_field_count(&mut self) {
        self.field_count = 0;
    }

    /// Whether sync loss was declared since the last call to [`SyncTracker::take_field_invalid`].
    pub fn field_invalid(&self) -> bool {
        self.field_invalid
    }

    pub fn take_field_invalid(&mut self) -> bool {
        std::mem::take(&mut self.field_invalid)
    }
}

impl Default for SyncTracker {
    fn default() -> Self {
        SyncTracker::new()
    }
}
