// Chroma
// Copyright (c) 2026 The Project Chroma Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `pool` module drives a decoder across a pool of worker threads.
//!
//! One dispatch cursor hands out contiguous batches of frames. Each worker fetches the field
//! window its batch needs (including the decoder's look-behind and look-ahead context),
//! decodes it, and posts the finished frames to a bounded reorder buffer which writes them to
//! the sink in strictly increasing frame order. Output is byte-identical for any thread
//! count: a batch's field window depends only on the cursor, never on scheduling.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::thread;

use log::{debug, info, warn};

use crate::decoder::{DecodeWorker, FrameDecoder, FrameFlags, OutputFrame, SourceField};
use crate::errors::{decode_error, Error, Result};
use crate::io::{write_samples_le, SourceVideo};
use crate::meta::MetaData;

/// Frames handed to a worker per dispatch.
pub const DEFAULT_BATCH_FRAMES: usize = 4;

/// Scheduling options for a decode run.
#[derive(Copy, Clone, Debug)]
pub struct PoolOptions {
    /// Number of worker threads.
    pub threads: usize,
    /// First frame to decode, zero-based.
    pub start_frame: usize,
    /// Number of frames to decode; `None` decodes to the end of the source.
    pub length: Option<usize>,
    /// Frames per worker dispatch.
    pub batch_frames: usize,
}

impl Default for PoolOptions {
    fn default() -> Self {
        PoolOptions {
            threads: thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            start_frame: 0,
            length: None,
            batch_frames: DEFAULT_BATCH_FRAMES,
        }
    }
}

/// Counters reported at the end of a run.
#[derive(Copy, Clone, Debug, Default)]
pub struct RunStats {
    /// Frames written to the sink.
    pub frames: usize,
    /// Frames that were emitted with the low-confidence marker.
    pub low_confidence: usize,
}

struct Dispatch {
    next_frame: usize,
}

struct Reorder<'w> {
    next_write: usize,
    pending: BTreeMap<usize, OutputFrame>,
    writer: &'w mut (dyn Write + Send),
    stats: RunStats,
}

struct Shared<'a, 'w> {
    meta: &'a MetaData,
    source: Mutex<&'a mut SourceVideo>,
    dispatch: Mutex<Dispatch>,
    reorder: Mutex<Reorder<'w>>,
    space: Condvar,
    abort: AtomicBool,
    error: Mutex<Option<Error>>,
    end_frame: usize,
    frames_avail: usize,
    look_behind: usize,
    look_ahead: usize,
    batch: usize,
    max_pending: usize,
}

impl Shared<'_, '_> {
    /// Record the first fatal error, raise the abort flag, and wake any stalled worker.
    fn fatal(&self, err: Error) {
        let mut slot = self.error.lock().unwrap();
        if slot.is_none() {
            *slot = Some(err);
        }
        self.abort.store(true, Ordering::SeqCst);
        self.space.notify_all();
    }
}

/// Decode `meta`-described frames from `source` into `sink`.
///
/// The decoder is configured with the source video parameters, then one worker per thread
/// decodes batches of frames until the requested range is exhausted. The first fatal error
/// aborts the run and is returned; frames still waiting in the reorder buffer at that point
/// are discarded.
pub fn run(
    decoder: &mut dyn FrameDecoder,
    meta: &MetaData,
    source: &mut SourceVideo,
    sink: &mut (dyn Write + Send),
    options: &PoolOptions,
) -> Result<RunStats> {
    decoder.configure(&meta.video_parameters)?;

    let look_behind = decoder.look_behind();
    let look_ahead = decoder.look_ahead();
    let threads = options.threads.max(1);
    let batch = options.batch_frames.max(1);

    let frames_avail = source.num_fields().min(meta.number_of_fields()) / 2;
    let start = options.start_frame;
    let end = match options.length {
        Some(len) => frames_avail.min(start.saturating_add(len)),
        None => frames_avail,
    };

    if start >= end {
        warn!("no whole frames to decode ({} available, start frame {})", frames_avail, start);
        return Ok(RunStats::default());
    }

    // Size the field cache to cover every worker's widest window.
    source.set_cache_limit(((look_behind + look_ahead + batch) * 2 * threads).max(4 * threads));

    let shared = Shared {
        meta,
        source: Mutex::new(source),
        dispatch: Mutex::new(Dispatch { next_frame: start }),
        reorder: Mutex::new(Reorder {
            next_write: start,
            pending: BTreeMap::new(),
            writer: sink,
            stats: RunStats::default(),
        }),
        space: Condvar::new(),
        abort: AtomicBool::new(false),
        error: Mutex::new(None),
        end_frame: end,
        frames_avail,
        look_behind,
        look_ahead,
        batch,
        max_pending: 2 * threads,
    };

    info!("decoding frames {}..{} with {} threads", start, end, threads);

    thread::scope(|scope| {
        for _ in 0..threads {
            let worker = decoder.make_worker();
            let shared = &shared;
            scope.spawn(move || worker_loop(shared, worker));
        }
    });

    if let Some(err) = shared.error.lock().unwrap().take() {
        return Err(err);
    }

    let reorder = shared.reorder.into_inner().unwrap();
    Ok(reorder.stats)
}

fn worker_loop(shared: &Shared<'_, '_>, mut worker: Box<dyn DecodeWorker>) {
    loop {
        if shared.abort.load(Ordering::SeqCst) {
            return;
        }

        // Claim the next batch.
        let (frame, count) = {
            let mut dispatch = shared.dispatch.lock().unwrap();
            if dispatch.next_frame >= shared.end_frame {
                return;
            }
            let frame = dispatch.next_frame;
            let count = (shared.end_frame - frame).min(shared.batch);
            dispatch.next_frame += count;
            (frame, count)
        };

        // The look-behind window is clamped at the start of the source.
        let warm = shared.look_behind.min(frame);
        let ahead = shared.look_ahead.min(shared.frames_avail - (frame + count));

        debug!("worker claimed frames {}..{} (warm-up {})", frame, frame + count, warm);

        let first_field = (frame - warm) * 2;
        let last_field = (frame + count + ahead) * 2;

        let window: Result<Vec<SourceField>> = {
            let mut guard = shared.source.lock().unwrap();
            (first_field..last_field)
                .map(|seq| fetch_field(&mut **guard, shared.meta, seq))
                .collect()
        };

        let window = match window {
            Ok(window) => window,
            Err(err) => return shared.fatal(err),
        };

        let frames = match worker.decode_frames(&window, warm * 2, (warm + count) * 2, &shared.abort)
        {
            Ok(frames) => frames,
            Err(err) => return shared.fatal(err),
        };

        // An abort may have cut the batch short; the partial result is discarded.
        if shared.abort.load(Ordering::SeqCst) {
            return;
        }

        if frames.len() != count {
            return shared
                .fatal(Error::DecodeError("pool: decoder returned the wrong number of frames"));
        }

        let mut reorder = shared.reorder.lock().unwrap();

        for (i, decoded) in frames.into_iter().enumerate() {
            reorder.pending.insert(frame + i, decoded);
        }

        // Drain the contiguous prefix to the sink.
        while let Some(decoded) = {
            let key = reorder.next_write;
            reorder.pending.remove(&key)
        } {
            if decoded.flags.contains(FrameFlags::LOW_CONFIDENCE) {
                warn!("frame {} was decoded with low confidence", reorder.next_write);
                reorder.stats.low_confidence += 1;
            }
            if let Some(code) = decoded.vbi.philips_code {
                debug!("frame {}: philips code {:#08x}", reorder.next_write, code);
            }
            if let Some((cc0, cc1)) = decoded.vbi.closed_caption {
                debug!("frame {}: closed caption bytes {:#04x} {:#04x}", reorder.next_write, cc0, cc1);
            }

            let reorder = &mut *reorder;
            if let Err(err) = write_samples_le(&mut *reorder.writer, &decoded.data) {
                shared.fatal(err);
                return;
            }

            reorder.next_write += 1;
            reorder.stats.frames += 1;
        }

        shared.space.notify_all();

        // Stall while the reorder buffer is over-full.
        while reorder.pending.len() > shared.max_pending && !shared.abort.load(Ordering::SeqCst) {
            reorder = shared.space.wait(reorder).unwrap();
        }
    }
}

fn fetch_field(
    source: &mut SourceVideo,
    meta: &MetaData,
    seq: usize,
) -> Result<SourceField> {
    let Some(field_meta) = meta.field(seq)
    else {
        return decode_error("pool: field missing from the metadata document");
    };

    Ok(SourceField { seq, meta: field_meta.clone(), samples: source.field(seq)? })
}
