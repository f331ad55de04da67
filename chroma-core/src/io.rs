// Chroma
// Copyright (c) 2026 The Project Chroma Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `io` module reads raw sample files and writes raw frame output.
//!
//! A sample file is a headerless concatenation of 16-bit unsigned little-endian samples.
//! Fields are contiguous and span `field_width * field_height` samples each. An optional byte
//! offset skips leading content.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use log::debug;

use crate::errors::{config_error, limit_error, Result};

/// A reader over the fields of a raw sample file.
///
/// Fields are fetched by sequential number and cached so that overlapping decode windows do
/// not re-read the file. The cache is bounded; the pool sizes it to cover every worker's
/// window.
pub struct SourceVideo {
    file: File,
    start_offset: u64,
    field_len: usize,
    available_fields: usize,
    cache: HashMap<usize, Arc<Vec<u16>>>,
    cache_limit: usize,
}

impl SourceVideo {
    /// Open a sample file with the given field geometry, skipping `byte_offset` bytes of
    /// leading content.
    pub fn open<P: AsRef<Path>>(
        path: P,
        field_width: u32,
        field_height: u32,
        byte_offset: u64,
    ) -> Result<SourceVideo> {
        if field_width == 0 || field_height == 0 {
            return config_error("io: field dimensions must be non-zero");
        }

        let field_len = field_width as usize * field_height as usize;

        let file = File::open(path)?;
        let file_len = file.metadata()?.len();

        let payload = file_len.saturating_sub(byte_offset);
        let available_fields = (payload / (field_len as u64 * 2)) as usize;

        debug!(
            "opened sample file: {} bytes, {} whole fields of {} samples",
            file_len, available_fields, field_len
        );

        Ok(SourceVideo {
            file,
            start_offset: byte_offset,
            field_len,
            available_fields,
            cache: HashMap::new(),
            cache_limit: 16,
        })
    }

    /// The number of whole fields present in the file.
    pub fn num_fields(&self) -> usize {
        self.available_fields
    }

    /// The number of samples in one field.
    pub fn field_len(&self) -> usize {
        self.field_len
    }

    /// Bound the number of cached fields.
    pub fn set_cache_limit(&mut self, limit: usize) {
        self.cache_limit = limit.max(1);
    }

    /// Fetch the samples of field `seq`.
    pub fn field(&mut self, seq: usize) -> Result<Arc<Vec<u16>>> {
        if seq >= self.available_fields {
            return limit_error("io: field number beyond end of sample file");
        }

        if let Some(samples) = self.cache.get(&seq) {
            return Ok(samples.clone());
        }

        let pos = self.start_offset + (seq as u64) * (self.field_len as u64) * 2;
        self.file.seek(SeekFrom::Start(pos))?;

        let mut bytes = vec![0u8; self.field_len * 2];
        self.file.read_exact(&mut bytes)?;

        let mut samples: Vec<u16> = bytemuck::pod_collect_to_vec(&bytes);
        if cfg!(target_endian = "big") {
            samples.iter_mut().for_each(|s| *s = s.swap_bytes());
        }

        let samples = Arc::new(samples);

        if self.cache.len() >= self.cache_limit {
            self.evict(seq);
        }
        self.cache.insert(seq, samples.clone());

        Ok(samples)
    }

    /// Evict the cached field furthest from `seq`. The pool advances monotonically, so the
    /// furthest entry is the least likely to be re-requested.
    fn evict(&mut self, seq: usize) {
        let victim = self
            .cache
            .keys()
            .copied()
            .max_by_key(|&k| if k > seq { k - seq } else { seq - k });

        if let Some(victim) = victim {
            self.cache.remove(&victim);
        }
    }
}

/// Write a slice of 16-bit samples to `out` as little-endian bytes.
pub fn write_samples_le(out: &mut dyn Write, samples: &[u16]) -> Result<()> {
    if cfg!(target_endian = "little") {
        out.write_all(bytemuck::cast_slice(samples))?;
    }
    else {
        for sample in samples {
            out.write_all(&sample.to_le_bytes())?;
        }
    }
    Ok(())
}
