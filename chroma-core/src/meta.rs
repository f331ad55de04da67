// Chroma
// Copyright (c) 2026 The Project Chroma Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `meta` module models the TBC metadata document that accompanies a sample file.
//!
//! A capture `input.tbc` is described by `input.tbc.json`, produced by the time-base
//! correction stage. The document carries the source video parameters and one record per
//! sequential field. Everything here is read-only after loading.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::error;
use serde::Deserialize;
use smallvec::SmallVec;

use crate::errors::{decode_error, Result};

/// Source video parameters shared by every field of a capture.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoParameters {
    pub number_of_sequential_fields: u32,
    pub is_source_pal: bool,
    /// First sample of the colour burst, relative to the line start.
    pub colour_burst_start: u32,
    /// One past the last sample of the colour burst.
    pub colour_burst_end: u32,
    /// First sample of active video, relative to the line start.
    pub active_video_start: u32,
    /// One past the last sample of active video.
    pub active_video_end: u32,
    /// 16-bit sample value corresponding to 100 IRE.
    pub white16b_ire: u32,
    /// 16-bit sample value corresponding to 0 IRE.
    pub black16b_ire: u32,
    pub field_width: u32,
    pub field_height: u32,
    pub sample_rate: u32,
    pub fsc: u32,
    pub is_mapped: bool,
}

/// PCM audio parameters. Not consumed by the video decoders.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PcmAudioParameters {
    pub sample_rate: u32,
    pub is_little_endian: bool,
    pub is_signed: bool,
    pub bits: u32,
}

/// Raw VBI data decoded upstream, if any.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vbi {
    #[serde(default)]
    pub vbi_data: Vec<i32>,
}

/// NTSC-specific field metadata.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NtscFieldInfo {
    #[serde(default)]
    pub is_fm_code_data_valid: bool,
    #[serde(default)]
    pub fm_code_data: i64,
    #[serde(default)]
    pub field_flag: bool,
    #[serde(default)]
    pub white_flag: bool,
    #[serde(default)]
    pub cc_data0: i32,
    #[serde(default)]
    pub cc_data1: i32,
}

/// VITS signal-quality metrics.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct VitsMetrics {
    #[serde(default, rename = "wSNR")]
    pub w_snr: f64,
    #[serde(default, rename = "bPSNR")]
    pub b_psnr: f64,
}

/// Dropout intervals for one field, stored as parallel arrays.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropOuts {
    #[serde(default)]
    pub startx: Vec<u32>,
    #[serde(default)]
    pub endx: Vec<u32>,
    #[serde(default)]
    pub field_line: Vec<u32>,
}

/// Where on a line a dropout interval falls.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DropOutKind {
    VisibleLine,
    ColourBurst,
    Unknown,
}

/// One dropout interval on one field line.
#[derive(Copy, Clone, Debug)]
pub struct DropOutLocation {
    pub field_line: u32,
    pub startx: u32,
    pub endx: u32,
    pub kind: DropOutKind,
}

/// Metadata for one sequential field.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMeta {
    /// The unique primary key of the field.
    pub seq_no: u32,
    pub is_first_field: bool,
    #[serde(default)]
    pub sync_conf: u32,
    #[serde(default, rename = "medianBurstIRE")]
    pub median_burst_ire: f64,
    #[serde(default)]
    pub field_phase_id: u32,
    #[serde(default)]
    pub audio_samples: u32,
    #[serde(default)]
    pub pad: bool,
    #[serde(default)]
    pub vits_metrics: Option<VitsMetrics>,
    #[serde(default)]
    pub vbi: Option<Vbi>,
    #[serde(default)]
    pub ntsc: Option<NtscFieldInfo>,
    #[serde(default)]
    pub drop_outs: Option<DropOuts>,
}

impl FieldMeta {
    /// The dropout intervals covering the given field line, classified against the burst and
    /// active-video bounds of `params`.
    pub fn dropouts_on_line(
        &self,
        line: u32,
        params: &VideoParameters,
    ) -> SmallVec<[DropOutLocation; 4]> {
        let mut spans = SmallVec::new();

        let Some(dropouts) = &self.drop_outs
        else {
            return spans;
        };

        for ((&startx, &endx), &field_line) in
            dropouts.startx.iter().zip(&dropouts.endx).zip(&dropouts.field_line)
        {
            if field_line != line {
                continue;
            }

            let kind = if startx < params.colour_burst_end && endx > params.colour_burst_start {
                DropOutKind::ColourBurst
            }
            else if startx < params.active_video_end && endx > params.active_video_start {
                DropOutKind::VisibleLine
            }
            else {
                DropOutKind::Unknown
            };

            spans.push(DropOutLocation { field_line, startx, endx, kind });
        }

        spans
    }
}

/// The complete metadata document for a capture.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaData {
    pub video_parameters: VideoParameters,
    #[serde(default)]
    pub pcm_audio_parameters: Option<PcmAudioParameters>,
    #[serde(default)]
    pub fields: Vec<FieldMeta>,
    #[serde(skip, default = "default_field_order")]
    is_first_field_first: bool,
}

fn default_field_order() -> bool {
    true
}

impl MetaData {
    /// Read and parse a metadata document from the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<MetaData> {
        let file = File::open(path)?;

        match serde_json::from_reader(BufReader::new(file)) {
            Ok(meta) => Ok(meta),
            Err(err) => {
                error!("metadata parse failed: {}", err);
                decode_error("meta: malformed metadata document")
            }
        }
    }

    /// Parse a metadata document from a JSON string.
    pub fn parse(json: &str) -> Result<MetaData> {
        match serde_json::from_str(json) {
            Ok(meta) => Ok(meta),
            Err(err) => {
                error!("metadata parse failed: {}", err);
                decode_error("meta: malformed metadata document")
            }
        }
    }

    pub fn number_of_fields(&self) -> usize {
        self.fields.len()
    }

    /// The number of whole frames described by the document.
    pub fn number_of_frames(&self) -> usize {
        self.fields.len() / 2
    }

    /// Expected field order. True when the first field of each frame precedes the second in
    /// the sample file.
    pub fn is_first_field_first(&self) -> bool {
        self.is_first_field_first
    }

    /// Override the expected field order, e.g. for captures with reversed field dominance.
    pub fn set_is_first_field_first(&mut self, flag: bool) {
        self.is_first_field_first = flag;
    }

    /// Sequential number of the first field of frame `frame`.
    pub fn first_field_of_frame(&self, frame: usize) -> usize {
        if self.is_first_field_first {
            2 * frame
        }
        else {
            2 * frame + 1
        }
    }

    /// Sequential number of the second field of frame `frame`.
    pub fn second_field_of_frame(&self, frame: usize) -> usize {
        if self.is_first_field_first {
            2 * frame + 1
        }
        else {
            2 * frame
        }
    }

    pub fn field(&self, seq: usize) -> Option<&FieldMeta> {
        self.fields.get(seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "videoParameters": {
            "numberOfSequentialFields": 4,
            "isSourcePal": false,
            "colourBurstStart": 170,
            "colourBurstEnd": 270,
            "activeVideoStart": 252,
            "activeVideoEnd": 1796,
            "white16bIre": 51200,
            "black16bIre": 16384,
            "fieldWidth": 1820,
            "fieldHeight": 263,
            "sampleRate": 28636363,
            "fsc": 3579545,
            "isMapped": false
        },
        "pcmAudioParameters": {
            "sampleRate": 44100,
            "isLittleEndian": true,
            "isSigned": true,
            "bits": 16
        },
        "fields": [
            { "seqNo": 0, "isFirstField": true, "syncConf": 100, "medianBurstIRE": 20.0,
              "fieldPhaseID": 1, "audioSamples": 735,
              "dropOuts": { "startx": [300, 200], "endx": [400, 240], "fieldLine": [50, 51] } },
            { "seqNo": 1, "isFirstField": false,
              "ntsc": { "whiteFlag": true, "ccData0": 67, "ccData1": 49 } },
            { "seqNo": 2, "isFirstField": true },
            { "seqNo": 3, "isFirstField": false }
        ]
    }"#;

    #[test]
    fn verify_parse() {
        let meta = MetaData::parse(DOC).unwrap();

        assert_eq!(meta.video_parameters.field_width, 1820);
        assert_eq!(meta.video_parameters.field_height, 263);
        assert!(!meta.video_parameters.is_source_pal);
        assert_eq!(meta.number_of_fields(), 4);
        assert_eq!(meta.number_of_frames(), 2);

        let ntsc = meta.field(1).unwrap().ntsc.as_ref().unwrap();
        assert!(ntsc.white_flag);
        assert_eq!(ntsc.cc_data0, 67);
    }

    #[test]
    fn verify_field_pairing() {
        let mut meta = MetaData::parse(DOC).unwrap();

        assert_eq!(meta.first_field_of_frame(1), 2);
        assert_eq!(meta.second_field_of_frame(1), 3);

        meta.set_is_first_field_first(false);
        assert_eq!(meta.first_field_of_frame(1), 3);
        assert_eq!(meta.second_field_of_frame(1), 2);
    }

    #[test]
    fn verify_dropout_classification() {
        let meta = MetaData::parse(DOC).unwrap();
        let params = &meta.video_parameters;
        let field = meta.field(0).unwrap();

        let visible = field.dropouts_on_line(50, params);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].kind, DropOutKind::VisibleLine);

        let burst = field.dropouts_on_line(51, params);
        assert_eq!(burst.len(), 1);
        assert_eq!(burst[0].kind, DropOutKind::ColourBurst);

        assert!(field.dropouts_on_line(52, params).is_empty());
    }

    #[test]
    fn verify_malformed_document_is_a_decode_error() {
        assert!(MetaData::parse("{ \"videoParameters\": 12 }").is_err());
    }
}
