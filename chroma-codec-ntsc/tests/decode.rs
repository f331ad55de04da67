// Chroma
// Copyright (c) 2026 The Project Chroma Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end decode scenarios over synthetic NTSC sample streams.

use std::f64::consts::PI;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use chroma_codec_ntsc::{MonoDecoder, NtscDecoder};
use chroma_core::decoder::{CombConfig, FrameDecoder};
use chroma_core::io::SourceVideo;
use chroma_core::meta::MetaData;
use chroma_core::pool::{self, PoolOptions, RunStats};

const WIDTH: usize = 1820;
const HEIGHT: usize = 263;
const OUT_WIDTH: usize = 1544;
const OUT_ROWS: usize = 480;

const SCALE: f64 = 62000.0;
const BLACK16: u32 = 16384;
const WHITE16: u32 = 51200;
const BLACK: f64 = BLACK16 as f64 / SCALE;
const WHITE: f64 = WHITE16 as f64 / SCALE;

const SYNC_TIP: f64 = 0.04;
const BURST_AMPLITUDE: f64 = 0.12;

/// Local subcarrier angle at absolute sample position `p`.
fn carrier(p: usize) -> f64 {
    2.0 * PI * (((p + 1) % 8) as f64) / 8.0
}

/// Append one synthesized field. `content` maps `(field_row, column, carrier angle)` to a
/// normalized level for the active region.
fn push_field(
    samples: &mut Vec<u16>,
    field_index: usize,
    content: &dyn Fn(usize, usize, f64) -> f64,
) {
    // First fields run 254 whole lines between equalization regions, second fields 253;
    // the tracker derives field parity from that difference.
    let equalizing = if field_index % 2 == 0 { 9 } else { 10 };

    let base = samples.len();

    for row in 0..HEIGHT {
        for col in 0..WIDTH {
            let p = base + row * WIDTH + col;
            let theta = carrier(p);

            let v = if row < equalizing {
                if col < 60 || (col >= 910 && col < 970) {
                    SYNC_TIP
                }
                else {
                    BLACK
                }
            }
            else if col < 130 {
                SYNC_TIP
            }
            else if col >= 170 && col < 270 {
                BLACK - BURST_AMPLITUDE * theta.cos()
            }
            else if col >= 252 && col < 1796 {
                content(row, col, theta)
            }
            else {
                BLACK
            };

            samples.push(((v * SCALE).round().max(0.0).min(65535.0)) as u16);
        }
    }
}

fn test_meta(num_fields: usize, dropouts: Option<(usize, &str)>) -> MetaData {
    let mut fields = String::new();
    for seq in 0..num_fields {
        if seq > 0 {
            fields.push(',');
        }

        let extra = match dropouts {
            Some((drop_seq, json)) if drop_seq == seq => format!(", \"dropOuts\": {}", json),
            _ => String::new(),
        };

        fields.push_str(&format!(
            "{{ \"seqNo\": {}, \"isFirstField\": {}, \"medianBurstIRE\": 20.0{} }}",
            seq,
            seq % 2 == 0,
            extra
        ));
    }

    let doc = format!(
        r#"{{
            "videoParameters": {{
                "numberOfSequentialFields": {},
                "isSourcePal": false,
                "colourBurstStart": 170, "colourBurstEnd": 270,
                "activeVideoStart": 252, "activeVideoEnd": 1796,
                "white16bIre": {}, "black16bIre": {},
                "fieldWidth": {}, "fieldHeight": {},
                "sampleRate": 28636363, "fsc": 3579545,
                "isMapped": false
            }},
            "fields": [{}]
        }}"#,
        num_fields, WHITE16, BLACK16, WIDTH, HEIGHT, fields
    );

    MetaData::parse(&doc).unwrap()
}

fn decode_with(
    tag: &str,
    samples: &[u16],
    meta: &MetaData,
    decoder: &mut dyn FrameDecoder,
    options: &PoolOptions,
) -> (RunStats, Vec<u8>) {
    let mut path = PathBuf::from(std::env::temp_dir());
    path.push(format!("chroma-decode-test-{}-{}", std::process::id(), tag));

    let mut file = File::create(&path).unwrap();
    for s in samples {
        file.write_all(&s.to_le_bytes()).unwrap();
    }
    drop(file);

    let mut source = SourceVideo::open(&path, WIDTH as u32, HEIGHT as u32, 0).unwrap();
    let mut sink = Vec::new();

    let stats = pool::run(decoder, meta, &mut source, &mut sink, options).unwrap();

    std::fs::remove_file(&path).unwrap();
    (stats, sink)
}

fn decode(
    tag: &str,
    samples: &[u16],
    meta: &MetaData,
    config: CombConfig,
    options: &PoolOptions,
) -> (RunStats, Vec<u8>) {
    decode_with(tag, samples, meta, &mut NtscDecoder::new(config), options)
}

/// RGB triplet at `(row, col)` of the frame starting at byte `frame_base`.
fn pixel(sink: &[u8], frame_base: usize, row: usize, col: usize) -> (u16, u16, u16) {
    let offset = frame_base + (row * OUT_WIDTH + col) * 6;
    (
        u16::from_le_bytes([sink[offset], sink[offset + 1]]),
        u16::from_le_bytes([sink[offset + 2], sink[offset + 3]]),
        u16::from_le_bytes([sink[offset + 4], sink[offset + 5]]),
    )
}

/// The output conversion applied to a decoded `(y, i, q)` triple, in normalized units.
fn expected_rgb(y_dn: f64, i_dn: f64, q_dn: f64) -> (u16, u16, u16) {
    let range = WHITE - BLACK;
    let y = (y_dn - BLACK) / range;
    let i = i_dn / range;
    let q = q_dn / range;

    let r = ((y * 1.164) + (1.596 * i)).clamp(0.0, 1.0);
    let g = ((y * 1.164) - (0.813 * i) - (q * 0.391)).clamp(0.0, 1.0);
    let b = ((y * 1.164) + (q * 2.018)).clamp(0.0, 1.0);

    (
        (r * 65535.0).round() as u16,
        (g * 65535.0).round() as u16,
        (b * 65535.0).round() as u16,
    )
}

fn assert_close(actual: (u16, u16, u16), expected: (u16, u16, u16), tol: u16, what: &str) {
    let close = |a: u16, b: u16| a.abs_diff(b) <= tol;
    assert!(
        close(actual.0, expected.0) && close(actual.1, expected.1) && close(actual.2, expected.2),
        "{}: got {:?}, expected {:?}",
        what,
        actual,
        expected
    );
}

const FRAME_BYTES: usize = OUT_WIDTH * OUT_ROWS * 3 * 2;

const SAMPLE_ROWS: [usize; 5] = [51, 151, 251, 351, 451];
const SAMPLE_COLS: [usize; 5] = [100, 400, 700, 1000, 1400];

#[test]
fn black_input_decodes_to_black_frames() {
    // Two fields of flat black level: no sync, no burst, no content.
    let samples = vec![BLACK16 as u16; WIDTH * HEIGHT * 2];
    let meta = test_meta(2, None);

    let options = PoolOptions { threads: 1, ..Default::default() };
    let (stats, sink) = decode("black", &samples, &meta, CombConfig::default(), &options);

    assert_eq!(stats.frames, 1);
    assert_eq!(sink.len(), FRAME_BYTES);
    assert!(sink.iter().all(|&b| b == 0));
}

#[test]
fn constant_luminance_decodes_to_flat_grey() {
    let grey = BLACK + 0.5 * (WHITE - BLACK);

    let mut samples = Vec::new();
    for field in 0..4 {
        push_field(&mut samples, field, &|_, _, _| grey);
    }
    let meta = test_meta(4, None);

    let config = CombConfig { black_and_white: true, ..Default::default() };
    let options =
        PoolOptions { threads: 1, start_frame: 1, length: Some(1), ..Default::default() };
    let (stats, sink) = decode("grey", &samples, &meta, config, &options);

    assert_eq!(stats.frames, 1);
    assert_eq!(stats.low_confidence, 0);

    let expected = expected_rgb(grey, 0.0, 0.0);
    for &row in &SAMPLE_ROWS {
        for &col in &SAMPLE_COLS {
            let px = pixel(&sink, 0, row, col);
            assert_eq!(px.0, px.1);
            assert_eq!(px.1, px.2);
            assert_close(px, expected, 1500, &format!("row {} col {}", row, col));
        }
    }
}

#[test]
fn mono_decoder_recovers_luma_without_chroma() {
    let grey = BLACK + 0.5 * (WHITE - BLACK);

    let mut samples = Vec::new();
    for field in 0..4 {
        push_field(&mut samples, field, &|_, _, _| grey);
    }
    let meta = test_meta(4, None);

    let options =
        PoolOptions { threads: 1, start_frame: 1, length: Some(1), ..Default::default() };
    let (stats, sink) = decode_with("mono", &samples, &meta, &mut MonoDecoder::new(), &options);

    assert_eq!(stats.frames, 1);
    assert_eq!(stats.low_confidence, 0);

    let expected = expected_rgb(grey, 0.0, 0.0);
    for &row in &SAMPLE_ROWS {
        for &col in &SAMPLE_COLS {
            let px = pixel(&sink, 0, row, col);
            assert_eq!(px.0, px.1);
            assert_eq!(px.1, px.2);
            assert_close(px, expected, 1500, &format!("row {} col {}", row, col));
        }
    }
}

#[test]
fn dropout_line_is_replaced_by_black() {
    let grey = BLACK + 0.5 * (WHITE - BLACK);

    let mut samples = Vec::new();
    for field in 0..4 {
        push_field(&mut samples, field, &|_, _, _| grey);
    }

    // A dropout covering all of field line 126 of the frame's first field.
    let meta = test_meta(4, Some((2, "{ \"startx\": [0], \"endx\": [1820], \"fieldLine\": [126] }")));

    let config = CombConfig { black_and_white: true, ..Default::default() };
    let options =
        PoolOptions { threads: 1, start_frame: 1, length: Some(1), ..Default::default() };
    let (_, sink) = decode("dropout", &samples, &meta, config, &options);

    // Exactly one output row in the search band decodes at black level; it comes from the
    // frame's first field, so it is an even row.
    let mut black_rows = Vec::new();
    for row in 150..260 {
        let dark = SAMPLE_COLS.iter().all(|&col| {
            let px = pixel(&sink, 0, row, col);
            px.0 < 1000 && px.1 < 1000 && px.2 < 1000
        });
        if dark {
            black_rows.push(row);
        }
    }

    assert_eq!(black_rows.len(), 1, "black rows: {:?}", black_rows);
    assert_eq!(black_rows[0] % 2, 0);
}

#[test]
fn missing_hsync_is_bridged_by_the_watchdog() {
    let grey = BLACK + 0.5 * (WHITE - BLACK);

    let mut samples = Vec::new();
    for field in 0..4 {
        push_field(&mut samples, field, &|_, _, _| grey);
    }

    // Blank the HSYNC of one line in the frame's first field.
    let black16 = BLACK16 as u16;
    let pulse_start = 2 * WIDTH * HEIGHT + 150 * WIDTH;
    for s in samples.iter_mut().skip(pulse_start).take(130) {
        *s = black16;
    }

    let meta = test_meta(4, None);
    let config = CombConfig { black_and_white: true, ..Default::default() };
    let options =
        PoolOptions { threads: 1, start_frame: 1, length: Some(1), ..Default::default() };
    let (stats, sink) = decode("watchdog", &samples, &meta, config, &options);

    // The synthesized boundary keeps the line count, so the field still decodes cleanly.
    assert_eq!(stats.frames, 1);
    assert_eq!(stats.low_confidence, 0);

    let expected = expected_rgb(grey, 0.0, 0.0);
    for &row in &[101usize, 151, 201, 351, 401] {
        for &col in &SAMPLE_COLS {
            assert_close(pixel(&sink, 0, row, col), expected, 1500, &format!("row {}", row));
        }
    }
}

#[test]
fn output_is_identical_for_any_thread_count() {
    let grey = BLACK + 0.45 * (WHITE - BLACK);

    let mut samples = Vec::new();
    for field in 0..6 {
        push_field(&mut samples, field, &|_, _, _| grey);
    }
    let meta = test_meta(6, None);

    let one = PoolOptions { threads: 1, batch_frames: 1, ..Default::default() };
    let four = PoolOptions { threads: 4, batch_frames: 1, ..Default::default() };

    let (stats_one, sink_one) = decode("det1", &samples, &meta, CombConfig::default(), &one);
    let (stats_four, sink_four) = decode("det4", &samples, &meta, CombConfig::default(), &four);

    assert_eq!(stats_one.frames, 3);
    assert_eq!(stats_four.frames, 3);
    assert_eq!(sink_one.len(), 3 * FRAME_BYTES);
    assert_eq!(sink_one, sink_four);
}

#[test]
fn temporal_comb_leaves_moving_scenes_to_the_line_comb() {
    // Two frames of strongly different flat images: every active pixel is in motion, so the
    // 3D decoder must fall back to the 2D output everywhere.
    let dark = BLACK + 0.2 * (WHITE - BLACK);
    let bright = BLACK + 0.7 * (WHITE - BLACK);

    let mut samples = Vec::new();
    for field in 0..4 {
        let level = if field < 2 { dark } else { bright };
        push_field(&mut samples, field, &move |_, _, _| level);
    }
    let meta = test_meta(4, None);

    let options =
        PoolOptions { threads: 1, start_frame: 1, length: Some(1), ..Default::default() };

    let flat = CombConfig::default();
    let temporal = CombConfig { use_3d: true, ..Default::default() };

    let (_, sink_2d) = decode("motion2d", &samples, &meta, flat, &options);
    let (_, sink_3d) = decode("motion3d", &samples, &meta, temporal, &options);

    assert_eq!(sink_2d, sink_3d);
}

#[test]
fn colour_bars_recover_their_reference_levels() {
    // Three vertical bars, each with known (Y, I, Q) in normalized units. The chroma gain
    // through the demodulator inverts the 0.8 encoding factor exactly.
    let bars: [(f64, f64, f64); 3] = [
        (BLACK + 0.5 * (WHITE - BLACK), 0.0, 0.0),
        (BLACK + 0.4 * (WHITE - BLACK), 0.10, 0.03),
        (BLACK + 0.6 * (WHITE - BLACK), -0.08, -0.05),
    ];

    let bar_of = |col: usize| -> usize {
        if col < 766 {
            0
        }
        else if col < 1281 {
            1
        }
        else {
            2
        }
    };

    let mut samples = Vec::new();
    for field in 0..4 {
        push_field(&mut samples, field, &|_, col, theta| {
            let (y, i_t, q_t) = bars[bar_of(col)];
            let p = q_t / 1.25;
            let m = -i_t / 1.25;
            y + p * theta.cos() + m * theta.sin()
        });
    }
    let meta = test_meta(4, None);

    let options =
        PoolOptions { threads: 1, start_frame: 1, length: Some(1), ..Default::default() };
    let (_, sink) = decode("bars", &samples, &meta, CombConfig::default(), &options);

    // Bar centres in output columns. Output column 0 sits 276 ticks after the start of the
    // sync pulse: 252 for the active-video offset plus the 24-sample detection vote.
    let centres = [250usize, 747, 1262];

    for (bar, &centre) in bars.iter().zip(&centres) {
        let expected = expected_rgb(bar.0, bar.1, bar.2);
        for &row in &[151usize, 251, 351] {
            for col in [centre - 50, centre, centre + 50] {
                assert_close(
                    pixel(&sink, 0, row, col),
                    expected,
                    1500,
                    &format!("bar at col {} row {}", col, row),
                );
            }
        }
    }
}
