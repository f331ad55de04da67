// Chroma
// Copyright (c) 2026 The Project Chroma Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

use std::fs::File;
use std::io::{BufWriter, Write};
use std::process;

use clap::{App, Arg, ArgMatches, ErrorKind};
use log::{error, info, warn, LevelFilter};

use chroma_codec_ntsc::{MonoDecoder, NtscDecoder};
use chroma_core::decoder::{CombConfig, FrameDecoder};
use chroma_core::errors::{config_error, unsupported_error, Result};
use chroma_core::io::SourceVideo;
use chroma_core::meta::MetaData;
use chroma_core::pool::{self, PoolOptions};

fn main() {
    let matches = match build_app().try_get_matches() {
        Ok(matches) => matches,
        Err(err) => {
            if err.kind() == ErrorKind::DisplayHelp || err.kind() == ErrorKind::DisplayVersion {
                err.print().expect("failed to write to stderr");
                return;
            }
            err.print().expect("failed to write to stderr");
            process::exit(-1);
        }
    };

    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(if matches.is_present("debug") {
        LevelFilter::Debug
    }
    else if matches.is_present("quiet") {
        LevelFilter::Error
    }
    else {
        LevelFilter::Info
    });
    builder.init();

    if let Err(err) = run(&matches) {
        error!("{}", err);
        process::exit(-1);
    }
}

fn build_app() -> App<'static> {
    App::new("chroma-decode")
        .version("0.1.0")
        .about("Colourisation filter for TBC LaserDisc captures")
        .arg(
            Arg::new("start")
                .long("start")
                .short('s')
                .value_name("number")
                .help("Specify the start frame number")
                .takes_value(true),
        )
        .arg(
            Arg::new("length")
                .long("length")
                .short('l')
                .value_name("number")
                .help("Specify the length (number of frames to process)")
                .takes_value(true),
        )
        .arg(
            Arg::new("reverse")
                .long("reverse")
                .short('r')
                .help("Reverse the field order to second/first (default first/second)"),
        )
        .arg(
            Arg::new("blackandwhite")
                .long("blackandwhite")
                .short('b')
                .help("Output in black and white"),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .help("Suppress info and warning messages"),
        )
        .arg(Arg::new("debug").long("debug").short('d').help("Show debug"))
        .arg(
            Arg::new("decoder")
                .long("decoder")
                .short('f')
                .value_name("decoder")
                .help("Decoder to use (pal2d, transform2d, transform3d, ntsc2d, ntsc3d, mono; default automatic)")
                .takes_value(true),
        )
        .arg(
            Arg::new("threads")
                .long("threads")
                .short('t')
                .value_name("number")
                .help("Specify the number of concurrent threads (default number of logical CPUs)")
                .takes_value(true),
        )
        .arg(
            Arg::new("oftest")
                .long("oftest")
                .short('o')
                .help("NTSC: Show the optical flow map (only used for testing)"),
        )
        .arg(
            Arg::new("white")
                .long("white")
                .short('w')
                .help("NTSC: Use 75% white-point (default 100%)"),
        )
        .arg(Arg::new("input").help("Specify input TBC file").required(true).index(1))
        .arg(Arg::new("output").help("Specify output RGB file (omit for piped output)").index(2))
}

fn run(matches: &ArgMatches) -> Result<()> {
    let input = matches.value_of("input").unwrap();
    let output = matches.value_of("output");

    if Some(input) == output {
        return config_error("input and output files cannot be the same");
    }

    let start_frame = match matches.value_of("start") {
        Some(value) => match value.parse::<usize>() {
            Ok(n) if n >= 1 => n,
            _ => return config_error("start frame must be at least 1"),
        },
        None => 1,
    };

    let length = match matches.value_of("length") {
        Some(value) => match value.parse::<usize>() {
            Ok(n) if n >= 1 => Some(n),
            _ => return config_error("length must be greater than zero frames"),
        },
        None => None,
    };

    let threads = match matches.value_of("threads") {
        Some(value) => match value.parse::<usize>() {
            Ok(n) if n >= 1 => n,
            _ => return config_error("number of threads must be greater than zero"),
        },
        None => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
    };

    let mut comb_config = CombConfig {
        black_and_white: matches.is_present("blackandwhite"),
        white_point_100: !matches.is_present("white"),
        use_3d: false,
        show_optical_flow_map: matches.is_present("oftest"),
    };

    // Load the source video metadata.
    let mut meta = MetaData::open(format!("{}.json", input))?;

    if matches.is_present("reverse") {
        info!("expected field order is reversed to second field/first field");
        meta.set_is_first_field_first(false);
    }

    // Work out which decoder to use.
    let decoder_name = match matches.value_of("decoder") {
        Some(name) => name.to_string(),
        None if meta.video_parameters.is_source_pal => "pal2d".to_string(),
        None => "ntsc2d".to_string(),
    };

    if comb_config.show_optical_flow_map && decoder_name != "ntsc3d" {
        return config_error("can only show the optical flow map with the ntsc3d decoder");
    }

    let mut decoder: Box<dyn FrameDecoder> = match decoder_name.as_str() {
        "ntsc2d" => Box::new(NtscDecoder::new(comb_config)),
        "ntsc3d" => {
            comb_config.use_3d = true;
            Box::new(NtscDecoder::new(comb_config))
        }
        "mono" => Box::new(MonoDecoder::new()),
        "pal2d" | "transform2d" | "transform3d" => {
            return unsupported_error("pal: decoding of PAL sources is not supported");
        }
        _ => return config_error("unknown decoder name"),
    };

    let params = &meta.video_parameters;
    let mut source = SourceVideo::open(input, params.field_width, params.field_height, 0)?;

    let mut sink: Box<dyn Write + Send> = match output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(std::io::stdout()),
    };

    let options = PoolOptions {
        threads,
        start_frame: start_frame - 1,
        length,
        ..Default::default()
    };

    let stats = pool::run(decoder.as_mut(), &meta, &mut source, sink.as_mut(), &options)?;
    sink.flush()?;

    info!("decoded {} frames", stats.frames);
    if stats.low_confidence > 0 {
        warn!("{} frames were decoded with low confidence", stats.low_confidence);
    }

    Ok(())
}
