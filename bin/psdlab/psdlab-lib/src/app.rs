// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

use clap::{Arg, ArgAction, Command, crate_version, value_parser};
use psdkit::render::WorkerStrategy;

pub fn create_app() -> Command {
  Command::new("psdlab")
    .version(crate_version!())
    .about("PSDLab - Inspect and render Photoshop documents")
    .subcommand_required(true)
    .arg_required_else_help(true)
    .arg(
      Arg::new("debug")
        .short('d')
        .action(ArgAction::Count)
        .global(true)
        .help("Sets the level of debugging information"),
    )
    .arg(
      Arg::new("chunk_size")
        .long("chunk-size")
        .value_parser(value_parser!(u64).range(512..))
        .global(true)
        .help("Chunk size in bytes for remote documents"),
    )
    .arg(
      Arg::new("max_request_chunks")
        .long("max-request-chunks")
        .value_parser(value_parser!(usize))
        .global(true)
        .help("Maximum number of chunks fetched by one range request"),
    )
    .arg(
      Arg::new("worker")
        .long("worker")
        .value_parser(value_parser!(WorkerStrategy))
        .default_value("auto")
        .global(true)
        .help("Where rendering runs"),
    )
    .arg(
      Arg::new("inline")
        .long("inline")
        .action(ArgAction::SetTrue)
        .global(true)
        .help("Render on the main thread, same as --worker inline"),
    )
    .subcommand(
      Command::new("info")
        .about("Print document structure and layer tree")
        .arg(Arg::new("json").long("json").action(ArgAction::SetTrue).help("Format output as JSON"))
        .arg(
          Arg::new("yaml")
            .long("yaml")
            .action(ArgAction::SetTrue)
            .conflicts_with("json")
            .help("Format output as YAML"),
        )
        .arg(input()),
    )
    .subcommand(
      Command::new("render")
        .about("Composite all visible layers into a PNG")
        .arg(
          Arg::new("hide")
            .long("hide")
            .value_parser(value_parser!(usize))
            .action(ArgAction::Append)
            .help("Hide the layer with this index"),
        )
        .arg(
          Arg::new("show")
            .long("show")
            .value_parser(value_parser!(usize))
            .action(ArgAction::Append)
            .help("Show the layer with this index"),
        )
        .arg(overwrite())
        .arg(input())
        .arg(output()),
    )
    .subcommand(
      Command::new("thumbnail")
        .about("Render a single layer or group into a PNG")
        .arg(
          Arg::new("layer")
            .long("layer")
            .short('l')
            .required(true)
            .value_parser(value_parser!(usize))
            .help("Layer index as printed by 'info'"),
        )
        .arg(
          Arg::new("width")
            .long("width")
            .value_parser(value_parser!(u32).range(1..))
            .default_value("256")
            .help("Thumbnail width"),
        )
        .arg(
          Arg::new("height")
            .long("height")
            .value_parser(value_parser!(u32).range(1..))
            .default_value("256")
            .help("Thumbnail height"),
        )
        .arg(overwrite())
        .arg(input())
        .arg(output()),
    )
    .subcommand(
      Command::new("merged")
        .about("Extract the pre-composited image stored in the document")
        .arg(overwrite())
        .arg(input())
        .arg(output()),
    )
}

fn input() -> Arg {
  Arg::new("INPUT").required(true).help("Input file or http(s) URL")
}

fn output() -> Arg {
  Arg::new("OUTPUT")
    .required(true)
    .value_parser(value_parser!(std::path::PathBuf))
    .help("Output PNG file")
}

fn overwrite() -> Arg {
  Arg::new("override")
    .short('f')
    .long("override")
    .action(ArgAction::SetTrue)
    .help("Override existing files")
}
