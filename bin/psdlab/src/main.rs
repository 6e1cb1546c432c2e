// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

use fern::colors::{Color, ColoredLevelConfig};
use psdlab_lib::{app, info, merged, render, thumbnail};
use tokio::runtime::Builder;

const STACK_SIZE_MIB: usize = 4;

fn main() -> anyhow::Result<()> {
  let runtime = Builder::new_multi_thread()
    .enable_all()
    .thread_name("psdlab-tokio-worker")
    .thread_stack_size(STACK_SIZE_MIB * 1024 * 1024)
    .build()?;

  runtime.block_on(main_async())
}

/// Main entry function
///
/// We initialize the fern logger here, create a Clap command line
/// parser and dispatch to the subcommand.
async fn main_async() -> anyhow::Result<()> {
  let app = app::create_app();
  let matches = app.try_get_matches().unwrap_or_else(|e| e.exit());

  let colors = ColoredLevelConfig::new().debug(Color::Magenta);
  fern::Dispatch::new()
    .chain(std::io::stderr())
    .level({
      match matches.get_count("debug") {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Warn,
        2 => log::LevelFilter::Info,
        3 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
      }
    })
    .format(move |out, message, record| {
      out.finish(format_args!(
        "[{:6}][{}] {} ({}:{})",
        colors.color(record.level()),
        record.target(),
        message,
        record.file().unwrap_or("<undefined>"),
        record.line().unwrap_or(0)
      ))
    })
    .apply()?;

  match matches.subcommand() {
    Some(("info", sc)) => info::info(sc).await?,
    Some(("render", sc)) => render::render(sc).await?,
    Some(("thumbnail", sc)) => thumbnail::thumbnail(sc).await?,
    Some(("merged", sc)) => merged::merged(sc).await?,
    _ => anyhow::bail!("Unknown subcommand was used"),
  }
  Ok(())
}
