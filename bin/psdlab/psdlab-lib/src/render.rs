// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

use std::time::Instant;

use clap::ArgMatches;
use log::info;

use crate::{input_source, output_path, save_png, start_renderer, wait_for_render};

/// Layer visibility overrides from `--hide` and `--show`, shown layers win.
fn visibility_overrides(options: &ArgMatches) -> Vec<(usize, bool)> {
  let indices = |id: &str| options.get_many::<usize>(id).into_iter().flatten().copied();
  indices("hide").map(|i| (i, false)).chain(indices("show").map(|i| (i, true))).collect()
}

/// Composite the visible layers into a PNG file
pub async fn render(options: &ArgMatches) -> crate::Result<()> {
  let source = input_source(options)?;
  let output = output_path(options)?;
  let start = Instant::now();

  let (renderer, mut events) = start_renderer(options);
  renderer.load_with_visibility(source, visibility_overrides(options))?;
  let image = wait_for_render(&mut events, true).await?;
  info!("Rendered in {:.2?}, {} layer decodes", start.elapsed(), renderer.decode_count());
  save_png(&image, &output)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn show_wins_over_hide() {
    let matches = crate::app::create_app()
      .try_get_matches_from(["psdlab", "render", "--show", "2", "--hide", "2", "--hide", "4", "a.psd", "b.png"])
      .unwrap();
    let (_, sc) = matches.subcommand().unwrap();
    assert_eq!(visibility_overrides(sc), [(2, false), (4, false), (2, true)]);
  }
}
