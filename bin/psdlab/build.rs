use std::path::PathBuf;

use clap_mangen::Man;

use clap_complete::{
  Shell::{Bash, Elvish, Fish, PowerShell, Zsh},
  generate_to,
};

fn main() -> std::io::Result<()> {
  println!("cargo:rerun-if-changed=psdlab-lib/src/app.rs");
  build_manpages()?;
  build_completions()?;
  Ok(())
}

fn build_completions() -> std::io::Result<()> {
  let outdir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("completions");
  std::fs::create_dir_all(&outdir)?;
  let mut cmd = psdlab_lib::app::create_app().name("psdlab");
  for shell in [Bash, Elvish, Fish, PowerShell, Zsh] {
    generate_to(shell, &mut cmd, "psdlab", &outdir)?;
  }
  Ok(())
}

fn build_manpages() -> std::io::Result<()> {
  let outdir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("manpages");
  std::fs::create_dir_all(&outdir)?;
  let name = "psdlab";
  let cmd = psdlab_lib::app::create_app().name(name);
  let mut buffer: Vec<u8> = Default::default();
  Man::new(cmd.clone()).render(&mut buffer)?;
  std::fs::write(outdir.join("psdlab.1"), buffer)?;

  for subcommand in cmd.get_subcommands() {
    let subcommand_name = format!("{name}-{}", subcommand.get_name());
    let mut buffer: Vec<u8> = Default::default();
    Man::new(subcommand.clone().name(&subcommand_name)).render(&mut buffer)?;
    std::fs::write(outdir.join(format!("{}.1", subcommand_name)), buffer)?;
  }
  Ok(())
}
