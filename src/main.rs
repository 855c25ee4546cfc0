use std::path::PathBuf;

use anyhow::{bail, Context};
use got_clue::modal::ModalKind;

const USAGE: &str = "usage: got-clue <page-snapshot.json> <selector>";

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let (Some(snapshot), Some(selector)) = (args.next(), args.next()) else {
        bail!(USAGE);
    };

    let view = got_clue::run(&PathBuf::from(&snapshot), &selector)
        .with_context(|| format!("failed to answer from {snapshot}"))?;

    println!("{}\n\n{}", view.kind.title(), view.text);
    if view.kind == ModalKind::Error {
        std::process::exit(1);
    }
    Ok(())
}
