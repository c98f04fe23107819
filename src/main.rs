use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use sheetfix::{io, Cli, SheetInput, SheetProcessor};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = cli.sheet_config()?;
    if cli.debug_overlay && config.post.moves_content() {
        warn!("post stages move the sheet; debug overlays are skipped");
    }
    let mut processor = SheetProcessor::new(config).context("Invalid configuration")?;
    let sheets = cli.sheets(processor.config().input_pages as usize);

    let mut failed = 0;
    for (index, pages) in sheets.iter().enumerate() {
        let sheet = index as u32 + 1;
        if let Err(err) = process_sheet(&cli, &mut processor, sheet, pages) {
            error!(sheet, "{:#}", err);
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{} of {} sheets failed", failed, sheets.len());
    }
    Ok(())
}

fn process_sheet(
    cli: &Cli,
    processor: &mut SheetProcessor,
    sheet: u32,
    pages: &[Option<PathBuf>],
) -> Result<()> {
    let config = processor.config();
    let (background, black_threshold) = (config.background, config.black_threshold);
    // Detected rectangles only line up with pages the post stages left alone.
    let overlay = cli.debug_overlay && !config.post.moves_content();

    let mut input = SheetInput::default();
    for page in pages {
        input.pages.push(match page {
            Some(path) => Some(
                io::load(path, background)
                    .with_context(|| format!("Failed to load page: {:?}", path))?,
            ),
            None => None,
        });
    }

    let output = processor
        .process(sheet, input)
        .with_context(|| format!("Failed to process sheet {}", sheet))?;
    let report = &output.report;

    let source = pages.iter().flatten().next().map(PathBuf::as_path);
    let count = output.pages.len();
    for (j, page) in output.pages.iter().enumerate() {
        let number = (count > 1).then_some(j + 1);
        let path = cli.output_path(source, sheet, number);
        io::save(page, &path, black_threshold)
            .with_context(|| format!("Failed to save output: {:?}", path))?;
        eprintln!("Saved sheet {}: {:?}", sheet, path);

        if overlay {
            let (masks, borders) = report.page_outlines(j, count);
            let overlay_path = cli.overlay_path(source, sheet, number);
            io::render_overlay(page, &masks, &borders)
                .save(&overlay_path)
                .with_context(|| format!("Failed to save overlay: {:?}", overlay_path))?;
        }
    }

    if cli.report {
        let line = serde_json::to_string(report).context("Failed to serialize report")?;
        println!("{}", line);
    }
    Ok(())
}
