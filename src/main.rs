use std::{fs, path::PathBuf, time::Instant};

use anyhow::Context;
use clap::Parser;
use obbprep::{util::draw_overlay, BlobAssembler, TokenPairing};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

/// Assembles training blobs from a directory of images and logs what came out.
#[derive(Parser, Debug)]
#[command(name = "obbprep")]
struct Args {
    /// Directory of images; annotations are found through the token pairing.
    dir: PathBuf,
    /// Target for the short image side.
    #[arg(long, default_value_t = obbprep::rescale::MIN_BOUND)]
    min_side: u32,
    /// Cap for the long image side.
    #[arg(long, default_value_t = obbprep::rescale::MAX_BOUND)]
    max_side: u32,
    /// Directory-name token marking images.
    #[arg(long, default_value = "image")]
    image_token: String,
    /// Replacement for the image token in annotation paths.
    #[arg(long, default_value = "txt")]
    annotation_token: String,
    /// Extension of annotation files.
    #[arg(long, default_value = "txt")]
    annotation_extension: String,
    /// Write each resized image with its scaled boxes drawn on top here.
    #[arg(long)]
    overlay_dir: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let assembler = BlobAssembler::builder()
        .pairing(TokenPairing::new(
            args.image_token,
            args.annotation_token,
            args.annotation_extension,
        ))
        .min_side(args.min_side)
        .max_side(args.max_side)
        .build();

    let start = Instant::now();
    let blobs = assembler
        .assemble_dir(&args.dir)
        .with_context(|| format!("failed to assemble blobs from {}", args.dir.display()))?;
    log::debug!("{:?}", start.elapsed());

    for blob in &blobs {
        log::info!(
            "{}: {} boxes, im_info {:?}",
            blob.source.display(),
            blob.gt_list.len(),
            blob.im_info.to_array()
        );
    }
    for skipped in blobs.skipped() {
        log::warn!("skipped {}: {}", skipped.path.display(), skipped.error);
    }

    if let Some(overlay_dir) = &args.overlay_dir {
        fs::create_dir_all(overlay_dir)
            .with_context(|| format!("failed to create {}", overlay_dir.display()))?;
        for blob in &blobs {
            let name = blob
                .source
                .file_stem()
                .context("blob source has no file name")?;
            let path = overlay_dir.join(format!("{}.png", name.to_string_lossy()));
            draw_overlay(blob)
                .save(&path)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
    }

    Ok(())
}
