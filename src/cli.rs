//! Headless mode: the same batches, reported on stdout

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tokio::runtime::Handle;

use crate::activation;
use crate::cancel::CancellationScope;
use crate::format::status_line;
use crate::imaging::{self, ImageCrateOps, ImageOperations, ResizeTarget, TargetFormat};
use crate::model::{Batch, BatchEvent, ItemResult};
use crate::processor::BatchProcessor;
use crate::resize::{ResizeForm, ResizeMode};
use crate::settings::Settings;

#[derive(Parser)]
#[command(name = "sill-image-helper")]
#[command(about = "Compress, convert and resize images", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to settings file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Losslessly recompress images in place
    Compress {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Write a copy of each image in another format next to the original
    Convert {
        /// Target format (png, jpeg, bmp, gif, tiff, webp, avif, ico)
        #[arg(short, long)]
        format: Option<TargetFormat>,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Resize one image in place
    Resize {
        #[arg(long, requires = "height")]
        width: Option<u32>,
        #[arg(long, requires = "width")]
        height: Option<u32>,
        /// Scale both sides by this percentage instead
        #[arg(long, conflicts_with_all = ["width", "height"])]
        percent: Option<u32>,
        /// Stretch to exactly width x height
        #[arg(long)]
        ignore_aspect: bool,
        file: PathBuf,
    },
}

/// Runs one subcommand to completion. Fails if any file failed.
pub async fn run(command: Commands, settings: &Settings) -> Result<()> {
    let ops: Arc<dyn ImageOperations> = Arc::new(ImageCrateOps::new(settings.compress.level));

    let batch = match command {
        Commands::Compress { files } => {
            run_batch(&files, imaging::compress_action(ops)).await?
        }
        Commands::Convert { format, files } => {
            let format = format.unwrap_or(settings.convert.default_format);
            run_batch(&files, imaging::convert_action(ops, format)).await?
        }
        Commands::Resize {
            width,
            height,
            percent,
            ignore_aspect,
            file,
        } => {
            let target = resize_target(&file, width.zip(height), percent, ignore_aspect)?;
            run_batch(std::slice::from_ref(&file), imaging::resize_action(ops, target)).await?
        }
    };

    if batch.failed() > 0 {
        bail!("{} of {} files failed", batch.failed(), batch.len());
    }
    Ok(())
}

fn resize_target(
    file: &Path,
    size: Option<(u32, u32)>,
    percent: Option<u32>,
    ignore_aspect: bool,
) -> Result<ResizeTarget> {
    match (size, percent) {
        (Some((width, height)), _) => Ok(ResizeTarget {
            width,
            height,
            preserve_aspect: !ignore_aspect,
        }),
        (None, Some(percent)) => {
            let mut form = ResizeForm::from_image(file)?;
            form.mode = ResizeMode::Percentage;
            form.percentage = percent;
            Ok(form.target())
        }
        (None, None) => bail!("pass --width and --height, or --percent"),
    }
}

async fn run_batch<A>(files: &[PathBuf], action: A) -> Result<Batch>
where
    A: Fn(&Path, &CancellationScope) -> ItemResult + Send + 'static,
{
    let supported = activation::compatible_files(files);
    for skipped in files.iter().filter(|f| !supported.contains(*f)) {
        tracing::warn!(path = %skipped.display(), "skipping unsupported file");
    }
    if supported.is_empty() {
        bail!("no supported image files given");
    }

    let processor = BatchProcessor::new(Handle::current());
    let mut batch = Batch::from_paths(&supported);
    let mut run = processor.start(&batch, action, processor.scope())?;

    while let Some(event) = run.next_into(&mut batch).await {
        if let BatchEvent::Completed { index, .. } = event {
            let item = &batch.items()[index];
            println!(
                "[{}/{}] {}: {}",
                index + 1,
                batch.len(),
                item.file_name,
                status_line(item)
            );
        }
    }
    run.join().await;
    Ok(batch)
}
