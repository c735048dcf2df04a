//! Image helper panel and command line entry point

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
// eframe/egui for the panel window
use eframe::egui::Visuals;
// OnceCell for single-time runtime initialization
use once_cell::sync::OnceCell;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

use sill_image_helper::activation::{DISPLAY_NAME, SillDescriptor};
use sill_image_helper::app::ImageHelperApp;
use sill_image_helper::cli::{self, Cli};
use sill_image_helper::settings::Settings;

// Global Tokio runtime stored in a OnceCell for lazy init
static RUNTIME: OnceCell<Arc<Runtime>> = OnceCell::new();

fn runtime() -> Result<&'static Arc<Runtime>> {
    RUNTIME.get_or_try_init(|| {
        Runtime::new()
            .map(Arc::new)
            .context("Failed to start tokio runtime")
    })
}

/// Program entry point: parses arguments, then runs a headless batch or the panel
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let settings_path = cli.config.clone().unwrap_or_else(Settings::default_path);
    let settings = Settings::load(&settings_path).context("Failed to load settings")?;
    tracing::debug!(path = %settings_path.display(), "settings loaded");

    let rt = runtime()?;

    if let Some(command) = cli.command {
        return rt.block_on(cli::run(command, &settings));
    }

    let title = match SillDescriptor::load() {
        Some(descriptor) => {
            tracing::debug!(icon_bytes = descriptor.icon_svg.len(), "panel icon loaded");
            descriptor.display_name
        }
        None => DISPLAY_NAME,
    };

    let handle = rt.handle().clone();
    let options = eframe::NativeOptions::default();
    eframe::run_native(
        title,
        options,
        Box::new(move |cc| {
            // Use dark theme visuals
            cc.egui_ctx.set_visuals(Visuals::dark());
            Box::new(ImageHelperApp::new(handle, settings, Vec::new()))
        }),
    )
    .map_err(|e| anyhow!("Failed to open window: {e}"))
}
