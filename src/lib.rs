//! Drop images onto a small panel to compress, convert or resize them.
//!
//! Every operation is a [`processor::BatchProcessor`] run over the dropped
//! files with a different per-item action from [`imaging`].

// Which dropped files and views the panel offers
pub mod activation;
// egui panel and its pages
pub mod app;
// Shared cancellation flag for one run
pub mod cancel;
// Headless subcommands
pub mod cli;
// Human-readable sizes and status lines
pub mod format;
// Compress, convert and resize on disk
pub mod imaging;
// Batch items, statuses and worker events
pub mod model;
// Sequential background runner
pub mod processor;
// Resize form with the aspect-ratio lock
pub mod resize;
// TOML settings file
pub mod settings;
// Preview textures for the resize page
pub mod thumbnail;
