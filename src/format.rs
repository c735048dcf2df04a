use crate::imaging::CompressionStats;
use crate::model::{BatchItem, ItemOutput, ItemStatus};

/// Human-friendly byte count, e.g. `1.50 MB`
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

pub fn format_saved(stats: &CompressionStats) -> String {
    format!("{}%", stats.saved_percentage())
}

/// One-line status for list rows and console output
pub fn status_line(item: &BatchItem) -> String {
    match (item.status(), item.output()) {
        (ItemStatus::Pending, _) => "waiting".to_string(),
        (ItemStatus::Running, _) => "working…".to_string(),
        (ItemStatus::Failed(reason), _) => format!("failed: {reason}"),
        (ItemStatus::Succeeded, Some(ItemOutput::Compressed(stats))) => format!(
            "{} → {} ({} saved)",
            format_size(stats.before),
            format_size(stats.after),
            format_saved(stats)
        ),
        (ItemStatus::Succeeded, Some(ItemOutput::Converted(path))) => {
            format!("saved as {}", path.display())
        }
        (ItemStatus::Succeeded, _) => "done".to_string(),
    }
}
