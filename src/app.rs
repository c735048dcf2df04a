//! Desktop panel: drop images, pick an operation, watch the batch run

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use eframe::{App, Frame, egui};
use egui::{Color32, TextureHandle, TextureOptions};
use rfd::FileDialog;
use tokio::runtime::Handle;

use crate::activation::{self, SUPPORTED_EXTENSIONS, ViewKind};
use crate::format::{format_saved, format_size, status_line};
use crate::imaging::{self, ImageCrateOps, ImageOperations, ItemAction, TargetFormat};
use crate::model::{Batch, ItemOutput, ItemStatus};
use crate::processor::{BatchProcessor, BatchRun};
use crate::resize::{ResizeForm, ResizeMode};
use crate::settings::Settings;
use crate::thumbnail;

/// A batch shown in a list, plus the run feeding it
struct BatchView {
    batch: Batch,
    run: Option<BatchRun>,
    error: Option<String>,
}

impl BatchView {
    fn new(files: &[PathBuf]) -> Self {
        Self {
            batch: Batch::from_paths(files),
            run: None,
            error: None,
        }
    }

    fn start(&mut self, processor: &BatchProcessor, action: ItemAction) {
        match processor.start(&self.batch, action, processor.scope()) {
            Ok(run) => self.run = Some(run),
            Err(e) => {
                tracing::error!(error = %e, "could not start batch");
                self.error = Some(e.to_string());
            }
        }
    }

    fn poll(&mut self) {
        if let Some(run) = self.run.as_mut() {
            run.poll_into(&mut self.batch);
        }
    }

    fn is_running(&self) -> bool {
        self.run.as_ref().is_some_and(|r| !r.is_finished())
    }
}

enum ConvertPage {
    ChooseFormat,
    Converting(BatchView),
}

struct ResizeView {
    file: PathBuf,
    form: Option<ResizeForm>,
    preview: Option<TextureHandle>,
    job: Option<BatchView>,
    error: Option<String>,
}

enum OpenView {
    Compress(BatchView),
    Convert(ConvertPage),
    Resize(ResizeView),
}

/// Things the user asked for during this frame, applied after drawing
enum UiAction {
    Activate(Vec<PathBuf>),
    Open(ViewKind),
    Close,
    Convert(TargetFormat),
    Resize,
}

pub struct ImageHelperApp {
    settings: Settings,
    ops: Arc<dyn ImageOperations>,
    processor: BatchProcessor,
    /// Compatible files from the last drop
    files: Vec<PathBuf>,
    views: Vec<ViewKind>,
    open: Option<OpenView>,
    /// Kind of the open view, for highlighting the side list
    open_kind: Option<ViewKind>,
    status: String,
}

impl ImageHelperApp {
    pub fn new(runtime: Handle, settings: Settings, files: Vec<PathBuf>) -> Self {
        let ops: Arc<dyn ImageOperations> =
            Arc::new(ImageCrateOps::new(settings.compress.level));
        let mut app = Self {
            settings,
            ops,
            processor: BatchProcessor::new(runtime),
            files: Vec::new(),
            views: Vec::new(),
            open: None,
            open_kind: None,
            status: "Drop images here or browse for them.".to_string(),
        };
        if !files.is_empty() {
            app.activate(files);
        }
        app
    }

    /// Handles a drop: keeps the supported files and lists the views for them.
    fn activate(&mut self, paths: Vec<PathBuf>) {
        if !activation::should_activate(&paths) {
            self.status = "None of those files is a supported image.".to_string();
            return;
        }
        self.close_view();
        self.files = activation::compatible_files(&paths);
        self.views = activation::available_views(&self.files);
        self.status = format!("{} image(s) ready.", self.files.len());
        tracing::info!(files = self.files.len(), "activated");
    }

    /// Closing a view always cancels whatever it was running.
    fn close_view(&mut self) {
        self.processor.cancel();
        self.open = None;
        self.open_kind = None;
    }

    fn open_view(&mut self, kind: ViewKind, ctx: &egui::Context) {
        self.close_view();
        let view = match kind {
            ViewKind::Compress => {
                let mut view = BatchView::new(&self.files);
                view.start(
                    &self.processor,
                    Box::new(imaging::compress_action(Arc::clone(&self.ops))),
                );
                OpenView::Compress(view)
            }
            ViewKind::Convert => OpenView::Convert(ConvertPage::ChooseFormat),
            ViewKind::Resize => {
                let Some(file) = self.files.first().cloned() else {
                    return;
                };
                OpenView::Resize(self.resize_view(file, ctx))
            }
        };
        self.open = Some(view);
        self.open_kind = Some(kind);
    }

    fn resize_view(&self, file: PathBuf, ctx: &egui::Context) -> ResizeView {
        let (form, error) = match ResizeForm::from_image(&file) {
            Ok(mut form) => {
                form.set_maintain_aspect_ratio(self.settings.resize.maintain_aspect_ratio);
                form.percentage = self.settings.resize.default_percentage;
                (Some(form), None)
            }
            Err(e) => {
                tracing::warn!(path = %file.display(), error = %e, "cannot read image size");
                (None, Some(e.to_string()))
            }
        };
        let preview = thumbnail::load_preview(&file).map(|img| {
            ctx.load_texture(file.display().to_string(), img, TextureOptions::default())
        });
        ResizeView {
            file,
            form,
            preview,
            job: None,
            error,
        }
    }

    fn apply(&mut self, action: UiAction, ctx: &egui::Context) {
        match action {
            UiAction::Activate(paths) => self.activate(paths),
            UiAction::Open(kind) => self.open_view(kind, ctx),
            UiAction::Close => self.close_view(),
            UiAction::Convert(format) => {
                let mut view = BatchView::new(&self.files);
                view.start(
                    &self.processor,
                    Box::new(imaging::convert_action(Arc::clone(&self.ops), format)),
                );
                self.open = Some(OpenView::Convert(ConvertPage::Converting(view)));
            }
            UiAction::Resize => {
                if let Some(OpenView::Resize(view)) = self.open.as_mut() {
                    if let Some(form) = &view.form {
                        let mut job = BatchView::new(std::slice::from_ref(&view.file));
                        job.start(
                            &self.processor,
                            Box::new(imaging::resize_action(Arc::clone(&self.ops), form.target())),
                        );
                        view.job = Some(job);
                    }
                }
            }
        }
    }

    /// Drains worker events into the open view's batch.
    fn poll_open_view(&mut self) -> bool {
        let mut close = false;
        let running = match self.open.as_mut() {
            Some(OpenView::Compress(view)) | Some(OpenView::Convert(ConvertPage::Converting(view))) => {
                view.poll();
                view.is_running()
            }
            Some(OpenView::Resize(view)) => match view.job.as_mut() {
                Some(job) if job.run.is_none() => {
                    view.error = job.error.take();
                    view.job = None;
                    false
                }
                Some(job) => {
                    job.poll();
                    if job.batch.is_finished() {
                        match job.batch.items().first().map(|i| i.status().clone()) {
                            Some(ItemStatus::Succeeded) => close = true,
                            Some(ItemStatus::Failed(reason)) => {
                                view.error = Some(reason);
                                view.job = None;
                            }
                            _ => view.job = None,
                        }
                        false
                    } else {
                        true
                    }
                }
                None => false,
            },
            _ => false,
        };
        if close {
            self.status = "Image resized.".to_string();
            self.close_view();
        }
        running
    }
}

impl App for ImageHelperApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        let mut actions = Vec::new();

        // 1️⃣ Files dropped onto the window
        let dropped: Vec<PathBuf> = ctx.input(|i| {
            i.raw
                .dropped_files
                .iter()
                .filter_map(|f| f.path.clone())
                .collect()
        });
        if !dropped.is_empty() {
            actions.push(UiAction::Activate(dropped));
        }
        let hovering = ctx.input(|i| !i.raw.hovered_files.is_empty());

        // 2️⃣ Apply worker progress
        let running = self.poll_open_view();

        // 3️⃣ Left panel: drop target and the views offered for it
        egui::SidePanel::left("views_panel").show(ctx, |ui| {
            ui.heading(activation::DISPLAY_NAME);
            ui.separator();
            if hovering {
                ui.colored_label(Color32::LIGHT_BLUE, "Release to load images");
            }
            ui.label(&self.status);
            if ui.button("Browse…").clicked() {
                let extensions: Vec<&str> = SUPPORTED_EXTENSIONS
                    .iter()
                    .map(|e| e.trim_start_matches('.'))
                    .collect();
                if let Some(files) = FileDialog::new()
                    .add_filter("Images", extensions.as_slice())
                    .pick_files()
                {
                    actions.push(UiAction::Activate(files));
                }
            }
            ui.separator();
            for kind in &self.views {
                let selected = self.open_kind == Some(*kind);
                if ui.selectable_label(selected, kind.title()).clicked() && !selected {
                    actions.push(UiAction::Open(*kind));
                }
            }
        });

        // 4️⃣ Main panel: the open view
        egui::CentralPanel::default().show(ctx, |ui| match &mut self.open {
            None => {
                ui.label("Pick an operation on the left.");
            }
            Some(OpenView::Compress(view)) => {
                ui.heading(ViewKind::Compress.title());
                batch_list(ui, view);
                done_button(ui, view, &mut actions);
            }
            Some(OpenView::Convert(ConvertPage::ChooseFormat)) => {
                format_page(ui, self.settings.convert.default_format, &mut actions);
            }
            Some(OpenView::Convert(ConvertPage::Converting(view))) => {
                ui.heading(ViewKind::Convert.title());
                batch_list(ui, view);
                done_button(ui, view, &mut actions);
            }
            Some(OpenView::Resize(view)) => resize_page(ui, view, &mut actions),
        });

        let acted = !actions.is_empty();
        for action in actions {
            self.apply(action, ctx);
        }

        // Keep polling while a worker is busy or was just started
        if running || acted {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }
}

fn batch_list(ui: &mut egui::Ui, view: &BatchView) {
    if let Some(error) = &view.error {
        ui.colored_label(Color32::RED, error);
    }
    ui.add(egui::ProgressBar::new(view.batch.progress()).show_percentage());
    egui::ScrollArea::vertical()
        .auto_shrink([false; 2])
        .max_height(ui.available_height() - 40.0)
        .show(ui, |ui| {
            for item in view.batch.items() {
                ui.group(|ui| {
                    ui.horizontal(|ui| {
                        ui.vertical(|ui| {
                            ui.strong(&item.file_name);
                            ui.label(format_size(item.byte_length));
                        });
                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            match (item.status(), item.output()) {
                                (ItemStatus::Running, _) => {
                                    ui.add(egui::Spinner::new());
                                }
                                (ItemStatus::Failed(reason), _) => {
                                    ui.colored_label(Color32::RED, "❌").on_hover_text(reason.as_str());
                                }
                                (ItemStatus::Succeeded, Some(ItemOutput::Compressed(stats))) => {
                                    ui.vertical(|ui| {
                                        ui.strong(format_saved(stats));
                                        ui.label(format_size(stats.after));
                                    });
                                }
                                (ItemStatus::Succeeded, _) => {
                                    ui.colored_label(Color32::GREEN, "✅")
                                        .on_hover_text(status_line(item));
                                }
                                (ItemStatus::Pending, _) => {}
                            }
                        });
                    });
                });
            }
        });
}

fn format_page(ui: &mut egui::Ui, default: TargetFormat, actions: &mut Vec<UiAction>) {
    ui.heading(ViewKind::Convert.title());
    ui.label("Convert to:");
    if ui.button(format!("{} (default)", default.label())).clicked() {
        actions.push(UiAction::Convert(default));
    }
    ui.horizontal_wrapped(|ui| {
        for format in TargetFormat::ALL.iter().filter(|f| **f != default) {
            if ui.button(format.label()).clicked() {
                actions.push(UiAction::Convert(*format));
            }
        }
    });
    ui.separator();
    if ui.button("Cancel").clicked() {
        actions.push(UiAction::Close);
    }
}

/// Cancel while the batch runs, Done once it finished
fn done_button(ui: &mut egui::Ui, view: &BatchView, actions: &mut Vec<UiAction>) {
    ui.separator();
    let label = if view.is_running() { "Cancel" } else { "Done" };
    if ui.button(label).clicked() {
        actions.push(UiAction::Close);
    }
}

fn resize_page(ui: &mut egui::Ui, view: &mut ResizeView, actions: &mut Vec<UiAction>) {
    ui.heading(ViewKind::Resize.title());
    ui.label(view.file.display().to_string());
    if let Some(tex) = &view.preview {
        ui.image(tex);
    }
    if let Some(error) = &view.error {
        ui.colored_label(Color32::RED, error);
    }
    let busy = view.job.is_some();
    let Some(form) = view.form.as_mut() else {
        if ui.button("Close").clicked() {
            actions.push(UiAction::Close);
        }
        return;
    };

    let (orig_w, orig_h) = form.original_size();
    ui.label(format!("Original size: {orig_w} × {orig_h}"));
    ui.horizontal(|ui| {
        ui.selectable_value(&mut form.mode, ResizeMode::AbsoluteSize, "Absolute size");
        ui.selectable_value(&mut form.mode, ResizeMode::Percentage, "Percentage");
    });
    ui.separator();

    ui.add_enabled_ui(!busy, |ui| match form.mode {
        ResizeMode::AbsoluteSize => {
            let mut width = form.width();
            let mut height = form.height();
            ui.horizontal(|ui| {
                ui.label("Width");
                if ui
                    .add(egui::DragValue::new(&mut width).clamp_range(1..=65_535))
                    .changed()
                {
                    form.set_width(width);
                }
                ui.label("Height");
                if ui
                    .add(egui::DragValue::new(&mut height).clamp_range(1..=65_535))
                    .changed()
                {
                    form.set_height(height);
                }
            });
            let mut locked = form.maintain_aspect_ratio();
            if ui.checkbox(&mut locked, "Keep aspect ratio").changed() {
                form.set_maintain_aspect_ratio(locked);
            }
        }
        ResizeMode::Percentage => {
            ui.add(egui::Slider::new(&mut form.percentage, 1..=400).suffix("%"));
            let target = form.target();
            ui.label(format!("New size: {} × {}", target.width, target.height));
        }
    });

    ui.separator();
    ui.horizontal(|ui| {
        if busy {
            ui.add(egui::Spinner::new());
        }
        if ui.add_enabled(!busy, egui::Button::new("Resize")).clicked() {
            actions.push(UiAction::Resize);
        }
        if ui.button("Cancel").clicked() {
            actions.push(UiAction::Close);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::{CompressionStats, ImageOpError, ResizeTarget};
    use std::path::Path;
    use std::sync::{Mutex, mpsc};

    fn app() -> ImageHelperApp {
        ImageHelperApp::new(Handle::current(), Settings::default(), Vec::new())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_drop_without_images_is_ignored() {
        let mut app = app();
        app.activate(vec![PathBuf::from("notes.txt")]);
        assert!(app.files.is_empty());
        assert!(app.views.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_single_image_offers_resize() {
        let mut app = app();
        app.activate(vec![PathBuf::from("a.png"), PathBuf::from("b.txt")]);
        assert_eq!(app.files, vec![PathBuf::from("a.png")]);
        assert_eq!(
            app.views,
            vec![ViewKind::Resize, ViewKind::Convert, ViewKind::Compress]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_closing_view_cancels_run() {
        let ctx = egui::Context::default();
        let mut app = app();
        app.activate(vec![
            PathBuf::from("/nonexistent/a.png"),
            PathBuf::from("/nonexistent/b.png"),
        ]);
        app.open_view(ViewKind::Compress, &ctx);
        assert!(matches!(app.open, Some(OpenView::Compress(_))));
        let scope = app.processor.scope();

        app.apply(UiAction::Close, &ctx);
        assert!(app.open.is_none());
        assert!(scope.is_cancelled());
        assert!(!app.processor.scope().is_cancelled());
    }

    /// Compression that blocks until the test lets it go
    struct GatedOps {
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl ImageOperations for GatedOps {
        fn lossless_compress(&self, _: &Path) -> Result<CompressionStats, ImageOpError> {
            let _ = self.release.lock().unwrap().recv();
            Ok(CompressionStats {
                before: 10,
                after: 10,
            })
        }

        fn convert(&self, path: &Path, _: TargetFormat) -> Result<PathBuf, ImageOpError> {
            Ok(path.to_path_buf())
        }

        fn resize(&self, _: &Path, _: ResizeTarget) -> Result<(), ImageOpError> {
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reopening_after_cancel_starts_new_run() {
        let ctx = egui::Context::default();
        let mut app = app();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        app.ops = Arc::new(GatedOps {
            release: Mutex::new(release_rx),
        });
        app.activate(vec![PathBuf::from("a.png"), PathBuf::from("b.png")]);

        app.open_view(ViewKind::Compress, &ctx);
        assert!(app.processor.is_running());

        // Reopen while the first item is still blocked
        app.apply(UiAction::Close, &ctx);
        app.apply(UiAction::Open(ViewKind::Compress), &ctx);

        drop(release_tx);
        match app.open.as_mut() {
            Some(OpenView::Compress(view)) => {
                assert_eq!(view.error, None);
                let run = view.run.as_mut().unwrap();
                run.wait_into(&mut view.batch).await;
                assert_eq!(view.batch.completed(), 2);
                assert!(!view.batch.was_cancelled());
            }
            _ => panic!("expected the compress page"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_choosing_format_starts_conversion() {
        let ctx = egui::Context::default();
        let mut app = app();
        app.activate(vec![PathBuf::from("/nonexistent/a.png")]);
        app.open_view(ViewKind::Convert, &ctx);
        assert!(matches!(
            app.open,
            Some(OpenView::Convert(ConvertPage::ChooseFormat))
        ));

        app.apply(UiAction::Convert(TargetFormat::Gif), &ctx);
        match app.open.as_mut() {
            Some(OpenView::Convert(ConvertPage::Converting(view))) => {
                let run = view.run.as_mut().unwrap();
                run.wait_into(&mut view.batch).await;
                // Missing source fails the item, not the view
                assert_eq!(view.batch.failed(), 1);
                assert!(!view.is_running());
            }
            _ => panic!("expected the conversion page"),
        }
    }
}
