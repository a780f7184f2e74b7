mod state;
mod ui;

use crate::config::ExportConfig;
use crate::render::{ExportOutcome, Exporter, PageLayout};
use crate::upload::{
    spawn_load, Notification, Preview, ResponsePayload, SelectedFile, SubmissionPolicy,
};
use eframe::{egui, App};
use rfd::FileDialog;
use std::io;
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub use state::{SessionState, UploadSession};

const TOAST_LIFETIME: Duration = Duration::from_secs(4);
const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "webp", "bmp"];

pub struct Toast {
    pub notification: Notification,
    pub shown_at: Instant,
}

/// Something the user clicked this frame; handled after drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiAction {
    PickFile,
    Clear,
    Submit,
    Retry,
    ExportPdf,
    CloseResult,
    ToggleSource,
}

type LoadResult = (PathBuf, io::Result<SelectedFile>);

pub struct ImageAnalyzer {
    session: UploadSession,
    load_sender: Sender<LoadResult>,
    load_receiver: Receiver<LoadResult>,
    pending_loads: usize,
    exporter: Exporter,
    export_receiver: Receiver<ExportOutcome>,
    export_config: ExportConfig,
    preview_texture: Option<(u64, egui::TextureHandle)>,
    toasts: Vec<Toast>,
    show_source: bool,
}

impl ImageAnalyzer {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        policy: Arc<dyn SubmissionPolicy>,
        export_config: ExportConfig,
    ) -> Self {
        info!("Initializing Image Analyzer ({} policy)", policy.name());
        let (sender, export_receiver) = channel();
        let (load_sender, load_receiver) = channel();
        Self {
            session: UploadSession::new(policy),
            load_sender,
            load_receiver,
            pending_loads: 0,
            exporter: Exporter::new(PageLayout::from(&export_config), sender),
            export_receiver,
            export_config,
            preview_texture: None,
            toasts: Vec::new(),
            show_source: false,
        }
    }

    fn notify(&mut self, notification: Notification) {
        self.toasts.push(Toast {
            notification,
            shown_at: Instant::now(),
        });
    }

    pub fn load_path(&mut self, path: PathBuf) {
        self.pending_loads += 1;
        spawn_load(path, self.load_sender.clone(), |path, result| (path, result));
    }

    fn finish_load(&mut self, path: PathBuf, result: io::Result<SelectedFile>) {
        match result {
            Ok(file) => {
                if let Err(e) = self.session.select_file(file) {
                    warn!("Ignoring {}: {}", path.display(), e);
                }
            }
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                self.notify(Notification::failure(format!(
                    "Could not read {}.",
                    path.display()
                )));
            }
        }
    }

    fn pick_file(&mut self) {
        if let Some(path) = FileDialog::new()
            .add_filter("Images", &IMAGE_EXTENSIONS)
            .pick_file()
        {
            self.load_path(path);
        }
    }

    fn start_export(&mut self) {
        let Some(ResponsePayload::Markup(markup)) = self.session.payload() else {
            return;
        };
        if self.exporter.is_running() {
            return;
        }
        let markup = markup.clone();
        let Some(destination) = FileDialog::new()
            .set_file_name(self.export_config.file_name.as_str())
            .add_filter("PDF", &["pdf"])
            .save_file()
        else {
            return;
        };

        if let Err(e) = self.exporter.start(&markup, destination) {
            warn!("Export not started: {}", e);
            self.notify(Notification::failure(
                "Could not generate the PDF. Please try again.",
            ));
        }
    }

    pub fn handle(&mut self, action: UiAction) {
        let result = match action {
            UiAction::PickFile => {
                self.pick_file();
                Ok(())
            }
            UiAction::Clear => self.session.reset(),
            UiAction::Submit => self.session.submit(),
            UiAction::Retry => self.session.retry().and_then(|_| self.session.submit()),
            UiAction::ExportPdf => {
                self.start_export();
                Ok(())
            }
            UiAction::CloseResult => {
                self.show_source = false;
                self.session.close_result()
            }
            UiAction::ToggleSource => {
                self.show_source = !self.show_source;
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!("{:?} rejected: {}", action, e);
        }
    }

    pub fn update_state(&mut self, ctx: &egui::Context) {
        self.session.poll();

        let dropped = ctx.input(|i| i.raw.dropped_files.clone());
        if let Some(path) = dropped.into_iter().find_map(|f| f.path) {
            self.load_path(path);
        }
        while let Ok((path, result)) = self.load_receiver.try_recv() {
            self.pending_loads = self.pending_loads.saturating_sub(1);
            self.finish_load(path, result);
        }

        for notification in self.session.take_notifications() {
            self.notify(notification);
        }

        while let Ok(outcome) = self.export_receiver.try_recv() {
            match outcome.result {
                Ok(path) => {
                    self.notify(Notification::success(
                        "The PDF was generated and saved.",
                    ));
                    if self.export_config.open_after_save {
                        if let Err(e) = open::that(&path) {
                            warn!("Failed to open {}: {}", path.display(), e);
                        }
                    }
                }
                Err(_) => self.notify(Notification::failure(
                    "Could not generate the PDF. Please try again.",
                )),
            }
        }

        self.sync_preview_texture(ctx);
        self.toasts
            .retain(|toast| toast.shown_at.elapsed() < TOAST_LIFETIME);

        if self.pending_loads > 0
            || self.session.is_busy()
            || self.exporter.is_running() || !self.toasts.is_empty() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }

    fn sync_preview_texture(&mut self, ctx: &egui::Context) {
        let selection = self.session.selection_id();
        match self.session.preview() {
            Some(Preview::Ready(image)) => {
                let current = matches!(&self.preview_texture, Some((id, _)) if *id == selection);
                if !current {
                    let color_image = egui::ColorImage::from_rgba_unmultiplied(
                        [image.width as usize, image.height as usize],
                        &image.rgba,
                    );
                    let texture =
                        ctx.load_texture("preview", color_image, egui::TextureOptions::LINEAR);
                    self.preview_texture = Some((selection, texture));
                }
            }
            _ => self.preview_texture = None,
        }
    }
}

impl App for ImageAnalyzer {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.update_state(ctx);
        for action in self.render(ctx) {
            self.handle(action);
        }
    }
}
