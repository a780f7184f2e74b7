use super::{ImageAnalyzer, SessionState, UiAction};
use crate::render::{flatten, Block};
use crate::upload::classify::table_rows;
use crate::upload::{NotificationKind, Preview, ResponsePayload};
use crate::utils::file_size::file_label;
use eframe::egui::{self, Align2, Color32, RichText};

const ACCENT: Color32 = Color32::from_rgb(161, 89, 225);
const SUCCESS: Color32 = Color32::from_rgb(0, 150, 0);
const FAILURE: Color32 = Color32::from_rgb(220, 50, 50);

impl ImageAnalyzer {
    pub fn render(&self, ctx: &egui::Context) -> Vec<UiAction> {
        let mut actions = Vec::new();

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                ui.add_space(20.0);
                ui.vertical_centered(|ui| {
                    ui.heading("Image Analyzer");
                    ui.add_space(5.0);
                    ui.label(
                        RichText::new("Send an image for analysis and view the result")
                            .color(ui.visuals().text_color().gamma_multiply(0.7)),
                    );
                });
                ui.add_space(20.0);

                self.render_form(ui, &mut actions);
            });
        });

        if self.session.state() == SessionState::ResultReady {
            self.render_result(ctx, &mut actions);
        }
        self.render_toasts(ctx);

        actions
    }

    fn render_form(&self, ui: &mut egui::Ui, actions: &mut Vec<UiAction>) {
        let state = self.session.state();
        let busy = state == SessionState::Submitting;

        ui.group(|ui| {
            ui.label("Choose an image (or drop one on the window)");
            ui.add_space(8.0);
            ui.horizontal(|ui| {
                if ui
                    .add_enabled(!busy, egui::Button::new("🖼 Select Image"))
                    .clicked()
                {
                    actions.push(UiAction::PickFile);
                }
                if let Some(file) = self.session.selected_file() {
                    ui.label(file_label(file));
                    if ui
                        .add_enabled(!busy, egui::Button::new("🗑 Clear"))
                        .clicked()
                    {
                        actions.push(UiAction::Clear);
                    }
                }
            });
        });

        match self.session.preview() {
            Some(Preview::Ready(_)) => {
                if let Some((_, texture)) = &self.preview_texture {
                    ui.add_space(10.0);
                    ui.vertical_centered(|ui| {
                        ui.add(
                            egui::Image::new((texture.id(), texture.size_vec2()))
                                .max_height(260.0)
                                .max_width(ui.available_width()),
                        );
                    });
                }
            }
            Some(Preview::Pending) => {
                ui.add_space(10.0);
                ui.vertical_centered(|ui| {
                    ui.spinner();
                });
            }
            Some(Preview::Unavailable(_)) => {
                ui.add_space(10.0);
                ui.vertical_centered(|ui| {
                    ui.label(
                        RichText::new("No preview available")
                            .color(ui.visuals().text_color().gamma_multiply(0.6)),
                    );
                });
            }
            None => {}
        }

        ui.add_space(20.0);
        ui.vertical_centered(|ui| {
            if state == SessionState::Failed {
                ui.colored_label(FAILURE, "The last upload failed.");
                ui.add_space(5.0);
                let button = egui::Button::new("🔄 Try Again").min_size(egui::vec2(200.0, 40.0));
                if ui.add(button).clicked() {
                    actions.push(UiAction::Retry);
                }
            } else {
                let label = if busy {
                    "⏳ Analysing..."
                } else {
                    "📤 Analyse Image"
                };
                let button = egui::Button::new(label).min_size(egui::vec2(200.0, 40.0));
                if ui.add_enabled(self.session.can_submit(), button).clicked() {
                    actions.push(UiAction::Submit);
                }
            }
            ui.add_space(8.0);
            ui.label(
                RichText::new(format!("Destination: {}", self.session.policy_name()))
                    .small()
                    .color(ui.visuals().text_color().gamma_multiply(0.5)),
            );
        });
    }

    fn render_result(&self, ctx: &egui::Context, actions: &mut Vec<UiAction>) {
        let Some(payload) = self.session.payload() else {
            return;
        };

        egui::Window::new("Analysis result")
            .collapsible(false)
            .resizable(true)
            .default_width(640.0)
            .default_height(480.0)
            .anchor(Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    if let ResponsePayload::Markup(_) = payload {
                        let exporting = self.exporter.is_running();
                        let label = if exporting {
                            "Generating..."
                        } else {
                            "⬇ Download PDF"
                        };
                        if ui
                            .add_enabled(!exporting, egui::Button::new(label))
                            .clicked()
                        {
                            actions.push(UiAction::ExportPdf);
                        }
                        let source_label = if self.show_source {
                            "Show Formatted"
                        } else {
                            "Show Source"
                        };
                        if ui.button(source_label).clicked() {
                            actions.push(UiAction::ToggleSource);
                        }
                    }
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.button("✖ Close").clicked() {
                            actions.push(UiAction::CloseResult);
                        }
                    });
                });
                ui.separator();

                egui::ScrollArea::vertical()
                    .auto_shrink([false, false])
                    .show(ui, |ui| match payload {
                        ResponsePayload::Markup(markup) if self.show_source => {
                            ui.label(RichText::new(markup.as_str()).monospace());
                        }
                        ResponsePayload::Markup(markup) => render_blocks(ui, &flatten(markup)),
                        ResponsePayload::Tabular(fields) => {
                            egui::Grid::new("result_table")
                                .striped(true)
                                .num_columns(2)
                                .spacing([16.0, 6.0])
                                .show(ui, |ui| {
                                    ui.label(RichText::new("Property").strong());
                                    ui.label(RichText::new("Value").strong());
                                    ui.end_row();
                                    for (key, value) in table_rows(fields) {
                                        ui.label(RichText::new(key).strong());
                                        ui.label(RichText::new(value).monospace());
                                        ui.end_row();
                                    }
                                });
                        }
                    });
            });
    }

    fn render_toasts(&self, ctx: &egui::Context) {
        if self.toasts.is_empty() {
            return;
        }
        egui::Area::new("toasts")
            .anchor(Align2::RIGHT_BOTTOM, [-12.0, -12.0])
            .show(ctx, |ui| {
                for toast in &self.toasts {
                    let (icon, color) = match toast.notification.kind {
                        NotificationKind::Success => ("✅", SUCCESS),
                        NotificationKind::Failure => ("❌", FAILURE),
                    };
                    egui::Frame::none()
                        .fill(ui.visuals().extreme_bg_color)
                        .stroke(egui::Stroke::new(1.0, color))
                        .rounding(6.0)
                        .inner_margin(8.0)
                        .show(ui, |ui| {
                            ui.horizontal(|ui| {
                                ui.label(icon);
                                ui.colored_label(color, &toast.notification.message);
                            });
                        });
                    ui.add_space(4.0);
                }
            });
    }
}

fn render_blocks(ui: &mut egui::Ui, blocks: &[Block]) {
    for block in blocks {
        match block {
            Block::Heading(level, text) => {
                let size = match level {
                    1 => 24.0,
                    2 => 20.0,
                    3 => 17.0,
                    _ => 15.0,
                };
                ui.add_space(6.0);
                ui.label(RichText::new(text).size(size).strong().color(ACCENT));
            }
            Block::Paragraph(text) => {
                ui.label(text);
            }
            Block::ListItem(text) => {
                ui.horizontal_wrapped(|ui| {
                    ui.label("•");
                    ui.label(text);
                });
            }
            Block::Rule => {
                ui.separator();
            }
        }
        ui.add_space(4.0);
    }
}
