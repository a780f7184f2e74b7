use crate::config::ExportConfig;
use crate::error::ExportError;
use crate::render::markup::{flatten, Block};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use tracing::{error, info};

const A4_WIDTH_MM: f32 = 210.0;
const A4_HEIGHT_MM: f32 = 297.0;
const PT_TO_MM: f32 = 0.3528;
const LINE_SPACING: f32 = 1.35;
// Average Helvetica glyph width as a fraction of the font size.
const AVG_GLYPH_WIDTH: f32 = 0.5;
const MIN_CHARS_PER_LINE: usize = 8;
const MAX_CHARS_PER_LINE: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    pub width_mm: f32,
    pub height_mm: f32,
    pub margin_mm: f32,
    pub font_size: f32,
}

impl PageLayout {
    pub fn a4(margin_mm: f32, font_size: f32) -> Self {
        Self {
            width_mm: A4_WIDTH_MM,
            height_mm: A4_HEIGHT_MM,
            margin_mm,
            font_size,
        }
    }

    fn chars_per_line(&self, size: f32, indent_mm: f32) -> usize {
        let usable = self.width_mm - 2.0 * self.margin_mm - indent_mm;
        let glyph = size * AVG_GLYPH_WIDTH * PT_TO_MM;
        // Float-to-int casts saturate (NaN becomes 0), so the clamp bounds every input.
        ((usable / glyph).floor() as usize).clamp(MIN_CHARS_PER_LINE, MAX_CHARS_PER_LINE)
    }
}

impl From<&ExportConfig> for PageLayout {
    fn from(config: &ExportConfig) -> Self {
        PageLayout::a4(config.margin_mm, config.font_size)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub text: String,
    pub size: f32,
    pub bold: bool,
    pub indent_mm: f32,
    pub gap_before_mm: f32,
}

/// Word-wraps blocks into printable lines for the given layout.
pub fn lay_out(blocks: &[Block], layout: &PageLayout) -> Vec<Line> {
    let mut lines = Vec::new();
    for block in blocks {
        let (size, bold, indent_mm, prefix) = match block {
            Block::Heading(level, _) => {
                let bump = match level {
                    1 => 8.0,
                    2 => 5.0,
                    3 => 3.0,
                    _ => 1.0,
                };
                (layout.font_size + bump, true, 0.0, "")
            }
            Block::Paragraph(_) => (layout.font_size, false, 0.0, ""),
            Block::ListItem(_) => (layout.font_size, false, 5.0, "- "),
            Block::Rule => {
                lines.push(Line {
                    text: "_".repeat(layout.chars_per_line(layout.font_size, 0.0) / 2),
                    size: layout.font_size,
                    bold: false,
                    indent_mm: 0.0,
                    gap_before_mm: 2.0,
                });
                continue;
            }
        };

        let width = layout.chars_per_line(size, indent_mm);
        let text = format!("{prefix}{}", block.text());
        for (i, wrapped) in wrap(&text, width).into_iter().enumerate() {
            lines.push(Line {
                text: wrapped,
                size,
                bold,
                indent_mm,
                gap_before_mm: if i == 0 { size * 0.5 * PT_TO_MM } else { 0.0 },
            });
        }
    }
    lines
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word = word;
        // Hard-split words longer than a whole line.
        while word.chars().count() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let split = word
                .char_indices()
                .nth(width)
                .map_or(word.len(), |(idx, _)| idx);
            lines.push(word[..split].to_string());
            word = &word[split..];
        }
        if word.is_empty() {
            continue;
        }
        let needed = current.chars().count() + word.chars().count() + usize::from(!current.is_empty());
        if needed > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn pdf_error(e: impl std::fmt::Display) -> ExportError {
    ExportError::Pdf(e.to_string())
}

/// Renders the blocks to a paginated PDF and returns its bytes.
pub fn render_pdf(blocks: &[Block], layout: &PageLayout, title: &str) -> Result<Vec<u8>, ExportError> {
    let (doc, page, layer) = PdfDocument::new(
        title,
        Mm(layout.width_mm),
        Mm(layout.height_mm),
        "content",
    );
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(pdf_error)?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(pdf_error)?;

    let top = layout.height_mm - layout.margin_mm;
    let mut current = doc.get_page(page).get_layer(layer);
    let mut y = top;
    let mut pages = 1;

    for line in lay_out(blocks, layout) {
        let advance = line.gap_before_mm + line.size * LINE_SPACING * PT_TO_MM;
        if y - advance < layout.margin_mm && y < top {
            let (page, layer) = doc.add_page(Mm(layout.width_mm), Mm(layout.height_mm), "content");
            current = doc.get_page(page).get_layer(layer);
            y = top;
            pages += 1;
        }
        y -= advance;
        let font: &IndirectFontRef = if line.bold { &bold } else { &regular };
        current.use_text(
            line.text,
            line.size,
            Mm(layout.margin_mm + line.indent_mm),
            Mm(y),
            font,
        );
    }

    let bytes = doc.save_to_bytes().map_err(pdf_error)?;
    info!("Rendered PDF: {} page(s), {} bytes", pages, bytes.len());
    Ok(bytes)
}

/// Allows one export at a time. The ticket releases the guard when dropped,
/// whichever way the export ends.
#[derive(Clone, Default)]
pub struct ExportGuard {
    running: Arc<AtomicBool>,
}

pub struct ExportTicket {
    running: Arc<AtomicBool>,
}

impl ExportGuard {
    pub fn try_begin(&self) -> Option<ExportTicket> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ExportTicket {
                running: Arc::clone(&self.running),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for ExportTicket {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
pub struct ExportOutcome {
    pub result: Result<PathBuf, ExportError>,
}

/// Runs PDF exports of the displayed markup on a worker thread.
pub struct Exporter {
    guard: ExportGuard,
    layout: PageLayout,
    sender: Sender<ExportOutcome>,
}

impl Exporter {
    pub fn new(layout: PageLayout, sender: Sender<ExportOutcome>) -> Self {
        Self {
            guard: ExportGuard::default(),
            layout,
            sender,
        }
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_running()
    }

    pub fn guard(&self) -> &ExportGuard {
        &self.guard
    }

    /// Starts writing `markup` as a PDF to `destination`. Refused while a
    /// previous export is still running.
    pub fn start(&self, markup: &str, destination: PathBuf) -> Result<(), ExportError> {
        let blocks = flatten(markup);
        if blocks.is_empty() {
            return Err(ExportError::NothingToExport);
        }
        let ticket = self.guard.try_begin().ok_or(ExportError::AlreadyRunning)?;
        let layout = self.layout.clone();
        let sender = self.sender.clone();

        std::thread::spawn(move || {
            let result = render_pdf(&blocks, &layout, "Image analysis").and_then(|bytes| {
                fs::write(&destination, bytes).map_err(|source| ExportError::Io {
                    path: destination.clone(),
                    source,
                })?;
                Ok(destination)
            });
            match &result {
                Ok(path) => info!("Exported PDF to {}", path.display()),
                Err(e) => error!("PDF export failed: {}", e),
            }
            drop(ticket);
            let _ = sender.send(ExportOutcome { result });
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use std::time::Duration;

    #[test]
    fn wrap_respects_width() {
        let lines = wrap("the quick brown fox jumps over the lazy dog", 10);
        assert_eq!(
            lines,
            vec!["the quick", "brown fox", "jumps over", "the lazy", "dog"]
        );
    }

    #[test]
    fn degenerate_layout_keeps_rules_bounded() {
        for font_size in [0.0, 1e-9, f32::NAN, -3.0] {
            let layout = PageLayout::a4(10.0, font_size);
            let lines = lay_out(&[Block::Rule], &layout);
            assert_eq!(lines.len(), 1);
            assert!(lines[0].text.len() <= MAX_CHARS_PER_LINE / 2);
        }
        let wide = PageLayout::a4(-1e30, 11.0);
        assert_eq!(wide.chars_per_line(11.0, 0.0), MAX_CHARS_PER_LINE);
    }

    #[test]
    fn wrap_splits_long_words() {
        assert_eq!(wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn headings_are_bold_and_larger() {
        let layout = PageLayout::a4(10.0, 11.0);
        let lines = lay_out(
            &[
                Block::Heading(1, "Title".into()),
                Block::ListItem("point".into()),
            ],
            &layout,
        );
        assert_eq!(lines.len(), 2);
        assert!(lines[0].bold);
        assert!(lines[0].size > layout.font_size);
        assert_eq!(lines[1].text, "- point");
        assert_eq!(lines[1].indent_mm, 5.0);
    }

    #[test]
    fn long_documents_paginate() {
        let layout = PageLayout::a4(10.0, 11.0);
        let blocks: Vec<Block> = (0..200)
            .map(|i| Block::Paragraph(format!("paragraph number {i}")))
            .collect();
        let bytes = render_pdf(&blocks, &layout, "test").unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        let single = render_pdf(&blocks[..1], &layout, "test").unwrap();
        assert!(bytes.len() > single.len());
    }

    #[test]
    fn guard_allows_one_export_at_a_time() {
        let guard = ExportGuard::default();
        let ticket = guard.try_begin().expect("first export starts");
        assert!(guard.is_running());
        assert!(guard.try_begin().is_none());
        drop(ticket);
        assert!(!guard.is_running());
        assert!(guard.try_begin().is_some());
    }

    #[test]
    fn second_start_is_refused_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = channel();
        let exporter = Exporter::new(PageLayout::a4(10.0, 11.0), tx);

        let in_flight = exporter.guard().try_begin().unwrap();
        let blocked = dir.path().join("blocked.pdf");
        assert!(matches!(
            exporter.start("<p>ok</p>", blocked.clone()),
            Err(ExportError::AlreadyRunning)
        ));
        assert!(!blocked.exists());
        drop(in_flight);

        let target = dir.path().join("analyse-image.pdf");
        exporter.start("<p>ok</p>", target.clone()).unwrap();
        let outcome = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(outcome.result.unwrap(), target);
        assert!(fs::read(&target).unwrap().starts_with(b"%PDF"));
        assert!(!exporter.is_running());
    }

    #[test]
    fn failed_export_releases_the_guard() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = channel();
        let exporter = Exporter::new(PageLayout::a4(10.0, 11.0), tx);

        let target = dir.path().join("missing-dir").join("out.pdf");
        exporter.start("<p>ok</p>", target).unwrap();
        let outcome = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(matches!(outcome.result, Err(ExportError::Io { .. })));
        assert!(!exporter.is_running());
        assert!(exporter.guard().try_begin().is_some());
    }

    #[test]
    fn empty_markup_is_not_exported() {
        let (tx, _rx) = channel();
        let exporter = Exporter::new(PageLayout::a4(10.0, 11.0), tx);
        assert!(matches!(
            exporter.start("<script>x</script>", PathBuf::from("unused.pdf")),
            Err(ExportError::NothingToExport)
        ));
        assert!(!exporter.is_running());
    }
}
