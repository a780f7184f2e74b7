use crate::error::PreviewError;
use crate::upload::types::SelectedFile;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use derivative::Derivative;
use std::sync::mpsc::Sender;
use tracing::debug;

/// Longest side of the decoded preview, in pixels. Display only.
pub const MAX_PREVIEW_SIDE: u32 = 1024;

#[derive(Derivative, Clone)]
#[derivative(Debug, PartialEq)]
pub struct PreviewImage {
    pub data_uri: String,
    pub width: u32,
    pub height: u32,
    #[derivative(Debug = "ignore")]
    pub rgba: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Preview {
    Pending,
    Ready(PreviewImage),
    Unavailable(String),
}

impl Preview {
    pub fn is_pending(&self) -> bool {
        matches!(self, Preview::Pending)
    }
}

/// Encodes `file` as a data URI and decodes its pixels for display.
/// Purely local; the same file always yields the same preview.
pub fn generate_preview(file: &SelectedFile) -> Result<PreviewImage, PreviewError> {
    let data_uri = format!(
        "data:{};base64,{}",
        file.mime_type,
        STANDARD.encode(file.bytes.as_slice())
    );

    let decoded = image::load_from_memory(&file.bytes)?;
    let decoded = if decoded.width() > MAX_PREVIEW_SIDE || decoded.height() > MAX_PREVIEW_SIDE {
        decoded.thumbnail(MAX_PREVIEW_SIDE, MAX_PREVIEW_SIDE)
    } else {
        decoded
    };
    let rgba = decoded.to_rgba8();
    debug!(
        "Decoded preview for {} ({}x{})",
        file.name,
        rgba.width(),
        rgba.height()
    );

    Ok(PreviewImage {
        data_uri,
        width: rgba.width(),
        height: rgba.height(),
        rgba: rgba.into_raw(),
    })
}

/// Decodes on a worker thread and reports `(selection, preview)` through
/// `sender`. The receiver decides whether the result is still current.
pub fn spawn_preview<T, F>(file: SelectedFile, selection: u64, sender: Sender<T>, wrap: F)
where
    T: Send + 'static,
    F: FnOnce(u64, Preview) -> T + Send + 'static,
{
    std::thread::spawn(move || {
        let preview = match generate_preview(&file) {
            Ok(image) => Preview::Ready(image),
            Err(e) => {
                debug!("No preview for {}: {}", file.name, e);
                Preview::Unavailable(e.to_string())
            }
        };
        let _ = sender.send(wrap(selection, preview));
    });
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    pub(crate) fn png_file(name: &str, width: u32, height: u32, color: [u8; 4]) -> SelectedFile {
        let img = RgbaImage::from_pixel(width, height, Rgba(color));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .expect("encode png");
        SelectedFile::new(name, "image/png", buf)
    }

    #[test]
    fn preview_is_idempotent() {
        let file = png_file("red.png", 4, 3, [255, 0, 0, 255]);
        let first = generate_preview(&file).unwrap();
        let second = generate_preview(&file).unwrap();
        assert_eq!(first, second);
        assert_eq!((first.width, first.height), (4, 3));
        assert_eq!(&first.rgba[..4], &[255, 0, 0, 255]);
    }

    #[test]
    fn data_uri_carries_mime_and_bytes() {
        let file = png_file("blue.png", 2, 2, [0, 0, 255, 255]);
        let preview = generate_preview(&file).unwrap();
        let prefix = "data:image/png;base64,";
        assert!(preview.data_uri.starts_with(prefix));
        let decoded = STANDARD.decode(&preview.data_uri[prefix.len()..]).unwrap();
        assert_eq!(decoded, *file.bytes);
    }

    #[test]
    fn large_images_are_downscaled() {
        let file = png_file("wide.png", 2048, 512, [0, 255, 0, 255]);
        let preview = generate_preview(&file).unwrap();
        assert_eq!(preview.width, MAX_PREVIEW_SIDE);
        assert_eq!(preview.height, 256);
    }

    #[test]
    fn undecodable_bytes_fail() {
        let file = SelectedFile::new("broken.png", "image/png", b"garbage".to_vec());
        assert!(matches!(
            generate_preview(&file),
            Err(PreviewError::Decode(_))
        ));
    }

    #[test]
    fn spawned_preview_reports_selection() {
        let (tx, rx) = std::sync::mpsc::channel();
        let file = png_file("dot.png", 1, 1, [0, 0, 0, 255]);
        spawn_preview(file, 7, tx, |selection, preview| (selection, preview));
        let (selection, preview) = rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .unwrap();
        assert_eq!(selection, 7);
        assert!(matches!(preview, Preview::Ready(_)));
    }
}
