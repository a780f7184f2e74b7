use derivative::Derivative;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use tracing::debug;

/// Files above this size are refused before any bytes are read.
pub const MAX_FILE_BYTES: u64 = 25 * 1024 * 1024;

/// The file picked by the user. Cheap to clone: the bytes are shared.
#[derive(Derivative, Clone)]
#[derivative(Debug, PartialEq)]
pub struct SelectedFile {
    pub name: String,
    pub mime_type: String,
    pub path: Option<PathBuf>,
    #[derivative(Debug = "ignore", PartialEq = "ignore")]
    pub bytes: Arc<Vec<u8>>,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            path: None,
            bytes: Arc::new(bytes),
        }
    }

    pub fn from_path(path: &Path) -> io::Result<Self> {
        Self::from_path_limited(path, MAX_FILE_BYTES)
    }

    pub fn from_path_limited(path: &Path, max_bytes: u64) -> io::Result<Self> {
        let len = fs::metadata(path)?.len();
        if len > max_bytes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("file is {len} bytes, the limit is {max_bytes}"),
            ));
        }
        let bytes = fs::read(path)?;
        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        Ok(Self {
            mime_type: mime_from_path(path),
            name,
            path: Some(path.to_path_buf()),
            bytes: Arc::new(bytes),
        })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Lower-cased extension of the original file name, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .map(str::to_lowercase)
    }
}

/// Reads `path` on a worker thread so large files never stall the UI.
pub fn spawn_load<T, F>(path: PathBuf, sender: Sender<T>, wrap: F)
where
    T: Send + 'static,
    F: FnOnce(PathBuf, io::Result<SelectedFile>) -> T + Send + 'static,
{
    std::thread::spawn(move || {
        let result = SelectedFile::from_path(&path);
        if let Err(e) = &result {
            debug!("Could not load {}: {}", path.display(), e);
        }
        let _ = sender.send(wrap(path, result));
    });
}

pub fn mime_from_path(path: &Path) -> String {
    image::ImageFormat::from_path(path)
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| "application/octet-stream".to_string())
}

/// One submission: built at submit time and handed to the policy by value.
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    pub file: SelectedFile,
}

/// A classified endpoint response. Decided once, at the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    Markup(String),
    Tabular(Vec<(String, serde_json::Value)>),
}

impl ResponsePayload {
    pub fn kind(&self) -> &'static str {
        match self {
            ResponsePayload::Markup(_) => "markup",
            ResponsePayload::Tabular(_) => "tabular",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Success,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Failure,
            message: message.into(),
        }
    }
}
