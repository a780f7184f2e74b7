pub mod classify;
mod preview;
mod submitter;
mod types;

pub use preview::{generate_preview, spawn_preview, Preview};
pub use submitter::{build_policy, SubmissionPolicy};
pub use types::{
    spawn_load, Notification, NotificationKind, ResponsePayload, SelectedFile,
    SubmissionRequest,
};

#[cfg(test)]
pub(crate) use preview::tests::png_file;
#[cfg(test)]
pub(crate) use submitter::tests::webhook_config;
