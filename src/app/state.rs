use crate::error::{SessionError, SubmitError};
use crate::upload::{
    spawn_preview, Notification, Preview, ResponsePayload, SelectedFile, SubmissionPolicy,
    SubmissionRequest,
};
use std::collections::VecDeque;
use std::fmt;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

const SUCCESS_MESSAGE: &str = "Your image was analysed successfully.";
const FAILURE_MESSAGE: &str = "Something went wrong while analysing the image.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    PreviewReady,
    Submitting,
    ResultReady,
    Failed,
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::PreviewReady => "ready to submit",
            SessionState::Submitting => "submitting",
            SessionState::ResultReady => "showing a result",
            SessionState::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Results of background work, tagged with the selection they belong to.
#[derive(Debug)]
pub enum SessionEvent {
    PreviewDecoded {
        selection: u64,
        preview: Preview,
    },
    Submitted {
        selection: u64,
        result: Result<ResponsePayload, SubmitError>,
    },
}

/// Owns one upload cycle: the picked file, its preview, the in-flight
/// submission and the classified result.
pub struct UploadSession {
    state: SessionState,
    file: Option<SelectedFile>,
    preview: Option<Preview>,
    payload: Option<ResponsePayload>,
    selection: u64,
    in_flight: Option<u64>,
    pending_previews: usize,
    policy: Arc<dyn SubmissionPolicy>,
    notifications: VecDeque<Notification>,
    sender: Sender<SessionEvent>,
    receiver: Receiver<SessionEvent>,
}

impl UploadSession {
    pub fn new(policy: Arc<dyn SubmissionPolicy>) -> Self {
        let (sender, receiver) = channel();
        debug!("Upload session using {} policy", policy.name());
        Self {
            state: SessionState::Idle,
            file: None,
            preview: None,
            payload: None,
            selection: 0,
            in_flight: None,
            pending_previews: 0,
            policy,
            notifications: VecDeque::new(),
            sender,
            receiver,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn selected_file(&self) -> Option<&SelectedFile> {
        self.file.as_ref()
    }

    pub fn preview(&self) -> Option<&Preview> {
        self.preview.as_ref()
    }

    pub fn payload(&self) -> Option<&ResponsePayload> {
        self.payload.as_ref()
    }

    /// Identifies the current selection; changes every time a file is picked.
    pub fn selection_id(&self) -> u64 {
        self.selection
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    pub fn can_submit(&self) -> bool {
        self.state == SessionState::PreviewReady && self.file.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some() || self.pending_previews > 0
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        self.notifications.drain(..).collect()
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session: {} -> {}", self.state, next);
        self.state = next;
    }

    fn reject(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            from: self.state.label(),
            action,
        }
    }

    /// Replaces the current file and starts decoding its preview. Any preview
    /// still decoding for an earlier file is discarded when it arrives.
    pub fn select_file(&mut self, file: SelectedFile) -> Result<(), SessionError> {
        match self.state {
            SessionState::Idle | SessionState::PreviewReady | SessionState::Failed => {}
            _ => return Err(self.reject("select a file")),
        }

        self.selection += 1;
        debug!(
            "Selected {} ({}, {} bytes) as selection {}",
            file.name,
            file.mime_type,
            file.size(),
            self.selection
        );

        self.pending_previews += 1;
        spawn_preview(
            file.clone(),
            self.selection,
            self.sender.clone(),
            |selection, preview| SessionEvent::PreviewDecoded { selection, preview },
        );

        self.file = Some(file);
        self.preview = Some(Preview::Pending);
        self.payload = None;
        self.transition(SessionState::PreviewReady);
        Ok(())
    }

    /// Sends the current file through the configured policy. At most one
    /// submission is ever in flight; nothing is queued.
    pub fn submit(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Idle => return Err(SessionError::NoFileSelected),
            SessionState::PreviewReady => {}
            _ => return Err(self.reject("submit")),
        }
        let file = self.file.clone().ok_or(SessionError::NoFileSelected)?;

        let selection = self.selection;
        self.in_flight = Some(selection);
        self.transition(SessionState::Submitting);

        let policy = Arc::clone(&self.policy);
        let sender = self.sender.clone();
        let request = SubmissionRequest { file };

        std::thread::spawn(move || {
            let result = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt.block_on(policy.submit(request)),
                Err(e) => Err(SubmitError::Transport(format!(
                    "could not start async runtime: {e}"
                ))),
            };
            let _ = sender.send(SessionEvent::Submitted { selection, result });
        });
        Ok(())
    }

    /// Dismisses the result and clears file, preview and payload together.
    pub fn close_result(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::ResultReady {
            return Err(self.reject("close the result"));
        }
        self.clear();
        Ok(())
    }

    /// Leaves `Failed` keeping the file and preview so it can be resubmitted.
    pub fn retry(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Failed {
            return Err(self.reject("retry"));
        }
        if self.file.is_none() {
            return Err(SessionError::NoFileSelected);
        }
        self.transition(SessionState::PreviewReady);
        Ok(())
    }

    /// Empties the form without submitting.
    pub fn reset(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Idle | SessionState::PreviewReady | SessionState::Failed => {
                self.clear();
                Ok(())
            }
            _ => Err(self.reject("reset")),
        }
    }

    fn clear(&mut self) {
        self.file = None;
        self.preview = None;
        self.payload = None;
        self.transition(SessionState::Idle);
    }

    /// Applies every finished background result. Returns whether anything
    /// arrived.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(event) = self.receiver.try_recv() {
            self.apply(event);
            changed = true;
        }
        changed
    }

    /// Blocks until no preview or submission is outstanding, or `timeout`
    /// elapses. Returns whether the session settled.
    pub fn wait_settled(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_busy() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(event) => self.apply(event),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return false
                }
            }
        }
        self.poll();
        true
    }

    pub(crate) fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::PreviewDecoded { selection, preview } => {
                self.pending_previews = self.pending_previews.saturating_sub(1);
                if selection != self.selection || self.file.is_none() {
                    debug!(
                        "Discarding stale preview for selection {} (current {})",
                        selection, self.selection
                    );
                    return;
                }
                self.preview = Some(preview);
            }
            SessionEvent::Submitted { selection, result } => {
                if self.in_flight != Some(selection) {
                    warn!("Ignoring submission result for selection {}", selection);
                    return;
                }
                self.in_flight = None;
                match result {
                    Ok(payload) => {
                        debug!("Received {} payload", payload.kind());
                        self.payload = Some(payload);
                        self.notifications
                            .push_back(Notification::success(SUCCESS_MESSAGE));
                        self.transition(SessionState::ResultReady);
                    }
                    Err(e) => {
                        if e.is_protocol() {
                            warn!("Endpoint answered with an unusable body: {}", e);
                        } else {
                            error!("Upload error: {}", e);
                        }
                        self.payload = None;
                        self.notifications
                            .push_back(Notification::failure(FAILURE_MESSAGE));
                        self.transition(SessionState::Failed);
                    }
                }
            }
        }
    }
}
