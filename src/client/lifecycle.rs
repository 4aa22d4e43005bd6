//! Client-side lifecycle of a single generation submission.
//!
//! [`Lifecycle`] is a plain state machine: feed it one [`Event`] at a time
//! and execute the [`Command`]s it hands back. It never touches the network
//! or a clock, which is what [`super::session::GenerationSession`] is for.
//!
//! ```text
//! Idle ──Submit──▶ Submitting(1) ──ok──▶ Succeeded
//!                     │  ▲
//!               error │  │ TimerFired
//!                     ▼  │
//!               WaitingToRetry(n) ──(attempt == max)──▶ Failed
//!
//! AbortRequested while Submitting/WaitingToRetry ──▶ Aborted
//! ResetRequested from anywhere                    ──▶ Idle
//! ```

use std::time::Duration;

use bytes::Bytes;

use super::api::RequestFailure;
use crate::generations::Generation;
use crate::validators::Style;

pub const MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);

pub const STATUS_GENERATING: &str = "Generating image...";
pub const STATUS_RETRY_OVERLOADED: &str = "Model overloaded. Retrying...";
pub const STATUS_RETRY_TRANSIENT: &str = "Temporary issue. Retrying...";
pub const ERROR_NO_IMAGE: &str = "Please upload an image before generating.";
pub const ERROR_OVERLOADED: &str = "Model overloaded. Please try again.";
pub const ERROR_CANCELLED: &str = "Generation cancelled";

/// A locally selected image file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// Everything one attempt sends; captured at submit time so retries resend
/// the same form even if the inputs change meanwhile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationUpload {
    pub prompt: String,
    pub style: String,
    pub image: ImageFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Submitting { attempt: u32 },
    WaitingToRetry { next_attempt: u32 },
    Succeeded,
    Aborted,
    Failed,
}

#[derive(Debug, Clone)]
pub enum Event {
    SelectImage(ImageFile),
    ClearImage,
    SetPrompt(String),
    SetStyle(String),
    Submit,
    Response {
        request: u64,
        outcome: Result<Generation, RequestFailure>,
    },
    TimerFired {
        request: u64,
    },
    AbortRequested,
    ResetRequested,
    HistoryLoaded(Vec<Generation>),
    /// Restore a past generation: its prompt and style become the inputs
    /// and it becomes the displayed result.
    SelectHistoryItem(Generation),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send {
        request: u64,
        attempt: u32,
        upload: GenerationUpload,
    },
    ScheduleRetry {
        request: u64,
        delay: Duration,
    },
    Cancel {
        request: u64,
    },
    RefreshHistory,
}

#[derive(Debug, Clone)]
pub struct Lifecycle {
    phase: Phase,
    request: u64,
    pending: Option<GenerationUpload>,
    image: Option<ImageFile>,
    prompt: String,
    style: String,
    loading: bool,
    status: Option<String>,
    error: Option<String>,
    result: Option<Generation>,
    history: Vec<Generation>,
    max_attempts: u32,
    backoff_base: Duration,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::with_backoff(DEFAULT_BACKOFF_BASE)
    }

    pub fn with_backoff(backoff_base: Duration) -> Self {
        Self {
            phase: Phase::Idle,
            request: 0,
            pending: None,
            image: None,
            prompt: String::new(),
            style: Style::default().as_str().to_string(),
            loading: false,
            status: None,
            error: None,
            result: None,
            history: Vec::new(),
            max_attempts: MAX_ATTEMPTS,
            backoff_base,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    /// Whether the abort control should be enabled.
    pub fn can_abort(&self) -> bool {
        self.in_flight()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn result(&self) -> Option<&Generation> {
        self.result.as_ref()
    }

    pub fn history(&self) -> &[Generation] {
        &self.history
    }

    pub fn image(&self) -> Option<&ImageFile> {
        self.image.as_ref()
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn style(&self) -> &str {
        &self.style
    }

    /// True while `request` is the submission still being worked on.
    pub fn is_active(&self, request: u64) -> bool {
        request == self.request && self.in_flight()
    }

    fn in_flight(&self) -> bool {
        matches!(
            self.phase,
            Phase::Submitting { .. } | Phase::WaitingToRetry { .. }
        )
    }

    pub fn handle(&mut self, event: Event) -> Vec<Command> {
        match event {
            Event::SelectImage(image) => {
                self.image = Some(image);
                if self.error.as_deref() == Some(ERROR_NO_IMAGE) {
                    self.error = None;
                }
                Vec::new()
            }
            Event::ClearImage => {
                self.image = None;
                Vec::new()
            }
            Event::SetPrompt(prompt) => {
                self.prompt = prompt;
                Vec::new()
            }
            Event::SetStyle(style) => {
                self.style = style;
                Vec::new()
            }
            Event::Submit => self.submit(),
            Event::Response { request, outcome } => self.response(request, outcome),
            Event::TimerFired { request } => self.timer_fired(request),
            Event::AbortRequested => self.abort(),
            Event::ResetRequested => self.reset(),
            Event::HistoryLoaded(items) => {
                self.history = items.into_iter().map(normalize).collect();
                Vec::new()
            }
            Event::SelectHistoryItem(item) => {
                self.prompt = item.prompt.clone();
                self.style = item.style.clone();
                self.result = Some(normalize(item));
                Vec::new()
            }
        }
    }

    fn submit(&mut self) -> Vec<Command> {
        let Some(image) = self.image.clone() else {
            self.error = Some(ERROR_NO_IMAGE.to_string());
            return Vec::new();
        };

        let mut commands = Vec::new();
        if self.in_flight() {
            commands.push(Command::Cancel {
                request: self.request,
            });
        }

        let upload = GenerationUpload {
            prompt: self.prompt.clone(),
            style: self.style.clone(),
            image,
        };
        self.request += 1;
        self.phase = Phase::Submitting { attempt: 1 };
        self.pending = Some(upload.clone());
        self.loading = true;
        self.error = None;
        self.result = None;
        self.status = Some(STATUS_GENERATING.to_string());

        commands.push(Command::Send {
            request: self.request,
            attempt: 1,
            upload,
        });
        commands
    }

    fn response(&mut self, request: u64, outcome: Result<Generation, RequestFailure>) -> Vec<Command> {
        let Phase::Submitting { attempt } = self.phase else {
            return Vec::new();
        };
        if request != self.request {
            return Vec::new();
        }

        match outcome {
            Ok(generation) => {
                self.phase = Phase::Succeeded;
                self.result = Some(normalize(generation));
                self.finish();
                vec![Command::RefreshHistory]
            }
            Err(failure) if attempt < self.max_attempts => {
                self.phase = Phase::WaitingToRetry {
                    next_attempt: attempt + 1,
                };
                self.status = Some(
                    if failure.is_overload() {
                        STATUS_RETRY_OVERLOADED
                    } else {
                        STATUS_RETRY_TRANSIENT
                    }
                    .to_string(),
                );
                vec![Command::ScheduleRetry {
                    request,
                    delay: self.backoff_base * attempt,
                }]
            }
            Err(failure) => {
                self.phase = Phase::Failed;
                self.error = Some(if failure.is_overload() {
                    ERROR_OVERLOADED.to_string()
                } else {
                    failure.message
                });
                self.finish();
                Vec::new()
            }
        }
    }

    fn timer_fired(&mut self, request: u64) -> Vec<Command> {
        let Phase::WaitingToRetry { next_attempt } = self.phase else {
            return Vec::new();
        };
        if request != self.request {
            return Vec::new();
        }
        let Some(upload) = self.pending.clone() else {
            return Vec::new();
        };

        self.phase = Phase::Submitting {
            attempt: next_attempt,
        };
        self.status = Some(format!(
            "Retrying ({}/{})...",
            next_attempt, self.max_attempts
        ));
        vec![Command::Send {
            request,
            attempt: next_attempt,
            upload,
        }]
    }

    fn abort(&mut self) -> Vec<Command> {
        if !self.in_flight() {
            return Vec::new();
        }
        self.phase = Phase::Aborted;
        self.result = None;
        self.error = Some(ERROR_CANCELLED.to_string());
        self.finish();
        vec![Command::Cancel {
            request: self.request,
        }]
    }

    /// Clears every input and outcome. Unlike abort, no cancellation message
    /// is left behind.
    fn reset(&mut self) -> Vec<Command> {
        let commands = if self.in_flight() {
            vec![Command::Cancel {
                request: self.request,
            }]
        } else {
            Vec::new()
        };
        self.phase = Phase::Idle;
        self.image = None;
        self.prompt.clear();
        self.style = Style::default().as_str().to_string();
        self.result = None;
        self.error = None;
        self.finish();
        commands
    }

    fn finish(&mut self) {
        self.loading = false;
        self.status = None;
        self.pending = None;
    }
}

fn normalize(mut g: Generation) -> Generation {
    g.image_url = g.image_url.replace('\\', "/");
    g
}
