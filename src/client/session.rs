use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::api::GenerationTransport;
use super::lifecycle::{Command, Event, ImageFile, Lifecycle, Phase};
use crate::generations::{services::MAX_HISTORY, Generation};

/// Runs a [`Lifecycle`] against a real transport and clock.
///
/// `generate` drives one submission to a terminal phase; `abort` and
/// `reset` may be called from another task while it runs and interrupt any
/// request or backoff sleep in progress.
pub struct GenerationSession<T> {
    transport: Arc<T>,
    lifecycle: Mutex<Lifecycle>,
    interrupt: Notify,
}

impl<T: GenerationTransport> GenerationSession<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self::with_lifecycle(transport, Lifecycle::new())
    }

    pub fn with_lifecycle(transport: Arc<T>, lifecycle: Lifecycle) -> Self {
        Self {
            transport,
            lifecycle: Mutex::new(lifecycle),
            interrupt: Notify::new(),
        }
    }

    /// Copy of the current view state.
    pub fn snapshot(&self) -> Lifecycle {
        self.lock().clone()
    }

    pub fn select_image(&self, image: ImageFile) {
        self.dispatch(Event::SelectImage(image));
    }

    pub fn clear_image(&self) {
        self.dispatch(Event::ClearImage);
    }

    pub fn set_prompt(&self, prompt: impl Into<String>) {
        self.dispatch(Event::SetPrompt(prompt.into()));
    }

    pub fn set_style(&self, style: impl Into<String>) {
        self.dispatch(Event::SetStyle(style.into()));
    }

    pub fn select_history_item(&self, item: Generation) {
        self.dispatch(Event::SelectHistoryItem(item));
    }

    /// Submit the current inputs and run retries until the submission
    /// succeeds, fails for good or is interrupted. Returns the phase it
    /// ended in.
    pub async fn generate(&self) -> Phase {
        let mut queue: VecDeque<Command> = self.dispatch(Event::Submit).into();

        while let Some(command) = queue.pop_front() {
            let next = match command {
                Command::Send {
                    request,
                    attempt,
                    upload,
                } => {
                    // registered before the check so an abort landing after it still wakes us
                    let interrupted = self.interrupt.notified();
                    tokio::pin!(interrupted);
                    interrupted.as_mut().enable();
                    if !self.is_active(request) {
                        continue;
                    }
                    debug!(request, attempt, "sending generation request");
                    tokio::select! {
                        outcome = self.transport.submit(&upload) => {
                            if let Err(failure) = &outcome {
                                warn!(request, attempt, status = ?failure.status, error = %failure, "generation attempt failed");
                            }
                            self.dispatch(Event::Response { request, outcome })
                        }
                        _ = interrupted => Vec::new(),
                    }
                }
                Command::ScheduleRetry { request, delay } => {
                    let interrupted = self.interrupt.notified();
                    tokio::pin!(interrupted);
                    interrupted.as_mut().enable();
                    if !self.is_active(request) {
                        continue;
                    }
                    debug!(request, delay_ms = delay.as_millis() as u64, "backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => self.dispatch(Event::TimerFired { request }),
                        _ = interrupted => Vec::new(),
                    }
                }
                Command::Cancel { request } => {
                    debug!(request, "cancelling superseded request");
                    self.interrupt.notify_waiters();
                    Vec::new()
                }
                Command::RefreshHistory => {
                    self.refresh_history().await;
                    Vec::new()
                }
            };
            queue.extend(next);
        }

        let phase = self.lock().phase();
        info!(?phase, "generation finished");
        phase
    }

    /// Stop the in-flight submission. No-op when nothing is running.
    pub fn abort(&self) {
        if !self.dispatch(Event::AbortRequested).is_empty() {
            self.interrupt.notify_waiters();
        }
    }

    pub fn reset(&self) {
        if !self.dispatch(Event::ResetRequested).is_empty() {
            self.interrupt.notify_waiters();
        }
    }

    /// Reload the recent list. Failures keep the previous list.
    pub async fn refresh_history(&self) {
        match self.transport.recent(MAX_HISTORY as u32).await {
            Ok(items) => {
                self.dispatch(Event::HistoryLoaded(items));
            }
            Err(e) => warn!(error = %e, "failed to refresh history"),
        }
    }

    fn is_active(&self, request: u64) -> bool {
        self.lock().is_active(request)
    }

    fn dispatch(&self, event: Event) -> Vec<Command> {
        self.lock().handle(event)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
