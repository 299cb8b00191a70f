//! Progress reporting and cancellation.
//!
//! The bake calls [`BakeProgress::step`] between stages and every few
//! rows inside long stages. Returning `true` from it cancels the bake,
//! which then fails with [`crate::Error::Cancelled`].

use std::sync::atomic::{self, AtomicBool};
use std::sync::Arc;

/// Receives bake progress; may cancel.
pub trait BakeProgress {
    /// Report `fraction` (0..=1) of `stage`. Return `true` to cancel.
    fn step(&mut self, stage: &str, fraction: f32) -> bool;

    /// Called once when the bake finishes, successfully or not.
    fn end(&mut self) {}
}

/// Ignores progress, never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl BakeProgress for NullProgress {
    fn step(&mut self, _stage: &str, _fraction: f32) -> bool {
        false
    }
}

/// Shared flag another thread raises to stop a bake.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(atomic::Ordering::SeqCst)
    }

    /// Raise the flag. The bake stops at its next progress step.
    pub fn cancel(&self) {
        self.0.store(true, atomic::Ordering::SeqCst);
    }
}

impl BakeProgress for CancellationToken {
    fn step(&mut self, _stage: &str, _fraction: f32) -> bool {
        self.is_cancelled()
    }
}

/// Logs stage changes and every tenth of a stage with `tracing`.
#[derive(Debug, Default)]
pub struct LogProgress {
    stage: String,
    last_tenth: i32,
    token: Option<CancellationToken>,
}

impl LogProgress {
    pub fn new() -> Self {
        Self {
            last_tenth: -1,
            ..Default::default()
        }
    }

    /// Also cancel when `token` is raised.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token: Some(token),
            ..Self::new()
        }
    }
}

impl BakeProgress for LogProgress {
    fn step(&mut self, stage: &str, fraction: f32) -> bool {
        if stage != self.stage {
            self.stage = stage.to_string();
            self.last_tenth = -1;
            tracing::info!(stage, "bake stage");
        }
        let tenth = (fraction.clamp(0.0, 1.0) * 10.0) as i32;
        if tenth > self.last_tenth {
            self.last_tenth = tenth;
            tracing::debug!(stage, percent = tenth * 10, "progress");
        }
        self.token.as_ref().is_some_and(|t| t.is_cancelled())
    }

    fn end(&mut self) {
        tracing::debug!("bake progress ended");
    }
}
