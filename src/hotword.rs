//! Hotword detector control seam
//!
//! An always-on wake-word listener runs outside this core and shares the
//! microphone with it. The coordinator pauses it before listening and
//! resumes it when the conversation returns to idle. Both signals are
//! fire-and-forget; redundant resumes are harmless.

use async_trait::async_trait;

/// Pause/resume control over the external hotword detector
#[async_trait]
pub trait HotwordControl: Send + Sync {
    /// Ask the detector to release the microphone
    async fn pause(&self);

    /// Ask the detector to resume listening for its wake word
    async fn resume(&self);
}

/// No-op control for deployments without a hotword detector
pub struct NoopHotword;

#[async_trait]
impl HotwordControl for NoopHotword {
    async fn pause(&self) {}

    async fn resume(&self) {}
}
