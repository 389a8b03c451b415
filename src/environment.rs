use async_trait::async_trait;
use nanoid::nanoid;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::action::Coordinates;
use crate::error::EnvironmentError;

/// Coordinate convention an environment expects for pointer primitives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoordinateSpace {
    /// Device pixels of the captured frame.
    Pixels,
    /// Fractions of the frame, both axes in `[0, 1]`.
    Normalized,
}

impl CoordinateSpace {
    /// Map `at` onto device pixels of a `width`×`height` surface.
    pub fn to_pixels(self, at: Coordinates, width: u32, height: u32) -> (f64, f64) {
        match self {
            CoordinateSpace::Pixels => (at.x, at.y),
            CoordinateSpace::Normalized => (
                at.x.clamp(0.0, 1.0) * width as f64,
                at.y.clamp(0.0, 1.0) * height as f64,
            ),
        }
    }
}

/// One still image of the surface.
#[derive(Clone, Debug)]
pub struct Frame {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub mime_type: String,
    /// Id of the capture this frame was taken from.
    pub capture_id: String,
}

impl Frame {
    pub fn extension(&self) -> &str {
        match self.mime_type.as_str() {
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            _ => "png",
        }
    }
}

/// Live capture of a surface, returned by [`Environment::start_capture`].
///
/// Clones share state: the surface-ended token fires for every clone, and
/// [`CaptureHandle::release`] reports `true` exactly once across all of them.
#[derive(Clone, Debug)]
pub struct CaptureHandle {
    id: String,
    ended: CancellationToken,
    released: Arc<AtomicBool>,
}

impl CaptureHandle {
    pub fn new() -> Self {
        Self::with_signal(CancellationToken::new())
    }

    /// Handle whose surface-ended signal is driven by `ended`.
    pub fn with_signal(ended: CancellationToken) -> Self {
        Self {
            id: nanoid!(10),
            ended,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Fires when the surface goes away on its own (closed target, revoked
    /// access), independent of anything the operator is doing.
    pub fn ended(&self) -> &CancellationToken {
        &self.ended
    }

    pub fn signal_ended(&self) {
        self.ended.cancel();
    }

    pub fn is_live(&self) -> bool {
        !self.ended.is_cancelled() && !self.is_released()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Marks the capture released. Returns `false` if it already was.
    pub fn release(&self) -> bool {
        !self.released.swap(true, Ordering::SeqCst)
    }

    /// `CaptureUnavailable` unless the handle is still live.
    pub fn ensure_live(&self) -> Result<(), EnvironmentError> {
        if self.is_released() {
            return Err(EnvironmentError::CaptureUnavailable(format!(
                "capture {} was released",
                self.id
            )));
        }
        if self.ended.is_cancelled() {
            return Err(EnvironmentError::CaptureUnavailable(format!(
                "surface for capture {} has ended",
                self.id
            )));
        }
        Ok(())
    }
}

impl Default for CaptureHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// The observed, controllable surface the operator acts on.
///
/// Pointer coordinates are in the space given by
/// [`Environment::coordinate_space`]. Every input primitive may fail with
/// `Unavailable` if the surface was torn down concurrently; `type_text` and
/// `press_key` fail with `InputRejected` when nothing accepts input focus.
#[async_trait]
pub trait Environment: Send + Sync {
    fn coordinate_space(&self) -> CoordinateSpace;

    async fn start_capture(&self) -> Result<CaptureHandle, EnvironmentError>;

    async fn capture_frame(&self, handle: &CaptureHandle) -> Result<Frame, EnvironmentError>;

    async fn pointer_click(&self, at: Coordinates) -> Result<(), EnvironmentError>;

    async fn pointer_move(&self, at: Coordinates) -> Result<(), EnvironmentError>;

    /// Wheel scroll at `at`; positive `delta_y` scrolls down.
    async fn pointer_scroll(&self, at: Coordinates, delta_y: i32) -> Result<(), EnvironmentError>;

    async fn type_text(&self, text: &str) -> Result<(), EnvironmentError>;

    async fn press_key(&self, name: &str) -> Result<(), EnvironmentError>;

    async fn wait(&self, duration: Duration) -> Result<(), EnvironmentError> {
        tokio::time::sleep(duration).await;
        Ok(())
    }

    /// Releases the capture. Safe to call any number of times.
    async fn stop_capture(&self, handle: &CaptureHandle) -> Result<(), EnvironmentError>;
}

#[async_trait]
impl<E: Environment + ?Sized> Environment for Arc<E> {
    fn coordinate_space(&self) -> CoordinateSpace {
        (**self).coordinate_space()
    }

    async fn start_capture(&self) -> Result<CaptureHandle, EnvironmentError> {
        (**self).start_capture().await
    }

    async fn capture_frame(&self, handle: &CaptureHandle) -> Result<Frame, EnvironmentError> {
        (**self).capture_frame(handle).await
    }

    async fn pointer_click(&self, at: Coordinates) -> Result<(), EnvironmentError> {
        (**self).pointer_click(at).await
    }

    async fn pointer_move(&self, at: Coordinates) -> Result<(), EnvironmentError> {
        (**self).pointer_move(at).await
    }

    async fn pointer_scroll(&self, at: Coordinates, delta_y: i32) -> Result<(), EnvironmentError> {
        (**self).pointer_scroll(at, delta_y).await
    }

    async fn type_text(&self, text: &str) -> Result<(), EnvironmentError> {
        (**self).type_text(text).await
    }

    async fn press_key(&self, name: &str) -> Result<(), EnvironmentError> {
        (**self).press_key(name).await
    }

    async fn wait(&self, duration: Duration) -> Result<(), EnvironmentError> {
        (**self).wait(duration).await
    }

    async fn stop_capture(&self, handle: &CaptureHandle) -> Result<(), EnvironmentError> {
        (**self).stop_capture(handle).await
    }
}
