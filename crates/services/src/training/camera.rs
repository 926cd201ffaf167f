use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;

/// Which way the requested camera points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Facing {
    /// Rear camera, pointed at the trainee's work.
    #[default]
    Environment,
    User,
}

/// Handle to an open video stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraStream {
    id: u64,
    facing: Facing,
}

impl CameraStream {
    #[must_use]
    pub fn new(id: u64, facing: Facing) -> Self {
        Self { id, facing }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn facing(&self) -> Facing {
        self.facing
    }
}

/// A single captured RGB frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CameraError {
    #[error("Camera access denied. Please enable camera permissions.")]
    PermissionDenied,
    #[error("camera is already in use")]
    Busy,
    #[error("stream {0} is not active")]
    StreamClosed(u64),
    #[error("frame capture failed: {0}")]
    Capture(String),
}

/// Device camera as seen by the training engine.
#[async_trait]
pub trait CameraCapture: Send + Sync {
    /// Ask for a live stream. Resolves once the user has answered the permission prompt.
    ///
    /// # Errors
    ///
    /// Returns `CameraError::PermissionDenied` if access is refused.
    async fn acquire_stream(&self, facing: Facing) -> Result<CameraStream, CameraError>;

    /// # Errors
    ///
    /// Returns `CameraError` if the stream is closed or the frame cannot be read.
    fn capture_frame(&self, stream: &CameraStream) -> Result<Frame, CameraError>;

    /// Stop every track of the stream. Releasing twice is a no-op.
    fn release(&self, stream: &CameraStream);
}

/// Exclusive ownership of an acquired stream.
///
/// The stream is released when the lease is dropped, whichever way the
/// training attempt ends.
pub struct CameraLease {
    camera: Arc<dyn CameraCapture>,
    stream: Option<CameraStream>,
}

impl CameraLease {
    /// # Errors
    ///
    /// Propagates the camera's `acquire_stream` failure.
    pub async fn acquire(
        camera: Arc<dyn CameraCapture>,
        facing: Facing,
    ) -> Result<Self, CameraError> {
        let stream = camera.acquire_stream(facing).await?;
        tracing::debug!(stream = stream.id(), ?facing, "camera stream acquired");
        Ok(Self {
            camera,
            stream: Some(stream),
        })
    }

    /// # Errors
    ///
    /// Returns `CameraError` if the frame cannot be captured.
    pub fn capture(&self) -> Result<Frame, CameraError> {
        match &self.stream {
            Some(stream) => self.camera.capture_frame(stream),
            None => Err(CameraError::StreamClosed(0)),
        }
    }

    #[must_use]
    pub fn stream(&self) -> Option<&CameraStream> {
        self.stream.as_ref()
    }
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            self.camera.release(&stream);
            tracing::debug!(stream = stream.id(), "camera stream released");
        }
    }
}

impl std::fmt::Debug for CameraLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraLease")
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct SyntheticState {
    next_id: u64,
    active: Option<u64>,
    acquired: u64,
    released: u64,
}

/// Software camera that yields a generated gradient frame.
///
/// Used by the terminal driver and in tests; counts acquisitions and releases
/// so leaks are observable.
#[derive(Debug)]
pub struct SyntheticCamera {
    permission_granted: bool,
    width: u32,
    height: u32,
    state: Mutex<SyntheticState>,
}

impl SyntheticCamera {
    #[must_use]
    pub fn granted() -> Self {
        Self::with_permission(true)
    }

    #[must_use]
    pub fn denied() -> Self {
        Self::with_permission(false)
    }

    fn with_permission(permission_granted: bool) -> Self {
        Self {
            permission_granted,
            width: 64,
            height: 48,
            state: Mutex::new(SyntheticState::default()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, SyntheticState>, CameraError> {
        self.state
            .lock()
            .map_err(|e| CameraError::Capture(e.to_string()))
    }

    /// Number of streams currently open (0 or 1).
    #[must_use]
    pub fn active_streams(&self) -> usize {
        self.lock().map_or(0, |s| usize::from(s.active.is_some()))
    }

    #[must_use]
    pub fn acquired_count(&self) -> u64 {
        self.lock().map_or(0, |s| s.acquired)
    }

    #[must_use]
    pub fn released_count(&self) -> u64 {
        self.lock().map_or(0, |s| s.released)
    }
}

#[async_trait]
impl CameraCapture for SyntheticCamera {
    async fn acquire_stream(&self, facing: Facing) -> Result<CameraStream, CameraError> {
        if !self.permission_granted {
            return Err(CameraError::PermissionDenied);
        }
        let mut state = self.lock()?;
        if state.active.is_some() {
            return Err(CameraError::Busy);
        }
        state.next_id += 1;
        state.acquired += 1;
        let id = state.next_id;
        state.active = Some(id);
        Ok(CameraStream::new(id, facing))
    }

    fn capture_frame(&self, stream: &CameraStream) -> Result<Frame, CameraError> {
        let state = self.lock()?;
        if state.active != Some(stream.id()) {
            return Err(CameraError::StreamClosed(stream.id()));
        }
        let mut pixels = Vec::with_capacity((self.width * self.height * 3) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                let r = u8::try_from(x * 255 / self.width.max(1)).unwrap_or(u8::MAX);
                let g = u8::try_from(y * 255 / self.height.max(1)).unwrap_or(u8::MAX);
                pixels.extend_from_slice(&[r, g, 128]);
            }
        }
        Ok(Frame {
            width: self.width,
            height: self.height,
            pixels,
        })
    }

    fn release(&self, stream: &CameraStream) {
        if let Ok(mut state) = self.lock() {
            if state.active == Some(stream.id()) {
                state.active = None;
                state.released += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lease_releases_stream_on_drop() {
        let camera = Arc::new(SyntheticCamera::granted());
        let lease = CameraLease::acquire(camera.clone(), Facing::Environment)
            .await
            .unwrap();
        assert_eq!(camera.active_streams(), 1);

        let frame = lease.capture().unwrap();
        assert_eq!(frame.pixels.len(), (frame.width * frame.height * 3) as usize);

        drop(lease);
        assert_eq!(camera.active_streams(), 0);
        assert_eq!(camera.released_count(), 1);
    }

    #[tokio::test]
    async fn camera_is_exclusive() {
        let camera = Arc::new(SyntheticCamera::granted());
        let _lease = CameraLease::acquire(camera.clone(), Facing::Environment)
            .await
            .unwrap();
        let err = CameraLease::acquire(camera.clone(), Facing::User)
            .await
            .unwrap_err();
        assert_eq!(err, CameraError::Busy);
    }

    #[tokio::test]
    async fn denied_permission_opens_nothing() {
        let camera = Arc::new(SyntheticCamera::denied());
        let err = CameraLease::acquire(camera.clone(), Facing::Environment)
            .await
            .unwrap_err();
        assert_eq!(err, CameraError::PermissionDenied);
        assert_eq!(camera.acquired_count(), 0);
    }

    #[tokio::test]
    async fn releasing_twice_counts_once() {
        let camera = SyntheticCamera::granted();
        let stream = camera.acquire_stream(Facing::Environment).await.unwrap();
        camera.release(&stream);
        camera.release(&stream);
        assert_eq!(camera.released_count(), 1);
        assert!(camera.capture_frame(&stream).is_err());
    }
}
