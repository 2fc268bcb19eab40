use std::path::Path;

use anyhow::{Context as AnyhowContext, Result};
use log::{debug, warn};
use opencv::core::{self as cv_core, Mat};
use opencv::prelude::*;
use opencv::videoio;

use crate::error::TrackerError;
use crate::frame::Frame;

/// A sequential supplier of decoded frames.
pub trait FrameSource {
    /// Returns `None` once the source is exhausted.
    fn read_next_frame(&mut self) -> Result<Option<Frame>>;

    /// Free the underlying handle. Called exactly once by [`SourceGuard`].
    fn release(&mut self) -> Result<()>;

    /// Number of frames, when the container reports it.
    fn length_hint(&self) -> Option<u64> {
        None
    }
}

/// Owns a frame source and releases it exactly once, either explicitly or on
/// drop.
pub struct SourceGuard<S: FrameSource> {
    source: S,
    released: bool,
}

impl<S: FrameSource> SourceGuard<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            released: false,
        }
    }

    /// Guard `source` and keep it only if `is_open` accepts it. On rejection
    /// the source is released before the error is returned.
    pub fn checked(
        source: S,
        path: &Path,
        is_open: impl FnOnce(&S) -> Result<bool>,
    ) -> Result<Self> {
        let guard = Self::new(source);
        if !is_open(&guard.source)? {
            return Err(TrackerError::SourceOpen {
                path: path.display().to_string(),
            }
            .into());
        }
        Ok(guard)
    }

    pub fn read_next_frame(&mut self) -> Result<Option<Frame>> {
        if self.released {
            return Ok(None);
        }
        self.source.read_next_frame()
    }

    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.source.release()
    }

    #[cfg(test)]
    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn length_hint(&self) -> Option<u64> {
        self.source.length_hint()
    }
}

impl<S: FrameSource> Drop for SourceGuard<S> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!("Failed to release video source: {:#}", err);
        }
    }
}

/// Video file decoded through OpenCV
pub struct VideoSource {
    capture: videoio::VideoCapture,
    mat: Mat,
}

impl VideoSource {
    pub fn open(path: &Path) -> Result<SourceGuard<VideoSource>> {
        let open_error = || TrackerError::SourceOpen {
            path: path.display().to_string(),
        };
        let path_str = path.to_str().ok_or_else(open_error)?;
        let capture =
            videoio::VideoCapture::from_file(path_str, videoio::CAP_ANY).with_context(open_error)?;

        let guard = SourceGuard::checked(
            VideoSource {
                capture,
                mat: Mat::default(),
            },
            path,
            |source| Ok(source.capture.is_opened()?),
        )?;
        debug!("Opened video {}", path.display());
        Ok(guard)
    }
}

impl FrameSource for VideoSource {
    fn read_next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.capture.read(&mut self.mat)? || self.mat.empty() {
            return Ok(None);
        }
        mat_to_frame(&self.mat).map(Some)
    }

    fn release(&mut self) -> Result<()> {
        self.capture.release()?;
        debug!("Released video source");
        Ok(())
    }

    fn length_hint(&self) -> Option<u64> {
        match self.capture.get(videoio::CAP_PROP_FRAME_COUNT) {
            Ok(count) if count > 0. => Some(count as u64),
            _ => None,
        }
    }
}

fn mat_to_frame(mat: &Mat) -> Result<Frame> {
    if mat.typ() != cv_core::CV_8UC3 {
        return Err(TrackerError::UnsupportedFrame {
            channels: mat.channels(),
            depth: mat.depth(),
        }
        .into());
    }
    let width = mat.cols() as usize;
    let height = mat.rows() as usize;
    let data = if mat.is_continuous() {
        mat.data_bytes()?.to_vec()
    } else {
        mat.try_clone()?.data_bytes()?.to_vec()
    };
    Frame::new(width, height, data)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use anyhow::bail;

    /// In-memory source that counts how often it is released.
    pub struct MemorySource {
        pub frames: VecDeque<Frame>,
        pub releases: Rc<Cell<usize>>,
        pub reads: Rc<Cell<usize>>,
    }

    impl MemorySource {
        pub fn new(frames: Vec<Frame>) -> Self {
            MemorySource {
                frames: frames.into(),
                releases: Rc::new(Cell::new(0)),
                reads: Rc::new(Cell::new(0)),
            }
        }
    }

    impl FrameSource for MemorySource {
        fn read_next_frame(&mut self) -> Result<Option<Frame>> {
            self.reads.set(self.reads.get() + 1);
            Ok(self.frames.pop_front())
        }

        fn release(&mut self) -> Result<()> {
            self.releases.set(self.releases.get() + 1);
            Ok(())
        }

        fn length_hint(&self) -> Option<u64> {
            Some(self.frames.len() as u64)
        }
    }

    #[test]
    fn test_release_once() {
        let source = MemorySource::new(vec![]);
        let releases = source.releases.clone();
        let mut guard = SourceGuard::new(source);
        guard.release().unwrap();
        guard.release().unwrap();
        assert!(guard.is_released());
        assert!(guard.read_next_frame().unwrap().is_none());
        drop(guard);
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn test_release_on_drop() {
        let source = MemorySource::new(vec![]);
        let releases = source.releases.clone();
        {
            let _guard = SourceGuard::new(source);
        }
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn test_rejected_open_releases() {
        let source = MemorySource::new(vec![]);
        let releases = source.releases.clone();
        let err = SourceGuard::checked(source, Path::new("missing.mp4"), |_| Ok(false))
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<TrackerError>(),
            Some(TrackerError::SourceOpen { .. })
        ));
        assert_eq!(releases.get(), 1);

        let source = MemorySource::new(vec![]);
        let releases = source.releases.clone();
        let result =
            SourceGuard::checked(source, Path::new("broken.mp4"), |_| bail!("not a video"));
        assert!(result.is_err());
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn test_open_missing_file() {
        let err = VideoSource::open(Path::new("/nonexistent/video.mp4"))
            .err()
            .unwrap();
        assert!(err.downcast_ref::<TrackerError>().is_some(), "{err:#}");
    }
}
