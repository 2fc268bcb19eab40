use anyhow::Result;
use tracing::{debug, info, warn, Span};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::error::TrackerError;
use crate::feature::Feature;
use crate::frame::Frame;
use crate::tracker::{TrackState, Tracker};
use crate::video::{FrameSource, SourceGuard};

pub enum DriverState {
    AwaitingFirstFrame,
    Tracking(TrackState),
    Terminated,
}

impl DriverState {
    /// Feed the next frame, or `None` once the source is exhausted.
    pub fn advance(self, tracker: &mut Tracker, frame: Option<&Frame>) -> Result<DriverState> {
        match (self, frame) {
            (DriverState::AwaitingFirstFrame, None) => Err(TrackerError::EmptySource.into()),
            (DriverState::AwaitingFirstFrame, Some(frame)) => {
                Ok(DriverState::Tracking(tracker.initialize(frame)?))
            }
            (DriverState::Tracking(mut state), Some(frame)) => {
                tracker.track(&mut state, frame)?;
                Ok(DriverState::Tracking(state))
            }
            (DriverState::Tracking(_), None) | (DriverState::Terminated, _) => {
                Ok(DriverState::Terminated)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RunOptions {
    /// Terminate as soon as no point is left instead of reading the rest of
    /// the video.
    pub stop_when_lost: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Termination {
    #[default]
    Exhausted,
    AllPointsLost,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Frames read and processed, the first one included.
    pub frames: usize,
    /// Frame transitions flow was estimated for.
    pub flow_steps: usize,
    pub initial_points: usize,
    pub final_points: usize,
    pub termination: Termination,
}

/// Detect on the first frame of `source` and track through the rest of it.
/// `on_frame` sees the frame index and the surviving features after every
/// processed frame. The source is released on every exit path.
pub fn run<S, F>(
    mut source: SourceGuard<S>,
    tracker: &mut Tracker,
    options: RunOptions,
    mut on_frame: F,
) -> Result<RunSummary>
where
    S: FrameSource,
    F: FnMut(usize, &[Feature]) -> Result<()>,
{
    let mut state = DriverState::AwaitingFirstFrame;
    let mut summary = RunSummary::default();
    let mut reported_loss = false;

    loop {
        let frame = source.read_next_frame()?;
        state = state.advance(tracker, frame.as_ref())?;

        let point_count = match &state {
            DriverState::Tracking(track_state) => {
                if summary.frames == 0 {
                    summary.initial_points = track_state.features.len();
                } else {
                    summary.flow_steps += 1;
                }
                on_frame(summary.frames, &track_state.features)?;
                summary.frames += 1;
                summary.final_points = track_state.features.len();
                Span::current().pb_inc(1);
                Some(track_state.features.len())
            }
            _ => None,
        };

        if point_count == Some(0) {
            if options.stop_when_lost {
                info!("No points left to track, stopping at frame {}", summary.frames);
                summary.termination = Termination::AllPointsLost;
                state = DriverState::Terminated;
            } else if !reported_loss {
                warn!("No points left to track, reading the remaining frames");
                reported_loss = true;
            }
        }

        if let DriverState::Terminated = state {
            break;
        }
    }

    source.release()?;
    debug!("{:?}", summary);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use crate::detector::DetectorConfig;
    use crate::image::Image;
    use crate::my_types::*;
    use crate::optical_flow::FlowConfig;
    use crate::video::tests::MemorySource;

    fn marker_frame(x: i32, y: i32) -> Frame {
        let mut image = Image::new(128, 96, 30);
        image.set_sub_image_i32(x, y, &Image::new(4, 4, 220));
        Frame::from_gray(&image)
    }

    fn flat_frame() -> Frame {
        Frame::from_gray(&Image::new(64, 48, 120))
    }

    fn new_tracker() -> Tracker {
        Tracker::new(DetectorConfig::default(), FlowConfig::default())
    }

    /// Run over in-memory frames, collecting the features seen after each one.
    fn run_frames(
        frames: Vec<Frame>,
        options: RunOptions,
    ) -> (Result<RunSummary>, Vec<Vec<Feature>>, usize, usize) {
        let source = MemorySource::new(frames);
        let releases = source.releases.clone();
        let reads = source.reads.clone();
        let mut seen = vec![];
        let result = run(SourceGuard::new(source), &mut new_tracker(), options, |_, features| {
            seen.push(features.to_vec());
            Ok(())
        });
        (result, seen, releases.get(), reads.get())
    }

    #[test]
    fn test_shifted_marker() {
        let (result, seen, releases, _) =
            run_frames(vec![marker_frame(50, 40), marker_frame(55, 40)], RunOptions::default());
        let summary = result.unwrap();
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.flow_steps, 1);
        assert_eq!(summary.initial_points, 1);
        assert_eq!(summary.final_points, 1);
        assert_eq!(summary.termination, Termination::Exhausted);
        assert_eq!(releases, 1);

        let p0 = seen[0][0].point;
        let p1 = seen[1][0].point;
        assert!((p0 - Vector2d::new(51.5, 41.5)).norm() < 5.);
        assert!((p1 - p0 - Vector2d::new(5., 0.)).norm() < 0.5, "{p0} -> {p1}");
    }

    #[test]
    fn test_single_frame() {
        let (result, seen, releases, reads) =
            run_frames(vec![marker_frame(50, 40)], RunOptions::default());
        let summary = result.unwrap();
        assert_eq!(summary.frames, 1);
        assert_eq!(summary.flow_steps, 0);
        assert_eq!(seen.len(), 1);
        // the first frame, then end of stream
        assert_eq!(reads, 2);
        assert_eq!(releases, 1);
    }

    #[test]
    fn test_textureless_first_frame() {
        let frames = vec![flat_frame(), flat_frame(), flat_frame(), flat_frame()];
        let (result, seen, releases, _) = run_frames(frames, RunOptions::default());
        let summary = result.unwrap();
        assert_eq!(summary.initial_points, 0);
        assert_eq!(summary.frames, 4);
        assert_eq!(summary.flow_steps, 3);
        assert_eq!(summary.final_points, 0);
        assert!(seen.iter().all(|features| features.is_empty()));
        assert_eq!(releases, 1);
    }

    #[test]
    fn test_stop_when_lost() {
        let frames = vec![flat_frame(), flat_frame(), flat_frame()];
        let (result, _, releases, reads) = run_frames(
            frames,
            RunOptions {
                stop_when_lost: true,
            },
        );
        let summary = result.unwrap();
        assert_eq!(summary.frames, 1);
        assert_eq!(summary.flow_steps, 0);
        assert_eq!(summary.termination, Termination::AllPointsLost);
        assert_eq!(reads, 1);
        assert_eq!(releases, 1);
    }

    #[test]
    fn test_empty_source() {
        let (result, seen, releases, _) = run_frames(vec![], RunOptions::default());
        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrackerError>(),
            Some(TrackerError::EmptySource)
        ));
        assert!(seen.is_empty());
        assert_eq!(releases, 1);
    }

    #[test]
    fn test_failed_open_releases() {
        let source = MemorySource::new(vec![marker_frame(50, 40)]);
        let releases = source.releases.clone();
        let result = SourceGuard::checked(source, Path::new("clip.mp4"), |_| Ok(false))
            .and_then(|guard| run(guard, &mut new_tracker(), RunOptions::default(), |_, _| Ok(())));
        assert!(result.is_err());
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn test_fatal_error_releases() {
        let frames = vec![marker_frame(50, 40), flat_frame()];
        let (result, _, releases, _) = run_frames(frames, RunOptions::default());
        assert!(matches!(
            result.unwrap_err().downcast_ref::<TrackerError>(),
            Some(TrackerError::FrameSizeMismatch { .. })
        ));
        assert_eq!(releases, 1);
    }

    #[test]
    fn test_point_count_never_grows() {
        // the marker runs into the right border
        let frames = (0..8).map(|i| marker_frame(90 + 6 * i, 40)).collect();
        let (result, seen, _, _) = run_frames(frames, RunOptions::default());
        let summary = result.unwrap();
        assert_eq!(summary.frames, 8);
        for pair in seen.windows(2) {
            assert!(pair[1].len() <= pair[0].len());
            // survivors keep their ids and relative order
            let ids: Vec<_> = pair[1].iter().map(|f| f.id).collect();
            let previous: Vec<_> = pair[0]
                .iter()
                .map(|f| f.id)
                .filter(|id| ids.contains(id))
                .collect();
            assert_eq!(ids, previous);
        }
        assert!(summary.final_points <= summary.initial_points);
    }

    #[test]
    fn test_advance_after_termination() {
        let mut tracker = new_tracker();
        let state = DriverState::Terminated
            .advance(&mut tracker, Some(&flat_frame()))
            .unwrap();
        assert!(matches!(state, DriverState::Terminated));
    }
}
