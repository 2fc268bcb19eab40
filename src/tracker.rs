use anyhow::Result;
use tracing::{debug, info, instrument};

use crate::detector::{Detector, DetectorConfig};
use crate::error::TrackerError;
use crate::feature::Feature;
use crate::frame::{Frame, PyramidFrame};
use crate::my_types::*;
use crate::optical_flow::{retain_tracked, FlowConfig, OpticalFlow};

/// Everything carried from one frame to the next.
#[derive(Debug)]
pub struct TrackState {
    pub previous: PyramidFrame,
    /// Points tracked through every frame so far.
    pub features: Vec<Feature>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackStep {
    pub tracked: usize,
    pub lost: usize,
}

pub struct Tracker {
    detector: Detector,
    optical_flow: OpticalFlow,
    next_id: TrackId,
}

impl Tracker {
    pub fn new(detector_config: DetectorConfig, flow_config: FlowConfig) -> Self {
        Tracker {
            detector: Detector::new(detector_config),
            optical_flow: OpticalFlow::new(flow_config),
            next_id: TrackId(0),
        }
    }

    /// Detect the initial features on the first frame.
    #[instrument(skip_all)]
    pub fn initialize(&mut self, frame: &Frame) -> Result<TrackState> {
        let pyramid_frame = self.pyramid_frame(frame)?;
        let corners = self.detector.detect(&pyramid_frame.image);
        let features: Vec<Feature> = corners
            .into_iter()
            .map(|corner| Feature {
                point: corner.point,
                id: self.next_track_id(),
            })
            .collect();
        info!(
            "Detected {} corners in the first {}x{} frame",
            features.len(),
            frame.width,
            frame.height
        );
        Ok(TrackState {
            previous: pyramid_frame,
            features,
        })
    }

    /// Move the tracked features onto `frame`, dropping the lost ones, and
    /// make `frame` the previous frame of the next step.
    #[instrument(skip_all)]
    pub fn track(&mut self, state: &mut TrackState, frame: &Frame) -> Result<TrackStep> {
        let expected = (state.previous.image.width, state.previous.image.height);
        let found = (frame.width, frame.height);
        if expected != found {
            return Err(TrackerError::FrameSizeMismatch { expected, found }.into());
        }

        let current = self.pyramid_frame(frame)?;
        let estimates = self
            .optical_flow
            .process(&state.previous, &current, &state.features);
        let survivors = retain_tracked(&state.features, &estimates);
        let step = TrackStep {
            tracked: survivors.len(),
            lost: state.features.len() - survivors.len(),
        };
        debug!("tracked {}, lost {}", step.tracked, step.lost);

        *state = TrackState {
            previous: current,
            features: survivors,
        };
        Ok(step)
    }

    fn pyramid_frame(&self, frame: &Frame) -> Result<PyramidFrame> {
        let config = self.optical_flow.config();
        PyramidFrame::new(frame.to_grayscale(), config.max_level, config.win_size)
    }

    fn next_track_id(&mut self) -> TrackId {
        let id = self.next_id;
        self.next_id = TrackId(id.0 + 1);
        id
    }
}
