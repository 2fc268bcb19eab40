use crate::detector::{DetectorConfig, DetectorKind};
use crate::error::TrackerError;
use crate::optical_flow::FlowConfig;

/// Tuning of the corner detector and the flow tracker.
#[derive(Debug)]
#[derive(clap::Parser)]
pub struct Config {
    /// Maximum number of corners detected on the first frame, 0 for no limit
    #[clap(long, default_value = "20")]
    pub max_corners: usize,

    /// Minimum corner response relative to the strongest one
    #[clap(long, default_value = "0.01")]
    pub quality_level: f64,

    /// Minimum distance in pixels between detected corners
    #[clap(long, default_value = "10")]
    pub min_distance: f64,

    #[clap(long, value_enum, default_value = "harris")]
    pub detector: DetectorKind,

    #[clap(long, default_value = "0.04")]
    pub harris_k: f64,

    /// Side of the structure tensor window
    #[clap(long, default_value = "3")]
    pub block_size: usize,

    /// Side of the optical flow window
    #[clap(long, default_value = "15")]
    pub win_size: usize,

    /// Coarsest pyramid level, 0 disables the pyramid
    #[clap(long, default_value = "2")]
    pub max_level: usize,

    #[clap(long, default_value = "10")]
    pub max_iters: usize,

    #[clap(long, default_value = "0.03")]
    pub epsilon: f64,

    #[clap(long, default_value = "0.1")]
    pub min_eig_threshold: f64,

    /// Stop reading the video once every point is lost
    #[clap(long)]
    pub stop_when_lost: bool,
}

impl Config {
    pub fn detector_config(&self) -> Result<DetectorConfig, TrackerError> {
        if !(self.quality_level > 0. && self.quality_level <= 1.) {
            return Err(invalid(format!(
                "quality level must be in (0, 1], got {}",
                self.quality_level
            )));
        }
        if !(self.min_distance >= 0. && self.min_distance.is_finite()) {
            return Err(invalid(format!(
                "min distance must be finite and not negative, got {}",
                self.min_distance
            )));
        }
        if self.block_size == 0 || self.block_size % 2 == 0 {
            return Err(invalid(format!(
                "block size must be odd, got {}",
                self.block_size
            )));
        }
        Ok(DetectorConfig {
            max_corners: self.max_corners,
            quality_level: self.quality_level,
            min_distance: self.min_distance,
            kind: self.detector,
            harris_k: self.harris_k,
            block_size: self.block_size,
        })
    }

    pub fn flow_config(&self) -> Result<FlowConfig, TrackerError> {
        if self.win_size < 3 || self.win_size % 2 == 0 {
            return Err(invalid(format!(
                "window size must be odd and at least 3, got {}",
                self.win_size
            )));
        }
        if self.max_iters == 0 {
            return Err(invalid("max iterations must be positive".into()));
        }
        if !(self.epsilon > 0.) {
            return Err(invalid(format!("epsilon must be positive, got {}", self.epsilon)));
        }
        if !(self.min_eig_threshold >= 0.) {
            return Err(invalid(format!(
                "min eigenvalue threshold must not be negative, got {}",
                self.min_eig_threshold
            )));
        }
        Ok(FlowConfig {
            win_size: self.win_size,
            max_level: self.max_level,
            max_iters: self.max_iters,
            epsilon: self.epsilon,
            min_eig_threshold: self.min_eig_threshold,
        })
    }
}

fn invalid(message: String) -> TrackerError {
    TrackerError::InvalidConfig(message)
}
