use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};

use tracing_indicatif::style::ProgressStyle;
use tracing::{debug, info, info_span};
use tracing_indicatif::span_ext::IndicatifSpanExt;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use lkt_tracker::config::Config;
use lkt_tracker::driver::{self, RunOptions};
use lkt_tracker::error::TrackerError;
use lkt_tracker::track_writer::TrackWriter;
use lkt_tracker::tracker::Tracker;
use lkt_tracker::video::VideoSource;

/// Track corners of the first frame of a video with pyramidal Lucas-Kanade
/// optical flow
#[derive(Parser)]
#[clap(name = "lkt-tracker")]
pub struct Args {
    /// Video file to track
    pub input_video: PathBuf,
    /// Output folder, only written to with --save-tracks
    #[clap(short, long)]
    pub output_dir: Option<PathBuf>,
    /// Write the tracked points of every frame to OUTPUT_DIR/tracks.jsonl
    #[clap(long)]
    pub save_tracks: bool,
    #[clap(flatten)]
    pub config: Config,
}

impl Args {
    /// Folder the track log goes to, `None` when tracks are not saved.
    fn tracks_dir(&self) -> Result<Option<&Path>, TrackerError> {
        match (&self.output_dir, self.save_tracks) {
            (Some(output_dir), true) => Ok(Some(output_dir.as_path())),
            (None, true) => Err(TrackerError::InvalidConfig(
                "--save-tracks needs --output-dir".into(),
            )),
            (Some(output_dir), false) => {
                debug!("Output folder {} is unused without --save-tracks", output_dir.display());
                Ok(None)
            }
            (None, false) => Ok(None),
        }
    }
}

fn main() -> Result<()> {
    // parse the config
    let args = Args::parse();
    let detector_config = args.config.detector_config()?;
    let flow_config = args.config.flow_config()?;

    // setup logging
    let indicatif_layer = IndicatifLayer::new();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .init();

    let mut track_writer = match args.tracks_dir()? {
        Some(output_dir) => Some(TrackWriter::create(output_dir)?),
        None => None,
    };

    // open the video, released by the driver on every exit path
    let source = VideoSource::open(&args.input_video)?;

    let header_span = info_span!("tracking");
    if let Some(length) = source.length_hint() {
        header_span.pb_set_style(&ProgressStyle::default_bar());
        header_span.pb_set_length(length);
    }
    let header_span_enter = header_span.enter();

    let mut tracker = Tracker::new(detector_config, flow_config);
    let options = RunOptions {
        stop_when_lost: args.config.stop_when_lost,
    };
    let summary = driver::run(source, &mut tracker, options, |frame, features| {
        match track_writer.as_mut() {
            Some(writer) => writer.write_frame(frame, features),
            None => Ok(()),
        }
    })?;

    std::mem::drop(header_span_enter);
    std::mem::drop(header_span);

    if let Some(writer) = track_writer {
        writer.finish()?;
    }
    info!(
        "Processed {} frames, {} of {} points survived ({:?})",
        summary.frames, summary.final_points, summary.initial_points, summary.termination
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracks_dir() {
        let args = Args::parse_from(["lkt-tracker", "in.mp4"]);
        assert_eq!(args.tracks_dir().unwrap(), None);

        let args = Args::parse_from(["lkt-tracker", "in.mp4", "-o", "out"]);
        assert_eq!(args.tracks_dir().unwrap(), None);

        let args = Args::parse_from(["lkt-tracker", "in.mp4", "-o", "out", "--save-tracks"]);
        assert_eq!(args.tracks_dir().unwrap(), Some(Path::new("out")));

        let args = Args::parse_from(["lkt-tracker", "in.mp4", "--save-tracks"]);
        assert!(matches!(args.tracks_dir(), Err(TrackerError::InvalidConfig(_))));
    }
}
