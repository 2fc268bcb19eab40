use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context as AnyhowContext, Result};
use serde::Serialize;

use crate::feature::Feature;
use crate::my_types::TrackId;

pub const TRACKS_FILE_NAME: &str = "tracks.jsonl";

#[derive(Serialize)]
struct PointRecord {
    id: TrackId,
    x: f64,
    y: f64,
}

#[derive(Serialize)]
struct FrameRecord {
    frame: usize,
    points: Vec<PointRecord>,
}

/// Writes the surviving features of every frame as one JSON line.
pub struct TrackWriter<W: Write> {
    writer: W,
}

impl TrackWriter<BufWriter<File>> {
    /// Create `tracks.jsonl` in `output_dir`, creating the directory if needed.
    pub fn create(output_dir: &Path) -> Result<Self> {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;
        let path = output_dir.join(TRACKS_FILE_NAME);
        let file =
            File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> TrackWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write_frame(&mut self, frame: usize, features: &[Feature]) -> Result<()> {
        let record = FrameRecord {
            frame,
            points: features
                .iter()
                .map(|f| PointRecord {
                    id: f.id,
                    x: f.point.x,
                    y: f.point.y,
                })
                .collect(),
        };
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::my_types::*;

    #[test]
    fn test_one_line_per_frame() {
        let mut writer = TrackWriter::new(vec![]);
        let features = vec![
            Feature {
                point: Vector2d::new(1.5, 2.),
                id: TrackId(3),
            },
            Feature {
                point: Vector2d::new(10., 20.25),
                id: TrackId(7),
            },
        ];
        writer.write_frame(0, &features).unwrap();
        writer.write_frame(1, &features[1..]).unwrap();
        writer.write_frame(2, &[]).unwrap();
        let bytes = writer.finish().unwrap();

        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["frame"], 0);
        assert_eq!(lines[0]["points"][0]["id"], 3);
        assert_eq!(lines[0]["points"][0]["x"], 1.5);
        assert_eq!(lines[1]["points"].as_array().unwrap().len(), 1);
        assert_eq!(lines[1]["points"][0]["y"], 20.25);
        assert!(lines[2]["points"].as_array().unwrap().is_empty());
    }
}
