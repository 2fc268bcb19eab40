use anyhow::Result;

use crate::error::TrackerError;
use crate::image::Image;
use crate::pyramid::Pyramid;

/// A decoded color frame, packed BGR rows.
#[derive(Clone, Debug)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl Frame {
    pub fn new(width: usize, height: usize, data: Vec<u8>) -> Result<Frame> {
        let expected = width * height * 3;
        if data.len() != expected {
            return Err(TrackerError::FrameBuffer {
                expected,
                found: data.len(),
            }
            .into());
        }
        Ok(Frame {
            data,
            width,
            height,
        })
    }

    /// Build a frame whose three channels all carry the gray value.
    #[cfg(test)]
    pub fn from_gray(image: &Image) -> Frame {
        Frame {
            data: image.data.iter().flat_map(|&v| [v, v, v]).collect(),
            width: image.width,
            height: image.height,
        }
    }

    /// BT.601 luma in 14-bit fixed point
    pub fn to_grayscale(&self) -> Image {
        const B: u32 = 1868;
        const G: u32 = 9617;
        const R: u32 = 4899;
        let data = self
            .data
            .chunks_exact(3)
            .map(|bgr| {
                ((B * bgr[0] as u32 + G * bgr[1] as u32 + R * bgr[2] as u32 + (1 << 13)) >> 14)
                    as u8
            })
            .collect();
        Image {
            data,
            width: self.width,
            height: self.height,
        }
    }
}

#[derive(Debug)]
pub struct PyramidFrame {
    /// original image
    pub image: Image,
    /// downsized images
    pub pyramid: Pyramid,
}

impl PyramidFrame {
    /// Build `max_level` pyramid levels over `image`, skipping levels smaller
    /// than `min_side`.
    pub fn new(image: Image, max_level: usize, min_side: usize) -> Result<PyramidFrame> {
        let mut pyramid = Pyramid::empty();
        pyramid.compute(&image, max_level, min_side)?;
        Ok(PyramidFrame { image, pyramid })
    }

    pub fn get_image_at_level(&self, level: usize) -> &Image {
        if level == 0 {
            &self.image
        } else {
            &self.pyramid.levels[level - 1]
        }
    }

    /// Index of the coarsest available level
    pub fn max_level(&self) -> usize {
        self.pyramid.levels.len()
    }
}
