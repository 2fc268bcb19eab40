use crate::my_types::*;

/// Row-major grayscale image storage
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl Image {
    /// Create an empty image
    pub fn empty() -> Image {
        Image {
            data: vec![],
            width: 0,
            height: 0,
        }
    }

    /// Create an image filled with a single value
    pub fn new(width: usize, height: usize, value: u8) -> Image {
        Image {
            data: vec![value; width * height],
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True if the sub-pixel point lies within the pixel centers of the image.
    /// Coordinate (0, 0) is the center of the top-left pixel.
    pub fn contains(&self, point: Vector2d) -> bool {
        !self.is_empty()
            && point.x >= 0.
            && point.y >= 0.
            && point.x <= (self.width - 1) as f64
            && point.y <= (self.height - 1) as f64
    }

    #[inline(always)]
    pub fn value(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    /// Pixel value with coordinates clamped to the image borders
    #[inline(always)]
    pub fn value_clamped(&self, x: i64, y: i64) -> u8 {
        let x = x.clamp(0, self.width as i64 - 1);
        let y = y.clamp(0, self.height as i64 - 1);
        self.data[y as usize * self.width + x as usize]
    }

    #[inline(always)]
    pub fn set_value(&mut self, x: usize, y: usize, value: u8) {
        self.data[y * self.width + x] = value;
    }

    /// Copy `other` into this image with its top-left corner at (x, y).
    /// Pixels falling outside are skipped.
    #[cfg(test)]
    pub fn set_sub_image_i32(&mut self, x: i32, y: i32, other: &Image) {
        for oy in 0..other.height {
            for ox in 0..other.width {
                let tx = x + ox as i32;
                let ty = y + oy as i32;
                if tx < 0 || ty < 0 || tx >= self.width as i32 || ty >= self.height as i32 {
                    continue;
                }
                self.set_value(tx as usize, ty as usize, other.value(ox, oy));
            }
        }
    }
}

/// Sample the image at a sub-pixel point. Points outside the image take the
/// value of the nearest border pixel.
pub fn bilinear(image: &Image, point: Vector2d) -> f64 {
    let x = point.x.clamp(0., (image.width - 1) as f64);
    let y = point.y.clamp(0., (image.height - 1) as f64);
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = usize::min(x0 + 1, image.width - 1);
    let y1 = usize::min(y0 + 1, image.height - 1);
    let ax = x - x0 as f64;
    let ay = y - y0 as f64;

    let v = |x: usize, y: usize| image.value(x, y) as f64;
    (1. - ay) * ((1. - ax) * v(x0, y0) + ax * v(x1, y0))
        + ay * ((1. - ax) * v(x0, y1) + ax * v(x1, y1))
}
