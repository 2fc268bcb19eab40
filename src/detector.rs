use clap::ValueEnum;
use tracing::debug;

use crate::image::Image;
use crate::math::{harris_response, min_eigenvalue};
use crate::my_types::*;

/// Corner response used to rank pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DetectorKind {
    /// det(M) - k * trace(M)^2 of the structure tensor M
    Harris,
    /// smaller eigenvalue of the structure tensor (Shi-Tomasi)
    MinEigen,
}

#[derive(Clone, Debug)]
pub struct DetectorConfig {
    /// Upper bound on the returned corners, 0 for no bound.
    pub max_corners: usize,
    /// Fraction of the strongest response a corner must exceed.
    pub quality_level: f64,
    /// Minimum euclidean distance between two returned corners.
    pub min_distance: f64,
    pub kind: DetectorKind,
    pub harris_k: f64,
    /// Side of the window the structure tensor is summed over.
    pub block_size: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_corners: 20,
            quality_level: 0.01,
            min_distance: 10.,
            kind: DetectorKind::Harris,
            harris_k: 0.04,
            block_size: 3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Corner {
    pub point: Vector2d,
    pub response: f64,
}

/// Finds strong, well separated corners ("good features to track").
/// ref J. Shi and C. Tomasi, Good Features to Track, 1994
pub struct Detector {
    config: DetectorConfig,
    ix: Matrixd,
    iy: Matrixd,
    response: Matrixd,
}

impl Detector {
    pub fn new(config: DetectorConfig) -> Self {
        Detector {
            config,
            ix: Matrixd::zeros(0, 0),
            iy: Matrixd::zeros(0, 0),
            response: Matrixd::zeros(0, 0),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Returns corners ordered by descending response.
    pub fn detect(&mut self, image: &Image) -> Vec<Corner> {
        let (w, h) = (image.width, image.height);
        if w < 3 || h < 3 {
            return vec![];
        }

        self.compute_response(image);
        let max_response = self
            .response
            .iter()
            .fold(f64::NEG_INFINITY, |acc, &r| f64::max(acc, r));
        if !(max_response > 0.) {
            debug!("no positive corner response, image is textureless");
            return vec![];
        }
        let threshold = max_response * self.config.quality_level;

        // The one pixel border is skipped so every candidate has a full neighborhood.
        let mut candidates = vec![];
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                let r = self.response[(y, x)];
                if r > threshold && is_local_max(&self.response, x, y) {
                    candidates.push(Corner {
                        point: Vector2d::new(x as f64, y as f64),
                        response: r,
                    });
                }
            }
        }

        // stable, equal responses keep raster order
        candidates.sort_by(|a, b| b.response.total_cmp(&a.response));
        let corners = self.select(candidates, w, h);
        debug!(
            "selected {} corners, max response {:.3e}",
            corners.len(),
            max_response
        );
        corners
    }

    /// Per pixel corner response, rows indexed by y.
    #[cfg(test)]
    pub fn corner_response(&mut self, image: &Image) -> &Matrixd {
        self.compute_response(image);
        &self.response
    }

    fn compute_response(&mut self, image: &Image) {
        let (w, h) = (image.width as i64, image.height as i64);
        sobel(image, &mut self.ix, &mut self.iy);

        let r = (self.config.block_size / 2) as i64;
        self.response = Matrixd::zeros(h as usize, w as usize);
        for y in 0..h {
            for x in 0..w {
                let (mut a, mut b, mut c) = (0., 0., 0.);
                for dy in -r..=r {
                    let sy = (y + dy).clamp(0, h - 1) as usize;
                    for dx in -r..=r {
                        let sx = (x + dx).clamp(0, w - 1) as usize;
                        let gx = self.ix[(sy, sx)];
                        let gy = self.iy[(sy, sx)];
                        a += gx * gx;
                        b += gx * gy;
                        c += gy * gy;
                    }
                }
                self.response[(y as usize, x as usize)] = match self.config.kind {
                    DetectorKind::Harris => harris_response(a, b, c, self.config.harris_k),
                    DetectorKind::MinEigen => min_eigenvalue(a, b, c),
                };
            }
        }
    }

    /// Greedy selection in response order. Accepted corners are bucketed in
    /// a grid of cells at least `min_distance` wide so only neighboring cells
    /// are checked.
    fn select(&self, candidates: Vec<Corner>, width: usize, height: usize) -> Vec<Corner> {
        let max_corners = match self.config.max_corners {
            0 => usize::MAX,
            n => n,
        };
        let min_distance = self.config.min_distance;
        if min_distance <= 0. {
            return candidates.into_iter().take(max_corners).collect();
        }

        let min_distance2 = min_distance * min_distance;
        // no finer than a pixel, no coarser than the image
        let cell = min_distance.clamp(1., usize::max(width, height) as f64);
        let grid_w = usize::max((width as f64 / cell).ceil() as usize, 1);
        let grid_h = usize::max((height as f64 / cell).ceil() as usize, 1);
        let mut grid: Vec<Vec<Vector2d>> = vec![vec![]; grid_w * grid_h];

        let mut corners = vec![];
        for candidate in candidates {
            let cx = usize::min((candidate.point.x / cell) as usize, grid_w - 1);
            let cy = usize::min((candidate.point.y / cell) as usize, grid_h - 1);

            let too_close = (cy.saturating_sub(1)..=usize::min(cy + 1, grid_h - 1)).any(|gy| {
                (cx.saturating_sub(1)..=usize::min(cx + 1, grid_w - 1)).any(|gx| {
                    grid[gy * grid_w + gx]
                        .iter()
                        .any(|p| (p - candidate.point).norm_squared() < min_distance2)
                })
            });
            if too_close {
                continue;
            }

            grid[cy * grid_w + cx].push(candidate.point);
            corners.push(candidate);
            if corners.len() >= max_corners {
                break;
            }
        }
        corners
    }
}

fn is_local_max(response: &Matrixd, x: usize, y: usize) -> bool {
    let r = response[(y, x)];
    for ny in y - 1..=y + 1 {
        for nx in x - 1..=x + 1 {
            if response[(ny, nx)] > r {
                return false;
            }
        }
    }
    true
}

/// 3x3 Sobel derivatives normalized to intensity per pixel, border replicated
fn sobel(image: &Image, out_x: &mut Matrixd, out_y: &mut Matrixd) {
    let (w, h) = (image.width, image.height);
    *out_x = Matrixd::zeros(h, w);
    *out_y = Matrixd::zeros(h, w);
    let v = |x: i64, y: i64| image.value_clamped(x, y) as f64;

    for y in 0..h as i64 {
        for x in 0..w as i64 {
            out_x[(y as usize, x as usize)] = (v(x + 1, y - 1) + 2. * v(x + 1, y) + v(x + 1, y + 1)
                - v(x - 1, y - 1)
                - 2. * v(x - 1, y)
                - v(x - 1, y + 1))
                / 8.;
            out_y[(y as usize, x as usize)] = (v(x - 1, y + 1) + 2. * v(x, y + 1) + v(x + 1, y + 1)
                - v(x - 1, y - 1)
                - 2. * v(x, y - 1)
                - v(x + 1, y - 1))
                / 8.;
        }
    }
}
