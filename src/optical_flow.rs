use nalgebra as na;

use crate::feature::Feature;
use crate::frame::PyramidFrame;
use crate::image::*;
use crate::math::min_eigenvalue_of;
use crate::my_types::*;

#[derive(Clone, Debug)]
pub struct FlowConfig {
    /// Side of the square integration window, odd.
    pub win_size: usize,
    /// Index of the coarsest pyramid level, 0 tracks on the full image only.
    pub max_level: usize,
    pub max_iters: usize,
    /// Iteration stops once the update is shorter than this.
    pub epsilon: f64,
    /// Minimum eigenvalue of the spatial gradient matrix per window pixel.
    pub min_eig_threshold: f64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            win_size: 15,
            max_level: 2,
            max_iters: 10,
            epsilon: 0.03,
            min_eig_threshold: 0.1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LossReason {
    /// The point or its estimate left the image.
    OutOfBounds,
    /// The window has too little gradient structure to solve for the flow.
    LowTexture,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackStatus {
    Tracked,
    Lost(LossReason),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlowEstimate {
    /// Position in the current image. Lost points keep their previous position.
    pub point: Vector2d,
    pub status: TrackStatus,
}

impl FlowEstimate {
    pub fn is_tracked(&self) -> bool {
        self.status == TrackStatus::Tracked
    }
}

/// Pyramidal Lucas-Kanade tracker
pub struct OpticalFlow {
    config: FlowConfig,
    ix: Matrixd,
    iy: Matrixd,
    it: Matrixd,
    grid: Matrixd,
}

impl OpticalFlow {
    pub fn new(config: FlowConfig) -> OpticalFlow {
        let n = config.win_size;
        OpticalFlow {
            config,
            ix: na::DMatrix::zeros(n, n),
            iy: na::DMatrix::zeros(n, n),
            it: na::DMatrix::zeros(n, n),
            grid: na::DMatrix::zeros(n + 2, n + 2),
        }
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Estimate the position of every feature of frame0 in frame1. The
    /// returned estimates are index aligned with `features0`.
    pub fn process(
        &mut self,
        pyramid_frame0: &PyramidFrame,
        pyramid_frame1: &PyramidFrame,
        features0: &[Feature],
    ) -> Vec<FlowEstimate> {
        features0
            .iter()
            .map(|feature0| {
                match self.process_feature(pyramid_frame0, pyramid_frame1, feature0.point) {
                    Ok(point) => FlowEstimate {
                        point,
                        status: TrackStatus::Tracked,
                    },
                    Err(reason) => FlowEstimate {
                        point: feature0.point,
                        status: TrackStatus::Lost(reason),
                    },
                }
            })
            .collect()
    }

    /// ref http://robots.stanford.edu/cs223b04/algo_tracking.pdf
    fn process_feature(
        &mut self,
        pyramid_frame0: &PyramidFrame,
        pyramid_frame1: &PyramidFrame,
        point0: Vector2d,
    ) -> Result<Vector2d, LossReason> {
        let levels = self
            .config
            .max_level
            .min(pyramid_frame0.max_level())
            .min(pyramid_frame1.max_level());

        // guess carried from the coarser levels, in units of the current level
        let mut g = Vector2d::zeros();
        for level in (0..=levels).rev() {
            let level0 = pyramid_frame0.get_image_at_level(level);
            let level1 = pyramid_frame1.get_image_at_level(level);
            let u = point0 / u32::pow(2, level as u32) as f64;

            let d = match self.refine(level0, level1, u, g) {
                Ok(d) => d,
                // a coarse level that cannot be solved just passes its guess on
                Err(_) if level > 0 => Vector2d::zeros(),
                Err(reason) => return Err(reason),
            };

            if level > 0 {
                g = 2. * (g + d)
            } else {
                g += d
            }
        }

        let point1 = point0 + g;
        if !pyramid_frame1.image.contains(point1) {
            return Err(LossReason::OutOfBounds);
        }
        Ok(point1)
    }

    /// Iteratively solve for the residual displacement of `u` at one level.
    fn refine(
        &mut self,
        level0: &Image,
        level1: &Image,
        u: Vector2d,
        g: Vector2d,
    ) -> Result<Vector2d, LossReason> {
        if !level0.contains(u) {
            return Err(LossReason::OutOfBounds);
        }
        let r = (self.config.win_size - 1) / 2;
        let area = (self.config.win_size * self.config.win_size) as f64;
        let epsilon2 = self.config.epsilon.powi(2);

        // one pixel of padding for the derivative kernel
        fill_grid(level0, u, r + 1, &mut self.grid);
        scharr(&self.grid, &mut self.ix, &mut self.iy);
        let gradient = spatial_gradient(&self.ix, &self.iy);
        if min_eigenvalue_of(&gradient) / area < self.config.min_eig_threshold {
            return Err(LossReason::LowTexture);
        }
        let inv_gradient = gradient.try_inverse().ok_or(LossReason::LowTexture)?;

        let mut nu = Vector2d::zeros();
        for _ in 0..self.config.max_iters {
            image_difference(&self.grid, &mut self.it, level1, u + g + nu, r);
            let eta = flow_vector(&inv_gradient, &self.ix, &self.iy, &self.it);
            nu += eta;
            if eta.norm_squared() < epsilon2 {
                break;
            }
        }
        Ok(nu)
    }
}

/// Keep the features whose flow was tracked, moved to their new position.
/// The result is contiguous and keeps the input order and track ids.
pub fn retain_tracked(features0: &[Feature], estimates: &[FlowEstimate]) -> Vec<Feature> {
    debug_assert_eq!(features0.len(), estimates.len());
    features0
        .iter()
        .zip(estimates)
        .filter(|(_, estimate)| estimate.is_tracked())
        .map(|(feature0, estimate)| Feature {
            point: estimate.point,
            id: feature0.id,
        })
        .collect()
}

fn flow_vector(inv_gradient: &Matrix2d, ix: &Matrixd, iy: &Matrixd, it: &Matrixd) -> Vector2d {
    let mut b = Vector2d::zeros();

    for y in 0..iy.nrows() {
        for x in 0..ix.ncols() {
            b[0] += it[(y, x)] * ix[(y, x)];
            b[1] += it[(y, x)] * iy[(y, x)];
        }
    }

    inv_gradient * b
}

/// it = I0(window) - I1(window shifted to `center`)
fn image_difference(i0: &Matrixd, it: &mut Matrixd, level: &Image, center: Vector2d, r: usize) {
    fill_grid(level, center, r, it);
    let n = 2 * r + 1;
    *it *= -1.;
    *it += i0.view((1, 1), (n, n));
}

fn spatial_gradient(ix: &Matrixd, iy: &Matrixd) -> Matrix2d {
    assert_eq!(ix.nrows(), iy.nrows());
    assert_eq!(ix.ncols(), iy.ncols());

    let mut x2 = 0.;
    let mut y2 = 0.;
    let mut xy = 0.;

    for y in 0..iy.nrows() {
        for x in 0..ix.ncols() {
            x2 += ix[(y, x)] * ix[(y, x)];
            y2 += iy[(y, x)] * iy[(y, x)];
            xy += ix[(y, x)] * iy[(y, x)];
        }
    }

    Matrix2d::new(x2, xy, xy, y2)
}

/// Derivatives of the interior of `grid`, which loses one pixel on each side.
/// ref https://theailearner.com/tag/scharr-operator/
fn scharr(grid: &Matrixd, out_x: &mut Matrixd, out_y: &mut Matrixd) {
    let n = (grid.nrows() - 2, grid.ncols() - 2);
    if out_x.shape() != n {
        *out_x = Matrixd::zeros(n.0, n.1);
        *out_y = Matrixd::zeros(n.0, n.1);
    }
    for y in 1..(grid.nrows() - 1) {
        for x in 1..(grid.ncols() - 1) {
            out_x[(y - 1, x - 1)] =
                (10. * grid[(y, x + 1)] + 3. * grid[(y + 1, x + 1)] + 3. * grid[(y - 1, x + 1)]
                    - 10. * grid[(y, x - 1)]
                    - 3. * grid[(y + 1, x - 1)]
                    - 3. * grid[(y - 1, x - 1)])
                    / 32.;
            out_y[(y - 1, x - 1)] =
                (10. * grid[(y + 1, x)] + 3. * grid[(y + 1, x + 1)] + 3. * grid[(y + 1, x - 1)]
                    - 10. * grid[(y - 1, x)]
                    - 3. * grid[(y - 1, x + 1)]
                    - 3. * grid[(y - 1, x - 1)])
                    / 32.;
        }
    }
}

/// Sample the (2r+1) x (2r+1) window of `level` centered on a sub-pixel point.
fn fill_grid(level: &Image, center: Vector2d, r: usize, grid: &mut Matrixd) {
    let n = 2 * r + 1;
    if grid.shape() != (n, n) {
        *grid = na::DMatrix::zeros(n, n);
    }

    let r = r as i32;
    for (y_ind, y) in (-r..=r).enumerate() {
        for (x_ind, x) in (-r..=r).enumerate() {
            grid[(y_ind, x_ind)] = bilinear(level, center + Vector2d::new(x as f64, y as f64));
        }
    }
}
