use nalgebra as na;
use serde::Serialize;

pub type Vector2d = na::Vector2<f64>;
pub type Matrix2d = na::Matrix2<f64>;
pub type Matrixd = na::DMatrix<f64>;

/// Identity of a feature from the frame it was detected in until it is lost.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TrackId(pub usize);
