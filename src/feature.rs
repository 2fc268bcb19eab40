use crate::my_types::*;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Feature {
    pub point: Vector2d,
    pub id: TrackId,
}
