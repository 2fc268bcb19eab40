use anyhow::{bail, Result};

use crate::image::Image;

#[derive(Debug)]
pub struct Pyramid {
    /// levels[0] is half the size of the parent image
    pub levels: Vec<Image>,
    pub parent_size: [usize; 2],
}

impl Pyramid {
    pub fn empty() -> Self {
        Self {
            levels: vec![],
            parent_size: [0; 2],
        }
    }

    /// Build up to `level_count` downscaled levels of `frame`. Levels whose
    /// width or height would drop below `min_side` are not built, so the
    /// resulting pyramid may be shallower than requested.
    pub fn compute(&mut self, frame: &Image, level_count: usize, min_side: usize) -> Result<()> {
        if frame.is_empty() {
            bail!("cannot build a pyramid over an empty image");
        }
        let min_side = usize::max(min_side, 1);

        let mut built = 0;
        while built < level_count {
            let (w, h) = if built == 0 {
                (frame.width, frame.height)
            } else {
                let parent = &self.levels[built - 1];
                (parent.width, parent.height)
            };
            if half(w) < min_side || half(h) < min_side {
                break;
            }
            if self.levels.len() <= built {
                self.levels.push(Image::empty());
            }
            if built == 0 {
                downscale(frame, &mut self.levels[0]);
            } else {
                // split_at_mut gives the parent and the child without aliasing
                let (parents, rest) = self.levels.split_at_mut(built);
                downscale(&parents[built - 1], &mut rest[0]);
            }
            built += 1;
        }
        self.levels.truncate(built);
        self.parent_size = [frame.width, frame.height];
        Ok(())
    }
}

fn half(size: usize) -> usize {
    (size + 1) / 2
}

/// downscale the parent image and store the result in child
fn downscale(parent: &Image, child: &mut Image) {
    let w = parent.width as i64;
    let h = parent.height as i64;

    child.data.clear();
    child.width = half(parent.width);
    child.height = half(parent.height);

    // prevent pixel out of bounds by replicating the border
    let v = |x: i64, y: i64| -> u16 { parent.value_clamped(x, y) as u16 };

    for y in 0..child.height as i64 {
        let y2 = i64::min(2 * y, h - 1);
        for x in 0..child.width as i64 {
            let x2 = i64::min(2 * x, w - 1);
            // 3x3 binomial kernel, weights sum to 16
            let value = 4 * v(x2, y2)
                + 2 * (v(x2 + 1, y2) + v(x2 - 1, y2) + v(x2, y2 + 1) + v(x2, y2 - 1))
                + (v(x2 + 1, y2 + 1) + v(x2 - 1, y2 - 1) + v(x2 - 1, y2 + 1) + v(x2 + 1, y2 - 1));
            child.data.push(((value + 8) / 16) as u8);
        }
    }
}
