use rayon::prelude::*;

/// A single-channel float image.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl Plane {
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Plane {
        debug_assert_eq!(data.len(), width * height);
        Plane {
            width: width,
            height: height,
            data: data,
        }
    }

    #[inline(always)]
    fn at(&self, x: isize, y: isize) -> f32 {
        let x = x.max(0).min(self.width as isize - 1) as usize;
        let y = y.max(0).min(self.height as isize - 1) as usize;
        self.data[y * self.width + x]
    }

    /// Halves the resolution with a 2x2 box filter.  Odd edges are
    /// extended by replication.
    pub fn downsample(&self) -> Plane {
        let width = (self.width + 1) / 2;
        let height = (self.height + 1) / 2;
        let mut data = vec![0.0f32; width * height];
        data.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
            let sy = 2 * y as isize;
            for (x, v) in row.iter_mut().enumerate() {
                let sx = 2 * x as isize;
                *v = (self.at(sx, sy)
                    + self.at(sx + 1, sy)
                    + self.at(sx, sy + 1)
                    + self.at(sx + 1, sy + 1))
                    * 0.25;
            }
        });
        Plane::new(width, height, data)
    }

    /// Bilinearly resamples to `width` x `height`, which should be
    /// roughly twice the current size.
    pub fn upsample(&self, width: usize, height: usize) -> Plane {
        let mut data = vec![0.0f32; width * height];
        data.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
            let fy = (y as f32 + 0.5) * 0.5 - 0.5;
            let y0 = fy.floor();
            let ty = fy - y0;
            for (x, v) in row.iter_mut().enumerate() {
                let fx = (x as f32 + 0.5) * 0.5 - 0.5;
                let x0 = fx.floor();
                let tx = fx - x0;
                let (x0, y0i) = (x0 as isize, y0 as isize);
                let top = self.at(x0, y0i) * (1.0 - tx) + self.at(x0 + 1, y0i) * tx;
                let bottom = self.at(x0, y0i + 1) * (1.0 - tx) + self.at(x0 + 1, y0i + 1) * tx;
                *v = top * (1.0 - ty) + bottom * ty;
            }
        });
        Plane::new(width, height, data)
    }
}

/// A Laplacian pyramid: band-pass detail levels from fine to coarse,
/// plus the low-pass residual.
#[derive(Debug, Clone)]
pub struct LaplacianPyramid {
    pub details: Vec<Plane>,
    pub base: Plane,
}

impl LaplacianPyramid {
    /// Decomposes `plane` into at most `max_levels` detail bands.
    /// Stops early rather than let the base shrink below `min_size` in
    /// either dimension.
    pub fn build(plane: &Plane, max_levels: usize, min_size: usize) -> LaplacianPyramid {
        let min_size = min_size.max(1);
        let mut details = Vec::new();
        let mut current = plane.clone();
        while details.len() < max_levels
            && current.width > 1
            && current.height > 1
            && (current.width + 1) / 2 >= min_size
            && (current.height + 1) / 2 >= min_size
        {
            let low = current.downsample();
            let up = low.upsample(current.width, current.height);
            let detail: Vec<f32> = current
                .data
                .par_iter()
                .zip(up.data.par_iter())
                .map(|(a, b)| a - b)
                .collect();
            details.push(Plane::new(current.width, current.height, detail));
            current = low;
        }

        LaplacianPyramid {
            details: details,
            base: current,
        }
    }

    /// Rebuilds the full-resolution plane, scaling every detail band by
    /// `detail_scale`.
    pub fn collapse(&self, detail_scale: f32) -> Plane {
        let mut current = self.base.clone();
        for detail in self.details.iter().rev() {
            let mut up = current.upsample(detail.width, detail.height);
            up.data
                .par_iter_mut()
                .zip(detail.data.par_iter())
                .for_each(|(v, d)| *v += d * detail_scale);
            current = up;
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_plane(width: usize, height: usize) -> Plane {
        let data = (0..(width * height))
            .map(|i| ((i * 7919) % 101) as f32 * 0.01)
            .collect();
        Plane::new(width, height, data)
    }

    #[test]
    fn downsample_box() {
        let p = Plane::new(2, 2, vec![0.0, 1.0, 2.0, 3.0]);
        let d = p.downsample();
        assert_eq!((d.width, d.height), (1, 1));
        assert_eq!(d.data, vec![1.5]);
    }

    #[test]
    fn downsample_odd() {
        let d = test_plane(5, 3).downsample();
        assert_eq!((d.width, d.height), (3, 2));
    }

    #[test]
    fn upsample_constant() {
        let p = Plane::new(3, 2, vec![4.0; 6]);
        let u = p.upsample(6, 4);
        assert!(u.data.iter().all(|&v| (v - 4.0).abs() < 1e-6));
    }

    #[test]
    fn collapse_is_exact_inverse() {
        let plane = test_plane(37, 23);
        let pyramid = LaplacianPyramid::build(&plane, 8, 1);
        assert!(!pyramid.details.is_empty());
        let rebuilt = pyramid.collapse(1.0);
        assert_eq!((rebuilt.width, rebuilt.height), (37, 23));
        for (a, b) in plane.data.iter().zip(rebuilt.data.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn level_limit() {
        let pyramid = LaplacianPyramid::build(&test_plane(64, 64), 3, 1);
        assert_eq!(pyramid.details.len(), 3);
        assert_eq!((pyramid.base.width, pyramid.base.height), (8, 8));

        let pyramid = LaplacianPyramid::build(&test_plane(8, 2), 8, 1);
        assert_eq!(pyramid.details.len(), 1);
        assert_eq!(pyramid.base.height, 1);
    }

    #[test]
    fn size_limit() {
        let pyramid = LaplacianPyramid::build(&test_plane(64, 64), 8, 8);
        assert_eq!(pyramid.details.len(), 3);
        assert_eq!((pyramid.base.width, pyramid.base.height), (8, 8));

        let pyramid = LaplacianPyramid::build(&test_plane(5, 40), 8, 8);
        assert!(pyramid.details.is_empty());
        assert_eq!(pyramid.base, test_plane(5, 40));
    }
}
