#[derive(Debug, Clone)]
pub struct Histogram {
    pub total_samples: usize,
    pub buckets: Vec<usize>,
}

impl Histogram {
    /// Builds a histogram from any iterator yielding items than can be converted to `usize`.
    ///
    /// The values yielded by the iterator are used to directly index
    /// into the histogram buckets, so `bucket_count` should be large
    /// enough to accommodate any yielded values.
    pub fn from_iter<T, Itr>(values: Itr, bucket_count: usize) -> Self
    where
        T: Into<usize>,
        Itr: std::iter::Iterator<Item = T>,
    {
        let mut hist = Histogram {
            total_samples: 0,
            buckets: vec![0; bucket_count],
        };
        for v in values {
            hist.total_samples += 1;
            hist.buckets[v.into()] += 1;
        }
        hist
    }

    /// The lowest bucket at or below which at least `fraction` of the
    /// samples fall.
    pub fn percentile(&self, fraction: f32) -> usize {
        let target = (self.total_samples as f64 * fraction.max(0.0).min(1.0) as f64).ceil() as usize;
        let mut sum = 0;
        for (i, &count) in self.buckets.iter().enumerate() {
            sum += count;
            if sum >= target.max(1) {
                return i;
            }
        }
        self.buckets.len().saturating_sub(1)
    }

    /// The median bucket.
    pub fn median(&self) -> usize {
        self.percentile(0.5)
    }
}
