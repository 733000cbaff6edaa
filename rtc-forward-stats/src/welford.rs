//! Online mean/variance accumulator.

/// Running mean and variance using Welford's single-pass algorithm.
///
/// An empty accumulator reports zero for every statistic, never NaN.
/// Accumulators covering disjoint sample sets can be combined with
/// [`Welford::merge`] without revisiting the samples.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct Welford {
    count: u64,
    mean: f64,
    /// Sum of squared differences from the running mean (M2).
    m2: f64,
}

impl Welford {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sample.
    pub fn update(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    /// Forget every sample.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.mean }
    }

    /// Population variance.
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            // rounding in the combination step can leave m2 a hair below zero
            (self.m2 / self.count as f64).max(0.0)
        }
    }

    /// Population standard deviation.
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Fold `other` into `self` using the parallel variance combination
    /// (Chan et al.).
    pub fn merge_with(&mut self, other: &Welford) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }

        let count = self.count + other.count;
        let delta = other.mean - self.mean;
        let weight = other.count as f64 / count as f64;

        self.m2 += other.m2 + delta * delta * self.count as f64 * weight;
        self.mean += delta * weight;
        self.count = count;
    }

    /// Combine any number of accumulators into a new one.
    ///
    /// Inputs are left untouched; merging nothing yields an empty accumulator.
    pub fn merge<'a, I>(summaries: I) -> Welford
    where
        I: IntoIterator<Item = &'a Welford>,
    {
        summaries.into_iter().fold(Welford::new(), |mut acc, w| {
            acc.merge_with(w);
            acc
        })
    }
}

impl<'a> FromIterator<&'a Welford> for Welford {
    fn from_iter<I: IntoIterator<Item = &'a Welford>>(iter: I) -> Self {
        Welford::merge(iter)
    }
}
