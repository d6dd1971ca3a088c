//! Incremental accumulators behind the statistics engines

/// Accumulator for computing statistics incrementally
pub trait Accumulator: Default + Send + Sync {
    /// Value fed per record
    type Input;

    /// Add a value to the accumulator
    fn add(&mut self, input: Self::Input);

    /// Number of records seen
    fn count(&self) -> u64;

    /// Merge another accumulator into this one
    fn merge(&mut self, other: &Self);

    /// Reset the accumulator
    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// First and second moments of a sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Moments {
    pub quantity: u64,
    pub mean: f64,
    /// Population variance
    pub variance: f64,
    pub standard_deviation: f64,
}

impl Moments {
    /// True unless accumulation overflowed
    pub fn is_finite(&self) -> bool {
        self.mean.is_finite() && self.variance.is_finite() && self.standard_deviation.is_finite()
    }
}

/// Mean and variance accumulator (Welford's algorithm).
///
/// Merging uses the parallel form of Chan et al., so a set of summaries
/// `(n, mean, variance)` pools to the same moments as the combined sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MomentAccumulator {
    count: u64,
    mean: f64,
    m2: f64,
}

impl MomentAccumulator {
    /// Accumulator standing for an already summarized sample
    pub fn from_summary(quantity: u64, mean: f64, variance: f64) -> Self {
        if quantity == 0 {
            return Self::default();
        }
        Self {
            count: quantity,
            mean,
            m2: variance * quantity as f64,
        }
    }

    pub fn moments(&self) -> Option<Moments> {
        if self.count == 0 {
            return None;
        }
        let variance = (self.m2 / self.count as f64).max(0.0);
        Some(Moments {
            quantity: self.count,
            mean: self.mean,
            variance,
            standard_deviation: variance.sqrt(),
        })
    }
}

impl Accumulator for MomentAccumulator {
    type Input = f64;

    fn add(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    fn count(&self) -> u64 {
        self.count
    }

    fn merge(&mut self, other: &Self) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        let total = self.count + other.count;
        let delta = other.mean - self.mean;
        let weight = other.count as f64 / total as f64;
        self.mean += delta * weight;
        self.m2 += other.m2 + delta * delta * self.count as f64 * weight;
        self.count = total;
    }
}

/// Occurrences and active time of one discrete value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityAccumulator {
    quantity: u64,
    activity_time: i64,
}

impl ActivityAccumulator {
    pub fn from_summary(quantity: u64, activity_time: i64) -> Self {
        Self {
            quantity,
            activity_time,
        }
    }

    /// Active milliseconds
    pub fn activity_time(&self) -> i64 {
        self.activity_time
    }
}

impl Accumulator for ActivityAccumulator {
    /// Milliseconds the value was active for one record
    type Input = i64;

    fn add(&mut self, active_ms: i64) {
        self.quantity += 1;
        self.activity_time += active_ms;
    }

    fn count(&self) -> u64 {
        self.quantity
    }

    fn merge(&mut self, other: &Self) {
        self.quantity += other.quantity;
        self.activity_time += other.activity_time;
    }
}
