//! # Value Accumulators
//!
//! Online estimators used throughout the search: the running mean attached to
//! every tree node, the aggregate counters of a search, and the extended
//! statistics (variance, extrema) used for game-length reporting.
//!
//! All updates are incremental (Welford style), so no raw samples are stored.
//! Removing a previously added sample restores the prior state exactly for
//! integer counts and within floating error otherwise.
//!
//! ## Count Types
//! [`Statistics`] is generic over its count type. Exact counts (`u32`, `u64`)
//! are defined as soon as the count is non-zero; floating counts (`f32`, `f64`)
//! only once the count exceeds a small epsilon, which keeps fractional
//! (weighted) updates from producing a singular mean.
//!
//! ## Lock-Free Storage
//! [`AtomicStatistics`] stores mean and count as two individually atomic
//! 64-bit fields. Updates are plain load/compute/store sequences and are only
//! race-free when the caller serializes them; see [`AtomicStatistics`].

use std::fmt;
use std::ops::{Add, Sub};
use std::sync::atomic::{AtomicU64, Ordering};

/// Numeric type usable as the sample count of a [`Statistics`].
pub trait Count:
    Copy + PartialOrd + fmt::Debug + Add<Output = Self> + Sub<Output = Self> + Send + Sync + 'static
{
    const ZERO: Self;
    const ONE: Self;

    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;

    /// Whether enough samples have been seen for the mean to be meaningful.
    fn is_defined(self) -> bool;
}

macro_rules! impl_exact_count {
    ($($t:ty),*) => {$(
        impl Count for $t {
            const ZERO: Self = 0;
            const ONE: Self = 1;

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(value: f64) -> Self {
                value.round() as $t
            }

            #[inline]
            fn is_defined(self) -> bool {
                self > 0
            }
        }
    )*};
}

macro_rules! impl_float_count {
    ($($t:ty),*) => {$(
        impl Count for $t {
            const ZERO: Self = 0.0;
            const ONE: Self = 1.0;

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(value: f64) -> Self {
                value as $t
            }

            #[inline]
            fn is_defined(self) -> bool {
                self > COUNT_EPSILON as $t
            }
        }
    )*};
}

/// Counts at or below this are treated as zero for floating count types.
pub const COUNT_EPSILON: f64 = 1e-6;

impl_exact_count!(u32, u64);
impl_float_count!(f32, f64);

/// Running mean and sample count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistics<C: Count = f64> {
    count: C,
    mean: f64,
}

impl<C: Count> Default for Statistics<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Count> Statistics<C> {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self {
            count: C::ZERO,
            mean: 0.0,
        }
    }

    /// Creates an accumulator that behaves as if `count` samples with the
    /// given mean had been added.
    pub fn with_initial(mean: f64, count: C) -> Self {
        Self { count, mean }
    }

    pub fn clear(&mut self) {
        self.count = C::ZERO;
        self.mean = 0.0;
    }

    pub fn is_defined(&self) -> bool {
        self.count.is_defined()
    }

    pub fn count(&self) -> C {
        self.count
    }

    /// The running mean. Only meaningful if [`is_defined`](Self::is_defined).
    pub fn mean(&self) -> f64 {
        debug_assert!(self.is_defined(), "mean of an empty accumulator");
        self.mean
    }

    /// The running mean, or `default` if no samples have been added.
    pub fn mean_or(&self, default: f64) -> f64 {
        if self.is_defined() {
            self.mean
        } else {
            default
        }
    }

    pub fn add(&mut self, value: f64) {
        self.add_weighted(value, C::ONE);
    }

    /// Adds `n` samples of the same value.
    pub fn add_weighted(&mut self, value: f64, n: C) {
        let count = self.count + n;
        if !count.is_defined() {
            return;
        }
        self.mean += n.to_f64() * (value - self.mean) / count.to_f64();
        self.count = count;
    }

    pub fn remove(&mut self, value: f64) {
        self.remove_weighted(value, C::ONE);
    }

    /// Removes `n` samples of the same value. Removing the last samples
    /// resets the accumulator instead of dividing by zero.
    pub fn remove_weighted(&mut self, value: f64, n: C) {
        if !(n < self.count) {
            self.clear();
            return;
        }
        let count = self.count - n;
        if !count.is_defined() {
            self.clear();
            return;
        }
        self.mean -= n.to_f64() * (value - self.mean) / count.to_f64();
        self.count = count;
    }

    /// Merges the samples of another accumulator into this one.
    pub fn merge(&mut self, other: &Statistics<C>) {
        if other.is_defined() {
            self.add_weighted(other.mean, other.count);
        }
    }
}

impl<C: Count> fmt::Display for Statistics<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_defined() {
            write!(f, "{:.3} ({:.0})", self.mean, self.count.to_f64())
        } else {
            write!(f, "- ({:.0})", self.count.to_f64())
        }
    }
}

/// Running mean with variance and extrema, used for distributions such as
/// game lengths.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatisticsExt {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Default for StatisticsExt {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticsExt {
    pub fn new() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn add(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Combines two distributions (Chan et al. parallel variance update).
    pub fn merge(&mut self, other: &StatisticsExt) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        let count = self.count + other.count;
        let delta = other.mean - self.mean;
        let (n_a, n_b, n) = (self.count as f64, other.count as f64, count as f64);
        self.mean += delta * n_b / n;
        self.m2 += other.m2 + delta * delta * n_a * n_b / n;
        self.count = count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_defined(&self) -> bool {
        self.count > 0
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }

    pub fn deviation(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

impl fmt::Display for StatisticsExt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 0 {
            return write!(f, "-");
        }
        write!(
            f,
            "{:.1} dev={:.1} min={:.0} max={:.0}",
            self.mean,
            self.deviation(),
            self.min,
            self.max
        )
    }
}

/// `f64` stored in an `AtomicU64` by bit-casting.
#[derive(Debug, Default)]
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    #[inline]
    pub fn load(&self, ordering: Ordering) -> f64 {
        f64::from_bits(self.bits.load(ordering))
    }

    #[inline]
    pub fn store(&self, value: f64, ordering: Ordering) {
        self.bits.store(value.to_bits(), ordering);
    }
}

/// Node-embedded accumulator with atomic fields.
///
/// Every field load and store is atomic, so readers never observe a torn
/// value, but an update is a separate load, compute and store. Concurrent
/// writers to the same accumulator can therefore lose samples: each race
/// between two writers drops at most one of the two updates, and a reader
/// may pair a `count` from one update with a `mean` from the adjacent one.
/// The mean always stays a convex combination of added values. Callers that
/// need exact counts serialize updates through the search's structural lock.
#[derive(Debug, Default)]
pub struct AtomicStatistics {
    count: AtomicF64,
    mean: AtomicF64,
}

impl AtomicStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn count(&self) -> f64 {
        self.count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_defined(&self) -> bool {
        self.count().is_defined()
    }

    /// The current mean; 0 if undefined.
    #[inline]
    pub fn mean(&self) -> f64 {
        self.mean.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> Statistics<f64> {
        Statistics::with_initial(self.mean(), self.count())
    }

    pub fn set(&self, stats: Statistics<f64>) {
        self.count.store(stats.count(), Ordering::Relaxed);
        self.mean.store(stats.mean_or(0.0), Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.count.store(0.0, Ordering::Relaxed);
        self.mean.store(0.0, Ordering::Relaxed);
    }

    pub fn add(&self, value: f64, n: f64) {
        let mut stats = self.snapshot();
        stats.add_weighted(value, n);
        // Mean first: a concurrent reader that sees the new count also sees
        // a mean that already includes this sample or an adjacent one.
        self.mean.store(stats.mean_or(0.0), Ordering::Relaxed);
        self.count.store(stats.count(), Ordering::Relaxed);
    }

    pub fn remove(&self, value: f64, n: f64) {
        let mut stats = self.snapshot();
        stats.remove_weighted(value, n);
        self.set(stats);
    }

    /// Copies the contents of `other` into this accumulator.
    pub fn copy_from(&self, other: &AtomicStatistics) {
        self.set(other.snapshot());
    }
}
