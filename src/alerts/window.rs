//! Sliding-window occurrence counters

use std::collections::VecDeque;

/// Counted event series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Series {
    Requests,
    Errors,
    CacheHits,
    CacheMisses,
    AuthFailures,
}

impl Series {
    pub const ALL: [Series; 5] = [
        Series::Requests,
        Series::Errors,
        Series::CacheHits,
        Series::CacheMisses,
        Series::AuthFailures,
    ];

    fn index(self) -> usize {
        match self {
            Series::Requests => 0,
            Series::Errors => 1,
            Series::CacheHits => 2,
            Series::CacheMisses => 3,
            Series::AuthFailures => 4,
        }
    }
}

/// Occurrence timestamps (unix millis) for each series, trimmed to a trailing window.
///
/// Timestamps inside a series are kept non-decreasing: a sample older than the
/// newest one already recorded is clamped forward. That keeps pruning a pop from
/// the front and counting a binary search.
#[derive(Debug, Clone)]
pub struct WindowCounters {
    window_ms: i64,
    series: [VecDeque<i64>; 5],
}

impl WindowCounters {
    pub fn new(window_ms: i64) -> Self {
        Self {
            window_ms,
            series: Default::default(),
        }
    }

    /// Window length in millis
    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    /// Record one occurrence
    pub fn record(&mut self, series: Series, at: i64) {
        let samples = &mut self.series[series.index()];
        let at = samples.back().map_or(at, |&last| at.max(last));
        samples.push_back(at);
    }

    /// Number of samples strictly newer than `window_start`
    pub fn count_since(&self, series: Series, window_start: i64) -> usize {
        let samples = &self.series[series.index()];
        samples.len() - samples.partition_point(|&t| t <= window_start)
    }

    /// Number of samples inside the window ending at `now`
    pub fn count(&self, series: Series, now: i64) -> usize {
        self.count_since(series, now - self.window_ms)
    }

    /// Drop samples that fell out of the window ending at `now`
    pub fn prune(&mut self, now: i64) {
        let cutoff = now - self.window_ms;
        for samples in self.series.iter_mut() {
            while samples.front().is_some_and(|&t| t <= cutoff) {
                samples.pop_front();
            }
        }
    }

    /// Retained samples, including any not yet pruned
    pub fn len(&self, series: Series) -> usize {
        self.series[series.index()].len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.iter().all(VecDeque::is_empty)
    }

    /// Drop every sample
    pub fn clear(&mut self) {
        for samples in self.series.iter_mut() {
            samples.clear();
        }
    }
}
