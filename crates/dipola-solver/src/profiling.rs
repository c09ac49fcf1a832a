//! Wall-clock profiling.
//!
//! A [`Profiler`] is created by the caller and passed down as
//! `Option<&Profiler>`; code that wants to be timed opens a [`ProfileSpan`]
//! which adds its elapsed time to a named accumulator when dropped.
//!
//! ```
//! use dipola_solver::profiling::Profiler;
//!
//! let prof = Profiler::new();
//! {
//!     let _span = prof.span("matvec");
//! }
//! assert_eq!(prof.entry("matvec").unwrap().count, 1);
//! ```

use indexmap::IndexMap;
use std::fmt::Write as _;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Format a duration as seconds with microsecond resolution, e.g. `1.250000s`.
pub fn format_duration(d: Duration) -> String {
    format!("{:.6}s", d.as_secs_f64())
}

/// Accumulated time for one named region.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProfileEntry {
    pub count: usize,
    pub total: Duration,
}

/// Named timers in first-use order.
#[derive(Debug, Default)]
pub struct Profiler {
    entries: Mutex<IndexMap<String, ProfileEntry>>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing `name`; the time is recorded when the span is dropped.
    pub fn span(&self, name: &str) -> ProfileSpan<'_> {
        ProfileSpan {
            profiler: self,
            name: name.to_string(),
            start: Instant::now(),
        }
    }

    /// Add `elapsed` to the timer `name`.
    pub fn record(&self, name: &str, elapsed: Duration) {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = entries.entry(name.to_string()).or_default();
        entry.count += 1;
        entry.total += elapsed;
    }

    pub fn entry(&self, name: &str) -> Option<ProfileEntry> {
        self.snapshot()
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, e)| e)
    }

    /// Copy of all timers in first-use order.
    pub fn snapshot(&self) -> Vec<(String, ProfileEntry)> {
        let entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }

    /// Human-readable table, one timer per line.
    pub fn report(&self) -> String {
        let mut out = String::new();
        for (name, entry) in self.snapshot() {
            let _ = writeln!(
                out,
                "{:<20} {:>8} {:>16}",
                name,
                entry.count,
                format_duration(entry.total)
            );
        }
        out
    }
}

/// Scoped timer returned by [`Profiler::span`].
#[must_use = "the span records its time when dropped"]
pub struct ProfileSpan<'a> {
    profiler: &'a Profiler,
    name: String,
    start: Instant,
}

impl Drop for ProfileSpan<'_> {
    fn drop(&mut self) {
        self.profiler.record(&self.name, self.start.elapsed());
    }
}

/// Per-iteration timings of a profiling run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfilingReport {
    /// `(iteration index, duration)` sorted by duration, then index.
    pub samples: Vec<(usize, Duration)>,
    pub median: Duration,
    /// Largest distance from the median to either extreme.
    pub spread: Duration,
}

impl ProfilingReport {
    /// Sort `samples` and compute median and spread.
    ///
    /// Returns `None` for an empty sample set.
    pub fn from_samples(mut samples: Vec<(usize, Duration)>) -> Option<Self> {
        samples.sort_by_key(|&(i, d)| (d, i));
        let first = samples.first()?.1;
        let last = samples.last()?.1;
        let median = samples[samples.len() / 2].1;
        let spread = (median - first).max(last - median);
        Some(Self {
            samples,
            median,
            spread,
        })
    }
}

impl std::fmt::Display for ProfilingReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, d) in &self.samples {
            write!(f, "[{}]{} ", i, format_duration(*d))?;
        }
        writeln!(f)?;
        writeln!(f)?;
        writeln!(
            f,
            "{} +- {}",
            format_duration(self.median),
            format_duration(self.spread)
        )
    }
}

/// Open a span on an optional profiler.
pub fn span<'a>(prof: Option<&'a Profiler>, name: &str) -> Option<ProfileSpan<'a>> {
    prof.map(|p| p.span(name))
}
