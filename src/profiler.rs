//! Wall-clock timing of named operations.
//!
//! A [`Profiler`] belongs to the orchestrating caller for one run. `start`
//! and `end` take `&mut self`, so timings cannot be recorded concurrently
//! from pipeline workers.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Operation name whose duration drives the throughput figure.
pub const DATA_IMPORT: &str = "data_import";

const RULE_WIDTH: usize = 60;

#[derive(Debug, Default, Clone, Copy)]
struct OperationTiming {
    started: Option<Instant>,
    elapsed: Option<Duration>,
}

/// Registry of named timers.
#[derive(Debug, Default)]
pub struct Profiler {
    operations: HashMap<String, OperationTiming>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin timing `name`, replacing any start that was never ended.
    pub fn start(&mut self, name: &str) {
        self.operations.entry(name.to_string()).or_default().started = Some(Instant::now());
    }

    /// Stop timing `name` and return the elapsed time.
    ///
    /// Returns [`Duration::ZERO`] when `name` was not started.
    pub fn end(&mut self, name: &str) -> Duration {
        let Some(timing) = self.operations.get_mut(name) else {
            return Duration::ZERO;
        };
        let Some(started) = timing.started.take() else {
            return Duration::ZERO;
        };

        let elapsed = started.elapsed();
        timing.elapsed = Some(elapsed);
        log::debug!("{} finished in {}", name, format_duration(elapsed));
        elapsed
    }

    /// Time an async operation under `name`.
    pub async fn measure<F, T>(&mut self, name: &str, operation: F) -> (T, Duration)
    where
        F: std::future::Future<Output = T>,
    {
        self.start(name);
        let output = operation.await;
        let elapsed = self.end(name);
        (output, elapsed)
    }

    /// Duration of a completed operation, zero if none was recorded.
    pub fn duration(&self, name: &str) -> Duration {
        self.operations
            .get(name)
            .and_then(|timing| timing.elapsed)
            .unwrap_or(Duration::ZERO)
    }

    /// All completed operations, sorted by name.
    pub fn operations(&self) -> Vec<(String, Duration)> {
        let mut completed: Vec<(String, Duration)> = self
            .operations
            .iter()
            .filter_map(|(name, timing)| timing.elapsed.map(|elapsed| (name.clone(), elapsed)))
            .collect();
        completed.sort_by(|a, b| a.0.cmp(&b.0));
        completed
    }

    pub fn reset(&mut self) {
        self.operations.clear();
    }

    /// Summarize completed operations.
    ///
    /// `total_time` is the sum of all durations, which overstates wall time
    /// when operations overlapped. Throughput is derived from
    /// [`DATA_IMPORT`] when it was recorded and non-zero.
    pub fn report(&self, total_rows: usize) -> ProfileReport {
        let operations: Vec<OperationReport> = self
            .operations()
            .into_iter()
            .map(|(name, elapsed)| OperationReport {
                name,
                elapsed_secs: elapsed.as_secs_f64(),
                elapsed,
            })
            .collect();

        let total_time: Duration = operations.iter().map(|op| op.elapsed).sum();
        let import_time = self.duration(DATA_IMPORT);
        let rows_per_second = if import_time > Duration::ZERO {
            Some(total_rows as f64 / import_time.as_secs_f64())
        } else {
            None
        };

        ProfileReport {
            operations,
            total_rows,
            total_secs: total_time.as_secs_f64(),
            total_time,
            rows_per_second,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationReport {
    pub name: String,
    #[serde(skip)]
    pub elapsed: Duration,
    pub elapsed_secs: f64,
}

/// Timings for one run.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileReport {
    pub operations: Vec<OperationReport>,
    pub total_rows: usize,
    #[serde(skip)]
    pub total_time: Duration,
    pub total_secs: f64,
    pub rows_per_second: Option<f64>,
}

impl fmt::Display for ProfileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(RULE_WIDTH))?;
        writeln!(f, "PERFORMANCE REPORT")?;
        writeln!(f, "{}", "=".repeat(RULE_WIDTH))?;
        for op in &self.operations {
            writeln!(f, "{:<22}: {}", op.name, format_duration(op.elapsed))?;
        }
        writeln!(f, "{}", "-".repeat(RULE_WIDTH))?;
        if self.total_rows > 0 {
            if let Some(rate) = self.rows_per_second {
                writeln!(f, "{:<22}: {}", "rows imported", self.total_rows)?;
                writeln!(f, "{:<22}: {:.2}", "rows per second", rate)?;
                writeln!(f, "{}", "-".repeat(RULE_WIDTH))?;
            }
        }
        writeln!(f, "{:<22}: {}", "total time", format_duration(self.total_time))?;
        write!(f, "{}", "=".repeat(RULE_WIDTH))
    }
}

/// Human-readable duration: `850ns`, `12.00µs`, `3.00ms`, `1.50s`, `2m 5.00s`.
pub fn format_duration(d: Duration) -> String {
    if d < Duration::from_micros(1) {
        format!("{}ns", d.as_nanos())
    } else if d < Duration::from_millis(1) {
        format!("{:.2}µs", d.as_micros() as f64)
    } else if d < Duration::from_secs(1) {
        format!("{:.2}ms", d.as_millis() as f64)
    } else if d < Duration::from_secs(60) {
        format!("{:.2}s", d.as_secs_f64())
    } else {
        let minutes = d.as_secs() / 60;
        let seconds = d.as_secs_f64() - (minutes * 60) as f64;
        format!("{}m {:.2}s", minutes, seconds)
    }
}

/// Side-by-side comparison of two timed runs.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub first: (String, Duration),
    pub second: (String, Duration),
}

impl Comparison {
    pub fn new(
        first_name: impl Into<String>,
        first: Duration,
        second_name: impl Into<String>,
        second: Duration,
    ) -> Self {
        Self {
            first: (first_name.into(), first),
            second: (second_name.into(), second),
        }
    }

    /// Name of the faster run with its improvement percent and speedup.
    ///
    /// `None` when both took the same time.
    pub fn winner(&self) -> Option<(&str, f64, f64)> {
        let (slow, fast) = match self.first.1.cmp(&self.second.1) {
            std::cmp::Ordering::Greater => (&self.first, &self.second),
            std::cmp::Ordering::Less => (&self.second, &self.first),
            std::cmp::Ordering::Equal => return None,
        };

        let slow_secs = slow.1.as_secs_f64();
        let fast_secs = fast.1.as_secs_f64();
        let improvement = (slow_secs - fast_secs) / slow_secs * 100.0;
        let speedup = if fast_secs > 0.0 {
            slow_secs / fast_secs
        } else {
            f64::INFINITY
        };
        Some((fast.0.as_str(), improvement, speedup))
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(RULE_WIDTH))?;
        writeln!(f, "PERFORMANCE COMPARISON")?;
        writeln!(f, "{}", "=".repeat(RULE_WIDTH))?;
        writeln!(f, "{:<30}: {}", self.first.0, format_duration(self.first.1))?;
        writeln!(f, "{:<30}: {}", self.second.0, format_duration(self.second.1))?;
        writeln!(f, "{}", "-".repeat(RULE_WIDTH))?;
        match self.winner() {
            Some((name, improvement, speedup)) => writeln!(
                f,
                "{} is {:.2}% faster ({:.2}x speedup)",
                name, improvement, speedup
            )?,
            None => writeln!(f, "both methods took the same time")?,
        }
        write!(f, "{}", "=".repeat(RULE_WIDTH))
    }
}
