use std::time::{Duration, Instant};

/// A `(bytes transferred, timestamp)` pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    pub bytes: u64,
    pub timestamp: Instant,
}

/// Derives transfer rate and ETA from consecutive progress samples.
///
/// Only the previous sample is kept; every new sample supersedes it.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    total_bytes: u64,
    last: Option<ProgressSample>,
    rate: f64,
    eta: Option<Duration>,
}

impl ProgressReporter {
    /// Creates a reporter for a transfer of `total_bytes`.
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            last: None,
            rate: 0.0,
            eta: None,
        }
    }

    /// Records `bytes` transferred as of now.
    pub fn record(&mut self, bytes: u64) {
        self.record_at(bytes, Instant::now());
    }

    /// Records `bytes` transferred as of `timestamp`.
    ///
    /// The rate is only recomputed when time moved forward and the byte count
    /// did not go backwards; otherwise the previous rate stands.
    pub fn record_at(&mut self, bytes: u64, timestamp: Instant) {
        if let Some(prev) = self.last
            && timestamp > prev.timestamp
            && bytes >= prev.bytes
        {
            let elapsed = timestamp.duration_since(prev.timestamp).as_secs_f64();
            self.rate = (bytes - prev.bytes) as f64 / elapsed;
        }

        // Estimates past `Duration::MAX` are reported as unknown.
        self.eta = if self.rate > 0.0 {
            let remaining = self.total_bytes.saturating_sub(bytes);
            Duration::try_from_secs_f64(remaining as f64 / self.rate).ok()
        } else {
            None
        };

        self.last = Some(ProgressSample { bytes, timestamp });
    }

    /// Moves the baseline to `bytes` at `timestamp` without touching the rate.
    ///
    /// Used when a transfer resumes so the paused interval is not averaged in.
    pub fn rebase(&mut self, bytes: u64, timestamp: Instant) {
        self.last = Some(ProgressSample { bytes, timestamp });
    }

    /// Bytes per second between the last two usable samples (0.0 if unknown).
    pub fn bytes_per_second(&self) -> f64 {
        self.rate
    }

    /// Estimated time remaining; `None` while the rate is unknown.
    pub fn eta(&self) -> Option<Duration> {
        self.eta
    }

    /// The most recent sample.
    pub fn last_sample(&self) -> Option<ProgressSample> {
        self.last
    }

    /// Total bytes of the transfer.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Forgets all samples and the derived rate.
    pub fn reset(&mut self) {
        self.last = None;
        self.rate = 0.0;
        self.eta = None;
    }
}

/// Formats a duration as `Ns` under a minute, `Mm Ss` under an hour, `Hh Mm` otherwise.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64().round() as u64;
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Formats a byte count with binary units (`B`, `KB`, `MB`, `GB`), two decimals at most.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".into();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded} {}", UNITS[unit])
}
