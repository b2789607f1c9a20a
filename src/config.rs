//! Configuration for the projection.
//!
//! Controls which files count as descriptors, how long idle sources live,
//! and how the streaming scheduler prioritises and waits for pieces.

use std::time::Duration;

/// Default suffix marking a descriptor file.
pub const DEFAULT_DESCRIPTOR_SUFFIX: &str = ".torrent";

/// Configuration options for the projection.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use torrentfs::{FsConfig, SchedulerOptions, TimeoutOptions};
///
/// let config = FsConfig::default()
///     .with_descriptor_suffix(".pkg")
///     .with_scheduler(SchedulerOptions::default().with_look_ahead(8))
///     .with_timeouts(TimeoutOptions::bounded(Duration::from_secs(30)));
///
/// assert_eq!(config.descriptor_suffix, ".pkg");
/// assert_eq!(config.scheduler.look_ahead, 8);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FsConfig {
    /// Suffix that marks a descriptor file.
    pub descriptor_suffix: String,
    /// Tear a source down as soon as its last holder releases it.
    /// When `false`, idle sources are kept until shutdown.
    pub remove_after_use: bool,
    /// Piece scheduling.
    pub scheduler: SchedulerOptions,
    /// Timeout settings.
    pub timeouts: TimeoutOptions,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            descriptor_suffix: DEFAULT_DESCRIPTOR_SUFFIX.to_string(),
            remove_after_use: true,
            scheduler: SchedulerOptions::default(),
            timeouts: TimeoutOptions::default(),
        }
    }
}

impl FsConfig {
    /// Set the descriptor suffix (including the leading dot).
    pub fn with_descriptor_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.descriptor_suffix = suffix.into();
        self
    }

    /// Set the idle-source policy.
    pub fn with_remove_after_use(mut self, remove_after_use: bool) -> Self {
        self.remove_after_use = remove_after_use;
        self
    }

    /// Set scheduler options.
    pub fn with_scheduler(mut self, scheduler: SchedulerOptions) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Set timeout options.
    pub fn with_timeouts(mut self, timeouts: TimeoutOptions) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Parse a configuration from JSON, filling omitted fields with defaults.
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

// ============================================================================
// Scheduler Options
// ============================================================================

/// Options for the streaming scheduler.
///
/// Requested pieces and the first look-ahead piece get `deadline_base`; each
/// further look-ahead piece gets `deadline_step` more, so nearer pieces are
/// more urgent.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SchedulerOptions {
    /// Pieces scheduled beyond the requested range.
    pub look_ahead: u32,
    /// Deadline for the most urgent pieces.
    pub deadline_base: Duration,
    /// Deadline increment per look-ahead piece.
    pub deadline_step: Duration,
    /// Sleep between availability checks.
    pub poll_interval: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            look_ahead: 4,
            deadline_base: Duration::from_secs(10),
            deadline_step: Duration::from_secs(1),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl SchedulerOptions {
    /// Set the look-ahead window size in pieces.
    pub fn with_look_ahead(mut self, look_ahead: u32) -> Self {
        self.look_ahead = look_ahead;
        self
    }

    /// Set the deadline curve.
    pub fn with_deadlines(mut self, base: Duration, step: Duration) -> Self {
        self.deadline_base = base;
        self.deadline_step = step;
        self
    }

    /// Set the polling interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Deadline for the `k`-th look-ahead piece (0-based).
    pub fn look_ahead_deadline(&self, k: u32) -> Duration {
        self.deadline_base + self.deadline_step * k
    }
}

// ============================================================================
// Timeout Options
// ============================================================================

/// Timeout settings for blocking operations.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TimeoutOptions {
    /// Longest a read waits for its pieces. `None` waits until they arrive
    /// or the read is interrupted.
    pub fetch_timeout: Option<Duration>,
}

impl Default for TimeoutOptions {
    fn default() -> Self {
        Self {
            fetch_timeout: Some(Duration::from_secs(300)), // 5 minutes
        }
    }
}

impl TimeoutOptions {
    /// Wait at most `timeout` for pieces.
    pub fn bounded(timeout: Duration) -> Self {
        Self {
            fetch_timeout: Some(timeout),
        }
    }

    /// Wait until pieces arrive or the read is interrupted.
    pub fn unbounded() -> Self {
        Self {
            fetch_timeout: None,
        }
    }
}
