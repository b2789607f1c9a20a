//! # Streaming Scheduler
//!
//! Turns a byte-range read on a package entry into piece requests, waits
//! for the pieces, and serves the bytes.
//!
//! ## Piece Window
//!
//! ```text
//! entry offset + read offset ─┐
//!                             ▼
//! pieces:   ... │ 0 │ 1 │ 2 │ 3 │ 4 │ 5 │ 6 │ 7 │ ...
//!                 └─requested─┘   └─look-ahead─┘
//! deadline:       base  base  ..  base +1  +2  +3   (× step)
//! ```
//!
//! Requested pieces are raised to [`Priority::High`] and get the base
//! deadline; the look-ahead window behind them gets progressively later
//! deadlines so sequential playback finds its next pieces already fetched.
//! Only the requested pieces are waited for.
//!
//! ## Waiting
//!
//! The calling thread polls piece availability at a fixed interval until the
//! pieces arrive, the read is [`Interrupt`]ed, or the optional fetch timeout
//! elapses. Each read blocks only its own thread.

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::config::{SchedulerOptions, TimeoutOptions};
use crate::source::{ContentEntry, ContentSource};
use crate::{FsError, Priority};

/// Cancellation flag for a blocking read.
///
/// Clones share the flag, so the filesystem binding can keep one clone per
/// in-flight request and trip it when the kernel interrupts the request.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    /// A fresh, untripped flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the read waiting on this flag.
    pub fn interrupt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether [`interrupt`](Self::interrupt) was called.
    pub fn is_interrupted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Pieces touched by one read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceWindow {
    /// Pieces holding the requested bytes.
    pub requested: RangeInclusive<u32>,
    /// Pieces scheduled ahead of the read, if any fit in the package.
    pub look_ahead: Option<RangeInclusive<u32>>,
}

impl PieceWindow {
    /// Window for `length` bytes at absolute package offset `offset`.
    ///
    /// Returns `None` for empty reads and empty packages.
    pub fn for_range(
        offset: u64,
        length: u64,
        piece_length: u64,
        piece_count: u32,
        look_ahead: u32,
    ) -> Option<Self> {
        if length == 0 || piece_count == 0 {
            return None;
        }
        let piece_length = piece_length.max(1);
        let max = u64::from(piece_count - 1);
        let first = (offset / piece_length).min(max) as u32;
        let last = ((offset + length - 1) / piece_length).min(max) as u32;

        let ahead_end = last.saturating_add(look_ahead).min(piece_count - 1);
        let look_ahead = (look_ahead > 0 && ahead_end > last).then(|| last + 1..=ahead_end);

        Some(Self {
            requested: first..=last,
            look_ahead,
        })
    }

    /// Deadline for every piece in the window, requested pieces first.
    pub fn deadlines(&self, options: &SchedulerOptions) -> Vec<(u32, Duration)> {
        let requested = self.requested.clone().map(|p| (p, options.deadline_base));
        let ahead = self
            .look_ahead
            .clone()
            .into_iter()
            .flatten()
            .enumerate()
            .map(|(k, p)| (p, options.look_ahead_deadline(k as u32)));
        requested.chain(ahead).collect()
    }
}

/// Serves byte ranges of package entries, fetching pieces on demand.
#[derive(Debug, Clone, Default)]
pub struct StreamingScheduler {
    options: SchedulerOptions,
    timeouts: TimeoutOptions,
}

impl StreamingScheduler {
    /// Create a scheduler.
    pub fn new(options: SchedulerOptions, timeouts: TimeoutOptions) -> Self {
        Self { options, timeouts }
    }

    /// Scheduling options in effect.
    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    /// Read up to `length` bytes at `offset` within `entry`.
    ///
    /// Returns fewer bytes at end of file and nothing when `length` is zero
    /// or `offset` is at or past the end; neither case schedules pieces.
    ///
    /// # Errors
    ///
    /// - [`FsError::Interrupted`] if `interrupt` trips while waiting
    /// - [`FsError::FetchTimeout`] if the pieces do not arrive in time
    pub fn read(
        &self,
        source: &ContentSource,
        entry: &ContentEntry,
        offset: u64,
        length: usize,
        interrupt: &Interrupt,
    ) -> Result<Vec<u8>, FsError> {
        if length == 0 || offset >= entry.size() {
            return Ok(Vec::new());
        }
        let length = (length as u64).min(entry.size() - offset);
        let absolute = entry.offset() + offset;

        let Some(window) = PieceWindow::for_range(
            absolute,
            length,
            source.piece_length(),
            source.piece_count(),
            self.options.look_ahead,
        ) else {
            return Ok(Vec::new());
        };

        debug!(
            entry = entry.path(),
            offset,
            length,
            pieces = ?window.requested,
            "read"
        );

        if source.have_pieces(window.requested.clone())? {
            debug!(pieces = ?window.requested, "pieces already downloaded");
        } else {
            self.schedule(source, &window)?;
            self.wait(source, entry, &window.requested, interrupt)?;
        }
        source.settle(window.requested.clone());

        source.read_local(absolute, length as usize)
    }

    fn schedule(&self, source: &ContentSource, window: &PieceWindow) -> Result<(), FsError> {
        debug!(
            requested = ?window.requested,
            look_ahead = ?window.look_ahead,
            "asking for pieces"
        );
        for (piece, deadline) in window.deadlines(&self.options) {
            source.request_piece(piece, Priority::High, deadline)?;
        }
        Ok(())
    }

    fn wait(
        &self,
        source: &ContentSource,
        entry: &ContentEntry,
        pieces: &RangeInclusive<u32>,
        interrupt: &Interrupt,
    ) -> Result<(), FsError> {
        let started = Instant::now();
        loop {
            if interrupt.is_interrupted() {
                debug!(entry = entry.path(), ?pieces, "read interrupted");
                return Err(FsError::Interrupted {
                    path: PathBuf::from(entry.path()),
                });
            }
            if source.have_pieces(pieces.clone())? {
                debug!(?pieces, waited = ?started.elapsed(), "pieces available");
                return Ok(());
            }
            let waited = started.elapsed();
            if let Some(limit) = self.timeouts.fetch_timeout {
                if waited >= limit {
                    warn!(entry = entry.path(), ?pieces, ?waited, "timed out waiting for pieces");
                    return Err(FsError::FetchTimeout {
                        path: PathBuf::from(entry.path()),
                        pieces: pieces.clone(),
                        waited,
                    });
                }
            }
            trace!(?pieces, "waiting for pieces");
            thread::sleep(self.options.poll_interval);
        }
    }
}
