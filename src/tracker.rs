//! Time-binned bandwidth accounting
//!
//! A [`DataTracker`] keeps rx/tx byte counters in fixed-width bins, oldest first. New bins are
//! pushed at the back when the current one has been open longer than the bin interval, and bins
//! older than the max track duration are dropped from the front, so memory stays bounded by
//! `max_track / bin_interval` bins.
//!
//! ```text
//! front (oldest)                                   back (open bin)
//! [start t0, end t1] [start t1, end t2] ... [start tn, end None]
//!        ↑ evicted once now - start > max_track       ↑ increments land here
//! ```
//!
//! The tracker is a plain accumulator with no interior locking. The device store guards it.

use std::collections::VecDeque;
use std::ops::{Add, AddAssign};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Default width of a single bin
pub const DEFAULT_BIN_INTERVAL: TimeDelta = TimeDelta::minutes(30);

/// Default amount of history kept per tracker
pub const DEFAULT_TRACK_DURATION: TimeDelta = TimeDelta::hours(24);

/// One bin of data use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataUse {
    pub start: DateTime<Utc>,

    /// Set when the bin is closed and a newer one opened
    pub end: Option<DateTime<Utc>>,

    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

impl DataUse {
    fn open(start: DateTime<Utc>) -> Self {
        Self {
            start,
            end: None,
            rx_bytes: 0,
            tx_bytes: 0,
        }
    }
}

/// An rx/tx pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataUseAmount {
    pub rx: u64,
    pub tx: u64,
}

impl DataUseAmount {
    pub fn rx(rx: u64) -> Self {
        Self { rx, tx: 0 }
    }

    pub fn tx(tx: u64) -> Self {
        Self { rx: 0, tx }
    }

    /// rx + tx
    pub fn total(&self) -> u64 {
        self.rx.saturating_add(self.tx)
    }
}

impl Add for DataUseAmount {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            rx: self.rx.saturating_add(other.rx),
            tx: self.tx.saturating_add(other.tx),
        }
    }
}

impl AddAssign for DataUseAmount {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

/// Bounded, time-ordered history of byte counters
#[derive(Debug, Clone)]
pub struct DataTracker {
    /// Invariant: never empty, sorted by `start`
    bins: VecDeque<DataUse>,

    bin_interval: TimeDelta,

    max_track: TimeDelta,
}

impl Default for DataTracker {
    fn default() -> Self {
        Self::new(DEFAULT_BIN_INTERVAL, DEFAULT_TRACK_DURATION)
    }
}

impl DataTracker {
    /// Create a tracker with a single open bin starting now
    ///
    /// Negative durations are treated as zero.
    pub fn new(bin_interval: TimeDelta, max_track: TimeDelta) -> Self {
        Self::new_at(bin_interval, max_track, Utc::now())
    }

    pub fn new_at(bin_interval: TimeDelta, max_track: TimeDelta, now: DateTime<Utc>) -> Self {
        Self {
            bins: VecDeque::from([DataUse::open(now)]),
            bin_interval: bin_interval.max(TimeDelta::zero()),
            max_track: max_track.max(TimeDelta::zero()),
        }
    }

    pub fn incr_rx(&mut self, rx: u64) {
        self.incr_data(DataUseAmount::rx(rx));
    }

    pub fn incr_tx(&mut self, tx: u64) {
        self.incr_data(DataUseAmount::tx(tx));
    }

    /// Add `amount` to the open bin, rolling and evicting bins as needed
    pub fn incr_data(&mut self, amount: DataUseAmount) {
        self.incr_data_at(amount, Utc::now());
    }

    pub fn incr_data_at(&mut self, amount: DataUseAmount, now: DateTime<Utc>) {
        loop {
            let oldest = self.oldest().start;
            if now - oldest > self.max_track {
                self.restrict_to_interval_at(self.max_track, now);
                if now - self.oldest().start > self.max_track {
                    // only reachable when now is before every bin start
                    break;
                }
                continue;
            }

            let bin_interval = self.bin_interval;
            let open = self.newest_mut();
            if now - open.start > bin_interval {
                open.end = Some(now);
                self.bins.push_back(DataUse::open(now));
                continue;
            }

            break;
        }

        let open = self.newest_mut();
        open.rx_bytes = open.rx_bytes.saturating_add(amount.rx);
        open.tx_bytes = open.tx_bytes.saturating_add(amount.tx);
    }

    /// Drop every bin that started more than `before` ago
    ///
    /// If nothing is left a fresh empty bin anchored at now is opened.
    pub fn restrict_to_interval(&mut self, before: TimeDelta) {
        self.restrict_to_interval_at(before, Utc::now());
    }

    pub fn restrict_to_interval_at(&mut self, before: TimeDelta, now: DateTime<Utc>) {
        let begin = self.bins.partition_point(|bin| now - bin.start > before);
        self.bins.drain(..begin);

        if self.bins.is_empty() {
            self.bins.push_back(DataUse::open(now));
        }
    }

    /// Sum over every retained bin
    pub fn total_use(&self) -> DataUseAmount {
        self.bins.iter().fold(DataUseAmount::default(), |acc, bin| {
            acc + DataUseAmount {
                rx: bin.rx_bytes,
                tx: bin.tx_bytes,
            }
        })
    }

    /// Sum over the bins that started within `before` of now
    pub fn data_use_in_interval(&self, before: TimeDelta) -> DataUseAmount {
        self.data_use_in_interval_at(before, Utc::now())
    }

    pub fn data_use_in_interval_at(&self, before: TimeDelta, now: DateTime<Utc>) -> DataUseAmount {
        self.bins
            .iter()
            .rev()
            .take_while(|bin| now - bin.start <= before)
            .fold(DataUseAmount::default(), |acc, bin| {
                acc + DataUseAmount {
                    rx: bin.rx_bytes,
                    tx: bin.tx_bytes,
                }
            })
    }

    pub fn bins(&self) -> impl ExactSizeIterator<Item = &DataUse> {
        self.bins.iter()
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    fn oldest(&self) -> &DataUse {
        &self.bins[0]
    }

    fn newest_mut(&mut self) -> &mut DataUse {
        let last = self.bins.len() - 1;
        &mut self.bins[last]
    }
}
