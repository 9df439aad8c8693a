use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters shared by all stages of one session; each stage only bumps its own.
#[derive(Debug, Default)]
pub struct SessionStats {
	pub datagrams_received: AtomicU64,
	pub captured_bytes: AtomicU64,
	pub raw_dropped: AtomicU64,
	pub malformed: AtomicU64,
	pub invalid: AtomicU64,
	pub filtered: AtomicU64,
	pub rate_unknown_dropped: AtomicU64,
	pub out_of_range: AtomicU64,
	pub windows_flushed: AtomicU64,
	pub flushes_dropped: AtomicU64,
	pub spectra_produced: AtomicU64,
	pub results_lagged: AtomicU64,
}

pub(crate) fn bump(counter:&AtomicU64, n:u64) { counter.fetch_add(n, Ordering::Relaxed); }

fn read(counter:&AtomicU64) -> u64 { counter.load(Ordering::Relaxed) }

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
	pub datagrams_received: u64,
	pub captured_bytes: u64,
	pub raw_dropped: u64,
	pub malformed: u64,
	pub invalid: u64,
	pub filtered: u64,
	pub rate_unknown_dropped: u64,
	pub out_of_range: u64,
	pub windows_flushed: u64,
	pub flushes_dropped: u64,
	pub spectra_produced: u64,
	pub results_lagged: u64,
}

impl SessionStats {

	pub fn snapshot(&self) -> StatsSnapshot {
		StatsSnapshot {
			datagrams_received:   read(&self.datagrams_received),
			captured_bytes:       read(&self.captured_bytes),
			raw_dropped:          read(&self.raw_dropped),
			malformed:            read(&self.malformed),
			invalid:              read(&self.invalid),
			filtered:             read(&self.filtered),
			rate_unknown_dropped: read(&self.rate_unknown_dropped),
			out_of_range:         read(&self.out_of_range),
			windows_flushed:      read(&self.windows_flushed),
			flushes_dropped:      read(&self.flushes_dropped),
			spectra_produced:     read(&self.spectra_produced),
			results_lagged:       read(&self.results_lagged),
		}
	}

}
