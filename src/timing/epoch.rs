//! Absolute time of a frame's first sample.
//!
//! VDIF counts time in half-year epochs since 2000: an even `ref_epoch` starts on January 1 of
//! `2000 + ref_epoch / 2`, an odd one on July 1 of the same year.

use std::fmt;
use std::time::SystemTime;

use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Utc};
use serde::Serialize;

use crate::timing::StreamTiming;
use crate::vdif::Frame;
use crate::{Error, Result};

const NANOS_PER_SEC:u64 = 1_000_000_000;

// 2000-01-01T00:00:00 UTC as a Unix timestamp
const J2000_UNIX_SECS:i64 = 946_684_800;

/// UTC instant with nanosecond resolution, displayed and serialized as RFC 3339.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {

	/// 2000-01-01T00:00:00 UTC
	pub fn j2000() -> Self { Timestamp(DateTime::<Utc>::default() + Duration::seconds(J2000_UNIX_SECS)) }

	/// `None` for a date or time that does not exist.
	pub fn from_civil(year:i32, month:u32, day:u32, hour:u32, minute:u32, second:u32) -> Option<Self> {
		Utc.with_ymd_and_hms(year, month, day, hour, minute, second).single().map(Timestamp)
	}

	pub fn as_datetime(&self) -> &DateTime<Utc> { &self.0 }

	pub fn secs_since_j2000(&self) -> i64 { self.0.timestamp() - J2000_UNIX_SECS }

	pub fn subsec_nanos(&self) -> u32 { self.0.timestamp_subsec_nanos() }

	pub fn add_nanos(&self, nanos:u64) -> Self {
		let secs = (nanos / NANOS_PER_SEC) as i64;
		let rest = (nanos % NANOS_PER_SEC) as i64;
		Timestamp(self.0 + Duration::seconds(secs) + Duration::nanoseconds(rest))
	}

	/// Signed difference `self - earlier` in milliseconds
	pub fn millis_since(&self, earlier:&Timestamp) -> f64 {
		let delta = self.0 - earlier.0;
		match delta.num_nanoseconds() {
			Some(ns) => ns as f64 / 1e6,
			None => delta.num_milliseconds() as f64,
		}
	}

	pub fn to_system_time(&self) -> SystemTime { SystemTime::from(self.0) }

}

impl From<DateTime<Utc>> for Timestamp {
	fn from(dt:DateTime<Utc>) -> Self { Timestamp(dt) }
}

impl fmt::Display for Timestamp {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true))
	}
}

/// Start of the half-year epoch named by `ref_epoch`.
pub fn epoch_base(ref_epoch:u8) -> Result<Timestamp> {
	let year = 2000 + (ref_epoch / 2) as i32;
	let month = if ref_epoch % 2 == 0 { 1 } else { 7 };
	Timestamp::from_civil(year, month, 1, 0, 0, 0)
		.ok_or_else(|| Error::malformed(format!("reference epoch {} has no calendar date", ref_epoch)))
}

/// Time of the first sample in `frame`: epoch base, plus whole seconds, plus `frame_number / frame_rate`.
pub fn resolve(frame:&Frame, timing:Option<&StreamTiming>) -> Result<Timestamp> {
	let frame_rate = match timing {
		Some(t) if t.frame_rate > 0 => t.frame_rate as u64,
		_ => return Err(Error::RateUnknown),
	};

	let n = frame.frame_number as u64;
	let whole = (frame.seconds_from_epoch as u64 + n / frame_rate) as i64;
	let nanos = (((n % frame_rate) * NANOS_PER_SEC) / frame_rate) as i64;

	let base = epoch_base(frame.ref_epoch)?;
	base.0.checked_add_signed(Duration::seconds(whole) + Duration::nanoseconds(nanos))
		.map(Timestamp)
		.ok_or_else(|| Error::malformed(format!("frame time {} s past epoch {} is out of range", whole, frame.ref_epoch)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::UNIX_EPOCH;

	fn timing(frame_rate:u32) -> StreamTiming {
		StreamTiming{ frame_rate, samples_per_frame: 4000, sample_rate: frame_rate as f64 * 4000.0 }
	}

	#[test]
	fn even_epoch_is_january_first() {
		let frame = Frame::default();
		let t = resolve(&frame, Some(&timing(25_000))).unwrap();
		assert_eq!(t, Timestamp::j2000());
		assert_eq!(t.to_string(), "2000-01-01T00:00:00Z");
	}

	#[test]
	fn odd_epoch_is_july_first() {
		let frame = Frame{ ref_epoch: 1, ..Frame::default() };
		let t = resolve(&frame, Some(&timing(25_000))).unwrap();
		assert_eq!(t.to_string(), "2000-07-01T00:00:00Z");
		assert_eq!(t.secs_since_j2000(), 182 * 86_400);
	}

	#[test]
	fn later_epochs() {
		assert_eq!(epoch_base(48).unwrap().to_string(), "2024-01-01T00:00:00Z");
		assert_eq!(epoch_base(49).unwrap().to_string(), "2024-07-01T00:00:00Z");
		assert_eq!(epoch_base(63).unwrap().to_string(), "2031-07-01T00:00:00Z");
	}

	#[test]
	fn seconds_and_frame_fraction() {
		let frame = Frame{ ref_epoch: 49, seconds_from_epoch: 3_600 * 24 + 61, frame_number: 250, ..Frame::default() };
		let t = resolve(&frame, Some(&timing(1000))).unwrap();
		assert_eq!(t.to_string(), "2024-07-02T00:01:01.250Z");
		assert_eq!(t.subsec_nanos(), 250_000_000);
		assert_eq!(t.millis_since(&epoch_base(49).unwrap()), 86_461_250.0);
	}

	#[test]
	fn fractional_seconds_keep_nanosecond_resolution() {
		let frame = Frame{ frame_number: 1, ..Frame::default() };
		let t = resolve(&frame, Some(&timing(3))).unwrap();
		assert_eq!(t.subsec_nanos(), 333_333_333);
		assert_eq!(t.to_string(), "2000-01-01T00:00:00.333333333Z");
	}

	#[test]
	fn unknown_rate_is_an_error() {
		assert!(matches!(resolve(&Frame::default(), None), Err(Error::RateUnknown)));
	}

	#[test]
	fn invalid_civil_dates_are_rejected() {
		assert!(Timestamp::from_civil(2023, 2, 29, 0, 0, 0).is_none());
		assert!(Timestamp::from_civil(2024, 2, 29, 0, 0, 0).is_some());
	}

	#[test]
	fn system_time_matches_unix_offset() {
		let since_unix = Timestamp::j2000().to_system_time().duration_since(UNIX_EPOCH).unwrap();
		assert_eq!(since_unix.as_secs(), 946_684_800);
	}

	#[test]
	fn serializes_as_rfc3339_string() {
		let t = Timestamp::from_civil(2024, 6, 16, 5, 56, 7).unwrap();
		assert_eq!(serde_json::to_string(&t).unwrap(), "\"2024-06-16T05:56:07Z\"");
	}
}
