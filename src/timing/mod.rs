//! Stream timing learned from the frame-number sequence.
//!
//! Frame numbers count up from zero within each second and wrap when the second rolls over, so
//! the frame rate is one more than the highest frame number seen before the first wrap.

use serde::Serialize;
use tracing::{debug, info};

use crate::vdif::Frame;

pub mod epoch;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StreamTiming {
	pub frame_rate: u32,
	pub samples_per_frame: usize,
	pub sample_rate: f64,
}

impl StreamTiming {

	pub fn from_frame(frame_rate:u32, frame:&Frame) -> Self {
		let samples_per_frame = frame.samples_per_frame();
		StreamTiming{ frame_rate, samples_per_frame, sample_rate: frame_rate as f64 * samples_per_frame as f64 }
	}

}

#[derive(Debug, Clone, PartialEq)]
pub enum RateObservation {
	/// No wrap seen yet; the frame cannot be placed in time
	Learning,
	/// This frame completed learning
	Learned(StreamTiming),
	Known(StreamTiming),
	/// Frame number is not below the learned rate
	OutOfRange{ frame_number: u32, frame_rate: u32 },
}

#[derive(Debug, Clone, Default)]
pub struct RateLearner {
	best_frame_number_seen: Option<u32>,
	best_seconds: u32,
	hint: Option<u32>,
	timing: Option<StreamTiming>,
}

impl RateLearner {

	pub fn new() -> Self { Self::default() }

	/// Skips learning; timing is derived from the first observed frame.
	pub fn with_frame_rate(frame_rate:u32) -> Self {
		Self{ hint: Some(frame_rate).filter(|r| *r > 0), ..Self::default() }
	}

	pub fn timing(&self) -> Option<&StreamTiming> { self.timing.as_ref() }

	pub fn reset(&mut self) {
		self.best_frame_number_seen = None;
		self.best_seconds = 0;
		self.timing = None;
	}

	fn fix(&mut self, frame_rate:u32, frame:&Frame) -> StreamTiming {
		let timing = StreamTiming::from_frame(frame_rate, frame);
		info!(frame_rate, sample_rate = timing.sample_rate, samples_per_frame = timing.samples_per_frame, "stream timing fixed");
		self.timing = Some(timing);
		timing
	}

	pub fn observe(&mut self, frame:&Frame) -> RateObservation {
		if let Some(timing) = self.timing {
			return if frame.frame_number >= timing.frame_rate {
				RateObservation::OutOfRange{ frame_number: frame.frame_number, frame_rate: timing.frame_rate }
			} else {
				RateObservation::Known(timing)
			};
		}

		if let Some(rate) = self.hint {
			let timing = self.fix(rate, frame);
			return if frame.frame_number >= rate {
				RateObservation::OutOfRange{ frame_number: frame.frame_number, frame_rate: rate }
			} else {
				RateObservation::Learned(timing)
			};
		}

		match self.best_frame_number_seen {
			// A drop below the watermark is the wrap. With one frame per second the number never drops,
			// so a new second without a higher number counts as a wrap too.
			Some(best) if frame.frame_number < best
				|| (frame.frame_number == best && frame.seconds_from_epoch > self.best_seconds) => {
				RateObservation::Learned(self.fix(best + 1, frame))
			},
			_ => {
				debug!(frame_number = frame.frame_number, "raising frame number watermark");
				self.best_frame_number_seen = Some(frame.frame_number);
				self.best_seconds = frame.seconds_from_epoch;
				RateObservation::Learning
			}
		}
	}

}
