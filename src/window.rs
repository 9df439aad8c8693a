//! Groups one thread's frames into fixed-duration windows of contiguous samples.
//!
//! Payloads are concatenated strictly in arrival order. Missing frames are not filled in, so a
//! window that lost frames simply carries fewer samples.

use tracing::{debug, trace};

use crate::timing::epoch::Timestamp;
use crate::vdif::Frame;

/// Concatenated payloads of one completed window
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
	pub bytes: Vec<u8>,
	pub bits_per_sample: u8,
	pub complex: bool,
	pub start_time: Timestamp,
	pub frame_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WindowEvent {
	/// Frame belongs to another thread; window state untouched
	Ignored,
	Continue,
	Flush(SampleBlock),
}

pub struct ChannelWindow {
	pub channel: u16,
	pub duration_target_ms: f64,
	start_time: Option<Timestamp>,
	buffer: Vec<u8>,
	frame_count: usize,
	bits_per_sample: u8,
	complex: bool,
}

impl ChannelWindow {

	pub fn new(channel:u16, duration_target_ms:f64) -> Self {
		Self{ channel, duration_target_ms, start_time: None, buffer: vec![], frame_count: 0, bits_per_sample: 0, complex: false }
	}

	pub fn start_time(&self) -> Option<Timestamp> { self.start_time }

	pub fn frame_count(&self) -> usize { self.frame_count }

	pub fn is_empty(&self) -> bool { self.frame_count == 0 }

	fn begin(&mut self, frame:&Frame, time:Timestamp) {
		self.start_time = Some(time);
		self.bits_per_sample = frame.bits_per_sample;
		self.complex = frame.complex;
		self.append(frame);
	}

	fn append(&mut self, frame:&Frame) {
		self.buffer.extend_from_slice(&frame.payload);
		self.frame_count += 1;
	}

	/// Takes the buffered window, leaving the accumulator empty.
	pub fn drain(&mut self) -> Option<SampleBlock> {
		let start_time = self.start_time.take()?;
		let block = SampleBlock{ bytes: std::mem::take(&mut self.buffer), bits_per_sample: self.bits_per_sample,
			complex: self.complex, start_time, frame_count: self.frame_count };
		self.frame_count = 0;
		Some(block)
	}

	pub fn accept(&mut self, frame:&Frame, resolved_time:Timestamp) -> WindowEvent {
		if frame.thread_id != self.channel {
			return WindowEvent::Ignored;
		}

		let start = match self.start_time {
			Some(start) => start,
			None => {
				self.begin(frame, resolved_time);
				return WindowEvent::Continue;
			}
		};

		let delta_ms = resolved_time.millis_since(&start);
		let same_format = frame.bits_per_sample == self.bits_per_sample && frame.complex == self.complex;

		if delta_ms < self.duration_target_ms && same_format {
			trace!(delta_ms, frame_number = frame.frame_number, "frame added to window");
			self.append(frame);
			return WindowEvent::Continue;
		}

		match self.drain() {
			Some(block) => {
				debug!(start = %block.start_time, frames = block.frame_count, bytes = block.bytes.len(), "window complete");
				self.begin(frame, resolved_time);
				WindowEvent::Flush(block)
			},
			None => {
				self.begin(frame, resolved_time);
				WindowEvent::Continue
			}
		}
	}

}
