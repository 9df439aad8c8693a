//! Decode/accumulate stage: the only owner of the learned stream timing and the open window.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::queue::QueueSender;
use super::stats::{bump, SessionStats};
use crate::config::{RateUnknownPolicy, ReceiverConfig};
use crate::timing::epoch;
use crate::timing::{RateLearner, RateObservation, StreamTiming};
use crate::vdif::{self, Frame};
use crate::window::{ChannelWindow, SampleBlock, WindowEvent};

/// A completed window on its way to the spectral stage
#[derive(Debug, Clone)]
pub struct FlushRequest {
	pub block: SampleBlock,
	pub sample_rate: f64,
}

pub struct DecodeStage {
	learner: RateLearner,
	window: ChannelWindow,
	policy: RateUnknownPolicy,
	held: VecDeque<Frame>,
	max_held_frames: usize,
	stats: Arc<SessionStats>,
}

impl DecodeStage {

	pub fn new(config:&ReceiverConfig, stats:Arc<SessionStats>) -> Self {
		let learner = match config.frame_rate_hint {
			Some(rate) => RateLearner::with_frame_rate(rate),
			None       => RateLearner::new(),
		};
		Self {
			learner,
			window: ChannelWindow::new(config.channel, config.window_duration_ms),
			policy: config.rate_unknown_policy,
			held: VecDeque::new(),
			max_held_frames: config.max_held_frames,
			stats,
		}
	}

	pub fn timing(&self) -> Option<StreamTiming> { self.learner.timing().copied() }

	/// Runs one datagram through the codec, rate learner, timestamp resolver and window.
	pub fn process(&mut self, datagram:&[u8]) -> Vec<FlushRequest> {
		let mut out = vec![];

		let frame = match vdif::decode(datagram) {
			Ok(frame) => frame,
			Err(e) => {
				bump(&self.stats.malformed, 1);
				warn!(error = %e, len = datagram.len(), "dropping malformed datagram");
				return out;
			}
		};

		if frame.invalid {
			bump(&self.stats.invalid, 1);
			debug!(frame_number = frame.frame_number, "dropping frame flagged invalid");
			return out;
		}

		if frame.thread_id != self.window.channel {
			bump(&self.stats.filtered, 1);
			trace!(thread_id = frame.thread_id, "frame for another thread");
			return out;
		}

		match self.learner.observe(&frame) {
			RateObservation::Learning => self.hold_or_drop(frame),
			RateObservation::Learned(timing) => {
				let held:Vec<Frame> = self.held.drain(..).collect();
				if !held.is_empty() {
					info!(frames = held.len(), "placing frames held while the rate was unknown");
				}
				for f in held {
					if f.frame_number < timing.frame_rate {
						self.place(&f, &timing, &mut out);
					} else {
						bump(&self.stats.out_of_range, 1);
					}
				}
				self.place(&frame, &timing, &mut out);
			},
			RateObservation::Known(timing) => self.place(&frame, &timing, &mut out),
			RateObservation::OutOfRange{ frame_number, frame_rate } => {
				bump(&self.stats.out_of_range, 1);
				warn!(frame_number, frame_rate, "frame number beyond learned frame rate");
			},
		}

		out
	}

	/// Takes the partially filled window, if any.
	pub fn finish(&mut self) -> Option<FlushRequest> {
		let timing = self.timing()?;
		let block = self.window.drain()?;
		bump(&self.stats.windows_flushed, 1);
		debug!(frames = block.frame_count, "flushing partial window");
		Some(FlushRequest{ block, sample_rate: timing.sample_rate })
	}

	fn hold_or_drop(&mut self, frame:Frame) {
		match self.policy {
			RateUnknownPolicy::Drop => bump(&self.stats.rate_unknown_dropped, 1),
			RateUnknownPolicy::Hold => {
				self.held.push_back(frame);
				if self.held.len() > self.max_held_frames {
					self.held.pop_front();
					bump(&self.stats.rate_unknown_dropped, 1);
				}
			},
		}
	}

	fn place(&mut self, frame:&Frame, timing:&StreamTiming, out:&mut Vec<FlushRequest>) {
		let time = match epoch::resolve(frame, Some(timing)) {
			Ok(t) => t,
			Err(e) => {
				warn!(error = %e, "unable to place frame in time");
				return;
			}
		};

		if let WindowEvent::Flush(block) = self.window.accept(frame, time) {
			bump(&self.stats.windows_flushed, 1);
			out.push(FlushRequest{ block, sample_rate: timing.sample_rate });
		}
	}

}

/// Consumes datagrams until the raw queue closes. Whether a busy spectral stage costs windows is up
/// to the flush queue's overflow mode.
pub(crate) async fn run(mut stage:DecodeStage, mut rx:mpsc::Receiver<Vec<u8>>, tx:QueueSender<Arc<FlushRequest>>,
	drain_partial_window:bool) -> Option<StreamTiming>
{
	while let Some(datagram) = rx.recv().await {
		for req in stage.process(&datagram) {
			if !tx.send(Arc::new(req)).await {
				debug!("spectral stage gone");
			}
		}
	}

	if drain_partial_window {
		if let Some(req) = stage.finish() {
			if !tx.send(Arc::new(req)).await {
				debug!("spectral stage gone before final window");
			}
		}
	}

	info!("decode stage finished");
	stage.timing()
}
