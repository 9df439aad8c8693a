//! Receiver configuration, loadable from JSON with every field optional.

use std::fs::File;
use std::io::BufReader;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::spectrum::SpectrumScale;
use crate::vdif::LEGACY_HEADER_BYTES;
use crate::{Error, Result};

pub const DEFAULT_PORT:u16 = 7100;
pub const MAX_THREAD_ID:u16 = 1023;

/// What to do with frames of the selected thread that arrive before the frame rate is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateUnknownPolicy {
	Drop,
	/// Keep up to `max_held_frames` and place them in windows once the rate is learned
	Hold,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReceiverConfig {
	pub bind_address: IpAddr,
	pub port: u16,
	pub channel: u16,
	pub window_duration_ms: f64,
	pub capture_enabled: bool,
	pub sink_path: Option<PathBuf>,
	pub frame_rate_hint: Option<u32>,
	pub rate_unknown_policy: RateUnknownPolicy,
	pub max_held_frames: usize,
	pub scale: SpectrumScale,
	pub drain_partial_window: bool,
	pub max_datagram_size: usize,
	pub raw_queue_depth: usize,
	pub flush_queue_depth: usize,
	pub result_queue_depth: usize,
}

impl Default for ReceiverConfig {
	fn default() -> Self {
		ReceiverConfig {
			bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
			port: DEFAULT_PORT,
			channel: 0,
			window_duration_ms: 10.0,
			capture_enabled: false,
			sink_path: None,
			frame_rate_hint: None,
			rate_unknown_policy: RateUnknownPolicy::Drop,
			max_held_frames: 65_536,
			scale: SpectrumScale::Decibel,
			drain_partial_window: true,
			max_datagram_size: 1 << 14,
			raw_queue_depth: 8192,
			flush_queue_depth: 4,
			result_queue_depth: 16,
		}
	}
}

impl ReceiverConfig {

	pub fn from_json_file<P: AsRef<Path>>(path:P) -> Result<Self> {
		let f = File::open(path.as_ref())?;
		let config:ReceiverConfig = serde_json::from_reader(BufReader::new(f))?;
		config.validate()?;
		Ok(config)
	}

	pub fn socket_addr(&self) -> SocketAddr { SocketAddr::new(self.bind_address, self.port) }

	pub fn validate(&self) -> Result<()> {
		if !self.window_duration_ms.is_finite() || self.window_duration_ms <= 0.0 {
			return Err(Error::config(format!("window_duration_ms must be positive, got {}", self.window_duration_ms)));
		}
		if self.channel > MAX_THREAD_ID {
			return Err(Error::config(format!("channel {} exceeds the largest thread id {}", self.channel, MAX_THREAD_ID)));
		}
		if self.raw_queue_depth == 0 || self.flush_queue_depth == 0 || self.result_queue_depth == 0 {
			return Err(Error::config("queue depths must be at least 1"));
		}
		if self.max_datagram_size < LEGACY_HEADER_BYTES {
			return Err(Error::config(format!("max_datagram_size {} cannot hold a frame header", self.max_datagram_size)));
		}
		if self.rate_unknown_policy == RateUnknownPolicy::Hold && self.max_held_frames == 0 {
			return Err(Error::config("hold policy needs max_held_frames of at least 1"));
		}
		if self.frame_rate_hint == Some(0) {
			return Err(Error::config("frame_rate_hint must be positive"));
		}
		Ok(())
	}

}
