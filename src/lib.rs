use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub mod config;
pub mod pipeline;
pub mod spectrum;
pub mod timing;
pub mod vdif;
pub mod window;

pub use config::{RateUnknownPolicy, ReceiverConfig};
pub use pipeline::{Pipeline, ResultReceiver, Session, SessionReport, StatsSnapshot};
pub use spectrum::{SpectralResult, SpectralTransform, SpectrumScale};
pub use timing::{RateLearner, RateObservation, StreamTiming};
pub use timing::epoch::Timestamp;
pub use vdif::Frame;
pub use window::{ChannelWindow, SampleBlock, WindowEvent};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
	#[error("malformed VDIF frame: {reason}")]
	MalformedFrame { reason: String },

	#[error("frame rate not yet learned")]
	RateUnknown,

	#[error("UDP socket closed unexpectedly")]
	SocketClosed,

	#[error("unable to bind UDP socket on {addr}")]
	Bind {
		addr: String,
		#[source]
		source: io::Error,
	},

	#[error("unable to open capture sink {}", path.display())]
	Sink {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("invalid configuration: {reason}")]
	Config { reason: String },

	#[error("{stage} stage terminated abnormally")]
	StageFailed { stage: &'static str },

	#[error(transparent)]
	Io(#[from] io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl Error {

	pub fn malformed<S: Into<String>>(reason:S) -> Self { Error::MalformedFrame{ reason: reason.into() } }

	pub fn config<S: Into<String>>(reason:S) -> Self { Error::Config{ reason: reason.into() } }

}
