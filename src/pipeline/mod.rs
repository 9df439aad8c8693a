//! Stage wiring and session lifecycle.
//!
//! ```text
//! UDP socket -> [receive] -> raw queue -> [decode/accumulate] -> flush queue -> [spectral] -> results
//! ```
//!
//! Every stage owns its state outright and talks to its neighbours only through channels. Stopping
//! cancels the receive stage; the closed channels then walk the shutdown down the line.

use std::io::{Read, Write};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ReceiverConfig;
use crate::spectrum::SpectralResult;
use crate::timing::StreamTiming;
use crate::vdif::reader::FrameReader;
use crate::{Error, Result};

pub mod decode;
pub mod queue;
pub mod receive;
pub mod results;
pub mod sink;
pub mod spectral;
pub mod stats;

#[cfg(test)]
mod tests;

pub use queue::Overflow;
pub use receive::DatagramSource;
pub use results::ResultReceiver;
pub use sink::CaptureSink;
pub use stats::{SessionStats, StatsSnapshot};

/// What a finished session leaves behind
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
	pub stats: StatsSnapshot,
	pub timing: Option<StreamTiming>,
}

/// Decode/accumulate and spectral stages fed from any datagram channel.
pub struct Pipeline {
	stats: Arc<SessionStats>,
	results: Option<ResultReceiver>,
	decode_handle: JoinHandle<Option<StreamTiming>>,
	spectral_handle: JoinHandle<()>,
}

impl Pipeline {

	/// Must be called from within a tokio runtime.
	pub fn spawn(config:&ReceiverConfig, raw_rx:mpsc::Receiver<Vec<u8>>) -> Self {
		Self::spawn_with_stats(config, raw_rx, Arc::new(SessionStats::default()), Overflow::DropOldest)
	}

	/// `overflow` applies to both the flush and the result queue.
	pub fn spawn_with_stats(config:&ReceiverConfig, raw_rx:mpsc::Receiver<Vec<u8>>, stats:Arc<SessionStats>,
		overflow:Overflow) -> Self
	{
		let (flush_tx, flush_rx) = queue::bounded::<Arc<decode::FlushRequest>>("flush", config.flush_queue_depth, overflow,
			stats.clone(), |s| &s.flushes_dropped);
		let (result_tx, result_rx) = queue::bounded::<SpectralResult>("result", config.result_queue_depth, overflow,
			stats.clone(), |s| &s.results_lagged);

		let stage = decode::DecodeStage::new(config, stats.clone());
		let decode_handle = tokio::spawn(decode::run(stage, raw_rx, flush_tx, config.drain_partial_window));

		let scale = config.scale;
		let spectral_stats = stats.clone();
		let spectral_handle = tokio::task::spawn_blocking(move || spectral::run(flush_rx, result_tx, scale, spectral_stats));

		let results = Some(ResultReceiver::new(result_rx));
		Pipeline{ stats, results, decode_handle, spectral_handle }
	}

	/// The result queue's consumer end; available once.
	pub fn results(&mut self) -> Option<ResultReceiver> { self.results.take() }

	pub fn stats(&self) -> StatsSnapshot { self.stats.snapshot() }

	/// Waits for both stages to finish. The raw queue's sender must already be dropped.
	pub async fn shutdown(self) -> Result<Option<StreamTiming>> {
		let Pipeline{ stats: _, results, decode_handle, spectral_handle } = self;
		drop(results);

		let timing = decode_handle.await.map_err(|_| Error::StageFailed{ stage: "decode" })?;
		spectral_handle.await.map_err(|_| Error::StageFailed{ stage: "spectral" })?;
		Ok(timing)
	}

}

/// One receiving session: a bound socket plus the stages behind it. All learned state lives and
/// dies with the session, so a new session always starts learning from scratch.
pub struct Session {
	local_addr: SocketAddr,
	cancel: CancellationToken,
	capture: Arc<AtomicBool>,
	has_sink: bool,
	receive_handle: JoinHandle<Result<()>>,
	pipeline: Pipeline,
}

impl Session {

	/// Binds the socket and opens `sink_path` (if any) before anything is spawned, so both kinds
	/// of failure are reported here.
	pub async fn start(config:ReceiverConfig) -> Result<Self> {
		config.validate()?;
		let capture = Arc::new(AtomicBool::new(config.capture_enabled));
		let sink = match &config.sink_path {
			Some(path) => CaptureSink::create(path, capture.clone())?,
			None => CaptureSink::none(capture.clone()),
		};
		Self::start_with_sink(config, sink, capture).await
	}

	/// Like `start`, capturing into `writer` instead of `sink_path`.
	pub async fn start_with_writer(config:ReceiverConfig, writer:Box<dyn Write + Send>) -> Result<Self> {
		config.validate()?;
		let capture = Arc::new(AtomicBool::new(config.capture_enabled));
		let sink = CaptureSink::from_writer(writer, capture.clone());
		Self::start_with_sink(config, sink, capture).await
	}

	async fn start_with_sink(config:ReceiverConfig, sink:CaptureSink, capture:Arc<AtomicBool>) -> Result<Self> {
		let addr = config.socket_addr();
		let socket = UdpSocket::bind(addr).await.map_err(|source| Error::Bind{ addr: addr.to_string(), source })?;
		let local_addr = socket.local_addr()?;
		Ok(Self::launch(config, socket, local_addr, sink, capture))
	}

	/// Spawns every stage behind an already open datagram source.
	pub(crate) fn launch<S: DatagramSource>(config:ReceiverConfig, source:S, local_addr:SocketAddr, sink:CaptureSink,
		capture:Arc<AtomicBool>) -> Self
	{
		let has_sink = sink.is_open();
		if capture.load(Ordering::Relaxed) && !has_sink {
			warn!("capture enabled without a sink, nothing will be written");
		}

		let stats = Arc::new(SessionStats::default());
		let (raw_tx, raw_rx) = mpsc::channel::<Vec<u8>>(config.raw_queue_depth);
		let pipeline = Pipeline::spawn_with_stats(&config, raw_rx, stats.clone(), Overflow::DropOldest);

		let cancel = CancellationToken::new();
		let stage = receive::ReceiveStage{ source, sink, max_datagram_size: config.max_datagram_size, stats };
		let receive_handle = tokio::spawn(stage.run(raw_tx, cancel.clone()));

		info!(%local_addr, channel = config.channel, window_ms = config.window_duration_ms, "session started");
		Session{ local_addr, cancel, capture, has_sink, receive_handle, pipeline }
	}

	pub fn local_addr(&self) -> SocketAddr { self.local_addr }

	pub fn results(&mut self) -> Option<ResultReceiver> { self.pipeline.results() }

	pub fn stats(&self) -> StatsSnapshot { self.pipeline.stats() }

	/// Turns raw capture on or off; returns whether there is a sink to capture into.
	pub fn set_capture(&self, enabled:bool) -> bool {
		self.capture.store(enabled, Ordering::Relaxed);
		self.has_sink
	}

	pub fn capture_enabled(&self) -> bool { self.capture.load(Ordering::Relaxed) }

	/// Resolves once the session is stopping, including after a fatal socket error.
	pub async fn terminated(&self) { self.cancel.cancelled().await }

	/// Stops all stages and waits for them. A socket failure during the session is returned here.
	pub async fn stop(self) -> Result<SessionReport> {
		let Session{ cancel, receive_handle, pipeline, .. } = self;
		cancel.cancel();

		let received = receive_handle.await.map_err(|_| Error::StageFailed{ stage: "receive" });
		let stats = pipeline.stats.clone();
		let timing = pipeline.shutdown().await?;
		received??;

		info!("session stopped");
		Ok(SessionReport{ stats: stats.snapshot(), timing })
	}

}

/// Feeds a captured byte stream through the decode and spectral stages, handing every result to
/// `on_result`. Nothing is dropped: every stage waits for the next one, down to `on_result`.
pub async fn replay<R, F>(config:&ReceiverConfig, src:R, mut on_result:F) -> Result<SessionReport>
	where R: Read + Send + 'static, F: FnMut(SpectralResult)
{
	config.validate()?;
	let stats = Arc::new(SessionStats::default());
	let (raw_tx, raw_rx) = mpsc::channel::<Vec<u8>>(config.raw_queue_depth);
	let mut pipeline = Pipeline::spawn_with_stats(config, raw_rx, stats.clone(), Overflow::Wait);
	let mut results = pipeline.results().ok_or(Error::StageFailed{ stage: "spectral" })?;

	let reader_stats = stats.clone();
	let reader:JoinHandle<Result<()>> = tokio::task::spawn_blocking(move || {
		for frame in FrameReader::new(src) {
			let frame = frame?;
			stats::bump(&reader_stats.datagrams_received, 1);
			if raw_tx.blocking_send(frame).is_err() { break; }
		}
		Ok(())
	});

	while let Some(result) = results.recv().await {
		on_result(result);
	}

	let read = reader.await.map_err(|_| Error::StageFailed{ stage: "replay" })?;
	let timing = pipeline.shutdown().await?;
	read?;
	Ok(SessionReport{ stats: stats.snapshot(), timing })
}

pub async fn replay_file<P, F>(config:&ReceiverConfig, path:P, on_result:F) -> Result<SessionReport>
	where P: AsRef<Path>, F: FnMut(SpectralResult)
{
	let f = std::fs::File::open(path.as_ref())?;
	replay(config, f, on_result).await
}
