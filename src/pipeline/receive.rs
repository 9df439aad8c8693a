//! Receive stage: socket to raw queue, plus the optional capture. No decoding happens here.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::sink::CaptureSink;
use super::stats::{bump, SessionStats};
use crate::{Error, Result};

/// Where the receive stage gets its datagrams from
#[async_trait::async_trait]
pub trait DatagramSource: Send + 'static {
	/// Waits for the next datagram. An error other than `Interrupted`/`WouldBlock` ends the session.
	async fn recv_datagram(&mut self, buf:&mut [u8]) -> io::Result<(usize, SocketAddr)>;
}

#[async_trait::async_trait]
impl DatagramSource for UdpSocket {
	async fn recv_datagram(&mut self, buf:&mut [u8]) -> io::Result<(usize, SocketAddr)> {
		self.recv_from(buf).await
	}
}

pub struct ReceiveStage<S: DatagramSource = UdpSocket> {
	pub source: S,
	pub sink: CaptureSink,
	pub max_datagram_size: usize,
	pub stats: Arc<SessionStats>,
}

impl<S: DatagramSource> ReceiveStage<S> {

	fn capture(&mut self, datagram:&[u8]) {
		match self.sink.append(datagram) {
			Ok(true) => bump(&self.stats.captured_bytes, datagram.len() as u64),
			Ok(false) => {},
			Err(e) => {
				error!(error = %e, "capture sink write failed, capture disabled");
				if let Err(e) = self.sink.close() {
					debug!(error = %e, "capture sink close failed");
				}
			}
		}
	}

	/// Runs until cancelled or the socket fails. A failure cancels `cancel` so the whole session
	/// tears down; cancellation itself is a clean exit.
	pub async fn run(mut self, tx:mpsc::Sender<Vec<u8>>, cancel:CancellationToken) -> Result<()> {
		let mut buffer = vec![0u8; self.max_datagram_size];

		let outcome = loop {
			let recv = tokio::select! {
				biased;
				_ = cancel.cancelled() => break Ok(()),
				recv = self.source.recv_datagram(&mut buffer) => recv,
			};

			match recv {
				Ok((len, addr)) => {
					bump(&self.stats.datagrams_received, 1);
					trace!(len, %addr, "datagram received");

					let datagram = &buffer[..len];
					self.capture(datagram);

					match tx.try_send(datagram.to_vec()) {
						Ok(()) => {},
						Err(TrySendError::Full(_)) => {
							bump(&self.stats.raw_dropped, 1);
							warn!("decode stage behind, datagram dropped");
						},
						Err(TrySendError::Closed(_)) => break Ok(()),
					}
				},
				Err(e) if e.kind() == io::ErrorKind::Interrupted || e.kind() == io::ErrorKind::WouldBlock => continue,
				Err(e) => {
					if cancel.is_cancelled() { break Ok(()); }
					error!(error = %e, "socket receive failed, stopping session");
					cancel.cancel();
					break Err(Error::SocketClosed);
				}
			}
		};

		if let Err(e) = self.sink.close() {
			warn!(error = %e, "unable to flush capture sink");
		}
		info!("receive stage finished");
		outcome
	}

}
