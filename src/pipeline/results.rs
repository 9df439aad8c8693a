use super::queue::QueueReceiver;
use crate::spectrum::SpectralResult;

/// Consumer end of the result queue. During live reception the queue keeps the newest results and a
/// consumer that falls behind skips the oldest ones; during replay every result is delivered.
pub struct ResultReceiver {
	rx: QueueReceiver<SpectralResult>,
}

impl ResultReceiver {

	pub(crate) fn new(rx:QueueReceiver<SpectralResult>) -> Self { Self{ rx } }

	/// Next result in order, or `None` once the session has finished and the queue is empty.
	pub async fn recv(&mut self) -> Option<SpectralResult> { self.rx.recv().await }

	/// Blocking variant for consumers outside the runtime.
	pub fn blocking_recv(&mut self) -> Option<SpectralResult> { self.rx.blocking_recv() }

	pub fn try_recv(&mut self) -> Option<SpectralResult> { self.rx.try_recv() }

	/// Drains everything queued and returns only the newest result.
	pub fn latest(&mut self) -> Option<SpectralResult> {
		let mut newest = None;
		while let Some(r) = self.try_recv() {
			newest = Some(r);
		}
		newest
	}

}
