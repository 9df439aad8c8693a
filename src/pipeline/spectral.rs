use std::sync::Arc;

use tracing::{debug, info, trace};

use super::decode::FlushRequest;
use super::queue::{QueueReceiver, QueueSender};
use super::stats::{bump, SessionStats};
use crate::spectrum::{SpectralResult, SpectralTransform, SpectrumScale};

/// Blocking worker: transforms each completed window and publishes the result. Runs until the
/// decode stage drops its end of the flush queue.
pub(crate) fn run(mut rx:QueueReceiver<Arc<FlushRequest>>, tx:QueueSender<SpectralResult>, scale:SpectrumScale, stats:Arc<SessionStats>) {
	let mut transform = SpectralTransform::new(scale);

	while let Some(req) = rx.blocking_recv() {
		let result = transform.transform(&req.block, req.sample_rate);

		bump(&stats.spectra_produced, 1);
		debug!(start = %result.window_start_time, bins = result.len(), frames = result.frame_count, "spectrum ready");

		if !tx.blocking_send(result) {
			trace!("no result consumer attached");
		}
	}

	info!("spectral stage finished");
}
