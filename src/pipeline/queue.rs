//! Bounded hand-off between two stages.
//!
//! Live reception keeps the newest work: a full queue evicts its oldest item and the receiving side
//! counts what it missed. Offline replay must not lose anything, so its producers wait for room.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::sync::mpsc;
use tracing::warn;

use super::stats::{bump, SessionStats};

/// What a full queue does when another item arrives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overflow {
	/// Evict the oldest queued item
	DropOldest,
	/// Hold the producer until the consumer makes room
	Wait,
}

/// Picks the counter that evictions are charged to
pub(crate) type EvictionCounter = fn(&SessionStats) -> &AtomicU64;

pub(crate) enum QueueSender<T> {
	Latest(broadcast::Sender<T>),
	Every(mpsc::Sender<T>),
}

enum Inner<T> {
	Latest(broadcast::Receiver<T>),
	Every(mpsc::Receiver<T>),
}

pub(crate) struct QueueReceiver<T> {
	inner: Inner<T>,
	name: &'static str,
	stats: Arc<SessionStats>,
	evicted: EvictionCounter,
}

/// `depth` below one is raised to one. With `Overflow::DropOldest` the depth is rounded up to a
/// power of two.
pub(crate) fn bounded<T: Clone>(name:&'static str, depth:usize, overflow:Overflow, stats:Arc<SessionStats>,
	evicted:EvictionCounter) -> (QueueSender<T>, QueueReceiver<T>)
{
	let depth = depth.max(1);
	let (tx, inner) = match overflow {
		Overflow::DropOldest => {
			let (tx, rx) = broadcast::channel(depth);
			(QueueSender::Latest(tx), Inner::Latest(rx))
		},
		Overflow::Wait => {
			let (tx, rx) = mpsc::channel(depth);
			(QueueSender::Every(tx), Inner::Every(rx))
		},
	};
	(tx, QueueReceiver{ inner, name, stats, evicted })
}

impl<T> QueueSender<T> {

	/// Returns false once the receiving end is gone.
	pub async fn send(&self, item:T) -> bool {
		match self {
			QueueSender::Latest(tx) => tx.send(item).is_ok(),
			QueueSender::Every(tx)  => tx.send(item).await.is_ok(),
		}
	}

	/// Same as `send`, for threads outside the runtime.
	pub fn blocking_send(&self, item:T) -> bool {
		match self {
			QueueSender::Latest(tx) => tx.send(item).is_ok(),
			QueueSender::Every(tx)  => tx.blocking_send(item).is_ok(),
		}
	}

}

impl<T: Clone> QueueReceiver<T> {

	fn lagged(&self, n:u64) {
		warn!(queue = self.name, evicted = n, "consumer fell behind, oldest items discarded");
		bump((self.evicted)(&self.stats), n);
	}

	/// Next item in order, or `None` once every sender is gone and the queue is empty.
	pub async fn recv(&mut self) -> Option<T> {
		loop {
			let missed = match &mut self.inner {
				Inner::Every(rx) => return rx.recv().await,
				Inner::Latest(rx) => match rx.recv().await {
					Ok(item) => return Some(item),
					Err(RecvError::Lagged(n)) => n,
					Err(RecvError::Closed) => return None,
				},
			};
			self.lagged(missed);
		}
	}

	pub fn blocking_recv(&mut self) -> Option<T> {
		loop {
			let missed = match &mut self.inner {
				Inner::Every(rx) => return rx.blocking_recv(),
				Inner::Latest(rx) => match rx.blocking_recv() {
					Ok(item) => return Some(item),
					Err(RecvError::Lagged(n)) => n,
					Err(RecvError::Closed) => return None,
				},
			};
			self.lagged(missed);
		}
	}

	/// Next item if one is queued right now.
	pub fn try_recv(&mut self) -> Option<T> {
		loop {
			let missed = match &mut self.inner {
				Inner::Every(rx) => return rx.try_recv().ok(),
				Inner::Latest(rx) => match rx.try_recv() {
					Ok(item) => return Some(item),
					Err(TryRecvError::Lagged(n)) => n,
					Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
				},
			};
			self.lagged(missed);
		}
	}

}
