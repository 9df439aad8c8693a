use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::{Error, Result};

/// Verbatim, unframed copy of every datagram, appended in arrival order while the toggle is on.
/// Owned by the receive stage alone.
pub struct CaptureSink {
	writer: Option<BufWriter<Box<dyn Write + Send>>>,
	enabled: Arc<AtomicBool>,
}

impl CaptureSink {

	pub fn none(enabled:Arc<AtomicBool>) -> Self { Self{ writer: None, enabled } }

	pub fn from_writer(writer:Box<dyn Write + Send>, enabled:Arc<AtomicBool>) -> Self {
		Self{ writer: Some(BufWriter::new(writer)), enabled }
	}

	/// Creates (truncating) the file at `path`.
	pub fn create(path:&Path, enabled:Arc<AtomicBool>) -> Result<Self> {
		let f = File::create(path).map_err(|source| Error::Sink{ path: path.to_path_buf(), source })?;
		Ok(Self::from_writer(Box::new(f), enabled))
	}

	pub fn is_open(&self) -> bool { self.writer.is_some() }

	/// Returns whether the datagram was written.
	pub fn append(&mut self, datagram:&[u8]) -> io::Result<bool> {
		match self.writer.as_mut() {
			Some(w) if self.enabled.load(Ordering::Relaxed) => {
				w.write_all(datagram)?;
				Ok(true)
			},
			_ => Ok(false),
		}
	}

	pub fn close(&mut self) -> io::Result<()> {
		match self.writer.take() {
			Some(mut w) => w.flush(),
			None => Ok(()),
		}
	}

}
