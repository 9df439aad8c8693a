use std::io::{self, BufReader, Read};

use super::{peek_frame_len, LEGACY_HEADER_BYTES};
use crate::{Error, Result};

/// Splits a raw VDIF byte stream (for example a capture file) back into one buffer per frame,
/// using the frame length carried in each header.
pub struct FrameReader<R: Read> {
	src: BufReader<R>,
	idx: usize,
}

impl<R: Read> FrameReader<R> {

	pub fn new(src:R) -> Self { Self{ src: BufReader::new(src), idx: 0 } }

	/// Number of frames returned so far
	pub fn frames_read(&self) -> usize { self.idx }

	fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
		let mut head = [0u8; LEGACY_HEADER_BYTES];
		let mut filled = 0;
		while filled < head.len() {
			match self.src.read(&mut head[filled..]) {
				Ok(0) if filled == 0 => return Ok(None),
				Ok(0) => return Err(Error::malformed(format!("stream ends inside the header of frame {}", self.idx))),
				Ok(n) => filled += n,
				Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
				Err(e) => return Err(e.into()),
			}
		}

		let frame_len = peek_frame_len(&head)?;
		if frame_len < LEGACY_HEADER_BYTES {
			return Err(Error::malformed(format!("frame {} announces only {} bytes", self.idx, frame_len)));
		}

		let mut frame = vec![0u8; frame_len];
		frame[..LEGACY_HEADER_BYTES].copy_from_slice(&head);
		self.src.read_exact(&mut frame[LEGACY_HEADER_BYTES..]).map_err(|e| match e.kind() {
			io::ErrorKind::UnexpectedEof => Error::malformed(format!("stream ends inside frame {}", self.idx)),
			_ => Error::Io(e),
		})?;

		self.idx += 1;
		Ok(Some(frame))
	}

}

impl<R: Read> Iterator for FrameReader<R> {
	type Item = Result<Vec<u8>>;

	fn next(&mut self) -> Option<Self::Item> {
		self.read_frame().transpose()
	}
}
