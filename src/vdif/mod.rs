//! VDIF frame codec.
//!
//! A frame is a little-endian header of eight 32-bit words (four when the legacy bit is set)
//! followed by bit-packed samples. One UDP datagram carries exactly one frame.

use byteorder::{ByteOrder, LittleEndian};

use crate::{Error, Result};

pub mod reader;
pub mod samples;

pub const HEADER_BYTES:usize = 32;
pub const LEGACY_HEADER_BYTES:usize = 16;

// The frame length field counts 8-byte units
const FRAME_LENGTH_UNIT:usize = 8;

const MASK_24:u32 = 0x00FF_FFFF;
const MASK_30:u32 = 0x3FFF_FFFF;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
	pub invalid: bool,
	pub legacy: bool,
	pub seconds_from_epoch: u32,
	pub ref_epoch: u8,
	pub frame_number: u32,
	pub version: u8,
	pub log2_channels: u8,
	pub complex: bool,
	pub bits_per_sample: u8,
	pub thread_id: u16,
	pub station_id: u16,
	pub extended_user_data: [u32; 4],
	pub payload: Vec<u8>,
}

impl Frame {

	pub fn header_len(&self) -> usize { if self.legacy { LEGACY_HEADER_BYTES } else { HEADER_BYTES } }

	pub fn len(&self) -> usize { self.header_len() + self.payload.len() }

	pub fn payload_bits(&self) -> usize { self.payload.len() * 8 }

	/// Extended data version, zero for legacy frames.
	pub fn edv(&self) -> u8 { if self.legacy { 0 } else { (self.extended_user_data[0] >> 24) as u8 } }

	pub fn samples_per_frame(&self) -> usize {
		samples::samples_per_payload(self.payload.len(), self.bits_per_sample, self.complex)
	}

}

impl Default for Frame {
	fn default() -> Self {
		Frame{ invalid: false, legacy: false, seconds_from_epoch: 0, ref_epoch: 0, frame_number: 0,
			version: 0, log2_channels: 0, complex: false, bits_per_sample: 2, thread_id: 0, station_id: 0,
			extended_user_data: [0; 4], payload: vec![] }
	}
}

/// Total frame size in bytes announced by a header, given at least the first 16 bytes of it.
pub fn peek_frame_len(bytes:&[u8]) -> Result<usize> {
	if bytes.len() < LEGACY_HEADER_BYTES {
		return Err(Error::malformed(format!("{} bytes is shorter than the minimum header", bytes.len())));
	}
	let w2 = LittleEndian::read_u32(&bytes[8..12]);
	Ok(((w2 & MASK_24) as usize) * FRAME_LENGTH_UNIT)
}

pub fn decode(bytes:&[u8]) -> Result<Frame> {
	let frame_len = peek_frame_len(bytes)?;

	let w0 = LittleEndian::read_u32(&bytes[0..4]);
	let w1 = LittleEndian::read_u32(&bytes[4..8]);
	let w2 = LittleEndian::read_u32(&bytes[8..12]);
	let w3 = LittleEndian::read_u32(&bytes[12..16]);

	let invalid = (w0 >> 31) & 1 == 1;
	let legacy  = (w0 >> 30) & 1 == 1;
	let header_len = if legacy { LEGACY_HEADER_BYTES } else { HEADER_BYTES };

	if bytes.len() < header_len {
		return Err(Error::malformed(format!("{} bytes is shorter than the {} byte header", bytes.len(), header_len)));
	}
	if frame_len < header_len {
		return Err(Error::malformed(format!("frame length field of {} bytes does not cover the header", frame_len)));
	}
	if frame_len != bytes.len() {
		return Err(Error::malformed(format!("frame length field says {} bytes but datagram holds {}", frame_len, bytes.len())));
	}

	let mut extended_user_data = [0u32; 4];
	if !legacy {
		LittleEndian::read_u32_into(&bytes[16..32], &mut extended_user_data);
	}

	Ok(Frame {
		invalid,
		legacy,
		seconds_from_epoch: w0 & MASK_30,
		frame_number:       w1 & MASK_24,
		ref_epoch:          ((w1 >> 24) & 0x3F) as u8,
		version:            ((w2 >> 29) & 0x07) as u8,
		log2_channels:      ((w2 >> 24) & 0x1F) as u8,
		station_id:         (w3 & 0xFFFF) as u16,
		thread_id:          ((w3 >> 16) & 0x03FF) as u16,
		bits_per_sample:    (((w3 >> 26) & 0x1F) + 1) as u8,
		complex:            (w3 >> 31) & 1 == 1,
		extended_user_data,
		payload: bytes[header_len..].to_vec(),
	})
}

pub fn encode(frame:&Frame) -> Result<Vec<u8>> {
	let total = frame.len();
	if total % FRAME_LENGTH_UNIT != 0 {
		return Err(Error::malformed(format!("frame of {} bytes is not a multiple of {}", total, FRAME_LENGTH_UNIT)));
	}
	if frame.bits_per_sample == 0 || frame.bits_per_sample > 32 {
		return Err(Error::malformed(format!("{} bits per sample is outside 1-32", frame.bits_per_sample)));
	}
	if frame.seconds_from_epoch > MASK_30 || frame.frame_number > MASK_24 || frame.ref_epoch > 0x3F || frame.thread_id > 0x03FF {
		return Err(Error::malformed("header field exceeds its bit width"));
	}

	let units = (total / FRAME_LENGTH_UNIT) as u32;
	if units > MASK_24 {
		return Err(Error::malformed(format!("frame of {} bytes is too long to encode", total)));
	}

	let w0 = (frame.invalid as u32) << 31 | (frame.legacy as u32) << 30 | frame.seconds_from_epoch;
	let w1 = (frame.ref_epoch as u32) << 24 | frame.frame_number;
	let w2 = ((frame.version & 0x07) as u32) << 29 | ((frame.log2_channels & 0x1F) as u32) << 24 | units;
	let w3 = (frame.complex as u32) << 31 | ((frame.bits_per_sample - 1) as u32) << 26
		| (frame.thread_id as u32) << 16 | frame.station_id as u32;

	let mut out = vec![0u8; total];
	LittleEndian::write_u32_into(&[w0, w1, w2, w3], &mut out[0..16]);
	if !frame.legacy {
		LittleEndian::write_u32_into(&frame.extended_user_data, &mut out[16..32]);
	}
	out[frame.header_len()..].copy_from_slice(&frame.payload);
	Ok(out)
}
