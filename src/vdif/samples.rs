//! Bit-packed sample handling.
//!
//! Samples are packed into 32-bit little-endian words starting from the least significant bit and
//! never straddle a word. Complex samples are an I value followed by a Q value.

use byteorder::{ByteOrder, LittleEndian};
use num_complex::Complex;

/// Reconstruction level for the outer 2-bit states
pub const OPTIMAL_2BIT_HIGH:f64 = 3.316505;

const LEVELS_2BIT:[f64; 4] = [-OPTIMAL_2BIT_HIGH, -1.0, 1.0, OPTIMAL_2BIT_HIGH];

fn mask(bits:u8) -> u32 { if bits >= 32 { u32::MAX } else { (1u32 << bits) - 1 } }

/// Number of samples carried by a payload of `payload_len` bytes.
pub fn samples_per_payload(payload_len:usize, bits:u8, complex:bool) -> usize {
	if bits == 0 || bits > 32 { return 0; }
	let words = payload_len / 4;
	let bits = bits as usize;
	if complex {
		if 2*bits > 32 { words / 2 } else { words * (32 / (2*bits)) }
	} else {
		words * (32 / bits)
	}
}

pub fn level(raw:u32, bits:u8) -> f64 {
	match bits {
		1 => if raw & 1 == 0 { -1.0 } else { 1.0 },
		2 => LEVELS_2BIT[(raw & 0x3) as usize],
		b => raw as f64 - (1u64 << (b - 1)) as f64 + 0.5,
	}
}

fn unpack_values(bytes:&[u8], bits:u8, values_per_word:usize) -> Vec<f64> {
	let m = mask(bits);
	let mut out:Vec<f64> = Vec::with_capacity((bytes.len() / 4) * values_per_word);
	for word in bytes.chunks_exact(4).map(LittleEndian::read_u32) {
		for i in 0..values_per_word {
			let raw = if bits >= 32 { word } else { (word >> (i * bits as usize)) & m };
			out.push(level(raw, bits));
		}
	}
	out
}

/// Converts a bit-packed sample buffer into complex values (zero imaginary part for real data).
/// Trailing bytes that do not fill a whole word are ignored.
pub fn unpack(bytes:&[u8], bits:u8, complex:bool) -> Vec<Complex<f64>> {
	if bits == 0 || bits > 32 { return vec![]; }

	if !complex {
		return unpack_values(bytes, bits, 32 / bits as usize).into_iter().map(|re| Complex{ re, im: 0.0 }).collect();
	}

	// Wide complex samples use one word per component
	let per_word = if 2*(bits as usize) > 32 { 1 } else { 2 * (32 / (2 * bits as usize)) };
	unpack_values(bytes, bits, per_word).chunks_exact(2).map(|iq| Complex{ re: iq[0], im: iq[1] }).collect()
}

/// Packs raw (unsigned, offset binary) sample codes into words; the inverse of `unpack` at the code level.
pub fn pack(codes:&[u32], bits:u8) -> Vec<u8> {
	if bits == 0 || bits > 32 { return vec![]; }
	let per_word = 32 / bits as usize;
	let m = mask(bits);
	let words:Vec<u32> = codes.chunks(per_word).map(|chunk| {
		chunk.iter().enumerate().fold(0u32, |acc, (i, c)| {
			if bits >= 32 { *c } else { acc | ((c & m) << (i * bits as usize)) }
		})
	}).collect();

	let mut out = vec![0u8; words.len() * 4];
	LittleEndian::write_u32_into(&words, &mut out);
	out
}
