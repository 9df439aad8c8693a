//! FFT magnitude spectra of completed windows.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::timing::epoch::Timestamp;
use crate::vdif::samples;
use crate::window::SampleBlock;

pub mod accumulate;

// Power floor keeps empty bins finite in dB
const POWER_FLOOR:f64 = 1e-20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpectrumScale {
	Magnitude,
	Decibel,
}

impl Default for SpectrumScale {
	fn default() -> Self { SpectrumScale::Decibel }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpectralResult {
	pub frequency_axis: Vec<f64>,
	pub magnitude: Vec<f64>,
	pub window_start_time: Timestamp,
	pub sample_rate: f64,
	pub frame_count: usize,
	pub scale: SpectrumScale,
}

impl SpectralResult {

	pub fn len(&self) -> usize { self.magnitude.len() }

	pub fn is_empty(&self) -> bool { self.magnitude.is_empty() }

	/// Time spanned by the samples behind this spectrum
	pub fn duration_secs(&self) -> f64 {
		if self.sample_rate > 0.0 { self.len() as f64 / self.sample_rate } else { 0.0 }
	}

	/// Linear magnitudes regardless of the scale the result was produced in.
	pub fn linear_magnitude(&self) -> Vec<f64> {
		match self.scale {
			SpectrumScale::Magnitude => self.magnitude.clone(),
			SpectrumScale::Decibel   => self.magnitude.iter().map(|db| 10f64.powf(db / 20.0)).collect(),
		}
	}

}

/// `fftshift(fftfreq(n, 1/sample_rate))`: negative frequencies first, DC at index `n/2`.
pub fn shifted_frequency_axis(n:usize, sample_rate:f64) -> Vec<f64> {
	let step = sample_rate / n as f64;
	let half = (n / 2) as f64;
	(0..n).map(|k| (k as f64 - half) * step).collect()
}

pub fn to_decibels(magnitude:&[f64]) -> Vec<f64> {
	magnitude.iter().map(|m| 10.0 * (m * m).max(POWER_FLOOR).log10()).collect()
}

pub struct SpectralTransform {
	planner: FftPlanner<f64>,
	pub scale: SpectrumScale,
}

impl SpectralTransform {

	pub fn new(scale:SpectrumScale) -> Self { Self{ planner: FftPlanner::new(), scale } }

	/// Shifted frequency axis and magnitude of the DFT over all of `samples`.
	pub fn spectrum(&mut self, samples:&[Complex<f64>], sample_rate:f64) -> (Vec<f64>, Vec<f64>) {
		let n = samples.len();
		if n == 0 { return (vec![], vec![]); }

		let mut buffer:Vec<Complex<f64>> = samples.to_vec();
		let fft = self.planner.plan_fft_forward(n);
		fft.process(&mut buffer);

		let mut magnitude:Vec<f64> = buffer.iter().map(|c| c.norm()).collect();
		magnitude.rotate_right(n / 2);

		if self.scale == SpectrumScale::Decibel {
			magnitude = to_decibels(&magnitude);
		}

		(shifted_frequency_axis(n, sample_rate), magnitude)
	}

	pub fn transform(&mut self, block:&SampleBlock, sample_rate:f64) -> SpectralResult {
		let values = samples::unpack(&block.bytes, block.bits_per_sample, block.complex);
		trace!(samples = values.len(), "transforming window");
		let (frequency_axis, magnitude) = self.spectrum(&values, sample_rate);
		SpectralResult{ frequency_axis, magnitude, window_start_time: block.start_time, sample_rate,
			frame_count: block.frame_count, scale: self.scale }
	}

}
