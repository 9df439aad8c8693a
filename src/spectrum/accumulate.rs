//! Consumer-side accumulation of spectra: a non-coherent integrated spectrum and a scrolling
//! spectrogram.
//!
//! Window length, and with it the FFT length, shrinks whenever frames go missing. Both accumulators
//! keep the frequency grid of the first spectrum they see and interpolate shorter or longer spectra
//! onto it. Only a change of sample rate starts them over.

use std::collections::VecDeque;

use super::SpectralResult;
use crate::timing::epoch::Timestamp;

/// Linear interpolation of `values`, sampled at the ascending frequencies `axis`, at each of `grid`.
/// Points outside `axis` take the nearest end value.
pub fn regrid(axis:&[f64], values:&[f64], grid:&[f64]) -> Vec<f64> {
	let n = axis.len().min(values.len());
	if n == 0 { return vec![0.0; grid.len()]; }

	grid.iter().map(|f| {
		let hi = axis[..n].partition_point(|a| a <= f);
		if hi == 0 { return values[0]; }
		if hi == n { return values[n - 1]; }
		let lo = hi - 1;
		let span = axis[hi] - axis[lo];
		if span <= 0.0 { return values[lo]; }
		let t = (f - axis[lo]) / span;
		values[lo] + t * (values[hi] - values[lo])
	}).collect()
}

/// `values` on `grid`, interpolating only when the axes differ in length.
fn on_grid(result:&SpectralResult, values:Vec<f64>, grid:&[f64]) -> Vec<f64> {
	if values.len() == grid.len() { values } else { regrid(&result.frequency_axis, &values, grid) }
}

/// Running average of linear magnitudes (phase discarded).
#[derive(Debug, Default)]
pub struct Integrator {
	frequency_axis: Vec<f64>,
	avg: Vec<f64>,
	sample_rate: f64,
	count: usize,
}

impl Integrator {

	pub fn new() -> Self { Self::default() }

	pub fn count(&self) -> usize { self.count }

	pub fn frequency_axis(&self) -> &[f64] { &self.frequency_axis }

	pub fn average(&self) -> &[f64] { &self.avg }

	pub fn reset(&mut self) {
		self.frequency_axis.clear();
		self.avg.clear();
		self.count = 0;
	}

	/// Adds one spectrum and returns how many are in the average. Empty spectra are skipped.
	pub fn add(&mut self, result:&SpectralResult) -> usize {
		if result.is_empty() { return self.count; }
		let this_fft = result.linear_magnitude();

		if self.count == 0 || result.sample_rate != self.sample_rate {
			self.frequency_axis = result.frequency_axis.clone();
			self.sample_rate = result.sample_rate;
			self.avg = this_fft;
			self.count = 1;
			return self.count;
		}

		let this_fft = on_grid(result, this_fft, &self.frequency_axis);
		let num = self.count as f64;
		for (avg, this) in self.avg.iter_mut().zip(this_fft.iter()) {
			*avg = (this + *avg * num) / (num + 1.0);
		}
		self.count += 1;
		self.count
	}

}

/// Fixed time extent of spectra, newest row first.
#[derive(Debug)]
pub struct Spectrogram {
	pub extent_secs: f64,
	rows: VecDeque<Vec<f64>>,
	frequency_axis: Vec<f64>,
	sample_rate: f64,
	max_rows: usize,
	latest_start: Option<Timestamp>,
}

impl Spectrogram {

	pub fn new(extent_secs:f64) -> Self {
		Self{ extent_secs, rows: VecDeque::new(), frequency_axis: vec![], sample_rate: 0.0, max_rows: 0, latest_start: None }
	}

	pub fn rows(&self) -> impl Iterator<Item = &Vec<f64>> { self.rows.iter() }

	pub fn num_rows(&self) -> usize { self.rows.len() }

	pub fn capacity(&self) -> usize { self.max_rows }

	/// Frequency of each column
	pub fn frequency_axis(&self) -> &[f64] { &self.frequency_axis }

	pub fn latest_start(&self) -> Option<Timestamp> { self.latest_start }

	pub fn push(&mut self, result:&SpectralResult) {
		if result.is_empty() { return; }

		if self.rows.is_empty() || result.sample_rate != self.sample_rate {
			let row_secs = result.duration_secs();
			self.max_rows = if row_secs > 0.0 { ((self.extent_secs / row_secs).floor() as usize).max(1) } else { 1 };
			self.frequency_axis = result.frequency_axis.clone();
			self.sample_rate = result.sample_rate;
			self.rows.clear();
		}

		let row = on_grid(result, result.magnitude.clone(), &self.frequency_axis);
		self.rows.push_front(row);
		self.rows.truncate(self.max_rows);
		self.latest_start = Some(result.window_start_time);
	}

}
