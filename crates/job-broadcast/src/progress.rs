use std::collections::HashMap;

/// Overall progress of a transfer that may be split into fragments.
///
/// Reported values never go down: each candidate is clamped to
/// `[last, 100]` and only a strict increase is returned.
#[derive(Debug, Default, Clone)]
pub struct DownloadProgress {
	fragments: HashMap<u32, f64>,
	last: f64,
}

impl DownloadProgress {
	pub fn new() -> Self {
		Self::default()
	}

	/// Last value handed out
	pub fn last(&self) -> f64 {
		self.last
	}

	/// Record `percent` of fragment `index` out of `count` and return the new
	/// overall value if it moved forward.
	pub fn fragment(&mut self, index: u32, count: u32, percent: f64) -> Option<f64> {
		if count == 0 {
			return self.overall(percent);
		}

		let entry = self.fragments.entry(index).or_insert(0.0);
		if percent.is_finite() && percent > *entry {
			*entry = percent.min(100.0);
		}

		let completed: u32 = self.fragments.values().map(|p| u32::from(*p >= 100.0)).sum();
		let current = if percent >= 100.0 { 0.0 } else { percent };
		self.advance(f64::from(completed).mul_add(100.0, current) / f64::from(count))
	}

	/// Record a plain overall percentage for unfragmented transfers
	pub fn overall(&mut self, percent: f64) -> Option<f64> {
		self.advance(percent)
	}

	fn advance(&mut self, candidate: f64) -> Option<f64> {
		if !candidate.is_finite() {
			return None;
		}
		let clamped = candidate.clamp(self.last, 100.0);
		if clamped > self.last {
			self.last = clamped;
			Some(clamped)
		} else {
			None
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn out_of_order_fragments_never_regress() {
		let mut progress = DownloadProgress::new();
		let mut seen = Vec::new();

		seen.extend(progress.fragment(1, 2, 20.0));
		seen.extend(progress.fragment(2, 2, 100.0));
		seen.extend(progress.fragment(1, 2, 50.0));
		seen.extend(progress.fragment(1, 2, 40.0));
		seen.extend(progress.fragment(1, 2, 100.0));

		assert!(seen.windows(2).all(|w| w[1] > w[0]), "{seen:?}");
		assert_eq!(progress.last(), 100.0);
	}

	#[test]
	fn overall_is_clamped_and_strictly_increasing() {
		let mut progress = DownloadProgress::new();
		assert_eq!(progress.overall(12.5), Some(12.5));
		assert_eq!(progress.overall(12.5), None);
		assert_eq!(progress.overall(3.0), None);
		assert_eq!(progress.overall(f64::NAN), None);
		assert_eq!(progress.overall(180.0), Some(100.0));
		assert_eq!(progress.overall(100.0), None);
	}
}
