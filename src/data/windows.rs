//! Fixed-size (input, output) windows cut from series and served in batches

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use tracing::debug;

use super::{FeatureTable, SeriesMask, SeriesTable};
use crate::errors::{EnsembleError, Result};

/// How windows are cut from each series and batched
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSpec {
    pub input_size: usize,
    pub output_size: usize,
    /// Step between consecutive window cut points
    pub sample_freq: usize,
    /// Only keep windows whose input and output lie fully inside the series
    pub complete_windows: bool,
    /// One window per series whose output starts at the first masked-in observation
    pub last_window: bool,
    pub batch_size: usize,
    pub shuffle: bool,
    pub seed: u64,
}

/// One training or prediction example
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub series_id: String,
    pub insample: Vec<f64>,
    pub insample_mask: Vec<f64>,
    pub outsample: Vec<f64>,
    pub outsample_mask: Vec<f64>,
    pub static_features: Vec<f64>,
}

impl Window {
    /// Observed input values, oldest first, without left padding
    pub fn observed_insample(&self) -> Vec<f64> {
        self.insample
            .iter()
            .zip(&self.insample_mask)
            .filter(|(_, mask)| **mask > 0.0)
            .map(|(value, _)| *value)
            .collect()
    }
}

/// Batched access to a fixed set of windows
#[derive(Debug, Clone)]
pub struct WindowLoader {
    windows: Vec<Window>,
    batch_size: usize,
    shuffle: bool,
    seed: u64,
}

impl WindowLoader {
    pub fn new(windows: Vec<Window>, batch_size: usize, shuffle: bool, seed: u64) -> Self {
        Self {
            windows,
            batch_size: batch_size.max(1),
            shuffle,
            seed,
        }
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    /// Series identifiers in window order, which is also prediction order
    pub fn series_ids(&self) -> Vec<&str> {
        self.windows.iter().map(|w| w.series_id.as_str()).collect()
    }

    /// Batches for one pass over the windows. Shuffled loaders reorder per epoch, deterministically.
    pub fn batches(&self, epoch: u64) -> Vec<Vec<&Window>> {
        let mut order: Vec<usize> = (0..self.windows.len()).collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(epoch));
            order.shuffle(&mut rng);
        }

        order
            .chunks(self.batch_size)
            .map(|chunk| chunk.iter().map(|&i| &self.windows[i]).collect())
            .collect()
    }
}

/// Builds window loaders from a dataset split
pub trait LoaderFactory {
    fn build(
        &self,
        series: &SeriesTable,
        statics: Option<&FeatureTable>,
        mask: &SeriesMask,
        spec: &WindowSpec,
    ) -> Result<WindowLoader>;
}

/// In-memory loader factory cutting sliding windows
#[derive(Debug, Clone, Default)]
pub struct WindowLoaderFactory;

impl WindowLoaderFactory {
    pub fn new() -> Self {
        Self
    }

    fn cut(values: &[f64], flags: &[bool], cut: usize, spec: &WindowSpec) -> (Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>) {
        let n = values.len();
        let mut insample = Vec::with_capacity(spec.input_size);
        let mut insample_mask = Vec::with_capacity(spec.input_size);
        for offset in 0..spec.input_size {
            // t = cut - input_size + offset, padded on the left when negative
            match (cut + offset).checked_sub(spec.input_size) {
                Some(t) if t < n => {
                    insample.push(values[t]);
                    insample_mask.push(1.0);
                }
                _ => {
                    insample.push(0.0);
                    insample_mask.push(0.0);
                }
            }
        }

        let mut outsample = Vec::with_capacity(spec.output_size);
        let mut outsample_mask = Vec::with_capacity(spec.output_size);
        for t in cut..cut + spec.output_size {
            if t < n {
                outsample.push(values[t]);
                outsample_mask.push(if flags.get(t).copied().unwrap_or(false) { 1.0 } else { 0.0 });
            } else {
                outsample.push(0.0);
                outsample_mask.push(0.0);
            }
        }

        (insample, insample_mask, outsample, outsample_mask)
    }
}

impl LoaderFactory for WindowLoaderFactory {
    fn build(
        &self,
        series: &SeriesTable,
        statics: Option<&FeatureTable>,
        mask: &SeriesMask,
        spec: &WindowSpec,
    ) -> Result<WindowLoader> {
        if spec.input_size == 0 || spec.output_size == 0 {
            return Err(EnsembleError::InvalidConfig(
                "window input and output sizes must be positive".to_string(),
            ));
        }
        if spec.sample_freq == 0 || spec.batch_size == 0 {
            return Err(EnsembleError::InvalidConfig(
                "window sample_freq and batch_size must be positive".to_string(),
            ));
        }

        let static_rows = statics.map(FeatureTable::index).unwrap_or_default();

        let mut windows = Vec::new();
        for (position, s) in series.iter().enumerate() {
            let flags = mask.for_series(position).unwrap_or(&[]);
            let static_features = static_rows
                .get(s.unique_id.as_str())
                .map(|values| values.to_vec())
                .unwrap_or_default();
            let n = s.len();

            let cuts: Vec<usize> = if spec.last_window {
                vec![flags.iter().position(|flag| *flag).unwrap_or(n)]
            } else {
                let first = if spec.complete_windows { spec.input_size } else { 1 };
                (first..n).step_by(spec.sample_freq).collect()
            };

            for cut in cuts {
                let (insample, insample_mask, outsample, outsample_mask) =
                    Self::cut(&s.values, flags, cut, spec);

                if !spec.last_window {
                    let usable = if spec.complete_windows {
                        outsample_mask.iter().all(|m| *m > 0.0)
                    } else {
                        outsample_mask.iter().any(|m| *m > 0.0)
                    };
                    if !usable {
                        continue;
                    }
                }

                windows.push(Window {
                    series_id: s.unique_id.clone(),
                    insample,
                    insample_mask,
                    outsample,
                    outsample_mask,
                    static_features: static_features.clone(),
                });
            }
        }

        debug!(
            windows = windows.len(),
            input_size = spec.input_size,
            output_size = spec.output_size,
            last_window = spec.last_window,
            "Built window loader"
        );

        Ok(WindowLoader::new(windows, spec.batch_size, spec.shuffle, spec.seed))
    }
}
