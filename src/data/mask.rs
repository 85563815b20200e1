//! Train / validation / test availability masks per series

use super::SeriesTable;

/// Availability flags aligned with `SeriesTable::series` and each series' values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesMask {
    pub flags: Vec<Vec<bool>>,
}

impl SeriesMask {
    pub fn for_series(&self, position: usize) -> Option<&[bool]> {
        self.flags.get(position).map(Vec::as_slice)
    }

    /// Number of available observations across all series
    pub fn available(&self) -> usize {
        self.flags.iter().flatten().filter(|flag| **flag).count()
    }
}

/// Split every series into train, validation and test regions.
///
/// The last `ds_in_test` observations form the test region, the `ds_in_val`
/// before them the validation region, everything earlier the train region.
/// Short series give up train observations first.
pub fn split_masks(
    series: &SeriesTable,
    ds_in_test: usize,
    ds_in_val: usize,
) -> (SeriesMask, SeriesMask, SeriesMask) {
    let mut train = SeriesMask::default();
    let mut valid = SeriesMask::default();
    let mut test = SeriesMask::default();

    for s in series.iter() {
        let len = s.len();
        let test_start = len.saturating_sub(ds_in_test);
        let valid_start = test_start.saturating_sub(ds_in_val);

        train.flags.push((0..len).map(|t| t < valid_start).collect());
        valid.flags.push((0..len).map(|t| t >= valid_start && t < test_start).collect());
        test.flags.push((0..len).map(|t| t >= test_start).collect());
    }

    (train, valid, test)
}
