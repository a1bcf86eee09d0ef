//! Parallel resampling.
//!
//! Scaling a caption processes every output row independently, so with the
//! `rayon` feature enabled the rows are distributed across rayon's thread
//! pool. The public API is unchanged; [`crate::filter::resample`] picks this
//! path up transparently.

use ::rayon::prelude::{IndexedParallelIterator, ParallelIterator, ParallelSliceMut};

/// Run `f(row_index, row)` for every `width`-pixel row of `buffer`.
pub(crate) fn for_each_row<T, F>(buffer: &mut [T], width: usize, f: F)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Sync,
{
    buffer
        .par_chunks_mut(width.max(1))
        .enumerate()
        .for_each(|(y, row)| f(y, row));
}
