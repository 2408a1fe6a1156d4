//! Canonical samples-by-features datasets for multivariate pattern analysis
//! of M/EEG and volumetric neuroimaging data.
//!
//! Readers turn FieldTrip-style structured recordings (in memory or in
//! `.mat` files) and EEGLAB text exports into a [`Dataset`]: a 2-D sample
//! matrix plus sample, feature and dataset attributes. [`flatten`] and
//! [`unflatten`] convert between that form and the original N-dimensional
//! array.

pub mod eeglab_txt;
pub mod export;
pub mod fieldtrip;
pub mod flatten;
pub mod layout;
pub mod matlab;
mod reader;
pub mod registry;
pub mod types;
pub mod validate;
pub mod volume;

use std::path::Path;

// Re-export types
pub use fieldtrip::{DataKind, Field, Record};
pub use flatten::{flatten, unflatten, unflatten_samples};
pub use reader::{stack, LoadOptions, Loader, CHUNKS, TARGETS};
pub use registry::{Capabilities, FormatAdapter, FormatRegistry, Input};
pub use types::*;
pub use validate::validate;

/// Loads a FieldTrip `.mat` file or an EEGLAB `.txt` export with the
/// built-in formats and no extra sample attributes.
///
/// # Examples
///
/// ```no_run
/// use meeg_dataset::load;
///
/// let result = load("path/to/subject01_timelock.mat");
/// match result {
///     Ok(ds) => println!("{} samples x {} features", ds.nsamples(), ds.nfeatures()),
///     Err(e) => println!("Error loading file: {}", e),
/// }
/// ```
pub fn load<P: AsRef<Path>>(file_path: P) -> Result<Dataset> {
    Loader::default().load(file_path.as_ref(), &LoadOptions::default())
}

/// Loads any supported input (path, in-memory [`Record`] or existing
/// [`Dataset`]) and attaches the sample attributes given in `options`.
pub fn load_with(input: impl Into<Input>, options: &LoadOptions) -> Result<Dataset> {
    Loader::default().load(input, options)
}
