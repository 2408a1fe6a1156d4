use ndarray::{ArrayD, ArrayViewD, IxDyn, Order};
use std::collections::{BTreeMap, HashSet};

use crate::types::*;
use crate::validate;

/// Folds an array of shape `(nsamples, d1, ..., dk)` into a dataset of shape
/// `(nsamples, d1 * ... * dk)`.
///
/// `labels[i]` and `values[i]` describe axis `i + 1`. Features are laid out in
/// row-major order: the last dimension varies fastest, so feature `f` sits at
/// the same position as `array[[s, ..]]` in a C-order traversal. For every
/// label a feature attribute holds the 0-based index along that axis.
///
/// The input array is not modified.
///
/// # Errors
///
/// * [`DatasetError::ShapeMismatch`] if the array rank is not one more than
///   the number of labels, or labels and value lists differ in count
/// * [`DatasetError::DimensionSizeMismatch`] if an axis length differs from
///   the number of values given for it
/// * [`DatasetError::InvalidDataset`] if a label is used twice
pub fn flatten<S: AsRef<str>>(
    array: ArrayViewD<'_, f64>,
    labels: &[S],
    values: Vec<DimValues>,
) -> Result<Dataset> {
    let ndim = array.ndim();
    if ndim == 0 || ndim - 1 != labels.len() || labels.len() != values.len() {
        return Err(DatasetError::ShapeMismatch {
            ndim,
            labels: labels.len(),
            values: values.len(),
        });
    }

    let shape = array.shape().to_vec();
    for (k, (label, dim_values)) in labels.iter().zip(&values).enumerate() {
        if shape[k + 1] != dim_values.len() {
            return Err(DatasetError::DimensionSizeMismatch {
                label: label.as_ref().to_string(),
                axis: k + 1,
                expected: dim_values.len(),
                actual: shape[k + 1],
            });
        }
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for label in labels {
        let label: &str = label.as_ref();
        if !seen.insert(label) {
            return Err(DatasetError::InvalidDataset(format!(
                "dimension label '{}' used more than once",
                label
            )));
        }
    }

    let nsamples = shape[0];
    let sizes = &shape[1..];
    let nfeatures: usize = sizes.iter().product();

    let samples = array
        .to_shape(((nsamples, nfeatures), Order::RowMajor))
        .map_err(|e| DatasetError::InvalidDataset(format!("cannot reshape array: {}", e)))?
        .into_owned();

    let mut feature_attributes = BTreeMap::new();
    for (k, label) in labels.iter().enumerate() {
        let stride: usize = sizes[k + 1..].iter().product();
        let size = sizes[k];
        let indices = (0..nfeatures).map(|f| (f / stride) % size).collect();
        feature_attributes.insert(label.as_ref().to_string(), indices);
    }

    let feature_dimensions = labels
        .iter()
        .zip(values)
        .map(|(label, values)| FeatureDim::new(label.as_ref(), values))
        .collect();

    Ok(Dataset {
        samples,
        sample_attributes: BTreeMap::new(),
        feature_attributes,
        feature_dimensions,
        dataset_attributes: BTreeMap::new(),
    })
}

/// Inverse of [`flatten`] for a dataset holding exactly one sample.
///
/// Returns the array of shape `(1, d1, ..., dk)` together with the feature
/// dimensions describing axes `1..=k`.
///
/// # Errors
///
/// * [`DatasetError::MultipleSamples`] if the dataset has more than one row
/// * [`DatasetError::InvalidDataset`] if it has none, or fails validation
pub fn unflatten(ds: &Dataset) -> Result<(ArrayD<f64>, Vec<FeatureDim>)> {
    match ds.nsamples() {
        0 => Err(DatasetError::InvalidDataset(
            "cannot unflatten a dataset without samples".to_string(),
        )),
        1 => Ok((unflatten_samples(ds)?, ds.feature_dimensions.clone())),
        n => Err(DatasetError::MultipleSamples(n)),
    }
}

/// Reconstructs the `(nsamples, d1, ..., dk)` array for any number of samples.
///
/// Each column is placed by its feature-attribute tuple, so datasets whose
/// columns were reordered or subset by [`Dataset::slice_features`] are
/// handled as well; positions without a column are zero.
pub fn unflatten_samples(ds: &Dataset) -> Result<ArrayD<f64>> {
    validate::validate(ds)?;

    let nsamples = ds.nsamples();
    let nfeatures = ds.nfeatures();
    let sizes: Vec<usize> = ds.feature_dimensions.iter().map(|d| d.len()).collect();
    let mut shape = Vec::with_capacity(sizes.len() + 1);
    shape.push(nsamples);
    shape.extend_from_slice(&sizes);

    let columns = ds
        .feature_dimensions
        .iter()
        .map(|d| {
            ds.feature_attributes
                .get(&d.label)
                .ok_or_else(|| DatasetError::MissingField(d.label.clone()))
        })
        .collect::<Result<Vec<_>>>()?;

    if nfeatures == sizes.iter().product::<usize>() && in_row_major_order(&columns, &sizes) {
        let data = ds.samples.iter().copied().collect();
        return ArrayD::from_shape_vec(IxDyn(&shape), data)
            .map_err(|e| DatasetError::InvalidDataset(format!("cannot reshape samples: {}", e)));
    }

    let mut out = ArrayD::zeros(IxDyn(&shape));
    let mut index = vec![0usize; shape.len()];
    for f in 0..nfeatures {
        for (k, column) in columns.iter().enumerate() {
            index[k + 1] = column[f];
        }
        for s in 0..nsamples {
            index[0] = s;
            out[IxDyn(&index)] = ds.samples[[s, f]];
        }
    }

    Ok(out)
}

// True if the columns enumerate the grid exactly as `flatten` produces it.
fn in_row_major_order(columns: &[&Vec<usize>], sizes: &[usize]) -> bool {
    columns.iter().enumerate().all(|(k, column)| {
        let stride: usize = sizes[k + 1..].iter().product();
        column
            .iter()
            .enumerate()
            .all(|(f, &i)| i == (f / stride) % sizes[k])
    })
}
