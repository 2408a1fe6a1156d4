use std::collections::HashSet;

use crate::types::*;

/// Checks the structural invariants of a canonical dataset.
///
/// Used after every load and to accept inputs that already are datasets.
/// Reports the first violated invariant as [`DatasetError::InvalidDataset`].
pub fn validate(ds: &Dataset) -> Result<()> {
    let (nsamples, nfeatures) = ds.shape();

    for (name, values) in &ds.sample_attributes {
        if values.len() != nsamples {
            return Err(invalid(format!(
                "sample attribute '{}' has {} values for {} samples",
                name,
                values.len(),
                nsamples
            )));
        }
    }

    for (name, values) in &ds.feature_attributes {
        if values.len() != nfeatures {
            return Err(invalid(format!(
                "feature attribute '{}' has {} values for {} features",
                name,
                values.len(),
                nfeatures
            )));
        }
    }

    let mut labels = HashSet::new();
    let mut columns = Vec::with_capacity(ds.feature_dimensions.len());
    for dim in &ds.feature_dimensions {
        if !labels.insert(dim.label.as_str()) {
            return Err(invalid(format!(
                "feature dimension '{}' listed twice",
                dim.label
            )));
        }

        let column = ds.feature_attributes.get(&dim.label).ok_or_else(|| {
            invalid(format!(
                "feature dimension '{}' has no feature attribute",
                dim.label
            ))
        })?;

        if let Some(pos) = column.iter().position(|&i| i >= dim.len()) {
            return Err(invalid(format!(
                "feature {} has index {} along '{}', which has {} values",
                pos,
                column[pos],
                dim.label,
                dim.len()
            )));
        }
        columns.push(column);
    }

    if columns.is_empty() {
        if nfeatures > 1 {
            return Err(invalid(format!(
                "{} features share the empty coordinate tuple of a dataset without feature dimensions",
                nfeatures
            )));
        }
    } else {
        let mut seen = HashSet::with_capacity(nfeatures);
        for f in 0..nfeatures {
            let coords: Vec<usize> = columns.iter().map(|c| c[f]).collect();
            if !seen.insert(coords) {
                return Err(invalid(format!(
                    "feature {} repeats the coordinates of an earlier feature",
                    f
                )));
            }
        }
    }

    Ok(())
}

fn invalid(message: String) -> DatasetError {
    DatasetError::InvalidDataset(message)
}
