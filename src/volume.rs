use ndarray::{arr1, Array2, Array4, ArrayView4, Ix4};

use crate::flatten::{flatten, unflatten_samples};
use crate::types::*;

/// Dataset attribute holding the 4x4 voxel-to-world transform.
pub const VOLUME_TRANSFORM: &str = "vol.mat";

/// Feature dimension labels of the voxel grid.
pub const VOXEL_DIMS: [&str; 3] = ["i", "j", "k"];

/// Flattens volumetric data of shape `(nsamples, ni, nj, nk)`.
///
/// Each voxel becomes one feature with indices along `i`, `j`, `k`; the
/// affine transform is kept as dataset attribute [`VOLUME_TRANSFORM`].
pub fn from_volume(data: ArrayView4<'_, f64>, affine: &Array2<f64>) -> Result<Dataset> {
    check_affine(affine)?;

    let (_, ni, nj, nk) = data.dim();
    let grid = |n: usize| DimValues::Numeric((0..n).map(|v| v as f64).collect());

    let mut ds = flatten(data.into_dyn(), &VOXEL_DIMS, vec![grid(ni), grid(nj), grid(nk)])?;
    ds.set_dataset_attribute(VOLUME_TRANSFORM, DatasetAttr::Matrix(affine.clone()));
    Ok(ds)
}

/// Inverse of [`from_volume`], for any number of samples.
pub fn to_volume(ds: &Dataset) -> Result<(Array4<f64>, Array2<f64>)> {
    if let Some(dim) = ds
        .feature_dimensions
        .iter()
        .zip(VOXEL_DIMS)
        .find(|(d, label)| d.label != *label)
        .map(|(d, _)| d)
    {
        return Err(DatasetError::UnexpectedDimension {
            dimension: dim.label.clone(),
            kind: "volume".to_string(),
            expected: VOXEL_DIMS.iter().map(|s| s.to_string()).collect(),
        });
    }
    if ds.feature_dimensions.len() != VOXEL_DIMS.len() {
        return Err(DatasetError::RankMismatch {
            dimord: VOXEL_DIMS.join("_"),
            expected: VOXEL_DIMS.len(),
            actual: ds.feature_dimensions.len(),
        });
    }

    let affine = transform(ds)?.clone();
    let data = unflatten_samples(ds)?
        .into_dimensionality::<Ix4>()
        .map_err(|e| DatasetError::InvalidDataset(format!("not a volume: {}", e)))?;
    Ok((data, affine))
}

/// World coordinates of the voxel behind `feature`.
pub fn voxel_position(ds: &Dataset, feature: usize) -> Result<[f64; 3]> {
    let affine = transform(ds)?;
    let coords = ds.feature_coordinates(feature).ok_or_else(|| {
        DatasetError::InvalidDataset(format!("no coordinates for feature {}", feature))
    })?;
    if coords.len() != 3 {
        return Err(DatasetError::RankMismatch {
            dimord: VOXEL_DIMS.join("_"),
            expected: 3,
            actual: coords.len(),
        });
    }

    let voxel = arr1(&[coords[0] as f64, coords[1] as f64, coords[2] as f64, 1.0]);
    let world = affine.dot(&voxel);
    Ok([world[0], world[1], world[2]])
}

fn transform(ds: &Dataset) -> Result<&Array2<f64>> {
    let affine = ds
        .dataset_attributes
        .get(VOLUME_TRANSFORM)
        .and_then(DatasetAttr::as_matrix)
        .ok_or_else(|| DatasetError::MissingField(VOLUME_TRANSFORM.to_string()))?;
    check_affine(affine)?;
    Ok(affine)
}

fn check_affine(affine: &Array2<f64>) -> Result<()> {
    if affine.dim() != (4, 4) {
        return Err(DatasetError::InvalidDataset(format!(
            "voxel transform must be 4x4, got {:?}",
            affine.dim()
        )));
    }
    Ok(())
}
