use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use thiserror::Error;

use crate::validate;

/// Distinct values taken along one feature dimension.
///
/// Channel axes carry labels, time and frequency axes carry numeric
/// coordinates (seconds and Hz respectively), voxel axes carry grid indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DimValues {
    /// Named positions, e.g. channel labels
    Labels(Vec<String>),
    /// Numeric coordinates, e.g. time points in seconds
    Numeric(Vec<f64>),
}

impl DimValues {
    /// Number of positions along the dimension.
    pub fn len(&self) -> usize {
        match self {
            DimValues::Labels(v) => v.len(),
            DimValues::Numeric(v) => v.len(),
        }
    }

    /// True for a dimension without positions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the labels if this is a label dimension.
    pub fn as_labels(&self) -> Option<&[String]> {
        match self {
            DimValues::Labels(v) => Some(v),
            DimValues::Numeric(_) => None,
        }
    }

    /// Returns the coordinates if this is a numeric dimension.
    pub fn as_numeric(&self) -> Option<&[f64]> {
        match self {
            DimValues::Numeric(v) => Some(v),
            DimValues::Labels(_) => None,
        }
    }
}

impl From<Vec<String>> for DimValues {
    fn from(values: Vec<String>) -> Self {
        DimValues::Labels(values)
    }
}

impl From<Vec<&str>> for DimValues {
    fn from(values: Vec<&str>) -> Self {
        DimValues::Labels(values.into_iter().map(String::from).collect())
    }
}

impl From<Vec<f64>> for DimValues {
    fn from(values: Vec<f64>) -> Self {
        DimValues::Numeric(values)
    }
}

/// One named feature axis together with its values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDim {
    /// Short identifier such as `chan`, `time`, `freq`, `i`
    pub label: String,
    /// Values along the axis, in the order used to build feature indices
    pub values: DimValues,
}

impl FeatureDim {
    /// Creates a feature dimension.
    ///
    /// # Arguments
    ///
    /// * `label` - Axis identifier, e.g. `chan`
    /// * `values` - Labels or numeric coordinates along the axis
    pub fn new(label: impl Into<String>, values: impl Into<DimValues>) -> Self {
        FeatureDim {
            label: label.into(),
            values: values.into(),
        }
    }

    /// Number of positions along the axis.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A column of per-sample metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValues {
    /// Real values, e.g. reaction times
    Numeric(Vec<f64>),
    /// Integer codes, e.g. condition numbers or trial indices
    Integer(Vec<i64>),
    /// Text labels, e.g. condition names
    Text(Vec<String>),
}

impl AttrValues {
    /// Number of samples covered.
    pub fn len(&self) -> usize {
        match self {
            AttrValues::Numeric(v) => v.len(),
            AttrValues::Integer(v) => v.len(),
            AttrValues::Text(v) => v.len(),
        }
    }

    /// True if no sample is covered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Picks the given rows, in the given order. Indices must be in range.
    pub(crate) fn select(&self, indices: &[usize]) -> AttrValues {
        match self {
            AttrValues::Numeric(v) => AttrValues::Numeric(indices.iter().map(|&i| v[i]).collect()),
            AttrValues::Integer(v) => AttrValues::Integer(indices.iter().map(|&i| v[i]).collect()),
            AttrValues::Text(v) => {
                AttrValues::Text(indices.iter().map(|&i| v[i].clone()).collect())
            }
        }
    }

    /// Appends `other`; returns false (leaving `self` untouched) if the kinds differ.
    pub(crate) fn append(&mut self, other: &AttrValues) -> bool {
        match (self, other) {
            (AttrValues::Numeric(a), AttrValues::Numeric(b)) => a.extend_from_slice(b),
            (AttrValues::Integer(a), AttrValues::Integer(b)) => a.extend_from_slice(b),
            (AttrValues::Text(a), AttrValues::Text(b)) => a.extend_from_slice(b),
            _ => return false,
        }
        true
    }
}

/// A single value that can be broadcast to every sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrScalar {
    /// Real value
    Numeric(f64),
    /// Integer code
    Integer(i64),
    /// Text label
    Text(String),
}

impl AttrScalar {
    /// Replicates the value `n` times.
    pub fn repeat(&self, n: usize) -> AttrValues {
        match self {
            AttrScalar::Numeric(x) => AttrValues::Numeric(vec![*x; n]),
            AttrScalar::Integer(x) => AttrValues::Integer(vec![*x; n]),
            AttrScalar::Text(x) => AttrValues::Text(vec![x.clone(); n]),
        }
    }
}

/// Caller-supplied sample metadata: one value for all samples, or one per sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SampleAttr {
    /// Same value for every sample
    Broadcast(AttrScalar),
    /// One value per sample, in sample order
    PerSample(AttrValues),
}

impl SampleAttr {
    /// Expands to exactly `nsamples` values.
    pub fn resolve(&self, name: &str, nsamples: usize) -> Result<AttrValues> {
        match self {
            SampleAttr::Broadcast(value) => Ok(value.repeat(nsamples)),
            SampleAttr::PerSample(values) if values.len() == nsamples => Ok(values.clone()),
            SampleAttr::PerSample(values) => Err(DatasetError::AttributeLength {
                name: name.to_string(),
                expected: nsamples,
                actual: values.len(),
            }),
        }
    }
}

impl From<AttrScalar> for SampleAttr {
    fn from(value: AttrScalar) -> Self {
        SampleAttr::Broadcast(value)
    }
}

impl From<AttrValues> for SampleAttr {
    fn from(values: AttrValues) -> Self {
        SampleAttr::PerSample(values)
    }
}

impl From<f64> for SampleAttr {
    fn from(value: f64) -> Self {
        SampleAttr::Broadcast(AttrScalar::Numeric(value))
    }
}

impl From<i64> for SampleAttr {
    fn from(value: i64) -> Self {
        SampleAttr::Broadcast(AttrScalar::Integer(value))
    }
}

impl From<&str> for SampleAttr {
    fn from(value: &str) -> Self {
        SampleAttr::Broadcast(AttrScalar::Text(value.to_string()))
    }
}

impl From<Vec<f64>> for SampleAttr {
    fn from(values: Vec<f64>) -> Self {
        SampleAttr::PerSample(AttrValues::Numeric(values))
    }
}

impl From<Vec<i64>> for SampleAttr {
    fn from(values: Vec<i64>) -> Self {
        SampleAttr::PerSample(AttrValues::Integer(values))
    }
}

impl From<Vec<String>> for SampleAttr {
    fn from(values: Vec<String>) -> Self {
        SampleAttr::PerSample(AttrValues::Text(values))
    }
}

/// Free-form metadata attached to the dataset as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DatasetAttr {
    /// e.g. `meeg.samples_type`
    Text(String),
    /// Scalar value
    Number(f64),
    /// e.g. the 4x4 voxel-to-world transform of volumetric data
    Matrix(Array2<f64>),
}

impl DatasetAttr {
    /// Returns the text if this is a text attribute.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            DatasetAttr::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            DatasetAttr::Number(x) => Some(*x),
            _ => None,
        }
    }

    /// Returns the matrix if this is a matrix attribute.
    pub fn as_matrix(&self) -> Option<&Array2<f64>> {
        match self {
            DatasetAttr::Matrix(m) => Some(m),
            _ => None,
        }
    }
}

impl From<&str> for DatasetAttr {
    fn from(value: &str) -> Self {
        DatasetAttr::Text(value.to_string())
    }
}

impl From<String> for DatasetAttr {
    fn from(value: String) -> Self {
        DatasetAttr::Text(value)
    }
}

/// Canonical samples-by-features dataset.
///
/// Every reader in this crate produces one of these; the unflatten path
/// consumes it. Invariants (checked by [`crate::validate`]):
///
/// - every sample attribute has one value per row of `samples`
/// - every feature attribute has one value per column of `samples`
/// - every feature dimension has a feature attribute of the same name whose
///   values index into the dimension's values
/// - no two columns share the same coordinate tuple
///
/// # Examples
///
/// ```
/// use meeg_dataset::{flatten, DimValues};
/// use ndarray::{ArrayD, IxDyn};
///
/// let data = ArrayD::<f64>::zeros(IxDyn(&[2, 3, 4]));
/// let ds = flatten(
///     data.view(),
///     &["chan", "time"],
///     vec![
///         DimValues::from(vec!["Cz", "Pz", "Oz"]),
///         DimValues::from(vec![0.0, 0.1, 0.2, 0.3]),
///     ],
/// )
/// .unwrap();
/// assert_eq!(ds.shape(), (2, 12));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Data matrix, samples x features
    pub samples: Array2<f64>,
    /// Per-sample metadata, e.g. `targets`, `chunks`, `rpt`
    pub sample_attributes: BTreeMap<String, AttrValues>,
    /// Per-feature 0-based indices into the matching feature dimension
    pub feature_attributes: BTreeMap<String, Vec<usize>>,
    /// Feature dimensions in the order consumed by unflatten
    pub feature_dimensions: Vec<FeatureDim>,
    /// Metadata not tied to samples or features
    pub dataset_attributes: BTreeMap<String, DatasetAttr>,
}

impl Dataset {
    /// Number of rows of the sample matrix.
    pub fn nsamples(&self) -> usize {
        self.samples.nrows()
    }

    /// Number of columns of the sample matrix.
    pub fn nfeatures(&self) -> usize {
        self.samples.ncols()
    }

    /// `(nsamples, nfeatures)`
    pub fn shape(&self) -> (usize, usize) {
        self.samples.dim()
    }

    /// Looks up a feature dimension by label.
    pub fn dim(&self, label: &str) -> Option<&FeatureDim> {
        self.feature_dimensions.iter().find(|d| d.label == label)
    }

    /// Feature dimension labels, in unflatten order.
    pub fn dim_labels(&self) -> Vec<&str> {
        self.feature_dimensions
            .iter()
            .map(|d| d.label.as_str())
            .collect()
    }

    /// Index of `feature` along every feature dimension, in dimension order.
    pub fn feature_coordinates(&self, feature: usize) -> Option<Vec<usize>> {
        self.feature_dimensions
            .iter()
            .map(|d| {
                self.feature_attributes
                    .get(&d.label)
                    .and_then(|fa| fa.get(feature).copied())
            })
            .collect()
    }

    /// Text-valued dataset attribute, if present.
    pub fn dataset_text(&self, key: &str) -> Option<&str> {
        self.dataset_attributes.get(key).and_then(|a| a.as_text())
    }

    /// Adds or overwrites a sample attribute. Scalars are broadcast to every
    /// sample; vectors must have one value per sample.
    pub fn set_sample_attribute(
        &mut self,
        name: impl Into<String>,
        attr: impl Into<SampleAttr>,
    ) -> Result<()> {
        let name = name.into();
        let values = attr.into().resolve(&name, self.nsamples())?;
        self.sample_attributes.insert(name, values);
        Ok(())
    }

    /// Adds or overwrites a feature attribute. The dataset is left unchanged
    /// if the new values would break an invariant.
    pub fn set_feature_attribute(
        &mut self,
        name: impl Into<String>,
        values: Vec<usize>,
    ) -> Result<()> {
        let name = name.into();
        if values.len() != self.nfeatures() {
            return Err(DatasetError::AttributeLength {
                name,
                expected: self.nfeatures(),
                actual: values.len(),
            });
        }

        let previous = self.feature_attributes.insert(name.clone(), values);
        if let Err(e) = validate::validate(self) {
            match previous {
                Some(old) => self.feature_attributes.insert(name, old),
                None => self.feature_attributes.remove(&name),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Adds or overwrites a dataset attribute.
    pub fn set_dataset_attribute(&mut self, name: impl Into<String>, attr: impl Into<DatasetAttr>) {
        self.dataset_attributes.insert(name.into(), attr.into());
    }

    /// New dataset holding the given rows, in the given order.
    pub fn slice_samples(&self, indices: &[usize]) -> Result<Dataset> {
        check_indices(indices, self.nsamples(), "sample")?;

        Ok(Dataset {
            samples: self.samples.select(Axis(0), indices),
            sample_attributes: self
                .sample_attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.select(indices)))
                .collect(),
            feature_attributes: self.feature_attributes.clone(),
            feature_dimensions: self.feature_dimensions.clone(),
            dataset_attributes: self.dataset_attributes.clone(),
        })
    }

    /// New dataset holding the given columns, in the given order.
    ///
    /// Fails with [`DatasetError::InvalidDataset`] if a column is picked twice,
    /// since the result would contain duplicate coordinate tuples.
    pub fn slice_features(&self, indices: &[usize]) -> Result<Dataset> {
        check_indices(indices, self.nfeatures(), "feature")?;

        let sliced = Dataset {
            samples: self.samples.select(Axis(1), indices),
            sample_attributes: self.sample_attributes.clone(),
            feature_attributes: self
                .feature_attributes
                .iter()
                .map(|(k, v)| (k.clone(), indices.iter().map(|&i| v[i]).collect()))
                .collect(),
            feature_dimensions: self.feature_dimensions.clone(),
            dataset_attributes: self.dataset_attributes.clone(),
        };
        validate::validate(&sliced)?;
        Ok(sliced)
    }
}

fn check_indices(indices: &[usize], bound: usize, what: &str) -> Result<()> {
    match indices.iter().find(|&&i| i >= bound) {
        Some(i) => Err(DatasetError::InvalidDataset(format!(
            "{} index {} out of range for {} {}s",
            what, i, bound, what
        ))),
        None => Ok(()),
    }
}

/// Errors raised while building, validating or reconstituting datasets.
///
/// All of them abort the operation; no partial dataset is returned.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Array rank does not match the number of labels / value lists
    #[error("array has {ndim} axes but {labels} labels and {values} value lists were given")]
    ShapeMismatch {
        ndim: usize,
        labels: usize,
        values: usize,
    },

    /// An axis length disagrees with the number of values for its dimension
    #[error("dimension '{label}' has {expected} values but axis {axis} has size {actual}")]
    DimensionSizeMismatch {
        label: String,
        axis: usize,
        expected: usize,
        actual: usize,
    },

    /// No registered format accepts the input
    #[error("unknown format: {0}")]
    UnknownFormat(String),

    /// A format needs an external dependency that is not available
    #[error("format '{format}' requires '{dependency}', which is not available")]
    MissingDependency { format: String, dependency: String },

    /// A structured recording holds none of the known sample fields
    #[error("no sample field found (tried {})", .0.join(", "))]
    NoSampleField(Vec<String>),

    /// A structured recording names an axis its data kind does not have
    #[error("unexpected dimension '{dimension}' for {kind} data, expected one of {}", .expected.join(", "))]
    UnexpectedDimension {
        dimension: String,
        kind: String,
        expected: Vec<String>,
    },

    /// The axis-order descriptor and the array rank disagree
    #[error("dimord '{dimord}' describes {expected} feature dimensions but data has {actual}")]
    RankMismatch {
        dimord: String,
        expected: usize,
        actual: usize,
    },

    /// A text export was truncated or malformed
    #[error("incomplete read of {origin}: {reason}")]
    IncompleteRead { origin: String, reason: String },

    /// Trial boundaries could not be inferred from the timestamps
    #[error("non-contiguous data: {0}")]
    NonContiguousData(String),

    #[error("invalid dataset: {0}")]
    InvalidDataset(String),

    /// An operation limited to one sample received several
    #[error("expected exactly one sample, found {0}")]
    MultipleSamples(usize),

    /// A structured recording lacks a required field
    #[error("missing field '{0}'")]
    MissingField(String),

    /// Sample or feature attribute of the wrong length
    #[error("attribute '{name}' has {actual} values, expected {expected}")]
    AttributeLength {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The MAT container could not be parsed
    #[error("MAT error: {0}")]
    Mat(String),
}

pub type Result<T> = std::result::Result<T, DatasetError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::flatten;
    use ndarray::{ArrayD, IxDyn};

    fn small_dataset() -> Dataset {
        let data = ArrayD::from_shape_vec(IxDyn(&[3, 2, 2]), (0..12).map(f64::from).collect())
            .unwrap();
        flatten(
            data.view(),
            &["chan", "time"],
            vec![
                DimValues::from(vec!["C3", "C4"]),
                DimValues::from(vec![0.0, 0.5]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn scalar_attribute_is_broadcast() {
        let mut ds = small_dataset();
        ds.set_sample_attribute("targets", 2i64).unwrap();
        assert_eq!(
            ds.sample_attributes["targets"],
            AttrValues::Integer(vec![2, 2, 2])
        );
    }

    #[test]
    fn vector_attribute_of_wrong_length_is_rejected() {
        let mut ds = small_dataset();
        let err = ds
            .set_sample_attribute("chunks", vec![1.0, 2.0])
            .unwrap_err();
        assert!(matches!(
            err,
            DatasetError::AttributeLength {
                expected: 3,
                actual: 2,
                ..
            }
        ));
        assert!(!ds.sample_attributes.contains_key("chunks"));
    }

    #[test]
    fn invalid_feature_attribute_is_rolled_back() {
        let mut ds = small_dataset();
        let before = ds.feature_attributes["chan"].clone();
        let err = ds
            .set_feature_attribute("chan", vec![0, 0, 0, 0])
            .unwrap_err();
        assert!(matches!(err, DatasetError::InvalidDataset(_)));
        assert_eq!(ds.feature_attributes["chan"], before);

        ds.set_feature_attribute("roi", vec![7, 7, 8, 8]).unwrap();
        assert_eq!(ds.feature_attributes["roi"], vec![7, 7, 8, 8]);
    }

    #[test]
    fn slicing_keeps_attributes_aligned() {
        let mut ds = small_dataset();
        ds.set_sample_attribute("targets", vec![10i64, 20, 30])
            .unwrap();

        let rows = ds.slice_samples(&[2, 0]).unwrap();
        assert_eq!(rows.samples.row(0).to_vec(), vec![8.0, 9.0, 10.0, 11.0]);
        assert_eq!(
            rows.sample_attributes["targets"],
            AttrValues::Integer(vec![30, 10])
        );

        let cols = ds.slice_features(&[3, 1]).unwrap();
        assert_eq!(cols.feature_coordinates(0), Some(vec![1, 1]));
        assert_eq!(cols.feature_coordinates(1), Some(vec![0, 1]));
        assert_eq!(cols.samples.column(0).to_vec(), vec![3.0, 7.0, 11.0]);

        assert!(ds.slice_features(&[1, 1]).is_err());
        assert!(ds.slice_samples(&[5]).is_err());
    }
}
