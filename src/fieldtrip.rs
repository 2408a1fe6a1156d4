use ndarray::{ArrayD, ArrayViewD, Axis, Order};
use std::collections::BTreeMap;

use crate::flatten::flatten;
use crate::layout::{resolve_senstype, SensorTypeLookup};
use crate::types::*;

// Dataset attribute keys shared by every M/EEG reader
pub const SAMPLES_TYPE: &str = "meeg.samples_type";
pub const SAMPLES_FIELD: &str = "meeg.samples_field";
pub const SAMPLES_LABEL: &str = "meeg.samples_label";
pub const SENSTYPE: &str = "meeg.senstype";

/// Name of the axis-order descriptor field.
pub const DIMORD_FIELD: &str = "dimord";

/// Per-sample fields carried over when their row count matches.
const AUX_SAMPLE_FIELDS: [&str; 2] = ["trialinfo", "cumtapcnt"];

/// One value stored in a structured recording.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Text(String),
    /// Cell array of strings, e.g. channel labels
    Labels(Vec<String>),
    /// Numeric array of any rank
    Array(ArrayD<f64>),
    /// Nested structure, e.g. the `grad` sensor description
    Struct(Record),
}

impl From<&str> for Field {
    fn from(value: &str) -> Self {
        Field::Text(value.to_string())
    }
}

impl From<String> for Field {
    fn from(value: String) -> Self {
        Field::Text(value)
    }
}

impl From<Vec<String>> for Field {
    fn from(values: Vec<String>) -> Self {
        Field::Labels(values)
    }
}

impl From<Vec<&str>> for Field {
    fn from(values: Vec<&str>) -> Self {
        Field::Labels(values.into_iter().map(String::from).collect())
    }
}

impl From<ArrayD<f64>> for Field {
    fn from(array: ArrayD<f64>) -> Self {
        Field::Array(array)
    }
}

impl From<Record> for Field {
    fn from(record: Record) -> Self {
        Field::Struct(record)
    }
}

/// In-memory structured recording: named fields holding sample data, the
/// axis-order descriptor and per-axis coordinates.
///
/// # Examples
///
/// ```
/// use meeg_dataset::Record;
/// use ndarray::{ArrayD, IxDyn};
///
/// let record = Record::new()
///     .with("dimord", "chan_time")
///     .with("avg", ArrayD::<f64>::zeros(IxDyn(&[2, 3])))
///     .with("label", vec!["Cz", "Pz"])
///     .with("time", ArrayD::from_shape_vec(IxDyn(&[3]), vec![0.0, 0.1, 0.2]).unwrap());
/// assert_eq!(record.text("dimord"), Some("chan_time"));
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: BTreeMap<String, Field>,
}

impl Record {
    pub fn new() -> Self {
        Record::default()
    }

    /// Builder-style [`Record::insert`].
    pub fn with(mut self, name: impl Into<String>, field: impl Into<Field>) -> Self {
        self.insert(name, field);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, field: impl Into<Field>) {
        self.fields.insert(name.into(), field.into());
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(Field::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn labels(&self, name: &str) -> Option<&[String]> {
        match self.fields.get(name) {
            Some(Field::Labels(l)) => Some(l),
            _ => None,
        }
    }

    pub fn array(&self, name: &str) -> Option<&ArrayD<f64>> {
        match self.fields.get(name) {
            Some(Field::Array(a)) => Some(a),
            _ => None,
        }
    }
}

/// Kind of data held by a structured recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    /// Time-locked data, averaged or single trial
    Timelock,
    /// Time-frequency data
    Freq,
}

impl DataKind {
    pub fn name(&self) -> &'static str {
        match self {
            DataKind::Timelock => "timelock",
            DataKind::Freq => "freq",
        }
    }

    /// Feature axes this kind of data may have.
    pub fn feature_dims(&self) -> &'static [&'static str] {
        match self {
            DataKind::Timelock => &["chan", "time"],
            DataKind::Freq => &["chan", "freq", "time"],
        }
    }

    /// Field holding the sample data when exporting a single sample.
    pub fn default_sample_field(&self) -> &'static str {
        match self {
            DataKind::Timelock => "avg",
            DataKind::Freq => "powspctrm",
        }
    }

    pub fn from_name(name: &str) -> Option<DataKind> {
        match name {
            "timelock" => Some(DataKind::Timelock),
            "freq" => Some(DataKind::Freq),
            _ => None,
        }
    }
}

/// Sample fields in order of preference; trial data wins over averages.
pub const SAMPLE_FIELDS: [(&str, DataKind); 4] = [
    ("trial", DataKind::Timelock),
    ("individual", DataKind::Timelock),
    ("avg", DataKind::Timelock),
    ("powspctrm", DataKind::Freq),
];

/// Field holding the coordinates of a feature axis.
pub fn coordinate_field(dim: &str) -> &str {
    match dim {
        "chan" => "label",
        other => other,
    }
}

/// Splits an axis-order descriptor such as `rpt_chan_time`.
pub fn parse_dimord(dimord: &str) -> Vec<String> {
    dimord
        .split('_')
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Structured-format detection: an in-memory record carrying a descriptor.
pub fn is_structured_record(record: &Record) -> bool {
    record.text(DIMORD_FIELD).is_some()
}

/// Converts a structured recording into a canonical dataset.
///
/// When the first `dimord` entry is itself a feature axis (e.g. `chan_time`
/// for an average) the data holds a single sample and a leading sample axis is
/// synthesized. Otherwise the first axis is the sample axis and a sample
/// attribute of that name holds the 1-based sample number.
///
/// Trailing axes that MATLAB dropped because they had length one are restored
/// when the matching coordinate field has exactly one value.
pub fn read_record(record: &Record, lookup: &dyn SensorTypeLookup) -> Result<Dataset> {
    let (field, kind) = find_sample_field(record)?;
    let data = record.array(field).ok_or_else(|| {
        DatasetError::InvalidDataset(format!("sample field '{}' is not a numeric array", field))
    })?;

    let dimord = record
        .text(DIMORD_FIELD)
        .ok_or_else(|| DatasetError::MissingField(DIMORD_FIELD.to_string()))?;
    let axes = parse_dimord(dimord);
    let first = axes.first().ok_or_else(|| DatasetError::RankMismatch {
        dimord: dimord.to_string(),
        expected: 0,
        actual: data.ndim(),
    })?;

    let expected = kind.feature_dims();
    let single_sample = expected.contains(&first.as_str());
    let (sample_label, feature_axes) = if single_sample {
        (None, &axes[..])
    } else {
        (Some(first.as_str()), &axes[1..])
    };

    check_feature_axes(feature_axes, kind)?;

    let mut view: ArrayViewD<'_, f64> = data.view();
    if single_sample {
        view = view.insert_axis(Axis(0));
    }
    let view = restore_trailing_singletons(view, feature_axes, record, dimord)?;

    let values = feature_axes
        .iter()
        .map(|axis| coordinate_values(record, axis))
        .collect::<Result<Vec<_>>>()?;

    let mut ds = flatten(view, feature_axes, values)?;
    let nsamples = ds.nsamples();

    if let Some(label) = sample_label {
        ds.sample_attributes.insert(
            label.to_string(),
            AttrValues::Integer((1..=nsamples as i64).collect()),
        );
    }
    carry_aux_fields(record, &mut ds);

    ds.set_dataset_attribute(SAMPLES_TYPE, kind.name());
    ds.set_dataset_attribute(SAMPLES_FIELD, field);
    if let Some(label) = sample_label {
        ds.set_dataset_attribute(SAMPLES_LABEL, label);
    }

    let channels = record.labels("label").unwrap_or(&[]);
    if let Some(senstype) = resolve_senstype(record, channels, lookup) {
        ds.set_dataset_attribute(SENSTYPE, senstype);
    }

    log::debug!(
        "{} data from field '{}' ({}): {} samples x {} features",
        kind.name(),
        field,
        dimord,
        nsamples,
        ds.nfeatures()
    );

    Ok(ds)
}

fn find_sample_field(record: &Record) -> Result<(&'static str, DataKind)> {
    SAMPLE_FIELDS
        .iter()
        .find(|(name, _)| record.contains(name))
        .copied()
        .ok_or_else(|| {
            DatasetError::NoSampleField(SAMPLE_FIELDS.iter().map(|(f, _)| f.to_string()).collect())
        })
}

fn check_feature_axes(axes: &[String], kind: DataKind) -> Result<()> {
    let expected = kind.feature_dims();
    for (i, axis) in axes.iter().enumerate() {
        let repeated = axes[..i].contains(axis);
        if repeated || !expected.contains(&axis.as_str()) {
            return Err(DatasetError::UnexpectedDimension {
                dimension: axis.clone(),
                kind: kind.name().to_string(),
                expected: expected.iter().map(|s| s.to_string()).collect(),
            });
        }
    }
    Ok(())
}

fn restore_trailing_singletons<'a>(
    mut view: ArrayViewD<'a, f64>,
    feature_axes: &[String],
    record: &Record,
    dimord: &str,
) -> Result<ArrayViewD<'a, f64>> {
    let rank_error = |actual: usize| DatasetError::RankMismatch {
        dimord: dimord.to_string(),
        expected: feature_axes.len(),
        actual,
    };

    let feature_rank = view.ndim().checked_sub(1).ok_or_else(|| rank_error(0))?;
    if feature_rank > feature_axes.len() {
        return Err(rank_error(feature_rank));
    }

    let all_singleton = feature_axes[feature_rank..]
        .iter()
        .all(|axis| coordinate_len(record, axis) == Some(1));
    if !all_singleton {
        return Err(rank_error(feature_rank));
    }

    while view.ndim() < feature_axes.len() + 1 {
        let n = view.ndim();
        view = view.insert_axis(Axis(n));
    }
    Ok(view)
}

fn coordinate_len(record: &Record, axis: &str) -> Option<usize> {
    match record.get(coordinate_field(axis))? {
        Field::Labels(l) => Some(l.len()),
        Field::Array(a) => Some(a.len()),
        _ => None,
    }
}

fn coordinate_values(record: &Record, axis: &str) -> Result<DimValues> {
    let name = coordinate_field(axis);
    match record.get(name) {
        Some(Field::Labels(labels)) => Ok(DimValues::Labels(labels.clone())),
        Some(Field::Array(values)) => Ok(DimValues::Numeric(values.iter().copied().collect())),
        Some(_) => Err(DatasetError::InvalidDataset(format!(
            "coordinate field '{}' holds neither labels nor numbers",
            name
        ))),
        None => Err(DatasetError::MissingField(name.to_string())),
    }
}

fn carry_aux_fields(record: &Record, ds: &mut Dataset) {
    let nsamples = ds.nsamples();
    for name in AUX_SAMPLE_FIELDS {
        let Some(array) = record.array(name) else {
            continue;
        };

        let rows = array.shape().first().copied().unwrap_or(0);
        let columns = match matrix_columns(array) {
            Some(columns) if rows == nsamples => columns,
            _ => {
                log::warn!(
                    "skipping '{}': {} rows for {} samples",
                    name,
                    rows,
                    nsamples
                );
                continue;
            }
        };

        let ncols = columns.len();
        for (j, column) in columns.into_iter().enumerate() {
            let key = if ncols == 1 {
                name.to_string()
            } else {
                format!("{}_{}", name, j + 1)
            };
            ds.sample_attributes.insert(key, AttrValues::Numeric(column));
        }
    }
}

// Columns of an array viewed as rows x (product of remaining axes).
fn matrix_columns(array: &ArrayD<f64>) -> Option<Vec<Vec<f64>>> {
    let rows = *array.shape().first()?;
    let cols: usize = array.shape()[1..].iter().product();
    let matrix = array.to_shape(((rows, cols), Order::RowMajor)).ok()?;
    Some(matrix.columns().into_iter().map(|c| c.to_vec()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::SensorDescriptionLookup;
    use ndarray::{Array, IxDyn};

    fn vector(values: &[f64]) -> ArrayD<f64> {
        ArrayD::from_shape_vec(IxDyn(&[values.len()]), values.to_vec()).unwrap()
    }

    fn trial_record() -> Record {
        let trial = Array::from_shape_fn((4, 2, 3), |(r, c, t)| (r * 100 + c * 10 + t) as f64);
        Record::new()
            .with("dimord", "rpt_chan_time")
            .with("trial", trial.into_dyn())
            .with("avg", ArrayD::<f64>::zeros(IxDyn(&[2, 3])))
            .with("label", vec!["MEG0113", "MEG0112"])
            .with("time", vector(&[-0.1, 0.0, 0.1]))
    }

    fn read(record: &Record) -> Result<Dataset> {
        read_record(record, &SensorDescriptionLookup)
    }

    #[test]
    fn trial_data_is_preferred_and_first_axis_is_samples() {
        let ds = read(&trial_record()).unwrap();

        assert_eq!(ds.shape(), (4, 6));
        assert_eq!(ds.dim_labels(), vec!["chan", "time"]);
        assert_eq!(ds.sample_attributes["rpt"], AttrValues::Integer(vec![1, 2, 3, 4]));
        assert_eq!(ds.samples[[3, 4]], 311.0);
        assert_eq!(ds.dataset_text(SAMPLES_FIELD), Some("trial"));
        assert_eq!(ds.dataset_text(SAMPLES_TYPE), Some("timelock"));
        assert_eq!(ds.dataset_text(SAMPLES_LABEL), Some("rpt"));
        assert_eq!(ds.dataset_text(SENSTYPE), Some("neuromag306"));
        assert_eq!(
            ds.dim("chan").unwrap().values,
            DimValues::from(vec!["MEG0113", "MEG0112"])
        );
    }

    #[test]
    fn feature_name_first_means_single_sample() {
        let avg = Array::from_shape_fn((2, 3), |(c, t)| (c * 3 + t) as f64).into_dyn();
        let record = Record::new()
            .with("dimord", "chan_time")
            .with("avg", avg)
            .with("label", vec!["Cz", "Pz"])
            .with("time", vector(&[0.0, 0.1, 0.2]));

        let ds = read(&record).unwrap();
        assert_eq!(ds.shape(), (1, 6));
        assert!(ds.sample_attributes.is_empty());
        assert_eq!(ds.samples.row(0).to_vec(), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(ds.dataset_text(SAMPLES_LABEL), None);
    }

    #[test]
    fn freq_data_uses_frequency_axis() {
        let pow = ArrayD::<f64>::ones(IxDyn(&[3, 2, 4, 5]));
        let record = Record::new()
            .with("dimord", "rpt_chan_freq_time")
            .with("powspctrm", pow)
            .with("label", vec!["MLC11", "MRC11"])
            .with("freq", vector(&[2.0, 4.0, 8.0, 16.0]))
            .with("time", vector(&[0.0, 0.1, 0.2, 0.3, 0.4]));

        let ds = read(&record).unwrap();
        assert_eq!(ds.shape(), (3, 40));
        assert_eq!(ds.dim_labels(), vec!["chan", "freq", "time"]);
        assert_eq!(ds.dataset_text(SAMPLES_TYPE), Some("freq"));
        assert_eq!(ds.dataset_text(SENSTYPE), Some("ctf151"));
    }

    #[test]
    fn missing_sample_field() {
        let record = Record::new().with("dimord", "chan_time");
        match read(&record) {
            Err(DatasetError::NoSampleField(tried)) => assert_eq!(tried.len(), 4),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn unexpected_dimension_is_named() {
        let mut record = trial_record();
        record.insert("dimord", "rpt_chan_freq");
        match read(&record) {
            Err(DatasetError::UnexpectedDimension { dimension, .. }) => {
                assert_eq!(dimension, "freq")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn rank_disagreement_fails_loudly() {
        let mut record = trial_record();
        record.insert("dimord", "chan_time");
        record.insert("avg", ArrayD::<f64>::zeros(IxDyn(&[2, 3, 4])));
        record.insert("trial", Field::Text("not data".into()));
        assert!(matches!(
            read(&record),
            Err(DatasetError::InvalidDataset(_))
        ));

        let mut record = trial_record();
        record.insert("dimord", "rpt_time");
        assert!(matches!(
            read(&record),
            Err(DatasetError::RankMismatch {
                expected: 1,
                actual: 2,
                ..
            })
        ));
    }

    #[test]
    fn dropped_trailing_singleton_is_restored() {
        let record = Record::new()
            .with("dimord", "rpt_chan_time")
            .with("trial", ArrayD::<f64>::ones(IxDyn(&[5, 2])))
            .with("label", vec!["Cz", "Pz"])
            .with("time", vector(&[0.25]));

        let ds = read(&record).unwrap();
        assert_eq!(ds.shape(), (5, 2));
        assert_eq!(ds.feature_attributes["time"], vec![0, 0]);

        let mut record = record;
        record.insert("time", vector(&[0.25, 0.5]));
        assert!(matches!(
            read(&record),
            Err(DatasetError::RankMismatch { .. })
        ));
    }

    #[test]
    fn missing_coordinates_are_reported() {
        let mut record = trial_record();
        record.fields.remove("label");
        assert!(matches!(
            read(&record),
            Err(DatasetError::MissingField(f)) if f == "label"
        ));
    }

    #[test]
    fn auxiliary_fields_follow_sample_count() {
        let mut record = trial_record();
        let trialinfo =
            ArrayD::from_shape_vec(IxDyn(&[4, 2]), vec![1., 10., 2., 20., 1., 30., 2., 40.])
                .unwrap();
        record.insert("trialinfo", trialinfo);
        record.insert("cumtapcnt", vector(&[1.0, 1.0, 1.0]));

        let ds = read(&record).unwrap();
        assert_eq!(
            ds.sample_attributes["trialinfo_1"],
            AttrValues::Numeric(vec![1., 2., 1., 2.])
        );
        assert_eq!(
            ds.sample_attributes["trialinfo_2"],
            AttrValues::Numeric(vec![10., 20., 30., 40.])
        );
        assert!(!ds.sample_attributes.contains_key("cumtapcnt"));
    }
}
