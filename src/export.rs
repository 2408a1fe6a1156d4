use ndarray::{Array1, Axis};

use crate::fieldtrip::{coordinate_field, DataKind, Record, DIMORD_FIELD, SAMPLES_TYPE};
use crate::flatten::unflatten;
use crate::types::*;

/// Rebuilds a structured recording from a single-sample M/EEG dataset.
///
/// The sample axis is dropped, so the result has the layout of an average:
/// `dimord` lists only the feature axes, the data goes into `avg`
/// (time-locked) or `powspctrm` (time-frequency), and every axis gets its
/// coordinate field back. Writing the record to disk is left to the caller.
///
/// # Errors
///
/// * [`DatasetError::MultipleSamples`] for more than one sample; slice the
///   dataset and export each sample separately
/// * [`DatasetError::UnexpectedDimension`] if a feature axis does not belong
///   to the data kind
pub fn to_record(ds: &Dataset) -> Result<Record> {
    let kind = data_kind(ds);
    let expected = kind.feature_dims();
    if let Some(dim) = ds
        .feature_dimensions
        .iter()
        .find(|d| !expected.contains(&d.label.as_str()))
    {
        return Err(DatasetError::UnexpectedDimension {
            dimension: dim.label.clone(),
            kind: kind.name().to_string(),
            expected: expected.iter().map(|s| s.to_string()).collect(),
        });
    }

    let (array, dims) = unflatten(ds)?;
    let data = array.index_axis_move(Axis(0), 0);

    let dimord = dims
        .iter()
        .map(|d| d.label.as_str())
        .collect::<Vec<_>>()
        .join("_");

    let mut record = Record::new()
        .with(DIMORD_FIELD, dimord)
        .with(kind.default_sample_field(), data);

    for dim in dims {
        let name = coordinate_field(&dim.label).to_string();
        match dim.values {
            DimValues::Labels(labels) => record.insert(name, labels),
            DimValues::Numeric(values) => record.insert(name, Array1::from(values).into_dyn()),
        }
    }

    Ok(record)
}

fn data_kind(ds: &Dataset) -> DataKind {
    ds.dataset_text(SAMPLES_TYPE)
        .and_then(DataKind::from_name)
        .unwrap_or(if ds.dim("freq").is_some() {
            DataKind::Freq
        } else {
            DataKind::Timelock
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fieldtrip::read_record;
    use crate::layout::SensorDescriptionLookup;
    use ndarray::{Array, ArrayD, IxDyn};

    fn avg_record() -> Record {
        let avg = Array::from_shape_fn((3, 4), |(c, t)| (c * 4 + t) as f64 * 0.5).into_dyn();
        Record::new()
            .with("dimord", "chan_time")
            .with("avg", avg)
            .with("label", vec!["Fz", "Cz", "Pz"])
            .with(
                "time",
                ArrayD::from_shape_vec(IxDyn(&[4]), vec![0.0, 0.1, 0.2, 0.3]).unwrap(),
            )
    }

    #[test]
    fn exported_record_matches_source() {
        let record = avg_record();
        let ds = read_record(&record, &SensorDescriptionLookup).unwrap();
        let exported = to_record(&ds).unwrap();

        assert_eq!(exported.text("dimord"), Some("chan_time"));
        assert_eq!(exported.array("avg"), record.array("avg"));
        assert_eq!(exported.labels("label"), record.labels("label"));
        assert_eq!(exported.array("time"), record.array("time"));
    }

    #[test]
    fn trial_data_must_be_exported_per_sample() {
        let trial = ArrayD::<f64>::ones(IxDyn(&[2, 3, 4]));
        let mut record = avg_record().with("trial", trial);
        record.insert("dimord", "rpt_chan_time");
        let ds = read_record(&record, &SensorDescriptionLookup).unwrap();

        assert!(matches!(to_record(&ds), Err(DatasetError::MultipleSamples(2))));

        let exported = to_record(&ds.slice_samples(&[1]).unwrap()).unwrap();
        assert_eq!(exported.array("avg").unwrap().shape(), &[3, 4]);
    }

    #[test]
    fn foreign_dimensions_are_refused() {
        let data = ArrayD::<f64>::zeros(IxDyn(&[1, 2]));
        let ds = crate::flatten::flatten(
            data.view(),
            &["i"],
            vec![DimValues::Numeric(vec![0.0, 1.0])],
        )
        .unwrap();
        assert!(matches!(
            to_record(&ds),
            Err(DatasetError::UnexpectedDimension { .. })
        ));
    }
}
