use ndarray::Array3;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::fieldtrip::{SAMPLES_FIELD, SAMPLES_LABEL, SAMPLES_TYPE, SENSTYPE};
use crate::flatten::flatten;
use crate::layout::senstype_from_labels;
use crate::types::*;

/// Label of the sample axis for text exports: one sample per trial.
pub const TRIAL_LABEL: &str = "rpt";

/// Reads a tab-separated EEGLAB text export.
///
/// The header names the channels between a leading time column and a
/// trailing bookkeeping column. Every following row holds one time point: a
/// timestamp in milliseconds followed by one value per channel. Trials are
/// concatenated row-wise, so the trial boundaries are recovered from the
/// repeating timestamps.
pub fn read_txt_file<P: AsRef<Path>>(path: P) -> Result<Dataset> {
    let file = File::open(path.as_ref())?;
    read_txt(BufReader::new(file), &path.as_ref().display().to_string())
}

/// Like [`read_txt_file`], reading from any source. `origin` names the source
/// in error messages.
pub fn read_txt<R: Read>(reader: R, origin: &str) -> Result<Dataset> {
    let table = parse_table(reader, origin)?;
    let (ntime, ntrials) = trial_span(&table.timestamps)?;
    let nchan = table.channels.len();

    let data = Array3::from_shape_fn((ntrials, nchan, ntime), |(r, c, t)| {
        table.values[(r * ntime + t) * nchan + c]
    });
    let times: Vec<f64> = table.timestamps[..ntime]
        .iter()
        .map(|ms| ms / 1000.0)
        .collect();

    let mut ds = flatten(
        data.into_dyn().view(),
        &["chan", "time"],
        vec![
            DimValues::Labels(table.channels.clone()),
            DimValues::Numeric(times),
        ],
    )?;

    ds.sample_attributes.insert(
        TRIAL_LABEL.to_string(),
        AttrValues::Integer((1..=ntrials as i64).collect()),
    );
    ds.set_dataset_attribute(SAMPLES_TYPE, "timelock");
    ds.set_dataset_attribute(SAMPLES_FIELD, "trial");
    ds.set_dataset_attribute(SAMPLES_LABEL, TRIAL_LABEL);
    if let Some(senstype) = senstype_from_labels(&table.channels) {
        ds.set_dataset_attribute(SENSTYPE, senstype);
    }

    log::debug!(
        "{}: {} trials, {} channels, {} time points",
        origin,
        ntrials,
        nchan,
        ntime
    );

    Ok(ds)
}

// Parsed rows before trial inference
struct Table {
    channels: Vec<String>,
    timestamps: Vec<f64>,
    // row-major, one row of `channels.len()` values per timestamp
    values: Vec<f64>,
}

fn parse_table<R: Read>(reader: R, origin: &str) -> Result<Table> {
    let incomplete = |reason: String| DatasetError::IncompleteRead {
        origin: origin.to_string(),
        reason,
    };

    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut records = csv_reader.records();

    let header = records
        .next()
        .ok_or_else(|| incomplete("missing header line".to_string()))??;
    if header.len() < 3 {
        return Err(incomplete("header names no channels".to_string()));
    }
    let channels: Vec<String> = header
        .iter()
        .skip(1)
        .take(header.len() - 2)
        .map(String::from)
        .collect();
    let nchan = channels.len();

    let mut timestamps = Vec::new();
    let mut values = Vec::new();
    for (i, record) in records.enumerate() {
        let record = record?;
        let line = i + 2;

        if record.iter().all(str::is_empty) {
            continue;
        }
        if record.len() < nchan + 1 {
            return Err(incomplete(format!(
                "line {} has {} values, expected {}",
                line,
                record.len(),
                nchan + 1
            )));
        }
        if record.iter().skip(nchan + 1).any(|f| !f.is_empty()) {
            return Err(incomplete(format!("line {} has trailing values", line)));
        }

        for (j, field) in record.iter().take(nchan + 1).enumerate() {
            let value: f64 = field.parse().map_err(|_| {
                incomplete(format!("line {}: cannot parse '{}' as a number", line, field))
            })?;
            if j == 0 {
                timestamps.push(value);
            } else {
                values.push(value);
            }
        }
    }

    if timestamps.is_empty() {
        return Err(incomplete("no data rows".to_string()));
    }

    Ok(Table {
        channels,
        timestamps,
        values,
    })
}

/// Finds the per-trial time span `(ntime, ntrials)`.
///
/// One trial runs from the first occurrence of the smallest timestamp to the
/// first occurrence of the largest. The data is accepted only if it starts
/// with that span and consists of whole repetitions of it.
fn trial_span(timestamps: &[f64]) -> Result<(usize, usize)> {
    let first_extreme = |better: fn(f64, f64) -> bool| {
        timestamps
            .iter()
            .enumerate()
            .fold(0, |best, (i, &t)| if better(t, timestamps[best]) { i } else { best })
    };
    let min_pos = first_extreme(|a, b| a < b);
    let max_pos = first_extreme(|a, b| a > b);

    if min_pos != 0 {
        return Err(DatasetError::NonContiguousData(format!(
            "smallest timestamp first occurs at row {}, expected row 1",
            min_pos + 1
        )));
    }

    let ntime = max_pos - min_pos + 1;
    let nrows = timestamps.len();
    if nrows % ntime != 0 {
        return Err(DatasetError::NonContiguousData(format!(
            "{} rows is not a multiple of the {} time points per trial",
            nrows, ntime
        )));
    }

    let template = &timestamps[..ntime];
    if let Some(row) = (0..nrows).find(|&r| timestamps[r] != template[r % ntime]) {
        return Err(DatasetError::NonContiguousData(format!(
            "timestamp {} at row {} breaks the trial pattern",
            timestamps[row],
            row + 1
        )));
    }

    Ok((ntime, nrows / ntime))
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2 trials x 3 channels x 4 time points; value = trial*100 + chan*10 + t
    fn export(timestamps: &[f64; 8]) -> String {
        let mut text = String::from("Time\tFz\tCz\tPz\t\n");
        for (row, ms) in timestamps.iter().enumerate() {
            let (trial, t) = (row / 4, row % 4);
            text.push_str(&format!("{}", ms));
            for c in 0..3 {
                text.push_str(&format!("\t{}", trial * 100 + c * 10 + t));
            }
            text.push_str("\t\n");
        }
        text
    }

    const TIMES: [f64; 8] = [0., 1., 2., 3., 0., 1., 2., 3.];

    #[test]
    fn trials_are_inferred_from_repeating_timestamps() {
        let ds = read_txt(export(&TIMES).as_bytes(), "test").unwrap();

        assert_eq!(ds.shape(), (2, 12));
        assert_eq!(ds.dim_labels(), vec!["chan", "time"]);
        assert_eq!(
            ds.dim("chan").unwrap().values,
            DimValues::from(vec!["Fz", "Cz", "Pz"])
        );
        assert_eq!(
            ds.dim("time").unwrap().values,
            DimValues::Numeric(vec![0.0, 0.001, 0.002, 0.003])
        );
        assert_eq!(ds.sample_attributes[TRIAL_LABEL], AttrValues::Integer(vec![1, 2]));
        // trial 1, chan 2, time 3
        assert_eq!(ds.samples[[1, 11]], 123.0);
        assert_eq!(ds.dataset_text(SAMPLES_TYPE), Some("timelock"));
        assert_eq!(ds.dataset_text(SENSTYPE), Some("eeg1020"));
    }

    #[test]
    fn broken_repetition_is_rejected() {
        let mut times = TIMES;
        times[6] = 5.0;
        let err = read_txt(export(&times).as_bytes(), "test").unwrap_err();
        assert!(matches!(err, DatasetError::NonContiguousData(_)));
    }

    #[test]
    fn data_must_start_at_minimum() {
        let times = [1., 2., 3., 0., 1., 2., 3., 0.];
        let err = read_txt(export(&times).as_bytes(), "test").unwrap_err();
        assert!(matches!(err, DatasetError::NonContiguousData(_)));
    }

    #[test]
    fn partial_trial_is_rejected() {
        let text = export(&TIMES);
        let truncated: String = text.lines().take(8).map(|l| format!("{}\n", l)).collect();
        let err = read_txt(truncated.as_bytes(), "test").unwrap_err();
        assert!(matches!(err, DatasetError::NonContiguousData(_)));
    }

    #[test]
    fn truncated_row_is_incomplete() {
        let mut text = export(&TIMES);
        text.push_str("4\t1.0\n");
        let err = read_txt(text.as_bytes(), "test").unwrap_err();
        assert!(matches!(err, DatasetError::IncompleteRead { .. }));
    }

    #[test]
    fn garbage_value_is_incomplete() {
        let text = export(&TIMES).replacen("\t110", "\tn/a", 1);
        let err = read_txt(text.as_bytes(), "test").unwrap_err();
        assert!(matches!(err, DatasetError::IncompleteRead { .. }));
    }

    #[test]
    fn header_only_is_incomplete() {
        let err = read_txt("Time\tFz\t\n".as_bytes(), "test").unwrap_err();
        match err {
            DatasetError::IncompleteRead { origin, reason } => {
                assert_eq!(origin, "test");
                assert_eq!(reason, "no data rows");
            }
            other => panic!("unexpected: {other}"),
        }
    }
}
