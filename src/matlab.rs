use std::path::Path;

use crate::fieldtrip::Record;
use crate::types::*;

/// Dependency name under which a `.mat` loader is registered.
pub const MATFILE: &str = "matfile";

/// Loads a MATLAB container into a structured record.
///
/// This is the only place the structured reader touches an external file
/// format; everything after it works on [`Record`].
pub trait MatLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Record>;
}

#[cfg(feature = "mat")]
pub use self::matfile_loader::MatFileLoader;

#[cfg(feature = "mat")]
mod matfile_loader {
    use matfile::{MatFile, NumericData};
    use ndarray::{ArrayD, IxDyn, ShapeBuilder};
    use std::fs::File;
    use std::io::BufReader;
    use std::path::Path;

    use super::MatLoader;
    use crate::fieldtrip::{parse_dimord, Field, Record, DIMORD_FIELD, SAMPLE_FIELDS};
    use crate::types::*;

    /// `matfile`-backed loader for MAT v5 files written with
    /// `save(filename, '-struct', 'data')`, i.e. one top-level variable per
    /// field of the recording.
    ///
    /// Only numeric variables can be read: char, cell and struct variables
    /// are skipped by the `matfile` parser. A FieldTrip structure has to have
    /// its text fields converted to character codes before saving:
    ///
    /// ```text
    /// data.dimord = double(data.dimord);
    /// data.label  = double(char(data.label));
    /// save('subject01.mat', '-struct', 'data');
    /// ```
    ///
    /// Numeric variables keep their MATLAB (column-major) element order.
    /// `dimord` is decoded from character codes, `label` from a character
    /// matrix holding one space-padded channel name per row.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct MatFileLoader;

    impl MatLoader for MatFileLoader {
        fn load(&self, path: &Path) -> Result<Record> {
            let file = File::open(path)?;
            let mat = MatFile::parse(BufReader::new(file))
                .map_err(|e| DatasetError::Mat(format!("{}: {:?}", path.display(), e)))?;

            let mut record = Record::new();
            for array in mat.arrays() {
                let values = numeric_values(array.data());
                let size = array.size();
                let field = match array.name() {
                    DIMORD_FIELD => Field::Text(decode_chars(&values)),
                    "label" => Field::Labels(decode_char_rows(&values, size)),
                    _ => Field::Array(column_major(values, size)?),
                };
                record.insert(array.name(), field);
            }

            log::debug!(
                "{}: loaded fields {:?}",
                path.display(),
                record.field_names().collect::<Vec<_>>()
            );
            check_required(&record, path)?;
            Ok(record)
        }
    }

    // Fields the structured reader needs, which disappear when they were
    // saved as char or cell arrays
    fn check_required(record: &Record, path: &Path) -> Result<()> {
        let unreadable = |name: &str| {
            DatasetError::Mat(format!(
                "{}: no numeric variable '{}'; char, cell and struct variables \
                 cannot be read, save them as character codes",
                path.display(),
                name
            ))
        };

        let dimord = record
            .text(DIMORD_FIELD)
            .ok_or_else(|| unreadable(DIMORD_FIELD))?;
        if !SAMPLE_FIELDS.iter().any(|(name, _)| record.contains(name)) {
            let names: Vec<&str> = SAMPLE_FIELDS.iter().map(|(name, _)| *name).collect();
            return Err(unreadable(&names.join("' or '")));
        }
        if parse_dimord(dimord).iter().any(|axis| axis == "chan") && !record.contains("label") {
            return Err(unreadable("label"));
        }
        Ok(())
    }

    // Real part of any numeric class, widened to f64
    fn numeric_values(data: &NumericData) -> Vec<f64> {
        match data {
            NumericData::Double { real, .. } => real.clone(),
            NumericData::Single { real, .. } => real.iter().map(|&v| v as f64).collect(),
            NumericData::Int8 { real, .. } => real.iter().map(|&v| v as f64).collect(),
            NumericData::UInt8 { real, .. } => real.iter().map(|&v| v as f64).collect(),
            NumericData::Int16 { real, .. } => real.iter().map(|&v| v as f64).collect(),
            NumericData::UInt16 { real, .. } => real.iter().map(|&v| v as f64).collect(),
            NumericData::Int32 { real, .. } => real.iter().map(|&v| v as f64).collect(),
            NumericData::UInt32 { real, .. } => real.iter().map(|&v| v as f64).collect(),
            NumericData::Int64 { real, .. } => real.iter().map(|&v| v as f64).collect(),
            NumericData::UInt64 { real, .. } => real.iter().map(|&v| v as f64).collect(),
        }
    }

    fn column_major(values: Vec<f64>, size: &[usize]) -> Result<ArrayD<f64>> {
        ArrayD::from_shape_vec(IxDyn(size).f(), values)
            .map_err(|e| DatasetError::Mat(format!("array of size {:?}: {}", size, e)))
    }

    fn decode_chars(codes: &[f64]) -> String {
        codes
            .iter()
            .filter_map(|&c| char::from_u32(c as u32))
            .collect::<String>()
            .trim()
            .to_string()
    }

    fn decode_char_rows(codes: &[f64], size: &[usize]) -> Vec<String> {
        let rows = size.first().copied().unwrap_or(0);
        if rows == 0 {
            return Vec::new();
        }
        let cols = codes.len() / rows;
        (0..rows)
            .map(|r| {
                let row: Vec<f64> = (0..cols).map(|c| codes[r + c * rows]).collect();
                decode_chars(&row)
            })
            .collect()
    }

}
