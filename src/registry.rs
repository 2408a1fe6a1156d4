use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::eeglab_txt::read_txt_file;
use crate::fieldtrip::{is_structured_record, read_record, Record};
use crate::layout::{SensorDescriptionLookup, SensorTypeLookup};
use crate::matlab::{MatLoader, MATFILE};
use crate::types::*;
use crate::validate::validate;

/// Anything a dataset can be loaded from.
#[derive(Debug, Clone)]
pub enum Input {
    /// File on disk, classified by extension
    Path(PathBuf),
    /// Structured recording already in memory
    Record(Record),
    /// Dataset that is already canonical; only validated
    Dataset(Dataset),
}

impl Input {
    /// Lower-cased file extension, for path inputs.
    pub fn extension(&self) -> Option<String> {
        match self {
            Input::Path(p) => p
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase()),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Input::Path(p) => Some(p),
            _ => None,
        }
    }
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Input::Path(p) => write!(f, "{}", p.display()),
            Input::Record(r) => write!(
                f,
                "record with fields [{}]",
                r.field_names().collect::<Vec<_>>().join(", ")
            ),
            Input::Dataset(ds) => write!(f, "dataset {}x{}", ds.nsamples(), ds.nfeatures()),
        }
    }
}

impl From<PathBuf> for Input {
    fn from(path: PathBuf) -> Self {
        Input::Path(path)
    }
}

impl From<&Path> for Input {
    fn from(path: &Path) -> Self {
        Input::Path(path.to_path_buf())
    }
}

impl From<&str> for Input {
    fn from(path: &str) -> Self {
        Input::Path(PathBuf::from(path))
    }
}

impl From<Record> for Input {
    fn from(record: Record) -> Self {
        Input::Record(record)
    }
}

impl From<Dataset> for Input {
    fn from(ds: Dataset) -> Self {
        Input::Dataset(ds)
    }
}

/// External capabilities available to readers.
///
/// Format adapters name the dependencies they need; [`Capabilities::has`]
/// answers whether each one is present. `matfile` is present when a `.mat`
/// loader is installed; any other name is present once it has been declared
/// with [`Capabilities::with_dependency`].
pub struct Capabilities {
    mat_loader: Option<Box<dyn MatLoader>>,
    sensor_lookup: Box<dyn SensorTypeLookup>,
    provided: BTreeSet<String>,
}

impl Default for Capabilities {
    /// Everything compiled into this build.
    fn default() -> Self {
        let caps = Capabilities::none();
        #[cfg(feature = "mat")]
        let caps = caps.with_mat_loader(crate::matlab::MatFileLoader);
        caps
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("mat_loader", &self.mat_loader.is_some())
            .field("provided", &self.provided)
            .finish()
    }
}

impl Capabilities {
    /// No optional dependencies at all.
    pub fn none() -> Self {
        Capabilities {
            mat_loader: None,
            sensor_lookup: Box::new(SensorDescriptionLookup),
            provided: BTreeSet::new(),
        }
    }

    /// Marks a named dependency of a custom adapter as available.
    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.provided.insert(name.into());
        self
    }

    /// Installs the loader used by the `ft_mat` format.
    pub fn with_mat_loader(mut self, loader: impl MatLoader + 'static) -> Self {
        self.mat_loader = Some(Box::new(loader));
        self
    }

    /// Removes the `.mat` loader, so `ft_mat` reports a missing `matfile`.
    pub fn without_mat_loader(mut self) -> Self {
        self.mat_loader = None;
        self
    }

    /// Replaces the primary sensor-type lookup.
    pub fn with_sensor_lookup(mut self, lookup: impl SensorTypeLookup + 'static) -> Self {
        self.sensor_lookup = Box::new(lookup);
        self
    }

    /// Presence test for a named dependency.
    pub fn has(&self, dependency: &str) -> bool {
        match dependency {
            MATFILE => self.mat_loader.is_some(),
            other => self.provided.contains(other),
        }
    }

    pub fn mat_loader(&self) -> Option<&dyn MatLoader> {
        self.mat_loader.as_deref()
    }

    pub fn sensor_lookup(&self) -> &dyn SensorTypeLookup {
        self.sensor_lookup.as_ref()
    }
}

/// Cheap classification of an input; must not parse it.
pub type Predicate = fn(&Input) -> bool;

/// Produces a dataset from an input accepted by the matching predicate.
pub type ReaderFn = fn(Input, &Capabilities) -> Result<Dataset>;

/// One entry of the format table.
#[derive(Clone, Copy)]
pub struct FormatAdapter {
    pub name: &'static str,
    pub matches: Predicate,
    pub reader: ReaderFn,
    /// External dependencies that must be present before `reader` runs
    pub dependencies: &'static [&'static str],
}

impl fmt::Debug for FormatAdapter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FormatAdapter")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

impl FormatAdapter {
    /// Fails with the first dependency that is not available.
    pub fn check_dependencies(&self, caps: &Capabilities) -> Result<()> {
        match self.dependencies.iter().find(|d| !caps.has(d)) {
            Some(missing) => Err(DatasetError::MissingDependency {
                format: self.name.to_string(),
                dependency: missing.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Checks dependencies, then runs the reader.
    pub fn read(&self, input: Input, caps: &Capabilities) -> Result<Dataset> {
        self.check_dependencies(caps)?;
        (self.reader)(input, caps)
    }
}

/// Ordered table of format adapters; the first matching entry wins.
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    adapters: Vec<FormatAdapter>,
}

impl Default for FormatRegistry {
    /// The built-in formats: canonical datasets, EEGLAB text exports,
    /// FieldTrip `.mat` files and in-memory FieldTrip records.
    fn default() -> Self {
        let mut registry = FormatRegistry::new();
        registry.register(FormatAdapter {
            name: "dataset",
            matches: |input| matches!(input, Input::Dataset(_)),
            reader: read_dataset,
            dependencies: &[],
        });
        registry.register(FormatAdapter {
            name: "eeglab_txt",
            matches: |input| input.extension().as_deref() == Some("txt"),
            reader: read_eeglab_txt,
            dependencies: &[],
        });
        registry.register(FormatAdapter {
            name: "ft_mat",
            matches: |input| input.extension().as_deref() == Some("mat"),
            reader: read_ft_mat,
            dependencies: &[MATFILE],
        });
        registry.register(FormatAdapter {
            name: "ft_record",
            matches: |input| matches!(input, Input::Record(r) if is_structured_record(r)),
            reader: read_ft_record,
            dependencies: &[],
        });
        registry
    }
}

impl FormatRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        FormatRegistry {
            adapters: Vec::new(),
        }
    }

    /// Appends an adapter; it is tried after every existing one.
    pub fn register(&mut self, adapter: FormatAdapter) {
        self.adapters.push(adapter);
    }

    pub fn adapters(&self) -> &[FormatAdapter] {
        &self.adapters
    }

    /// First adapter whose predicate accepts `input`.
    pub fn find(&self, input: &Input) -> Result<&FormatAdapter> {
        self.adapters
            .iter()
            .find(|a| (a.matches)(input))
            .ok_or_else(|| DatasetError::UnknownFormat(input.to_string()))
    }
}

fn read_dataset(input: Input, _: &Capabilities) -> Result<Dataset> {
    match input {
        Input::Dataset(ds) => {
            validate(&ds)?;
            Ok(ds)
        }
        other => Err(DatasetError::UnknownFormat(other.to_string())),
    }
}

fn read_eeglab_txt(input: Input, _: &Capabilities) -> Result<Dataset> {
    match input {
        Input::Path(path) => read_txt_file(path),
        other => Err(DatasetError::UnknownFormat(other.to_string())),
    }
}

fn read_ft_mat(input: Input, caps: &Capabilities) -> Result<Dataset> {
    let path = match input {
        Input::Path(path) => path,
        other => return Err(DatasetError::UnknownFormat(other.to_string())),
    };
    let loader = caps
        .mat_loader()
        .ok_or_else(|| DatasetError::MissingDependency {
            format: "ft_mat".to_string(),
            dependency: MATFILE.to_string(),
        })?;
    let record = loader.load(&path)?;
    read_record(&record, caps.sensor_lookup())
}

fn read_ft_record(input: Input, caps: &Capabilities) -> Result<Dataset> {
    match input {
        Input::Record(record) => read_record(&record, caps.sensor_lookup()),
        other => Err(DatasetError::UnknownFormat(other.to_string())),
    }
}
