use ndarray::{concatenate, Axis};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::registry::{Capabilities, FormatRegistry, Input};
use crate::types::*;
use crate::validate::validate;

/// Sample attribute set from [`LoadOptions::targets`].
pub const TARGETS: &str = "targets";
/// Sample attribute set from [`LoadOptions::chunks`].
pub const CHUNKS: &str = "chunks";

/// Caller-supplied sample metadata applied after reading.
///
/// Scalars are broadcast to every sample; vectors must have one value per
/// sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Condition labels
    pub targets: Option<SampleAttr>,
    /// Independence groups, e.g. runs
    pub chunks: Option<SampleAttr>,
    /// Any further named sample attributes
    pub sample_attributes: Vec<(String, SampleAttr)>,
}

impl LoadOptions {
    /// Sets the condition labels.
    pub fn targets(mut self, targets: impl Into<SampleAttr>) -> Self {
        self.targets = Some(targets.into());
        self
    }

    /// Sets the independence groups.
    pub fn chunks(mut self, chunks: impl Into<SampleAttr>) -> Self {
        self.chunks = Some(chunks.into());
        self
    }

    /// Adds a further named sample attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: impl Into<SampleAttr>) -> Self {
        self.sample_attributes.push((name.into(), attr.into()));
        self
    }

    fn apply(&self, ds: &mut Dataset) -> Result<()> {
        if let Some(targets) = &self.targets {
            ds.set_sample_attribute(TARGETS, targets.clone())?;
        }
        if let Some(chunks) = &self.chunks {
            ds.set_sample_attribute(CHUNKS, chunks.clone())?;
        }
        for (name, attr) in &self.sample_attributes {
            ds.set_sample_attribute(name.clone(), attr.clone())?;
        }
        Ok(())
    }
}

/// Format table plus the capabilities its readers may use.
#[derive(Debug, Default)]
pub struct Loader {
    registry: FormatRegistry,
    capabilities: Capabilities,
}

impl Loader {
    /// Creates a loader from a format table and the capabilities its
    /// readers may use.
    pub fn new(registry: FormatRegistry, capabilities: Capabilities) -> Self {
        Loader {
            registry,
            capabilities,
        }
    }

    /// The format table.
    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    /// Mutable format table, for registering custom adapters.
    pub fn registry_mut(&mut self) -> &mut FormatRegistry {
        &mut self.registry
    }

    /// The capabilities passed to readers.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Loads any supported input into a validated canonical dataset.
    ///
    /// The input is classified by the format registry, the matching reader's
    /// dependencies are checked, the reader runs, the options' sample
    /// attributes are attached, and the result is validated. Any failure
    /// aborts the load.
    ///
    /// # Arguments
    ///
    /// * `input` - Path, in-memory record or existing dataset
    /// * `options` - Sample attributes to attach
    ///
    /// # Returns
    ///
    /// The validated dataset, or the first error encountered
    pub fn load(&self, input: impl Into<Input>, options: &LoadOptions) -> Result<Dataset> {
        // Start timing
        let tic = Instant::now();
        let input = input.into();
        let description = input.to_string();

        // Classify the input
        let adapter = self.registry.find(&input)?;
        log::info!("Reading {} as {}", description, adapter.name);

        // Read, attach caller metadata, check invariants
        let mut ds = adapter.read(input, &self.capabilities)?;
        options.apply(&mut ds)?;
        validate(&ds)?;

        log::info!(
            "Done! {} sample{} x {} feature{} ({}). Elapsed time: {:.3} seconds",
            ds.nsamples(),
            if ds.nsamples() != 1 { "s" } else { "" },
            ds.nfeatures(),
            if ds.nfeatures() != 1 { "s" } else { "" },
            ds.dim_labels().join(", "),
            tic.elapsed().as_secs_f64()
        );

        Ok(ds)
    }

    /// Loads several inputs with the same options and stacks them along the
    /// sample axis.
    pub fn load_and_stack<I>(&self, inputs: Vec<I>, options: &LoadOptions) -> Result<Dataset>
    where
        I: Into<Input>,
    {
        let total = inputs.len();
        let mut datasets = Vec::with_capacity(total);
        for (i, input) in inputs.into_iter().enumerate() {
            let input = input.into();
            log::info!("Loading input {}/{}: {}", i + 1, total, input);
            datasets.push(self.load(input, options)?);
        }

        let stacked = stack(&datasets)?;
        log::info!(
            "Stacked {} datasets into {} samples",
            total,
            stacked.nsamples()
        );
        Ok(stacked)
    }
}

/// Concatenates datasets along the sample axis.
///
/// All datasets must share feature dimensions, feature attributes and
/// sample-attribute names; dataset attributes are taken from the first, with
/// a warning for every attribute a later dataset disagrees on.
pub fn stack(datasets: &[Dataset]) -> Result<Dataset> {
    let (first, rest) = datasets.split_first().ok_or_else(|| {
        DatasetError::InvalidDataset("no datasets to stack".to_string())
    })?;

    let mut stacked = first.clone();
    for (i, next) in rest.iter().enumerate() {
        verify_compatibility(first, next, i + 1)?;
        warn_on_attribute_drift(first, next, i + 1);

        stacked.samples = concatenate![Axis(0), stacked.samples.view(), next.samples.view()];
        for (name, values) in stacked.sample_attributes.iter_mut() {
            let appended = next
                .sample_attributes
                .get(name)
                .is_some_and(|other| values.append(other));
            if !appended {
                return Err(DatasetError::InvalidDataset(format!(
                    "sample attribute '{}' of dataset {} has a different type",
                    name,
                    i + 1
                )));
            }
        }
    }

    validate(&stacked)?;
    Ok(stacked)
}

fn warn_on_attribute_drift(first: &Dataset, other: &Dataset, index: usize) {
    let keys = first
        .dataset_attributes
        .keys()
        .chain(other.dataset_attributes.keys())
        .collect::<std::collections::BTreeSet<_>>();
    for key in keys {
        if first.dataset_attributes.get(key) != other.dataset_attributes.get(key) {
            log::warn!(
                "dataset attribute '{}' of dataset {} differs from the first; keeping the first",
                key,
                index
            );
        }
    }
}

fn verify_compatibility(first: &Dataset, other: &Dataset, index: usize) -> Result<()> {
    if first.feature_dimensions != other.feature_dimensions {
        return Err(DatasetError::InvalidDataset(format!(
            "feature dimensions of dataset {} don't match: [{}] vs [{}]",
            index,
            first.dim_labels().join(", "),
            other.dim_labels().join(", ")
        )));
    }

    if first.feature_attributes != other.feature_attributes {
        return Err(DatasetError::InvalidDataset(format!(
            "feature attributes of dataset {} don't match",
            index
        )));
    }

    let names = |ds: &Dataset| ds.sample_attributes.keys().cloned().collect::<Vec<_>>();
    if names(first) != names(other) {
        return Err(DatasetError::InvalidDataset(format!(
            "sample attributes of dataset {} don't match: {:?} vs {:?}",
            index,
            names(first),
            names(other)
        )));
    }

    Ok(())
}
