use meeg_dataset::{load_with, unflatten, LoadOptions};
use std::env;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let path = env::args()
        .nth(1)
        .unwrap_or_else(|| "data/subject01_timelock.mat".to_string());

    // Load file, labelling every sample with condition 1 and run 1
    let options = LoadOptions::default().targets(1i64).chunks(1i64);
    let ds = load_with(path.as_str(), &options)?;

    println!("Samples: {}", ds.nsamples());
    println!("Features: {}", ds.nfeatures());

    // Print feature dimensions
    for dim in &ds.feature_dimensions {
        println!("  {}: {} values", dim.label, dim.len());
    }

    // Print dataset attributes
    for (key, value) in &ds.dataset_attributes {
        if let Some(text) = value.as_text() {
            println!("{}: {}", key, text);
        }
    }

    // List sample attributes
    for (name, values) in &ds.sample_attributes {
        println!("Sample attribute '{}' ({} values)", name, values.len());
    }

    // Rebuild the array of the first sample
    if ds.nsamples() > 0 {
        let first = ds.slice_samples(&[0])?;
        let (array, _) = unflatten(&first)?;
        println!("First sample has shape {:?}", array.shape());
    }

    Ok(())
}
