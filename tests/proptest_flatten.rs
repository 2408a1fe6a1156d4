//! Property-based tests for flatten/unflatten.
//!
//! Run with: cargo test --test proptest_flatten

use meeg_dataset::{flatten, unflatten, unflatten_samples, validate, DimValues};
use ndarray::{ArrayD, IxDyn};
use proptest::prelude::*;
use std::collections::HashSet;

// =============================================================================
// Strategies
// =============================================================================

/// Array of shape `(nsamples, d1, ..., dk)` with 1..=3 feature axes.
fn arb_array(nsamples: std::ops::Range<usize>) -> impl Strategy<Value = ArrayD<f64>> {
    (nsamples, prop::collection::vec(1usize..5, 1..4)).prop_flat_map(|(n, sizes)| {
        let total = n * sizes.iter().product::<usize>();
        prop::collection::vec(-1e6..1e6f64, total).prop_map(move |data| {
            let mut shape = vec![n];
            shape.extend_from_slice(&sizes);
            ArrayD::from_shape_vec(IxDyn(&shape), data).unwrap()
        })
    })
}

fn dims_for(array: &ArrayD<f64>) -> (Vec<String>, Vec<DimValues>) {
    array.shape()[1..]
        .iter()
        .enumerate()
        .map(|(k, &n)| {
            (
                format!("d{}", k),
                DimValues::Numeric((0..n).map(|v| v as f64 * 0.5).collect()),
            )
        })
        .unzip()
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn single_sample_round_trip(array in arb_array(1..2)) {
        let (labels, values) = dims_for(&array);
        let ds = flatten(array.view(), &labels, values.clone()).unwrap();
        let (back, dims) = unflatten(&ds).unwrap();

        prop_assert_eq!(back, array);
        prop_assert_eq!(dims.iter().map(|d| d.values.clone()).collect::<Vec<_>>(), values);
    }

    #[test]
    fn multi_sample_round_trip(array in arb_array(1..5)) {
        let (labels, values) = dims_for(&array);
        let ds = flatten(array.view(), &labels, values).unwrap();
        prop_assert_eq!(unflatten_samples(&ds).unwrap(), array);
    }

    #[test]
    fn coordinates_are_unique_and_in_range(array in arb_array(1..3)) {
        let (labels, values) = dims_for(&array);
        let ds = flatten(array.view(), &labels, values).unwrap();
        prop_assert!(validate(&ds).is_ok());

        let tuples: HashSet<Vec<usize>> = (0..ds.nfeatures())
            .map(|f| ds.feature_coordinates(f).unwrap())
            .collect();
        prop_assert_eq!(tuples.len(), ds.nfeatures());
        prop_assert_eq!(ds.nfeatures(), array.shape()[1..].iter().product::<usize>());
    }

    #[test]
    fn reversed_features_still_unflatten(array in arb_array(1..2)) {
        let (labels, values) = dims_for(&array);
        let ds = flatten(array.view(), &labels, values).unwrap();
        let reversed: Vec<usize> = (0..ds.nfeatures()).rev().collect();
        let shuffled = ds.slice_features(&reversed).unwrap();

        let (back, _) = unflatten(&shuffled).unwrap();
        prop_assert_eq!(back, array);
    }
}
