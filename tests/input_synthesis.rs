//! Input synthesis and binding scenarios against the public API
//!
//! Covers the setup-time contract: shared-buffer sizing, explicit data
//! precedence, fixed-string synthesis, and fail-fast validation before any
//! worker thread exists.

use std::collections::HashMap;

use cargador::binder::RequestBinder;
use cargador::data::{InputDataStore, SyntheticDataOptions};
use cargador::testing::MockClientFactory;
use cargador::CargadorError;

// ============================================================================
// Shared Buffer Scenarios
// ============================================================================

#[test]
fn test_zero_filled_buffer_covers_both_numeric_inputs() {
    // Per-batch requirements of 10 and 20 bytes: one 20-byte all-zero
    // buffer serves both inputs.
    let factory = MockClientFactory::new(8)
        .with_numeric_input("small", vec![10], 1)
        .with_numeric_input("large", vec![20], 1);
    let options = SyntheticDataOptions::default().with_zero_input(true);
    let store = InputDataStore::build(&factory, HashMap::new(), &options).expect("build");

    assert_eq!(store.shared_bytes().len(), 20);
    assert!(store.shared_bytes().iter().all(|&b| b == 0));

    let mut ctx = factory.create_context_raw();
    RequestBinder::new(1).prepare(&mut ctx, &store).expect("prepare");

    let bound = ctx.bound_bytes("small").expect("bound");
    assert_eq!(bound[0].len(), 10);
    assert!(bound[0].iter().all(|&b| b == 0));
}

#[test]
fn test_random_buffer_has_requested_size() {
    let factory = MockClientFactory::new(8).with_numeric_input("tokens", vec![64], 4);
    let store = InputDataStore::build(
        &factory,
        HashMap::new(),
        &SyntheticDataOptions::default(),
    )
    .expect("build");
    assert_eq!(store.shared_bytes().len(), 256);
}

// ============================================================================
// String Input Scenarios
// ============================================================================

#[test]
fn test_directory_strings_used_verbatim_then_fixed_string_fallback() {
    let factory = MockClientFactory::new(8).with_string_input("words", vec![3]);

    // First run: the data directory supplies exactly three lines.
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("words"), "uno\ndos\ntres\n").expect("write");
    let options = SyntheticDataOptions::default().with_data_directory(dir.path());
    let store = InputDataStore::build(&factory, HashMap::new(), &options).expect("build");

    let mut ctx = factory.create_context_raw();
    RequestBinder::new(1).prepare(&mut ctx, &store).expect("prepare");
    let bound = ctx.bound_strings("words").expect("bound");
    assert_eq!(bound[0], ["uno", "dos", "tres"]);

    // Second run: no directory, fixed string fills every slot.
    let options = SyntheticDataOptions::default().with_string_data("foo");
    let store = InputDataStore::build(&factory, HashMap::new(), &options).expect("build");

    let mut ctx = factory.create_context_raw();
    RequestBinder::new(1).prepare(&mut ctx, &store).expect("prepare");
    let bound = ctx.bound_strings("words").expect("bound");
    assert_eq!(bound[0], ["foo", "foo", "foo"]);
}

#[test]
fn test_string_replicas_match_batch_size() {
    let factory = MockClientFactory::new(8).with_string_input("words", vec![2]);
    let options = SyntheticDataOptions::default().with_string_data("x");
    let store = InputDataStore::build(&factory, HashMap::new(), &options).expect("build");

    let mut ctx = factory.create_context_raw();
    RequestBinder::new(4).prepare(&mut ctx, &store).expect("prepare");

    let bound = ctx.bound_strings("words").expect("bound");
    assert_eq!(bound.len(), 4);
    assert!(bound.iter().all(|replica| replica.len() == 2));
}

// ============================================================================
// Fail-Fast Validation Scenarios
// ============================================================================

#[test]
fn test_wildcard_without_shape_or_data_fails_at_setup() {
    let factory = MockClientFactory::new(8).with_numeric_input("tokens", vec![-1], 4);
    let err = InputDataStore::build(
        &factory,
        HashMap::new(),
        &SyntheticDataOptions::default(),
    )
    .expect_err("must fail before any worker exists");
    assert!(matches!(err, CargadorError::InvalidConfiguration { .. }));
}

#[test]
fn test_supplied_shape_must_be_compatible() {
    let factory = MockClientFactory::new(8).with_numeric_input("tokens", vec![-1, 8], 4);
    let mut shapes = HashMap::new();
    shapes.insert("tokens".to_string(), vec![4, 16]);

    let err =
        InputDataStore::build(&factory, shapes, &SyntheticDataOptions::default())
            .expect_err("rank-compatible but extent-mismatched shape must fail");
    assert!(err.to_string().contains("user supplied shape"));
}

#[test]
fn test_supplied_shape_resolves_wildcard_for_binding() {
    let factory = MockClientFactory::new(8).with_numeric_input("tokens", vec![-1, 8], 4);
    let mut shapes = HashMap::new();
    shapes.insert("tokens".to_string(), vec![2, 8]);

    let options = SyntheticDataOptions::default().with_zero_input(true);
    let store = InputDataStore::build(&factory, shapes, &options).expect("build");
    assert_eq!(store.shared_bytes().len(), 2 * 8 * 4);

    // A fresh context starts with the wildcard unresolved; the binder
    // applies the stored shape before sizing.
    let mut ctx = factory.create_context_raw();
    RequestBinder::new(1).prepare(&mut ctx, &store).expect("prepare");
    let bound = ctx.bound_bytes("tokens").expect("bound");
    assert_eq!(bound[0].len(), 64);
}

#[test]
fn test_serialized_options_round_trip() {
    let options = SyntheticDataOptions::default()
        .with_string_length(32)
        .with_zero_input(true);
    let json = serde_json::to_string(&options).expect("serialize");
    let parsed: SyntheticDataOptions = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(parsed.string_length, 32);
    assert!(parsed.zero_input);
    assert!(parsed.data_directory.is_none());
}
