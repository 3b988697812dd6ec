//! Integration tests for chunk plan arithmetic.

use veritext_core::{ChunkPlan, CoreError, DEFAULT_CHUNK_SIZE};

#[test]
fn chunk_plan_tests_exact_multiple_has_no_remainder() {
    let plan = ChunkPlan::new(3 * DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_SIZE)
        .expect("plan should build");

    assert_eq!(plan.chunk_count(), 3);
    assert_eq!(plan.chunk_len(0), Some(DEFAULT_CHUNK_SIZE));
    assert_eq!(plan.chunk_len(2), Some(DEFAULT_CHUNK_SIZE));
    assert_eq!(plan.chunk_len(3), None);
}

#[test]
fn chunk_plan_tests_trailing_remainder_is_short() {
    let plan = ChunkPlan::new(DEFAULT_CHUNK_SIZE + 10, DEFAULT_CHUNK_SIZE)
        .expect("plan should build");

    assert_eq!(plan.chunk_count(), 2);
    assert_eq!(plan.chunk_len(0), Some(DEFAULT_CHUNK_SIZE));
    assert_eq!(plan.chunk_len(1), Some(10));

    let last = plan.byte_range(1).expect("second range should exist");
    assert_eq!(last.start, DEFAULT_CHUNK_SIZE);
    assert_eq!(last.end, DEFAULT_CHUNK_SIZE + 10);
}

#[test]
fn chunk_plan_tests_single_byte_source_is_one_chunk() {
    let plan = ChunkPlan::new(1, DEFAULT_CHUNK_SIZE).expect("plan should build");
    assert_eq!(plan.chunk_count(), 1);
    assert_eq!(plan.chunk_len(0), Some(1));
}

#[test]
fn chunk_plan_tests_rejects_degenerate_inputs() {
    assert!(matches!(
        ChunkPlan::new(0, DEFAULT_CHUNK_SIZE),
        Err(CoreError::EmptyFile)
    ));
    assert!(matches!(
        ChunkPlan::new(100, 0),
        Err(CoreError::InvalidChunkSize)
    ));
}
