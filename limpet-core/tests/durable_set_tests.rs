mod common;

use rstest::rstest;

use common::{UseLinkFree, UseLock, UseMrLock, UseSequential, UseSoft};
use limpet_core::common_tests::durable_set_core_tests::*;
use limpet_core::common_tests::SetFactory;

// Type-level parametrization over the set variants; each case runs the
// shared suite against one implementation.

#[rstest]
#[case::link_free(UseLinkFree)]
#[case::soft(UseSoft)]
#[case::lock(UseLock)]
#[case::mrlock(UseMrLock)]
#[case::sequential(UseSequential)]
fn test_basic<F: SetFactory>(#[case] _variant: F) {
    test_basic_operations::<F>();
}

#[rstest]
#[case::link_free(UseLinkFree)]
#[case::soft(UseSoft)]
#[case::lock(UseLock)]
#[case::mrlock(UseMrLock)]
#[case::sequential(UseSequential)]
fn test_ordering<F: SetFactory>(#[case] _variant: F) {
    test_insert_ordering::<F>();
}

#[rstest]
#[case::link_free(UseLinkFree)]
#[case::soft(UseSoft)]
#[case::lock(UseLock)]
#[case::mrlock(UseMrLock)]
#[case::sequential(UseSequential)]
fn test_model<F: SetFactory>(#[case] _variant: F) {
    test_against_model::<F>();
}

#[rstest]
#[case::link_free(UseLinkFree)]
#[case::soft(UseSoft)]
#[case::lock(UseLock)]
#[case::mrlock(UseMrLock)]
fn test_oracle<F: SetFactory>(#[case] _variant: F) {
    test_matches_sequential_oracle::<F>();
}

#[rstest]
#[case::link_free(UseLinkFree)]
#[case::soft(UseSoft)]
#[case::lock(UseLock)]
#[case::mrlock(UseMrLock)]
#[case::sequential(UseSequential)]
fn test_negatives<F: SetFactory>(#[case] _variant: F) {
    test_negative_keys::<F>();
}

#[rstest]
#[case::link_free(UseLinkFree)]
#[case::soft(UseSoft)]
#[case::lock(UseLock)]
#[case::mrlock(UseMrLock)]
#[case::sequential(UseSequential)]
fn test_exhaustion<F: SetFactory>(#[case] _variant: F) {
    test_arena_exhaustion::<F>();
}

#[rstest]
#[case::link_free(UseLinkFree)]
#[case::soft(UseSoft)]
#[case::lock(UseLock)]
#[case::mrlock(UseMrLock)]
#[case::sequential(UseSequential)]
fn test_failed_insert<F: SetFactory>(#[case] _variant: F) {
    test_failed_insert_consumes_nothing::<F>();
}

#[rstest]
#[case::link_free(UseLinkFree)]
#[case::soft(UseSoft)]
#[case::lock(UseLock)]
#[case::mrlock(UseMrLock)]
#[case::sequential(UseSequential)]
fn test_empty<F: SetFactory>(#[case] _variant: F) {
    test_empty_set::<F>();
}

#[rstest]
#[case::link_free(UseLinkFree)]
#[case::soft(UseSoft)]
#[case::lock(UseLock)]
#[case::mrlock(UseMrLock)]
#[case::sequential(UseSequential)]
fn test_abort<F: SetFactory>(#[case] _variant: F) {
    test_abort_returns_false::<F>();
}
