mod common;

use rstest::rstest;

use common::{UseLinkFree, UseLock, UseMrLock, UseSequential, UseSoft};
use limpet_core::common_tests::durable_set_core_tests::*;
use limpet_core::common_tests::SetFactory;

#[rstest]
#[case::link_free(UseLinkFree)]
#[case::soft(UseSoft)]
#[case::lock(UseLock)]
#[case::mrlock(UseMrLock)]
#[case::sequential(UseSequential)]
fn test_round_trip<F: SetFactory>(#[case] _variant: F) {
    test_recover_round_trip::<F>();
}

#[rstest]
#[case::link_free(UseLinkFree)]
#[case::soft(UseSoft)]
#[case::lock(UseLock)]
#[case::mrlock(UseMrLock)]
#[case::sequential(UseSequential)]
fn test_durable_equivalence<F: SetFactory>(#[case] _variant: F) {
    test_recover_durable_equivalence::<F>();
}

#[rstest]
#[case::link_free(UseLinkFree)]
#[case::soft(UseSoft)]
#[case::lock(UseLock)]
#[case::mrlock(UseMrLock)]
#[case::sequential(UseSequential)]
fn test_twice<F: SetFactory>(#[case] _variant: F) {
    test_recover_twice::<F>();
}
