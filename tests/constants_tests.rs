// SPDX-License-Identifier: MPL-2.0

//! Integration tests for constants module

use overlaycam::constants::{DegradePolicy, PoolMode, frame_budget};
use std::time::Duration;

#[test]
fn test_pool_mode_values() {
    assert_eq!(PoolMode::ALL.len(), 2);
    assert_eq!(PoolMode::default(), PoolMode::Backpressure);
}

#[test]
fn test_degrade_policy_values() {
    assert_eq!(DegradePolicy::ALL.len(), 2);
    assert_eq!(DegradePolicy::default(), DegradePolicy::DropOldest);
}

#[test]
fn test_display_names() {
    for mode in PoolMode::ALL {
        assert!(!mode.display_name().is_empty(), "Mode {:?} has empty display name", mode);
    }
    for policy in DegradePolicy::ALL {
        assert!(
            !policy.display_name().is_empty(),
            "Policy {:?} has empty display name",
            policy
        );
    }
}

#[test]
fn test_budget_shrinks_with_fps() {
    let mut previous = Duration::MAX;
    for fps in [1, 15, 30, 60, 120] {
        let budget = frame_budget(fps);
        assert!(budget < previous, "Budget should shrink as fps grows");
        previous = budget;
    }
}
