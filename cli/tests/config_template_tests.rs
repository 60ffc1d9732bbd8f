// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use arena_core::domain::adapter::Vendor;
use arena_core::domain::config::{ArenaConfig, RoundMode};
use arena_orchestrator::commands::config::{EXAMPLES_TEMPLATE, MINIMAL_TEMPLATE};
use std::time::Duration;

#[test]
fn generated_templates_are_valid() {
    for template in [MINIMAL_TEMPLATE, EXAMPLES_TEMPLATE] {
        let config = ArenaConfig::from_yaml_str(template).unwrap();
        config.validate().unwrap();
        assert_eq!(config.spec.mode, RoundMode::Arena);
        assert_eq!(config.spec.supervisor.profile.model.as_deref(), Some("haiku"));
    }
}

#[test]
fn examples_template_sets_documented_values() {
    let config = ArenaConfig::from_yaml_str(EXAMPLES_TEMPLATE).unwrap();
    assert_eq!(config.spec.workers.count, 3);
    assert_eq!(config.spec.workers.profile.vendor, Vendor::Claude);
    assert_eq!(config.spec.timing.closing_summary_wait, Duration::from_secs(120));
    assert_eq!(config.spec.liveness.max_restarts, Some(20));
    assert_eq!(config.spec.timing.autopilot_time_box, None);
}
