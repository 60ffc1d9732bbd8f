// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod agent;
pub mod registry;

pub use agent::Agent;
pub use registry::AgentRegistry;
