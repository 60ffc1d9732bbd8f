// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod adapters;
pub mod agent_log;
pub mod event_bus;
pub mod line_reader;
pub mod process;

pub use agent_log::AgentLog;
pub use event_bus::{DomainEvent, EventBus, EventBusError};
pub use line_reader::LineStreamReader;
pub use process::AgentProcess;
