// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Arena core
//!
//! Supervises long-running coding-agent CLI processes and normalizes their
//! output into one canonical message stream.
//!
//! # Architecture
//!
//! - **Domain:** messages, adapter contract, agent role policy, events, config
//! - **Infrastructure:** vendor adapters, line stream reader, process handles, event bus
//! - **Application:** agent lifecycle and the agent registry

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
