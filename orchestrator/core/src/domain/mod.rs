// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: canonical messages, agent policy, events and configuration.
//!
//! Nothing in this layer touches processes or files except the config loader.

pub mod adapter;
pub mod agent;
pub mod config;
pub mod events;
pub mod message;
pub mod runtime;
