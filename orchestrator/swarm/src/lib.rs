// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `arena-swarm`: Round Orchestration
//!
//! Drives groups of worker agents and one supervisor through rounds of
//! provision → work → evaluate → cleanup.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `RoundSettings`, `RoundState`, `ResumeState`, collaborator traits |
//! | [`infrastructure`] | Infrastructure | git worktrees, markdown task gate, prompt templates |
//! | [`application`] | Application | `RoundOrchestrator` |
//!
//! ## Modes
//!
//! - **Arena**: timed rounds. Workers are force-stopped when the phase ends
//!   and the supervisor evaluates and merges the best result.
//! - **Autopilot**: one phase. Workers run to completion and open their own
//!   pull requests while the supervisor only monitors.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::*;
