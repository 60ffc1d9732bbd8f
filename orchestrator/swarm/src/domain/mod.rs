// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Round Domain Layer
//!
//! Pure round types plus the collaborator seams. No process I/O here.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`round`] | `RoundSettings`, `RoundState`, `ResumeState`, `RunOutcome` |
//! | [`workspace`] | `WorktreeProvisioner`, `WorkGate` |

pub mod round;
pub mod workspace;

pub use round::*;
pub use workspace::*;
