// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Test harness for adaptive rate limiter traffic simulation.
//!
//! This module provides utilities for replaying hostile and benign traffic
//! patterns against the engine to validate its blocking decisions.

pub mod attacks;
pub mod generators;
pub mod metrics;
