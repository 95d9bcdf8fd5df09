// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Strata Authors

//! Shared foundations for the Strata reader crates: the error taxonomy,
//! the CPU worker pool, and bit-math helpers.

pub mod bits;
pub mod error;
pub mod executor;

pub use error::{Error, Result};
