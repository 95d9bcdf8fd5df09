// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Strata Authors

//! Value decoders, one module per encoding family.

pub mod byte_stream_split;
pub mod delta;
pub mod dictionary;
pub mod plain;
