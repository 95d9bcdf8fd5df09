// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Strata Authors

//! PLAIN_DICTIONARY / RLE_DICTIONARY data pages: a leading bit-width
//! byte followed by an RLE/bit-packed hybrid stream of dictionary
//! indices.

use snafu::location;
use strata_core::{Error, Result};

use crate::data::{Dictionary, ValueVector};
use crate::levels::decode_hybrid;

/// Decode `num_values` present values by dictionary indirection.
pub fn decode_dictionary(
    data: &[u8],
    dictionary: &Dictionary,
    num_values: usize,
) -> Result<ValueVector> {
    if num_values == 0 {
        return Ok(dictionary.make_output(0));
    }
    if dictionary.is_empty() {
        return Err(Error::corrupt(
            "<page>",
            "dictionary-encoded page with an empty dictionary",
            location!(),
        ));
    }
    let bit_width = *data.first().ok_or_else(|| {
        Error::corrupt(
            "<page>",
            "dictionary page data missing its bit-width byte",
            location!(),
        )
    })? as usize;
    if bit_width > 32 {
        return Err(Error::corrupt(
            "<page>",
            format!("dictionary index bit width {bit_width} out of range"),
            location!(),
        ));
    }
    let indices = decode_hybrid(&data[1..], bit_width, num_values)?;
    let mut out = dictionary.make_output(num_values);
    for index in indices {
        dictionary.push_into(index as usize, &mut out)?;
    }
    Ok(out)
}
