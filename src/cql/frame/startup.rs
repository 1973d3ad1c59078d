// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the STARTUP frame.

use super::{
    write_string_map,
    ToPayload,
};
use derive_builder::Builder;
use std::collections::HashMap;

/// The option naming the CQL version.
pub(crate) const CQL_VERSION: &str = "CQL_VERSION";
/// The option naming the body compression algorithm.
pub(crate) const COMPRESSION: &str = "COMPRESSION";

/// The STARTUP frame.
#[derive(Clone, Debug, Builder)]
#[builder(derive(Clone, Debug))]
#[builder(pattern = "owned")]
pub(crate) struct StartupFrame {
    #[builder(default)]
    pub(crate) options: HashMap<String, String>,
}

impl ToPayload for StartupFrame {
    fn to_payload(&self, payload: &mut Vec<u8>) {
        write_string_map(&self.options, payload);
    }
}

impl StartupFrameBuilder {
    pub(crate) fn with_option(mut self, key: &str, value: &str) -> Self {
        self.options
            .get_or_insert_with(HashMap::new)
            .insert(key.to_owned(), value.to_owned());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cql::frame::read_string_multimap;

    #[test]
    fn startup_options_encode_as_a_string_map() {
        let frame = StartupFrameBuilder::default()
            .with_option(CQL_VERSION, "3.0.0")
            .build()
            .unwrap();
        let mut payload = Vec::new();
        frame.to_payload(&mut payload);
        // a string map with one entry reads as a multimap with a one element list only by accident, so check bytes
        assert_eq!(&payload[..2], &[0, 1]);
        assert_eq!(&payload[2..4], &[0, 11]);
        assert_eq!(&payload[4..15], CQL_VERSION.as_bytes());
        assert_eq!(&payload[15..], &[0, 5, b'3', b'.', b'0', b'.', b'0']);
        assert!(read_string_multimap(&mut 0, &payload).is_err());
    }
}
