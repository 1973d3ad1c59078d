// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the SUPPORTED frame.

use super::{
    read_string_multimap,
    FromPayload,
};
use std::collections::HashMap;

/// The startup options the server supports.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct SupportedFrame {
    pub(crate) options: HashMap<String, Vec<String>>,
}

impl SupportedFrame {
    pub(crate) fn get(&self, key: &str) -> &[String] {
        self.options.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `key` lists `value`, compared case-insensitively.
    pub(crate) fn supports(&self, key: &str, value: &str) -> bool {
        self.get(key).iter().any(|v| v.eq_ignore_ascii_case(value))
    }
}

impl FromPayload for SupportedFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            options: read_string_multimap(start, payload)?,
        })
    }
}
