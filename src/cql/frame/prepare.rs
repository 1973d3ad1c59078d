// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the PREPARE frame.

use super::{
    write_long_string,
    ToPayload,
};
use derive_builder::Builder;

/// The PREPARE frame: a single `[long string]` query.
#[derive(Clone, Debug, Builder)]
#[builder(derive(Clone, Debug))]
#[builder(pattern = "owned", setter(into))]
pub(crate) struct PrepareFrame {
    pub(crate) statement: String,
}

impl ToPayload for PrepareFrame {
    fn to_payload(&self, payload: &mut Vec<u8>) {
        write_long_string(&self.statement, payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_frames_carry_a_long_string() {
        let frame = PrepareFrameBuilder::default().statement("SELECT 1").build().unwrap();
        let mut payload = Vec::new();
        frame.to_payload(&mut payload);
        assert_eq!(payload, b"\0\0\0\x08SELECT 1".to_vec());
    }
}
