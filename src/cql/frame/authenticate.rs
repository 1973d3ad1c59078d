// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the AUTHENTICATE frame.

use super::{
    read_string,
    FromPayload,
};

/// The server requires authentication through the named authenticator class.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AuthenticateFrame {
    pub(crate) authenticator: String,
}

impl FromPayload for AuthenticateFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            authenticator: read_string(start, payload)?,
        })
    }
}
