// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! A single CQL connection: handshake and request/response over a stream.

mod cql;

pub(crate) use cql::{
    collect_frame_response,
    Cql,
    Handshake,
    DEFAULT_CQL_VERSION,
};
