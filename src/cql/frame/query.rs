// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the QUERY and EXECUTE frames.

use super::{
    query_flags::QueryFlags,
    write_bytes,
    write_int,
    write_long,
    write_long_string,
    write_short,
    write_short_bytes,
    Consistency,
    ToPayload,
};
use crate::session::{
    Cell,
    Request,
};
use derive_builder::Builder;

/**
   The `<query_parameters>` shared by QUERY and EXECUTE:

   `<consistency><flags>[<n>[value_1]...[value_n]][<result_page_size>][<paging_state>][<serial_consistency>][<timestamp>]`

   Every optional part is announced by its flag.
*/
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct QueryParameters {
    pub(crate) consistency: Consistency,
    pub(crate) values: Vec<Cell>,
    pub(crate) page_size: Option<i32>,
    pub(crate) paging_state: Option<Vec<u8>>,
    pub(crate) serial_consistency: Option<Consistency>,
    pub(crate) timestamp: Option<i64>,
}

impl QueryParameters {
    /// The parameters of `request`, resuming at `paging_state`.
    pub(crate) fn from_request(request: &Request, paging_state: Option<&[u8]>) -> Self {
        Self {
            consistency: request.consistency,
            values: request.values.clone(),
            page_size: request.page_size,
            paging_state: paging_state.map(<[u8]>::to_vec),
            serial_consistency: request.serial_consistency,
            timestamp: request.timestamp,
        }
    }

    pub(crate) fn flags(&self) -> QueryFlags {
        let mut flags = QueryFlags::default();
        flags.set_values(!self.values.is_empty());
        flags.set_page_size(self.page_size.is_some());
        flags.set_paging_state(self.paging_state.is_some());
        flags.set_serial_consistency(self.serial_consistency.is_some());
        flags.set_default_timestamp(self.timestamp.is_some());
        flags
    }
}

impl ToPayload for QueryParameters {
    fn to_payload(&self, payload: &mut Vec<u8>) {
        let flags = self.flags();
        write_short(self.consistency as u16, payload);
        payload.push(flags.0);
        if flags.values() {
            write_short(self.values.len() as u16, payload);
            for value in &self.values {
                value.to_payload(payload);
            }
        }
        if let Some(page_size) = self.page_size {
            write_int(page_size, payload);
        }
        if let Some(paging_state) = &self.paging_state {
            write_bytes(paging_state, payload);
        }
        if let Some(serial_consistency) = self.serial_consistency {
            write_short(serial_consistency as u16, payload);
        }
        if let Some(timestamp) = self.timestamp {
            write_long(timestamp, payload);
        }
    }
}

/// The QUERY frame: `<query><query_parameters>`.
#[derive(Clone, Debug, Builder)]
#[builder(derive(Clone, Debug))]
#[builder(pattern = "owned")]
pub(crate) struct QueryFrame {
    pub(crate) statement: String,
    #[builder(default)]
    pub(crate) parameters: QueryParameters,
}

impl ToPayload for QueryFrame {
    fn to_payload(&self, payload: &mut Vec<u8>) {
        write_long_string(&self.statement, payload);
        self.parameters.to_payload(payload);
    }
}

/// The EXECUTE frame: `<id><query_parameters>` where the id is the
/// `[short bytes]` returned by PREPARE.
#[derive(Clone, Debug, Builder)]
#[builder(derive(Clone, Debug))]
#[builder(pattern = "owned")]
pub(crate) struct ExecuteFrame {
    pub(crate) id: Vec<u8>,
    #[builder(default)]
    pub(crate) parameters: QueryParameters,
}

impl ToPayload for ExecuteFrame {
    fn to_payload(&self, payload: &mut Vec<u8>) {
        write_short_bytes(&self.id, payload);
        self.parameters.to_payload(payload);
    }
}
