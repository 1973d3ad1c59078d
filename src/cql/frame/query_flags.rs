// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module defines the query parameter flags.

/// Values are provided.
pub(crate) const VALUES: u8 = 0x01;
/// A page size is provided.
pub(crate) const PAGE_SIZE: u8 = 0x04;
/// A paging state is provided.
pub(crate) const PAGING_STATE: u8 = 0x08;
/// A serial consistency is provided.
pub(crate) const SERIAL_CONSISTENCY: u8 = 0x10;
/// A client side timestamp is provided.
pub(crate) const DEFAULT_TIMESTAMP: u8 = 0x20;

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) struct QueryFlags(pub(crate) u8);

impl QueryFlags {
    fn set(&mut self, flag: u8, value: bool) {
        if value {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
    }

    pub(crate) fn values(&self) -> bool {
        self.0 & VALUES != 0
    }

    pub(crate) fn set_values(&mut self, value: bool) {
        self.set(VALUES, value)
    }

    pub(crate) fn page_size(&self) -> bool {
        self.0 & PAGE_SIZE != 0
    }

    pub(crate) fn set_page_size(&mut self, value: bool) {
        self.set(PAGE_SIZE, value)
    }

    pub(crate) fn paging_state(&self) -> bool {
        self.0 & PAGING_STATE != 0
    }

    pub(crate) fn set_paging_state(&mut self, value: bool) {
        self.set(PAGING_STATE, value)
    }

    pub(crate) fn serial_consistency(&self) -> bool {
        self.0 & SERIAL_CONSISTENCY != 0
    }

    pub(crate) fn set_serial_consistency(&mut self, value: bool) {
        self.set(SERIAL_CONSISTENCY, value)
    }

    pub(crate) fn default_timestamp(&self) -> bool {
        self.0 & DEFAULT_TIMESTAMP != 0
    }

    pub(crate) fn set_default_timestamp(&mut self, value: bool) {
        self.set(DEFAULT_TIMESTAMP, value)
    }
}
