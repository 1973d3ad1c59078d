// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! A native protocol (v4) implementation of [`Session`](crate::session::Session).
//!
//! Frames are encoded and decoded in [`frame`], bodies may be compressed with
//! LZ4 or Snappy, and [`CqlSession`] drives one connection to the first
//! reachable contact point.

mod compression;
pub(crate) mod connection;
pub(crate) mod frame;
mod session;
#[cfg(test)]
mod tests;

pub use compression::{
    Compression,
    CompressionError,
};
pub use frame::{
    Consistency,
    PasswordAuth,
};
pub use session::CqlSession;
