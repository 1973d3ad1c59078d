// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module defines the frame header.

use super::{
    read_byte,
    read_int,
    read_short,
    FromPayload,
    OpCode,
    ToPayload,
};
use std::convert::TryFrom;

/// The protocol version this crate speaks.
pub(crate) const PROTOCOL_VERSION: u8 = 0x04;
/// The direction bit of the version byte.
const RESPONSE: u8 = 0x80;

/// The compression flag.
pub(crate) const COMPRESSION: u8 = 0x01;
/// The tracing flag.
pub(crate) const TRACING: u8 = 0x02;
/// The custom payload flag.
pub(crate) const CUSTOM_PAYLOAD: u8 = 0x04;
/// The warning flag.
pub(crate) const WARNING: u8 = 0x08;

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) struct Flags(u8);

impl Flags {
    pub(crate) fn compression(&self) -> bool {
        self.0 & COMPRESSION != 0
    }

    pub(crate) fn set_compression(&mut self, value: bool) {
        if value {
            self.0 |= COMPRESSION;
        } else {
            self.0 &= !COMPRESSION;
        }
    }

    pub(crate) fn tracing(&self) -> bool {
        self.0 & TRACING != 0
    }

    pub(crate) fn custom_payload(&self) -> bool {
        self.0 & CUSTOM_PAYLOAD != 0
    }

    pub(crate) fn warning(&self) -> bool {
        self.0 & WARNING != 0
    }
}

/// The 9 byte header that starts every frame.
#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) struct Header {
    version: u8,
    flags: Flags,
    stream: i16,
    opcode: OpCode,
    body_len: u32,
}

impl Header {
    pub(crate) const LEN: usize = 9;

    /// A request header.
    pub(crate) fn request(stream: i16, opcode: OpCode, compressed: bool, body_len: u32) -> Self {
        let mut flags = Flags::default();
        flags.set_compression(compressed);
        Self {
            version: PROTOCOL_VERSION,
            flags,
            stream,
            opcode,
            body_len,
        }
    }

    pub(crate) fn is_response(&self) -> bool {
        self.version & RESPONSE != 0
    }

    pub(crate) fn version(&self) -> u8 {
        self.version & !RESPONSE
    }

    pub(crate) fn flags(&self) -> &Flags {
        &self.flags
    }

    pub(crate) fn is_compressed(&self) -> bool {
        self.flags.compression()
    }

    pub(crate) fn stream(&self) -> i16 {
        self.stream
    }

    pub(crate) fn opcode(&self) -> OpCode {
        self.opcode
    }

    pub(crate) fn body_len(&self) -> u32 {
        self.body_len
    }

    /// Read the body length from a raw header without decoding the rest.
    pub(crate) fn peek_body_len(raw: &[u8; Self::LEN]) -> u32 {
        u32::from_be_bytes([raw[5], raw[6], raw[7], raw[8]])
    }
}

impl FromPayload for Header {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        let version = read_byte(start, payload)?;
        anyhow::ensure!(
            version & !RESPONSE == PROTOCOL_VERSION,
            "Unsupported protocol version {:#04x}",
            version & !RESPONSE
        );
        let flags = Flags(read_byte(start, payload)?);
        let stream = read_short(start, payload)? as i16;
        let opcode = OpCode::try_from(read_byte(start, payload)?)?;
        let body_len = read_int(start, payload)? as u32;
        Ok(Self {
            version,
            flags,
            stream,
            opcode,
            body_len,
        })
    }
}

impl ToPayload for Header {
    fn to_payload(&self, payload: &mut Vec<u8>) {
        payload.push(self.version);
        payload.push(self.flags.0);
        payload.extend(&self.stream.to_be_bytes());
        payload.push(self.opcode as u8);
        payload.extend(&self.body_len.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_headers_decode() {
        let raw = [0x84, COMPRESSION | WARNING, 0, 7, 0x08, 0, 0, 1, 0];
        let header = Header::from_payload(&mut 0, &raw).unwrap();
        assert!(header.is_response());
        assert_eq!(header.version(), 4);
        assert!(header.is_compressed());
        assert!(header.flags().warning());
        assert!(!header.flags().tracing());
        assert_eq!(header.stream(), 7);
        assert_eq!(header.opcode(), OpCode::Result);
        assert_eq!(header.body_len(), 256);
        assert_eq!(Header::peek_body_len(&raw), 256);
    }

    #[test]
    fn other_protocol_versions_are_rejected() {
        let raw = [0x83, 0, 0, 0, 0x02, 0, 0, 0, 0];
        assert!(Header::from_payload(&mut 0, &raw).is_err());
    }

    #[test]
    fn request_headers_encode() {
        let mut payload = Vec::new();
        Header::request(-1, OpCode::Query, true, 12).to_payload(&mut payload);
        assert_eq!(payload, vec![0x04, 0x01, 0xff, 0xff, 0x07, 0, 0, 0, 12]);
    }
}
