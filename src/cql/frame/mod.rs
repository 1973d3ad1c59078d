// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the version 4 request and response frames.
//! See `https://github.com/apache/cassandra/blob/trunk/doc/native_protocol_v4.spec` for more details.

pub(crate) mod auth_response;
pub(crate) mod authenticate;
pub(crate) mod consistency;
pub(crate) mod error;
pub(crate) mod header;
pub(crate) mod opcode;
pub(crate) mod prepare;
pub(crate) mod query;
pub(crate) mod query_flags;
pub(crate) mod result;
pub(crate) mod startup;
pub(crate) mod supported;

pub use auth_response::PasswordAuth;
pub use consistency::Consistency;

pub(crate) use auth_response::{
    AuthResponseFrame,
    AuthResponseFrameBuilder,
};
pub(crate) use authenticate::AuthenticateFrame;
pub(crate) use error::ErrorFrame;
pub(crate) use header::Header;
pub(crate) use opcode::OpCode;
pub(crate) use prepare::{
    PrepareFrame,
    PrepareFrameBuilder,
};
pub(crate) use query::{
    ExecuteFrame,
    ExecuteFrameBuilder,
    QueryFrame,
    QueryFrameBuilder,
    QueryParameters,
};
pub(crate) use result::ResultFrame;
pub(crate) use startup::{
    StartupFrame,
    StartupFrameBuilder,
};
pub(crate) use supported::SupportedFrame;

use super::compression::Compression;
use crate::session::Cell;
use anyhow::{
    anyhow,
    ensure,
};
use std::{
    collections::HashMap,
    convert::TryInto,
};

/// Decode a value from a payload, advancing `start` past it.
pub(crate) trait FromPayload: Sized {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self>;
}

/// Encode a value at the end of a payload.
pub(crate) trait ToPayload {
    fn to_payload(&self, payload: &mut Vec<u8>);
}

fn take<'a>(start: &mut usize, payload: &'a [u8], len: usize) -> anyhow::Result<&'a [u8]> {
    let end = start
        .checked_add(len)
        .filter(|end| *end <= payload.len())
        .ok_or_else(|| anyhow!("Payload truncated: need {} bytes at offset {}", len, start))?;
    let slice = &payload[*start..end];
    *start = end;
    Ok(slice)
}

pub(crate) fn read_byte(start: &mut usize, payload: &[u8]) -> anyhow::Result<u8> {
    Ok(take(start, payload, 1)?[0])
}

pub(crate) fn read_short(start: &mut usize, payload: &[u8]) -> anyhow::Result<u16> {
    Ok(u16::from_be_bytes(take(start, payload, 2)?.try_into()?))
}

pub(crate) fn read_int(start: &mut usize, payload: &[u8]) -> anyhow::Result<i32> {
    Ok(i32::from_be_bytes(take(start, payload, 4)?.try_into()?))
}

pub(crate) fn read_string(start: &mut usize, payload: &[u8]) -> anyhow::Result<String> {
    let len = read_short(start, payload)? as usize;
    Ok(String::from_utf8(take(start, payload, len)?.to_vec())?)
}

pub(crate) fn read_string_list(start: &mut usize, payload: &[u8]) -> anyhow::Result<Vec<String>> {
    let n = read_short(start, payload)?;
    (0..n).map(|_| read_string(start, payload)).collect()
}

pub(crate) fn read_string_multimap(
    start: &mut usize,
    payload: &[u8],
) -> anyhow::Result<HashMap<String, Vec<String>>> {
    let n = read_short(start, payload)?;
    let mut map = HashMap::with_capacity(n as usize);
    for _ in 0..n {
        let key = read_string(start, payload)?;
        map.insert(key, read_string_list(start, payload)?);
    }
    Ok(map)
}

/// Read `[bytes]`: an int length, negative for null.
pub(crate) fn read_bytes<'a>(start: &mut usize, payload: &'a [u8]) -> anyhow::Result<Option<&'a [u8]>> {
    let len = read_int(start, payload)?;
    if len < 0 {
        Ok(None)
    } else {
        take(start, payload, len as usize).map(Some)
    }
}

/// Read `[short bytes]`.
pub(crate) fn read_short_bytes<'a>(start: &mut usize, payload: &'a [u8]) -> anyhow::Result<&'a [u8]> {
    let len = read_short(start, payload)? as usize;
    take(start, payload, len)
}

pub(crate) fn write_short(value: u16, payload: &mut Vec<u8>) {
    payload.extend(&value.to_be_bytes());
}

pub(crate) fn write_int(value: i32, payload: &mut Vec<u8>) {
    payload.extend(&value.to_be_bytes());
}

pub(crate) fn write_long(value: i64, payload: &mut Vec<u8>) {
    payload.extend(&value.to_be_bytes());
}

pub(crate) fn write_string(value: &str, payload: &mut Vec<u8>) {
    write_short(value.len() as u16, payload);
    payload.extend(value.as_bytes());
}

pub(crate) fn write_long_string(value: &str, payload: &mut Vec<u8>) {
    write_int(value.len() as i32, payload);
    payload.extend(value.as_bytes());
}

pub(crate) fn write_bytes(value: &[u8], payload: &mut Vec<u8>) {
    write_int(value.len() as i32, payload);
    payload.extend(value);
}

pub(crate) fn write_short_bytes(value: &[u8], payload: &mut Vec<u8>) {
    write_short(value.len() as u16, payload);
    payload.extend(value);
}

pub(crate) fn write_string_map(map: &HashMap<String, String>, payload: &mut Vec<u8>) {
    write_short(map.len() as u16, payload);
    for (k, v) in map {
        write_string(k, payload);
        write_string(v, payload);
    }
}

impl ToPayload for Cell {
    fn to_payload(&self, payload: &mut Vec<u8>) {
        match self {
            Cell::Set(body) => write_bytes(body, payload),
            Cell::Null => payload.extend(&crate::codec::BE_NULL_BYTES_LEN),
            Cell::Unset => payload.extend(&crate::codec::BE_UNSET_BYTES_LEN),
        }
    }
}

/// The body of a request frame.
#[derive(Clone, Debug)]
pub(crate) enum RequestBody {
    Startup(StartupFrame),
    Options,
    AuthResponse(AuthResponseFrame),
    Prepare(PrepareFrame),
    Query(QueryFrame),
    Execute(ExecuteFrame),
}

impl RequestBody {
    pub(crate) fn opcode(&self) -> OpCode {
        match self {
            Self::Startup(_) => OpCode::Startup,
            Self::Options => OpCode::Options,
            Self::AuthResponse(_) => OpCode::AuthResponse,
            Self::Prepare(_) => OpCode::Prepare,
            Self::Query(_) => OpCode::Query,
            Self::Execute(_) => OpCode::Execute,
        }
    }
}

impl ToPayload for RequestBody {
    fn to_payload(&self, payload: &mut Vec<u8>) {
        match self {
            Self::Startup(frame) => frame.to_payload(payload),
            Self::Options => (),
            Self::AuthResponse(frame) => frame.to_payload(payload),
            Self::Prepare(frame) => frame.to_payload(payload),
            Self::Query(frame) => frame.to_payload(payload),
            Self::Execute(frame) => frame.to_payload(payload),
        }
    }
}

/// A request frame addressed to a stream.
#[derive(Clone, Debug)]
pub(crate) struct RequestFrame {
    pub(crate) stream: i16,
    pub(crate) body: RequestBody,
}

impl RequestFrame {
    pub(crate) fn new(stream: i16, body: RequestBody) -> Self {
        Self { stream, body }
    }

    /// Build the wire payload. STARTUP and OPTIONS are never compressed.
    pub(crate) fn build_payload(&self, compression: Compression) -> anyhow::Result<Vec<u8>> {
        let mut body = Vec::new();
        self.body.to_payload(&mut body);
        let compression = match self.body {
            RequestBody::Startup(_) | RequestBody::Options => Compression::None,
            _ => compression,
        };
        let body = compression.compress_body(&body)?;
        let header = Header::request(self.stream, self.body.opcode(), compression.is_enabled(), body.len() as u32);
        let mut payload = Vec::with_capacity(Header::LEN + body.len());
        header.to_payload(&mut payload);
        payload.extend(body);
        Ok(payload)
    }
}

/// The body of a response frame.
#[derive(Clone, Debug)]
pub(crate) enum ResponseBody {
    Error(ErrorFrame),
    Ready,
    Authenticate(AuthenticateFrame),
    Supported(SupportedFrame),
    Result(ResultFrame),
    Event,
    AuthChallenge,
    AuthSuccess,
}

/// A decoded response frame.
#[derive(Clone, Debug)]
pub(crate) struct ResponseFrame {
    pub(crate) header: Header,
    pub(crate) body: ResponseBody,
}

impl ResponseFrame {
    /// Decode a complete frame (header and body) read from the stream.
    pub(crate) fn decode(buffer: &[u8], compression: Compression) -> anyhow::Result<Self> {
        let mut start = 0;
        let header = Header::from_payload(&mut start, buffer)?;
        ensure!(header.is_response(), "Received a request frame from the server");
        let body = &buffer[start..];
        ensure!(
            body.len() == header.body_len() as usize,
            "Frame body length mismatch: header says {}, got {}",
            header.body_len(),
            body.len()
        );
        let body = if header.is_compressed() {
            compression.decompress_body(body)?
        } else {
            body.to_vec()
        };
        let start = &mut 0;
        let payload = body.as_slice();
        if header.flags().tracing() {
            take(start, payload, 16)?;
        }
        if header.flags().warning() {
            for warning in read_string_list(start, payload)? {
                log::warn!("Server warning on stream {}: {}", header.stream(), warning);
            }
        }
        if header.flags().custom_payload() {
            let n = read_short(start, payload)?;
            for _ in 0..n {
                read_string(start, payload)?;
                read_bytes(start, payload)?;
            }
        }
        let body = match header.opcode() {
            OpCode::Error => ResponseBody::Error(ErrorFrame::from_payload(start, payload)?),
            OpCode::Ready => ResponseBody::Ready,
            OpCode::Authenticate => ResponseBody::Authenticate(AuthenticateFrame::from_payload(start, payload)?),
            OpCode::Supported => ResponseBody::Supported(SupportedFrame::from_payload(start, payload)?),
            OpCode::Result => ResponseBody::Result(ResultFrame::from_payload(start, payload)?),
            OpCode::Event => ResponseBody::Event,
            OpCode::AuthChallenge => ResponseBody::AuthChallenge,
            OpCode::AuthSuccess => ResponseBody::AuthSuccess,
            other => anyhow::bail!("Unexpected response opcode: {:?}", other),
        };
        Ok(Self { header, body })
    }

    pub(crate) fn stream(&self) -> i16 {
        self.header.stream()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_readers_bound_check() {
        let payload = [0, 3, b'a', b'b'];
        assert!(read_string(&mut 0, &payload).is_err());
        let payload = [0, 2, b'o', b'k', 0xff, 0xff, 0xff, 0xff];
        let start = &mut 0;
        assert_eq!(read_string(start, &payload).unwrap(), "ok");
        assert_eq!(read_bytes(start, &payload).unwrap(), None);
        assert_eq!(*start, payload.len());
    }

    #[test]
    fn string_multimaps_decode() {
        let mut payload = Vec::new();
        write_short(1, &mut payload);
        write_string("COMPRESSION", &mut payload);
        write_short(2, &mut payload);
        write_string("lz4", &mut payload);
        write_string("snappy", &mut payload);
        let map = read_string_multimap(&mut 0, &payload).unwrap();
        assert_eq!(map["COMPRESSION"], vec!["lz4".to_string(), "snappy".to_string()]);
    }

    #[test]
    fn cells_encode_null_and_unset_markers() {
        let mut payload = Vec::new();
        Cell::Null.to_payload(&mut payload);
        Cell::Unset.to_payload(&mut payload);
        Cell::Set(vec![7]).to_payload(&mut payload);
        assert_eq!(payload, vec![255, 255, 255, 255, 255, 255, 255, 254, 0, 0, 0, 1, 7]);
    }

    #[test]
    fn warnings_are_skipped_before_the_body() {
        let mut body = Vec::new();
        write_short(1, &mut body);
        write_string("Aggregation query used without partition key", &mut body);
        write_int(0x0001, &mut body);
        let mut frame = vec![0x84, 0x08, 0, 1, OpCode::Result as u8];
        frame.extend(&(body.len() as u32).to_be_bytes());
        frame.extend(body);
        let response = ResponseFrame::decode(&frame, Compression::None).unwrap();
        assert_eq!(response.stream(), 1);
        assert!(matches!(response.body, ResponseBody::Result(ResultFrame::Void)));
    }

    #[test]
    fn compressed_responses_decode() {
        let mut body = Vec::new();
        write_string("keyspace_one", &mut body);
        let mut result = Vec::new();
        write_int(0x0003, &mut result);
        result.extend(body);
        let compressed = Compression::Snappy.compress_body(&result).unwrap();
        let mut frame = vec![0x84, 0x01, 0, 2, OpCode::Result as u8];
        frame.extend(&(compressed.len() as u32).to_be_bytes());
        frame.extend(compressed);
        let response = ResponseFrame::decode(&frame, Compression::Snappy).unwrap();
        assert!(matches!(response.body, ResponseBody::Result(ResultFrame::SetKeyspace(k)) if k == "keyspace_one"));
    }

    #[test]
    fn options_frames_have_empty_bodies() {
        let payload = RequestFrame::new(3, RequestBody::Options)
            .build_payload(Compression::Lz4)
            .unwrap();
        assert_eq!(payload, vec![0x04, 0, 0, 3, 0x05, 0, 0, 0, 0]);
    }
}
