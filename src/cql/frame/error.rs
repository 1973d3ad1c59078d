// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the ERROR frame.

use super::{
    read_int,
    read_short_bytes,
    read_string,
    FromPayload,
};
use crate::Error;
use std::fmt::Display;

/// The Error code of `SERVER_ERROR`.
pub(crate) const SERVER_ERROR: i32 = 0x0000;
/// The Error code of `PROTOCOL_ERROR`.
pub(crate) const PROTOCOL_ERROR: i32 = 0x000A;
/// The Error code of `AUTHENTICATION_ERROR`.
pub(crate) const AUTHENTICATION_ERROR: i32 = 0x0100;
/// The Error code of `UNAVAILABLE_EXCEPTION`.
pub(crate) const UNAVAILABLE_EXCEPTION: i32 = 0x1000;
/// The Error code of `OVERLOADED`.
pub(crate) const OVERLOADED: i32 = 0x1001;
/// The Error code of `WRITE_TIMEOUT`.
pub(crate) const WRITE_TIMEOUT: i32 = 0x1100;
/// The Error code of `READ_TIMEOUT`.
pub(crate) const READ_TIMEOUT: i32 = 0x1200;
/// The Error code of `SYNTAX_ERROR`.
pub(crate) const SYNTAX_ERROR: i32 = 0x2000;
/// The Error code of `UNAUTHORIZED`.
pub(crate) const UNAUTHORIZED: i32 = 0x2100;
/// The Error code of `INVALID`.
pub(crate) const INVALID: i32 = 0x2200;
/// The Error code of `CONFIG_ERROR`.
pub(crate) const CONFIG_ERROR: i32 = 0x2300;
/// The Error code of `ALREADY_EXISTS`.
pub(crate) const ALREADY_EXISTS: i32 = 0x2400;
/// The Error code of `UNPREPARED`.
pub(crate) const UNPREPARED: i32 = 0x2500;

/// The ERROR frame. Code specific details are only kept for UNPREPARED.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ErrorFrame {
    pub(crate) code: i32,
    pub(crate) message: String,
    pub(crate) unprepared_id: Option<Vec<u8>>,
}

impl Display for ErrorFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:#06x}): {}", code_name(self.code), self.code, self.message)
    }
}

impl ErrorFrame {
    pub(crate) fn is_unprepared(&self) -> bool {
        self.code == UNPREPARED
    }

    pub(crate) fn is_timeout(&self) -> bool {
        self.code == READ_TIMEOUT || self.code == WRITE_TIMEOUT
    }

    pub(crate) fn is_authentication_error(&self) -> bool {
        self.code == AUTHENTICATION_ERROR
    }

    /// Convert into the crate error for a request on `query`.
    pub(crate) fn into_error(self, query: &str) -> Error {
        if self.is_timeout() {
            Error::ExecutionTimeout { query: query.to_owned() }
        } else {
            Error::Server {
                code: self.code,
                message: self.message,
                query: query.to_owned(),
            }
        }
    }
}

impl FromPayload for ErrorFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        let code = read_int(start, payload)?;
        let message = read_string(start, payload)?;
        let unprepared_id = if code == UNPREPARED {
            Some(read_short_bytes(start, payload)?.to_vec())
        } else {
            None
        };
        Ok(Self {
            code,
            message,
            unprepared_id,
        })
    }
}

fn code_name(code: i32) -> &'static str {
    match code {
        SERVER_ERROR => "SERVER_ERROR",
        PROTOCOL_ERROR => "PROTOCOL_ERROR",
        AUTHENTICATION_ERROR => "AUTHENTICATION_ERROR",
        UNAVAILABLE_EXCEPTION => "UNAVAILABLE_EXCEPTION",
        OVERLOADED => "OVERLOADED",
        WRITE_TIMEOUT => "WRITE_TIMEOUT",
        READ_TIMEOUT => "READ_TIMEOUT",
        SYNTAX_ERROR => "SYNTAX_ERROR",
        UNAUTHORIZED => "UNAUTHORIZED",
        INVALID => "INVALID",
        CONFIG_ERROR => "CONFIG_ERROR",
        ALREADY_EXISTS => "ALREADY_EXISTS",
        UNPREPARED => "UNPREPARED",
        _ => "ERROR",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cql::frame::{
        write_int,
        write_short_bytes,
        write_string,
    };

    fn frame(code: i32, message: &str, extra: impl FnOnce(&mut Vec<u8>)) -> ErrorFrame {
        let mut payload = Vec::new();
        write_int(code, &mut payload);
        write_string(message, &mut payload);
        extra(&mut payload);
        ErrorFrame::from_payload(&mut 0, &payload).unwrap()
    }

    #[test]
    fn unprepared_errors_carry_the_id() {
        let error = frame(UNPREPARED, "gone", |p| write_short_bytes(&[1, 2, 3], p));
        assert!(error.is_unprepared());
        assert_eq!(error.unprepared_id, Some(vec![1, 2, 3]));
    }

    #[test]
    fn server_timeouts_become_execution_timeouts() {
        let error = frame(READ_TIMEOUT, "slow", |_| ());
        assert!(matches!(error.into_error("SELECT"), Error::ExecutionTimeout { query } if query == "SELECT"));
        let error = frame(SYNTAX_ERROR, "line 1:0 no viable alternative", |_| ());
        assert_eq!(error.to_string(), "SYNTAX_ERROR (0x2000): line 1:0 no viable alternative");
        assert!(matches!(error.into_error("SELEC"), Error::Server { code: SYNTAX_ERROR, .. }));
    }
}
