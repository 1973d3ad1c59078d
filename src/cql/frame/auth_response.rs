// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the AUTH_RESPONSE frame.

use super::{
    write_bytes,
    ToPayload,
};
use derive_builder::Builder;
use serde::{
    Deserialize,
    Serialize,
};

/**
    Answers a server authentication challenge.

    The body of this message is a single `[bytes]` token whose content depends
    on the authenticator. The response is an AUTH_CHALLENGE, an AUTH_SUCCESS
    or an ERROR.
*/
#[derive(Debug, Clone, Builder)]
#[builder(derive(Clone, Debug))]
#[builder(pattern = "owned")]
pub(crate) struct AuthResponseFrame {
    pub(crate) token: Vec<u8>,
}

impl ToPayload for AuthResponseFrame {
    fn to_payload(&self, payload: &mut Vec<u8>) {
        write_bytes(&self.token, payload);
    }
}

impl AuthResponseFrameBuilder {
    /// Set the authentication token from credentials.
    pub(crate) fn auth_token(self, auth: &PasswordAuth) -> Self {
        self.token(auth.token())
    }
}

/// Plain text SASL credentials.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct PasswordAuth {
    user: String,
    pass: String,
}

impl PasswordAuth {
    /// Create credentials for `user`.
    pub fn new(user: impl Into<String>, pass: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            pass: pass.into(),
        }
    }

    /// The user name.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// The SASL PLAIN token: `\0user\0pass`.
    pub(crate) fn token(&self) -> Vec<u8> {
        let mut token = Vec::with_capacity(self.user.len() + self.pass.len() + 2);
        token.push(0);
        token.extend_from_slice(self.user.as_bytes());
        token.push(0);
        token.extend_from_slice(self.pass.as_bytes());
        token
    }
}

impl std::fmt::Debug for PasswordAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordAuth")
            .field("user", &self.user)
            .field("pass", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_tokens_are_sasl_plain() {
        let auth = PasswordAuth::new("cassandra", "secret");
        let frame = AuthResponseFrameBuilder::default().auth_token(&auth).build().unwrap();
        let mut payload = Vec::new();
        frame.to_payload(&mut payload);
        assert_eq!(&payload[..4], &[0, 0, 0, 17]);
        assert_eq!(&payload[4..], b"\0cassandra\0secret");
        assert!(!format!("{:?}", auth).contains("secret"));
    }
}
