// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use crate::cql::{
    compression::Compression,
    frame::{
        startup,
        AuthResponseFrameBuilder,
        Header,
        PasswordAuth,
        RequestBody,
        RequestFrame,
        ResponseBody,
        ResponseFrame,
        StartupFrameBuilder,
    },
};
use anyhow::{
    anyhow,
    bail,
    ensure,
};
use std::net::SocketAddr;
use tokio::{
    io::{
        AsyncRead,
        AsyncReadExt,
        AsyncWrite,
        AsyncWriteExt,
    },
    net::TcpStream,
};

/// The CQL version requested when the configuration names none.
pub(crate) const DEFAULT_CQL_VERSION: &str = "3.0.0";

/// What to negotiate during the handshake.
#[derive(Clone, Debug)]
pub(crate) struct Handshake {
    pub(crate) cql_version: String,
    pub(crate) compression: Compression,
    pub(crate) credentials: Option<PasswordAuth>,
}

impl Default for Handshake {
    fn default() -> Self {
        Self {
            cql_version: DEFAULT_CQL_VERSION.to_owned(),
            compression: Compression::None,
            credentials: None,
        }
    }
}

/// An established CQL connection over `S`.
pub(crate) struct Cql<S = TcpStream> {
    stream: S,
    address: Option<SocketAddr>,
    compression: Compression,
    next_stream: i16,
}

impl Cql<TcpStream> {
    /// Connect to `address` and run the handshake.
    pub(crate) async fn connect(address: SocketAddr, handshake: &Handshake) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        let mut cql = Cql::handshake(stream, handshake).await?;
        cql.address.replace(address);
        Ok(cql)
    }
}

impl<S> Cql<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Run OPTIONS, STARTUP and the optional authentication exchange on `stream`.
    pub(crate) async fn handshake(stream: S, handshake: &Handshake) -> anyhow::Result<Self> {
        let mut cql = Self {
            stream,
            address: None,
            compression: Compression::None,
            next_stream: 0,
        };
        let supported = match cql.request(RequestBody::Options).await? {
            ResponseBody::Supported(supported) => supported,
            ResponseBody::Error(error) => bail!("CQL connection not supported due to CqlError: {}", error),
            other => bail!("Expected SUPPORTED, got {:?}", other),
        };
        let cql_version = if supported.get(startup::CQL_VERSION).is_empty()
            || supported.supports(startup::CQL_VERSION, &handshake.cql_version)
        {
            handshake.cql_version.clone()
        } else {
            let offered = supported.get(startup::CQL_VERSION)[0].clone();
            log::warn!(
                "CQL version {} is not supported, falling back to {}",
                handshake.cql_version,
                offered
            );
            offered
        };
        let mut builder = StartupFrameBuilder::default().with_option(startup::CQL_VERSION, &cql_version);
        let mut compression = Compression::None;
        if let Some(kind) = handshake.compression.kind() {
            if supported.supports(startup::COMPRESSION, kind) {
                builder = builder.with_option(startup::COMPRESSION, kind);
                compression = handshake.compression;
            } else {
                log::warn!("Compression {} is not supported by the server, sending plain frames", kind);
            }
        }
        let response = cql.request(RequestBody::Startup(builder.build()?)).await?;
        // every frame after STARTUP may be compressed
        cql.compression = compression;
        match response {
            ResponseBody::Ready => (),
            ResponseBody::Authenticate(authenticate) => {
                let credentials = handshake.credentials.as_ref().ok_or_else(|| {
                    anyhow!(
                        "CQL connection not ready: {} requires credentials",
                        authenticate.authenticator
                    )
                })?;
                let frame = AuthResponseFrameBuilder::default().auth_token(credentials).build()?;
                match cql.request(RequestBody::AuthResponse(frame)).await? {
                    ResponseBody::AuthSuccess => (),
                    ResponseBody::AuthChallenge => bail!("CQL connection not ready due to unsupported auth challenge"),
                    ResponseBody::Error(error) => bail!("Authentication failed: {}", error),
                    other => bail!("Expected AUTH_SUCCESS, got {:?}", other),
                }
            }
            ResponseBody::Error(error) => bail!("CQL connection not ready due to CqlError: {}", error),
            other => bail!("Expected READY, got {:?}", other),
        }
        log::debug!("CQL connection ready (version {}, compression {:?})", cql_version, compression);
        Ok(cql)
    }

    /// Send one request and wait for its response. Responses to abandoned
    /// streams and server events are skipped.
    pub(crate) async fn request(&mut self, body: RequestBody) -> anyhow::Result<ResponseBody> {
        let stream_id = self.next_stream;
        self.next_stream = if self.next_stream == i16::MAX { 0 } else { self.next_stream + 1 };
        let payload = RequestFrame::new(stream_id, body).build_payload(self.compression)?;
        log::trace!("Sending {} bytes on stream {}", payload.len(), stream_id);
        self.stream.write_all(&payload).await?;
        self.stream.flush().await?;
        loop {
            let buffer = collect_frame_response(&mut self.stream).await?;
            let frame = ResponseFrame::decode(&buffer, self.compression)?;
            if frame.stream() == stream_id {
                return Ok(frame.body);
            }
            log::trace!("Skipping a response on stream {} while waiting for {}", frame.stream(), stream_id);
        }
    }

    /// The peer address, when connected over TCP.
    pub(crate) fn address(&self) -> Option<SocketAddr> {
        self.address
    }

    pub(crate) fn compression(&self) -> Compression {
        self.compression
    }
}

/// Read one complete frame: the header, then the body it announces.
pub(crate) async fn collect_frame_response<S: AsyncRead + Unpin>(stream: &mut S) -> anyhow::Result<Vec<u8>> {
    let mut header = [0; Header::LEN];
    stream.read_exact(&mut header).await?;
    let body_length = Header::peek_body_len(&header) as usize;
    ensure!(body_length <= i32::MAX as usize, "Invalid frame body length {}", body_length);
    let mut buffer = Vec::with_capacity(Header::LEN + body_length);
    buffer.extend(&header);
    buffer.resize(Header::LEN + body_length, 0);
    stream.read_exact(&mut buffer[Header::LEN..]).await?;
    Ok(buffer)
}
