// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! An in-process node answering the native protocol, for tests.


use super::{
    connection::collect_frame_response,
    frame::{
        read_bytes,
        read_byte,
        read_int,
        read_short,
        read_short_bytes,
        read_string,
        write_bytes,
        write_int,
        write_short,
        write_short_bytes,
        write_string,
        OpCode,
    },
    Compression,
};
use std::{
    collections::HashMap,
    convert::TryFrom,
    net::SocketAddr,
    sync::Arc,
};
use tokio::{
    io::{
        AsyncRead,
        AsyncWrite,
        AsyncWriteExt,
    },
    net::TcpListener,
};

/// A request frame received by the node.
#[derive(Clone, Debug)]
pub(crate) struct Received {
    pub(crate) stream: i16,
    pub(crate) opcode: OpCode,
    pub(crate) body: Vec<u8>,
}

/// The decoded parts of a QUERY, EXECUTE or PREPARE body.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct Statement {
    pub(crate) text: Option<String>,
    pub(crate) id: Option<Vec<u8>>,
    pub(crate) consistency: u16,
    pub(crate) values: Vec<Option<Vec<u8>>>,
    pub(crate) page_size: Option<i32>,
    pub(crate) paging_state: Option<Vec<u8>>,
}

impl Received {
    pub(crate) fn statement(&self) -> anyhow::Result<Statement> {
        let start = &mut 0;
        let payload = self.body.as_slice();
        let mut statement = Statement::default();
        match self.opcode {
            OpCode::Prepare | OpCode::Query => {
                let len = read_int(start, payload)? as usize;
                statement.text = Some(String::from_utf8(payload[*start..*start + len].to_vec())?);
                *start += len;
            }
            OpCode::Execute => statement.id = Some(read_short_bytes(start, payload)?.to_vec()),
            other => anyhow::bail!("{:?} carries no statement", other),
        }
        if self.opcode == OpCode::Prepare {
            return Ok(statement);
        }
        statement.consistency = read_short(start, payload)?;
        let flags = read_byte(start, payload)?;
        if flags & 0x01 != 0 {
            for _ in 0..read_short(start, payload)? {
                statement.values.push(read_bytes(start, payload)?.map(<[u8]>::to_vec));
            }
        }
        if flags & 0x04 != 0 {
            statement.page_size = Some(read_int(start, payload)?);
        }
        if flags & 0x08 != 0 {
            statement.paging_state = read_bytes(start, payload)?.map(<[u8]>::to_vec);
        }
        Ok(statement)
    }
}

/// The answer to a request: an opcode and a body, or silence.
pub(crate) type Reply = Option<(OpCode, Vec<u8>)>;
pub(crate) type Handler = Arc<dyn Fn(&Received) -> Reply + Send + Sync>;

/// Serve one client on `stream`. OPTIONS and STARTUP are answered here, every
/// other request goes to `handler`.
pub(crate) async fn serve<S>(mut stream: S, supported: HashMap<String, Vec<String>>, handler: Handler) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut compression = Compression::None;
    loop {
        let frame = match collect_frame_response(&mut stream).await {
            Ok(frame) => frame,
            Err(_) => return Ok(()),
        };
        let stream_id = i16::from_be_bytes([frame[2], frame[3]]);
        let opcode = OpCode::try_from(frame[4])?;
        let body = if frame[1] & 0x01 != 0 {
            compression.decompress_body(&frame[9..])?
        } else {
            frame[9..].to_vec()
        };
        let received = Received {
            stream: stream_id,
            opcode,
            body,
        };
        let reply = match opcode {
            OpCode::Options => Some((OpCode::Supported, multimap(&supported))),
            OpCode::Startup => {
                let options = string_map(&received.body)?;
                if let Some(kind) = options.get("COMPRESSION") {
                    compression = kind.parse()?;
                }
                handler(&received).or(Some((OpCode::Ready, Vec::new())))
            }
            _ => handler(&received),
        };
        if let Some((opcode, body)) = reply {
            let mut response = vec![0x84, 0x00];
            response.extend(&stream_id.to_be_bytes());
            response.push(opcode as u8);
            response.extend(&(body.len() as u32).to_be_bytes());
            response.extend(body);
            stream.write_all(&response).await?;
        }
    }
}

/// Start a node on an ephemeral local port, on its own thread.
pub(crate) fn spawn_node(handler: Handler) -> SocketAddr {
    let (sender, receiver) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("test runtime");
        runtime.block_on(async move {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            sender.send(listener.local_addr().expect("local addr")).expect("send address");
            loop {
                let (socket, _) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(_) => return,
                };
                let handler = handler.clone();
                tokio::spawn(async move {
                    let _ = serve(socket, default_supported(), handler).await;
                });
            }
        })
    });
    receiver.recv().expect("node address")
}

pub(crate) fn default_supported() -> HashMap<String, Vec<String>> {
    let mut supported = HashMap::new();
    supported.insert("CQL_VERSION".to_string(), vec!["3.0.0".to_string(), "3.3.1".to_string()]);
    supported.insert("COMPRESSION".to_string(), vec!["lz4".to_string(), "snappy".to_string()]);
    supported
}

fn multimap(map: &HashMap<String, Vec<String>>) -> Vec<u8> {
    let mut body = Vec::new();
    write_short(map.len() as u16, &mut body);
    for (key, values) in map {
        write_string(key, &mut body);
        write_short(values.len() as u16, &mut body);
        for value in values {
            write_string(value, &mut body);
        }
    }
    body
}

fn string_map(body: &[u8]) -> anyhow::Result<HashMap<String, String>> {
    let start = &mut 0;
    let n = read_short(start, body)?;
    let mut map = HashMap::new();
    for _ in 0..n {
        let key = read_string(start, body)?;
        map.insert(key, read_string(start, body)?);
    }
    Ok(map)
}

fn write_columns(columns: &[(&str, u16)], body: &mut Vec<u8>) {
    write_string("ks", body);
    write_string("cf_test", body);
    for (name, type_id) in columns {
        write_string(name, body);
        write_short(*type_id, body);
    }
}

pub(crate) fn void() -> Reply {
    let mut body = Vec::new();
    write_int(0x0001, &mut body);
    Some((OpCode::Result, body))
}

pub(crate) fn set_keyspace(keyspace: &str) -> Reply {
    let mut body = Vec::new();
    write_int(0x0003, &mut body);
    write_string(keyspace, &mut body);
    Some((OpCode::Result, body))
}

pub(crate) fn rows(columns: &[(&str, u16)], rows: &[Vec<Option<Vec<u8>>>], paging_state: Option<&[u8]>) -> Reply {
    let mut body = Vec::new();
    write_int(0x0002, &mut body);
    write_int(0x0001 | if paging_state.is_some() { 0x0002 } else { 0 }, &mut body);
    write_int(columns.len() as i32, &mut body);
    if let Some(paging_state) = paging_state {
        write_bytes(paging_state, &mut body);
    }
    write_columns(columns, &mut body);
    write_int(rows.len() as i32, &mut body);
    for row in rows {
        for cell in row {
            match cell {
                Some(cell) => write_bytes(cell, &mut body),
                None => write_int(-1, &mut body),
            }
        }
    }
    Some((OpCode::Result, body))
}

pub(crate) fn prepared(id: &[u8], variables: &[(&str, u16)], columns: &[(&str, u16)]) -> Reply {
    let mut body = Vec::new();
    write_int(0x0004, &mut body);
    write_short_bytes(id, &mut body);
    write_int(0x0001, &mut body);
    write_int(variables.len() as i32, &mut body);
    write_int(0, &mut body);
    write_columns(variables, &mut body);
    write_int(0x0001, &mut body);
    write_int(columns.len() as i32, &mut body);
    write_columns(columns, &mut body);
    Some((OpCode::Result, body))
}

pub(crate) fn error(code: i32, message: &str, extra: &[u8]) -> Reply {
    let mut body = Vec::new();
    write_int(code, &mut body);
    write_string(message, &mut body);
    body.extend(extra);
    Some((OpCode::Error, body))
}
