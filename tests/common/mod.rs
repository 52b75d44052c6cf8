//! A scripted MySQL server running over an in-memory duplex pipe.
//!
//! Tests drive the protocol from the server side frame by frame: the
//! helpers build raw payloads, `send`/`recv` do the 4-byte framing, and
//! `establish` walks a full handshake so query tests start from a ready
//! connection.

#![allow(dead_code)]

use std::time::Duration;

use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

use quill_mysql::constant::{CapabilityFlags, ColumnType};
use quill_mysql::protocol::column::{write_column_definition, ColumnDefinition};
use quill_mysql::{Connection, Opts};

/// Fixed auth seed the scripted handshake hands out: `0x00..0x13`.
pub const SEED: [u8; 20] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E,
    0x0F, 0x10, 0x11, 0x12, 0x13,
];

const RECV_DEADLINE: Duration = Duration::from_secs(5);

pub struct ScriptedServer {
    stream: DuplexStream,
}

impl ScriptedServer {
    /// Returns the server half and the stream to hand to
    /// `Connection::connect_with_stream`.
    pub fn new() -> (Self, DuplexStream) {
        let (server, client) = duplex(1 << 20);
        (Self { stream: server }, client)
    }

    pub async fn send(&mut self, sequence_id: u8, payload: &[u8]) {
        let mut frame = Vec::with_capacity(payload.len() + 4);
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes()[..3]);
        frame.push(sequence_id);
        frame.extend_from_slice(payload);
        self.stream.write_all(&frame).await.unwrap();
    }

    /// Receive one frame, failing the test if none arrives in time.
    pub async fn recv(&mut self) -> (u8, Vec<u8>) {
        tokio::time::timeout(RECV_DEADLINE, self.recv_inner())
            .await
            .expect("scripted server: no frame arrived")
    }

    async fn recv_inner(&mut self) -> (u8, Vec<u8>) {
        let mut header = [0u8; 4];
        self.stream.read_exact(&mut header).await.unwrap();
        let length = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
        let mut payload = vec![0u8; length];
        self.stream.read_exact(&mut payload).await.unwrap();
        (header[3], payload)
    }

    /// Assert that the client sends nothing within the window.
    pub async fn assert_no_frame(&mut self, window: Duration) {
        let mut byte = [0u8; 1];
        match tokio::time::timeout(window, self.stream.read(&mut byte)).await {
            Err(_elapsed) => {}
            Ok(Ok(0)) => {}
            Ok(result) => panic!("unexpected bytes from client: {:?}", result),
        }
    }

    // ------------------------------------------------------------------
    // Server payloads
    // ------------------------------------------------------------------

    pub async fn send_handshake(&mut self, server_version: &str, plugin: &str) {
        let caps = CapabilityFlags::CLIENT_PROTOCOL_41
            | CapabilityFlags::CLIENT_SECURE_CONNECTION
            | CapabilityFlags::CLIENT_PLUGIN_AUTH
            | CapabilityFlags::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA
            | CapabilityFlags::CLIENT_CONNECT_WITH_DB
            | CapabilityFlags::CLIENT_TRANSACTIONS;
        let bits = caps.bits();

        let mut payload = vec![0x0A];
        payload.extend_from_slice(server_version.as_bytes());
        payload.push(0);
        payload.extend_from_slice(&99u32.to_le_bytes()); // connection id
        payload.extend_from_slice(&SEED[..8]);
        payload.push(0x00); // filler
        payload.extend_from_slice(&(bits as u16).to_le_bytes());
        payload.push(33); // charset
        payload.extend_from_slice(&0u16.to_le_bytes()); // status flags
        payload.extend_from_slice(&((bits >> 16) as u16).to_le_bytes());
        payload.push(21); // auth data length
        payload.extend_from_slice(&[0u8; 10]); // reserved
        payload.extend_from_slice(&SEED[8..]);
        payload.push(0x00);
        payload.extend_from_slice(plugin.as_bytes());
        payload.push(0);

        self.send(0, &payload).await;
    }

    pub async fn send_ok(
        &mut self,
        sequence_id: u8,
        affected_rows: u64,
        last_insert_id: u64,
        status_flags: u16,
        warnings: u16,
    ) {
        let mut payload = vec![0x00];
        write_lenenc(&mut payload, affected_rows);
        write_lenenc(&mut payload, last_insert_id);
        payload.extend_from_slice(&status_flags.to_le_bytes());
        payload.extend_from_slice(&warnings.to_le_bytes());
        self.send(sequence_id, &payload).await;
    }

    pub async fn send_err(&mut self, sequence_id: u8, code: u16, sql_state: &str, message: &str) {
        assert_eq!(sql_state.len(), 5);
        let mut payload = vec![0xFF];
        payload.extend_from_slice(&code.to_le_bytes());
        payload.push(b'#');
        payload.extend_from_slice(sql_state.as_bytes());
        payload.extend_from_slice(message.as_bytes());
        self.send(sequence_id, &payload).await;
    }

    pub async fn send_eof(&mut self, sequence_id: u8, warnings: u16, status_flags: u16) {
        let mut payload = vec![0xFE];
        payload.extend_from_slice(&warnings.to_le_bytes());
        payload.extend_from_slice(&status_flags.to_le_bytes());
        self.send(sequence_id, &payload).await;
    }

    pub async fn send_result_set_header(&mut self, sequence_id: u8, column_count: u8) {
        self.send(sequence_id, &[column_count]).await;
    }

    pub async fn send_column(&mut self, sequence_id: u8, name: &str, column_type: ColumnType) {
        let mut payload = Vec::new();
        write_column_definition(&mut payload, &ColumnDefinition::named(name, column_type));
        self.send(sequence_id, &payload).await;
    }

    /// A text-protocol row; `None` cells are NULL.
    pub async fn send_text_row(&mut self, sequence_id: u8, cells: &[Option<&str>]) {
        let mut payload = Vec::new();
        for cell in cells {
            match cell {
                None => payload.push(0xFB),
                Some(text) => {
                    write_lenenc(&mut payload, text.len() as u64);
                    payload.extend_from_slice(text.as_bytes());
                }
            }
        }
        self.send(sequence_id, &payload).await;
    }

    /// COM_STMT_PREPARE response header.
    pub async fn send_prepare_ok(
        &mut self,
        sequence_id: u8,
        statement_id: u32,
        num_columns: u16,
        num_params: u16,
    ) {
        let mut payload = vec![0x00];
        payload.extend_from_slice(&statement_id.to_le_bytes());
        payload.extend_from_slice(&num_columns.to_le_bytes());
        payload.extend_from_slice(&num_params.to_le_bytes());
        payload.push(0x00);
        payload.extend_from_slice(&0u16.to_le_bytes());
        self.send(sequence_id, &payload).await;
    }

    /// A binary-protocol row of non-NULL i64 cells.
    pub async fn send_binary_int_row(&mut self, sequence_id: u8, cells: &[i64]) {
        let bitmap_len = (cells.len() + 7 + 2) / 8;
        let mut payload = vec![0x00];
        payload.extend_from_slice(&vec![0u8; bitmap_len]);
        for cell in cells {
            payload.extend_from_slice(&cell.to_le_bytes());
        }
        self.send(sequence_id, &payload).await;
    }
}

fn write_lenenc(out: &mut Vec<u8>, value: u64) {
    if value < 251 {
        out.push(value as u8);
    } else if value < (1 << 16) {
        out.push(0xFC);
        out.extend_from_slice(&(value as u16).to_le_bytes());
    } else {
        out.push(0xFE);
        out.extend_from_slice(&value.to_le_bytes());
    }
}

/// Default options for scripted-server tests.
pub fn test_opts() -> Opts {
    Opts {
        host: Some("localhost".to_string()),
        user: "test".to_string(),
        password: Some("secret".to_string()),
        db: Some("testdb".to_string()),
        ..Opts::default()
    }
}

/// Run a full handshake and return a ready connection with its server.
pub async fn establish(opts: Opts) -> (ScriptedServer, Connection) {
    let (mut server, client_stream) = ScriptedServer::new();
    let conn = Connection::new(opts).unwrap();

    let connecting = conn.clone();
    let connect_task =
        tokio::spawn(async move { connecting.connect_with_stream(client_stream).await });

    server
        .send_handshake("5.7.26-log", "mysql_native_password")
        .await;
    let (seq, _response) = server.recv().await;
    assert_eq!(seq, 1);
    server.send_ok(2, 0, 0, 0x0002, 0).await;

    connect_task.await.unwrap().unwrap();
    assert!(conn.is_connected());
    (server, conn)
}
