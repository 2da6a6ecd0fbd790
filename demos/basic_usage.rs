// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic driver usage example.
//!
//! Demonstrates:
//! 1. Building a client over a loopback in-memory transport
//! 2. Writing rows with PutRequest
//! 3. Reading them back with GetRequest
//! 4. A simple query
//! 5. Table limits seeding the rate-limiter map
//! 6. Clean shutdown
//!
//! The loopback transport stands in for the HTTP connection pool so the
//! example runs without any service. Point a real transport at an endpoint
//! and everything above it stays the same.
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};

use nosql_driver::protocol::{OpCode, ProtocolReader, ProtocolWriter};
use nosql_driver::{
    Channel, Client, ClientConfig, DeleteRequest, GetRequest, GetTableRequest, HttpTransport,
    NoAuthProvider, NoSQLError, PutRequest, QueryRequest, WireRequest, WireResponse,
};

/// In-memory single-table service speaking the driver's wire protocol.
#[derive(Default)]
struct LoopbackTransport {
    rows: Mutex<HashMap<String, Value>>,
}

fn ok_response(f: impl FnOnce(&mut ProtocolWriter)) -> WireResponse {
    let mut w = ProtocolWriter::new();
    w.write_byte(0);
    f(&mut w);
    WireResponse {
        status: 200,
        reason: "OK".into(),
        body: Bytes::from(w.into_bytes()),
    }
}

fn write_consumed(w: &mut ProtocolWriter, read_units: i64, write_units: i64) {
    w.write_packed_i64(read_units);
    w.write_packed_i64(read_units);
    w.write_packed_i64(write_units);
    w.write_packed_i64(write_units);
}

fn row_key(v: &Value) -> String {
    v.get("id").cloned().unwrap_or(Value::Null).to_string()
}

#[async_trait]
impl HttpTransport for LoopbackTransport {
    async fn get_channel(&self, _timeout: Duration) -> Result<Channel, NoSQLError> {
        Ok(Channel(1))
    }

    async fn run_request(
        &self,
        request: WireRequest,
        _channel: Channel,
    ) -> Result<WireResponse, NoSQLError> {
        let mut r = ProtocolReader::new(Bytes::from(request.body));
        let _serial = r.read_i16()?;
        let opcode = r.read_byte()?;
        let _timeout_ms = r.read_packed_i32()?;
        let _table = r.read_string()?;

        let response = if opcode == OpCode::GetTable as u8 {
            ok_response(|w| {
                w.write_string(Some("users"));
                w.write_byte(0); // active
                w.write_bool(true);
                w.write_packed_i32(100);
                w.write_packed_i32(50);
                w.write_packed_i32(25);
            })
        } else if opcode == OpCode::Get as u8 {
            let key = r.read_value()?;
            let row = self.rows.lock().unwrap().get(&row_key(&key)).cloned();
            ok_response(|w| {
                write_consumed(w, 1, 0);
                match row {
                    Some(row) => {
                        w.write_bool(true);
                        let _ = w.write_value(&row);
                        w.write_bytes(Some(&[1]));
                        w.write_packed_i64(0);
                    }
                    None => {
                        w.write_bool(false);
                        w.write_bytes(None);
                        w.write_packed_i64(0);
                    }
                }
            })
        } else if opcode == OpCode::Put as u8 {
            let value = r.read_value()?;
            self.rows.lock().unwrap().insert(row_key(&value), value);
            ok_response(|w| {
                write_consumed(w, 0, 1);
                w.write_bool(true);
                w.write_bytes(Some(&[1]));
            })
        } else if opcode == OpCode::Delete as u8 {
            let key = r.read_value()?;
            let removed = self.rows.lock().unwrap().remove(&row_key(&key)).is_some();
            ok_response(|w| {
                write_consumed(w, 1, 1);
                w.write_bool(removed);
            })
        } else if opcode == OpCode::Query as u8 {
            let rows: Vec<Value> = self.rows.lock().unwrap().values().cloned().collect();
            ok_response(|w| {
                write_consumed(w, rows.len() as i64, 0);
                w.write_packed_i32(rows.len() as i32);
                for row in &rows {
                    let _ = w.write_value(row);
                }
                w.write_bytes(None);
                w.write_bool(false); // simple
            })
        } else {
            let mut w = ProtocolWriter::new();
            w.write_byte(1); // unknown operation
            w.write_string(Some("unsupported operation"));
            WireResponse {
                status: 200,
                reason: "OK".into(),
                body: Bytes::from(w.into_bytes()),
            }
        };
        Ok(response)
    }

    fn max_content_length(&self) -> usize {
        32 * 1024 * 1024
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n=== nosql-driver: basic usage ===\n");

    // 1. Build the client over the loopback transport
    let config = ClientConfig {
        endpoint: "http://localhost:8080".into(),
        rate_limiting_enabled: true,
        ..Default::default()
    };
    let client = Client::new(
        config,
        Arc::new(LoopbackTransport::default()),
        Arc::new(NoAuthProvider),
    )?;
    println!("client ready");

    // 2. Write a few rows
    let users = [
        json!({"id": 1, "name": "Alice", "role": "admin"}),
        json!({"id": 2, "name": "Bob", "role": "user"}),
        json!({"id": 3, "name": "Carol", "role": "user"}),
    ];
    for user in &users {
        let res = PutRequest::new("users", user.clone())
            .execute(&client)
            .await?;
        println!("put id={} -> success={}", user["id"], res.success);
    }

    // 3. Read them back
    for id in 1..=3 {
        let res = GetRequest::new("users", json!({"id": id}))
            .execute(&client)
            .await?;
        match res.row {
            Some(row) => println!(
                "get id={id} -> {row} (read units: {})",
                res.consumed.read_units
            ),
            None => println!("get id={id} -> not found"),
        }
    }

    // 4. A simple query
    let mut query = QueryRequest::new("select * from users").table_name("users");
    let qres = query.execute(&client).await?;
    println!("query returned {} rows", qres.rows.len());

    // 5. Table limits seed the limiter map
    let table = GetTableRequest::new("users").execute(&client).await?;
    println!(
        "table '{}' limits: {:?}, rate-limited tables: {}",
        table.table_name,
        table.limits,
        client.rate_limited_tables()
    );

    // 6. Delete a row and shut down
    let res = DeleteRequest::new("users", json!({"id": 2}))
        .execute(&client)
        .await?;
    println!("delete id=2 -> success={}", res.success);

    client.shutdown().await;
    println!("\n=== done ===\n");
    Ok(())
}
