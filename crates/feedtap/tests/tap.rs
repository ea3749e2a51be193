//! Runs the tap against a scripted in-process server.

use clap::Parser;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use feedtap::{Args, Error};
use feedtap_proto::handshake::{JSON_PROTOCOL, V0_4};

async fn accept(listener: &TcpListener) -> TcpStream {
    let (mut stream, _) = listener.accept().await.unwrap();
    assert_eq!(stream.read_u32_le().await.unwrap(), V0_4);
    let len = stream.read_u32_le().await.unwrap();
    let mut key = vec![0u8; len as usize];
    stream.read_exact(&mut key).await.unwrap();
    assert_eq!(stream.read_u32_le().await.unwrap(), JSON_PROTOCOL);
    stream.write_all(b"SUCCESS\0").await.unwrap();
    stream
}

async fn read_query(stream: &mut TcpStream) -> Option<(u64, Value)> {
    let token = stream.read_u64_le().await.ok()?;
    let len = stream.read_u32_le().await.ok()?;
    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload).await.ok()?;
    Some((token, serde_json::from_slice(&payload).unwrap()))
}

async fn write_response(stream: &mut TcpStream, token: u64, response: Value) {
    let payload = serde_json::to_vec(&response).unwrap();
    stream.write_u64_le(token).await.unwrap();
    stream.write_u32_le(payload.len() as u32).await.unwrap();
    stream.write_all(&payload).await.unwrap();
}

#[tokio::test]
async fn test_table_feed_to_json_lines() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port().to_string();

    let server = tokio::spawn(async move {
        let mut stream = accept(&listener).await;
        let mut seen = Vec::new();

        let (token, start) = read_query(&mut stream).await.unwrap();
        seen.push(start[0].clone());
        assert_eq!(start[2]["time_format"], json!("raw"));
        write_response(
            &mut stream,
            token,
            json!({
                "t": 3,
                "r": [
                    {"state": "initializing"},
                    {"new_val": {"id": 1, "name": "a"}},
                    {"state": "ready"},
                    {"old_val": {"id": 1, "name": "a"}, "new_val": {"id": 1, "name": "b"}}
                ],
                "n": [1, 5]
            }),
        )
        .await;

        // CONTINUE, then STOP on teardown, until the client hangs up
        while let Some((_, query)) = read_query(&mut stream).await {
            seen.push(query[0].clone());
        }
        seen
    });

    let config = Args::try_parse_from([
        "feedtap",
        "--host",
        "127.0.0.1",
        "--port",
        port.as_str(),
        "--watch-tables",
        "mydb.users",
        "--tags",
        "cdc",
    ])
    .unwrap()
    .into_config()
    .unwrap();

    let (out, read_half) = tokio::io::duplex(64 * 1024);
    let mut lines = BufReader::new(read_half).lines();
    let mut received = Vec::new();

    let written = feedtap::run(config, out, async {
        while received.len() < 2 {
            match lines.next_line().await.unwrap() {
                Some(line) => received.push(serde_json::from_str::<Value>(&line).unwrap()),
                None => break,
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(written, 2);
    assert_eq!(received[0]["db"], json!("mydb"));
    assert_eq!(received[0]["table"], json!("users"));
    assert_eq!(received[0]["old_val"], Value::Null);
    assert_eq!(received[0]["new_val"], json!({"id": 1, "name": "a"}));
    assert_eq!(received[0]["tags"], json!(["cdc"]));
    assert_eq!(received[1]["old_val"], json!({"id": 1, "name": "a"}));
    assert_eq!(received[1]["new_val"], json!({"id": 1, "name": "b"}));
    assert!(received[1]["@timestamp"].is_string());

    let seen = server.await.unwrap();
    assert_eq!(&seen[..2], &[json!(1), json!(2)]);
}

#[tokio::test]
async fn test_connect_failure_is_fatal() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port().to_string();
    drop(listener);

    let config = Args::try_parse_from(["feedtap", "--host", "127.0.0.1", "--port", port.as_str()])
        .unwrap()
        .into_config()
        .unwrap();

    let result = feedtap::run(config, tokio::io::sink(), std::future::pending()).await;
    assert!(matches!(result, Err(Error::Client(_))));
}
