//! Driver tests against a scripted in-process server.

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use feedtap_client::{ClientConfig, Connection, ConnectionState, Error};
use feedtap_proto::handshake::{JSON_PROTOCOL, V0_4};
use feedtap_proto::term::{raw_format_optargs, table_changes};
use feedtap_proto::ChangesOptions;

struct MockServer {
    port: u16,
    listener: TcpListener,
}

impl MockServer {
    async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        Self { port, listener }
    }

    fn config(&self) -> ClientConfig {
        ClientConfig::new("127.0.0.1").with_port(self.port)
    }

    /// Accept one client and answer its handshake. Returns the auth key sent.
    async fn accept(&self, reply: &[u8]) -> (TcpStream, String) {
        let (mut stream, _) = self.listener.accept().await.unwrap();

        assert_eq!(stream.read_u32_le().await.unwrap(), V0_4);
        let len = stream.read_u32_le().await.unwrap();
        let mut key = vec![0u8; len as usize];
        stream.read_exact(&mut key).await.unwrap();
        assert_eq!(stream.read_u32_le().await.unwrap(), JSON_PROTOCOL);

        stream.write_all(reply).await.unwrap();
        (stream, String::from_utf8(key).unwrap())
    }
}

async fn read_query(stream: &mut TcpStream) -> (u64, Value) {
    let token = stream.read_u64_le().await.unwrap();
    let len = stream.read_u32_le().await.unwrap();
    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload).await.unwrap();
    (token, serde_json::from_slice(&payload).unwrap())
}

async fn write_response(stream: &mut TcpStream, token: u64, response: Value) {
    let payload = serde_json::to_vec(&response).unwrap();
    stream.write_u64_le(token).await.unwrap();
    stream.write_u32_le(payload.len() as u32).await.unwrap();
    stream.write_all(&payload).await.unwrap();
}

#[tokio::test]
async fn test_handshake_rejected() {
    let server = MockServer::bind().await;
    let config = server.config().with_auth_key("wrong");

    let server_task: JoinHandle<String> = tokio::spawn(async move {
        let (_stream, key) = server
            .accept(b"ERROR: Incorrect authorization key.\n\0")
            .await;
        key
    });

    let err = Connection::connect(config).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(feedtap_proto::Error::HandshakeRejected(_))
    ));
    assert_eq!(server_task.await.unwrap(), "wrong");
}

#[tokio::test]
async fn test_changefeed_batches_and_stop() {
    let server = MockServer::bind().await;
    let config = server.config();

    let server_task: JoinHandle<Vec<Value>> = tokio::spawn(async move {
        let (mut stream, key) = server.accept(b"SUCCESS\0").await;
        assert!(key.is_empty());
        let mut seen = Vec::new();

        let (token, start) = read_query(&mut stream).await;
        assert_eq!(start[0], json!(1));
        assert_eq!(start[2]["time_format"], json!("raw"));
        seen.push(start[0].clone());
        write_response(
            &mut stream,
            token,
            json!({"t": 3, "r": [{"state": "initializing"}, {"new_val": {"id": 1}}], "n": [1, 5]}),
        )
        .await;

        let (_, cont) = read_query(&mut stream).await;
        seen.push(cont[0].clone());
        write_response(
            &mut stream,
            token,
            json!({"t": 3, "r": [{"old_val": {"id": 1}, "new_val": {"id": 1, "x": 2}}], "n": [1, 5]}),
        )
        .await;

        // Second CONTINUE, then the STOP issued by close().
        let (_, cont) = read_query(&mut stream).await;
        seen.push(cont[0].clone());
        let (stop_token, stop) = read_query(&mut stream).await;
        assert_eq!(stop_token, token);
        seen.push(stop[0].clone());
        write_response(&mut stream, token, json!({"t": 2, "r": []})).await;

        seen
    });

    let conn = Connection::connect(config).await.unwrap();
    assert_eq!(conn.state(), ConnectionState::Ready);

    let term = table_changes("mydb", "users", ChangesOptions::default());
    let mut feed = conn.start(&term, Some(&raw_format_optargs())).unwrap();
    let handle = feed.handle();

    feed.wait_open().await.unwrap();
    assert_eq!(feed.next().await.unwrap().unwrap(), json!({"state": "initializing"}));
    assert_eq!(feed.next().await.unwrap().unwrap(), json!({"new_val": {"id": 1}}));
    assert_eq!(
        feed.next().await.unwrap().unwrap(),
        json!({"old_val": {"id": 1}, "new_val": {"id": 1, "x": 2}})
    );

    handle.close().unwrap();
    handle.close().unwrap();
    assert!(feed.next().await.is_none());

    let seen = server_task.await.unwrap();
    assert_eq!(seen, vec![json!(1), json!(2), json!(2), json!(3)]);

    conn.close();
    assert_eq!(conn.state(), ConnectionState::Closed);
    assert!(matches!(conn.start(&term, None), Err(Error::Closed)));
}

#[tokio::test]
async fn test_runtime_error_on_start() {
    let server = MockServer::bind().await;
    let config = server.config();

    let server_task = tokio::spawn(async move {
        let (mut stream, _) = server.accept(b"SUCCESS\0").await;
        let (token, _) = read_query(&mut stream).await;
        write_response(
            &mut stream,
            token,
            json!({"t": 18, "e": 4100000, "r": ["Table `mydb.gone` does not exist."]}),
        )
        .await;
        stream
    });

    let conn = Connection::connect(config).await.unwrap();
    let term = table_changes("mydb", "gone", ChangesOptions::default());
    let mut feed = conn.start(&term, None).unwrap();

    match feed.wait_open().await.unwrap_err() {
        Error::Query { kind, message } => {
            assert_eq!(kind, "RUNTIME_ERROR");
            assert!(message.contains("does not exist"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(conn.open_queries(), 0);

    let _stream = server_task.await.unwrap();
    conn.close();
}

#[tokio::test]
async fn test_connection_loss_fails_open_feeds() {
    let server = MockServer::bind().await;
    let config = server.config();

    let server_task = tokio::spawn(async move {
        let (mut stream, _) = server.accept(b"SUCCESS\0").await;
        let (token, _) = read_query(&mut stream).await;
        write_response(
            &mut stream,
            token,
            json!({"t": 3, "r": [{"state": "ready"}], "n": [1, 5]}),
        )
        .await;
        // Wait for the CONTINUE, then hang up.
        let _ = read_query(&mut stream).await;
        drop(stream);
    });

    let conn = Connection::connect(config).await.unwrap();
    let term = table_changes("mydb", "users", ChangesOptions::default());
    let mut feed = conn.start(&term, None).unwrap();

    feed.wait_open().await.unwrap();
    assert_eq!(feed.next().await.unwrap().unwrap(), json!({"state": "ready"}));

    server_task.await.unwrap();
    assert!(matches!(feed.next().await, Some(Err(Error::Connection(_)))));
    assert!(feed.next().await.is_none());
}
