// crates/chat-server/tests/stream_sessions.rs
use std::time::Duration;

use chat_server::{Config, Server, ServerHandle};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

async fn start() -> ServerHandle {
    let config = Config {
        bind_addr: "127.0.0.1".into(),
        port: 0,
        ..Config::default()
    };
    Server::bind(config).await.unwrap().spawn().unwrap()
}

struct LineClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl LineClient {
    async fn connect(server: &ServerHandle) -> Self {
        let stream = TcpStream::connect(server.stream_addr()).await.unwrap();
        let (reader, writer) = stream.into_split();
        LineClient {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
    }

    async fn send(&mut self, line: &str) {
        self.send_raw(format!("{}\r\n", line).as_bytes()).await;
    }

    /// Next line without the delimiter, or `None` on EOF.
    async fn recv(&mut self) -> Option<String> {
        let mut line = String::new();
        let n = timeout(WAIT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a line")
            .unwrap();
        if n == 0 {
            return None;
        }
        Some(line.trim_end_matches("\r\n").to_string())
    }

    async fn auth(&mut self, username: &str, display_name: &str) {
        self.send(&format!("AUTH {} AS {} USING secret", username, display_name))
            .await;
        assert_eq!(self.recv().await.as_deref(), Some("REPLY OK IS Auth success."));
    }
}

#[tokio::test]
async fn messages_reach_other_channel_members() {
    let server = start().await;
    let mut alice = LineClient::connect(&server).await;
    let mut bob = LineClient::connect(&server).await;

    alice.auth("alice", "Alice").await;
    bob.auth("bob", "Bob").await;
    assert_eq!(
        alice.recv().await.as_deref(),
        Some("MSG FROM Server IS Bob has joined default.")
    );

    bob.send("MSG FROM Bob IS hello there").await;
    assert_eq!(alice.recv().await.as_deref(), Some("MSG FROM Bob IS hello there"));

    server.shutdown().await;
}

#[tokio::test]
async fn line_split_across_writes_is_reassembled() {
    let server = start().await;
    let mut client = LineClient::connect(&server).await;

    client.send_raw(b"AUTH carol AS Carol US").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    client.send_raw(b"ING secret\r\n").await;

    assert_eq!(client.recv().await.as_deref(), Some("REPLY OK IS Auth success."));
    server.shutdown().await;
}

#[tokio::test]
async fn malformed_line_is_skipped() {
    let server = start().await;
    let mut client = LineClient::connect(&server).await;

    client.send("HELLO there").await;
    client.send("AUTH dave AS Dave USING secret").await;

    assert_eq!(client.recv().await.as_deref(), Some("REPLY OK IS Auth success."));
    server.shutdown().await;
}

#[tokio::test]
async fn message_before_auth_ends_the_session() {
    let server = start().await;
    let mut client = LineClient::connect(&server).await;

    client.send("JOIN general AS Eve").await;

    assert_eq!(
        client.recv().await.as_deref(),
        Some("ERR FROM Server IS You must authenticate first.")
    );
    assert_eq!(client.recv().await.as_deref(), Some("BYE"));
    assert_eq!(client.recv().await, None);
    server.shutdown().await;
}

#[tokio::test]
async fn dropped_connection_announces_departure() {
    let server = start().await;
    let mut alice = LineClient::connect(&server).await;
    let mut bob = LineClient::connect(&server).await;

    alice.auth("alice", "Alice").await;
    bob.auth("bob", "Bob").await;
    alice.recv().await;

    drop(bob);
    assert_eq!(
        alice.recv().await.as_deref(),
        Some("MSG FROM Server IS Bob has left default.")
    );

    server.shutdown().await;
}

#[tokio::test]
async fn join_moves_between_channels() {
    let server = start().await;
    let mut alice = LineClient::connect(&server).await;
    let mut bob = LineClient::connect(&server).await;

    alice.auth("alice", "Alice").await;
    bob.auth("bob", "Bob").await;
    alice.recv().await;

    bob.send("JOIN lounge AS Bob").await;
    assert_eq!(bob.recv().await.as_deref(), Some("REPLY OK IS Join success."));
    assert_eq!(
        alice.recv().await.as_deref(),
        Some("MSG FROM Server IS Bob has left default.")
    );

    // Only lounge members hear it now.
    alice.send("MSG FROM Alice IS anyone?").await;
    bob.send("MSG FROM Bob IS quiet here").await;
    alice.send("JOIN lounge AS Alice").await;
    assert_eq!(alice.recv().await.as_deref(), Some("REPLY OK IS Join success."));
    assert_eq!(
        bob.recv().await.as_deref(),
        Some("MSG FROM Server IS Alice has joined lounge.")
    );

    server.shutdown().await;
}

#[tokio::test]
async fn shutdown_says_goodbye() {
    let server = start().await;
    let mut client = LineClient::connect(&server).await;
    client.auth("frank", "Frank").await;

    server.shutdown().await;

    assert_eq!(client.recv().await.as_deref(), Some("BYE"));
    assert_eq!(client.recv().await, None);
}

#[tokio::test]
async fn overlong_line_closes_the_connection() {
    let server = start().await;
    let mut client = LineClient::connect(&server).await;

    client.send_raw(&[b'A'; 5000]).await;

    let mut line = String::new();
    let read = timeout(WAIT, client.reader.read_line(&mut line))
        .await
        .expect("connection left open");
    assert!(matches!(read, Ok(0) | Err(_)), "unexpected {:?}: {:?}", read, line);

    let mut emptied = false;
    for _ in 0..50 {
        if server.registry().is_empty() {
            emptied = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(emptied, "session still registered");

    server.shutdown().await;
}

#[tokio::test]
async fn stop_accepting_keeps_existing_sessions() {
    let server = start().await;
    let mut alice = LineClient::connect(&server).await;
    let mut bob = LineClient::connect(&server).await;
    alice.auth("alice", "Alice").await;
    bob.auth("bob", "Bob").await;
    alice.recv().await;

    server.stop_accepting();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Refused outright, or at least never served.
    if let Ok(stream) = TcpStream::connect(server.stream_addr()).await {
        let (reader, mut writer) = stream.into_split();
        let _ = writer.write_all(b"AUTH late AS Late USING secret\r\n").await;
        let mut line = String::new();
        let mut reader = BufReader::new(reader);
        match timeout(Duration::from_millis(300), reader.read_line(&mut line)).await {
            Err(_) | Ok(Ok(0)) | Ok(Err(_)) => {}
            Ok(Ok(_)) => panic!("late connection was served: {:?}", line),
        }
    }

    bob.send("MSG FROM Bob IS still here").await;
    assert_eq!(alice.recv().await.as_deref(), Some("MSG FROM Bob IS still here"));
    assert_eq!(server.registry().len(), 2);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_reader_does_not_stall_other_sessions() {
    let server = start().await;

    // Authenticates, then never reads again.
    let mut slow = LineClient::connect(&server).await;
    slow.auth("slow", "Slow").await;

    let mut loud = LineClient::connect(&server).await;
    loud.auth("loud", "Loud").await;
    let LineClient {
        reader: _loud_reader,
        writer: mut loud_writer,
    } = loud;

    let flood = tokio::spawn(async move {
        let line = format!("MSG FROM Loud IS {}\r\n", "x".repeat(1300));
        for _ in 0..10_000 {
            if loud_writer.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    let mut victim = LineClient::connect(&server).await;
    victim.send("AUTH victim AS Victim USING secret").await;
    let replied = timeout(Duration::from_secs(3), async {
        loop {
            match victim.recv().await {
                Some(line) if line.starts_with("REPLY") => return line,
                Some(_) => continue,
                None => panic!("victim disconnected"),
            }
        }
    })
    .await
    .expect("auth reply held up by a slow reader");
    assert_eq!(replied, "REPLY OK IS Auth success.");

    timeout(Duration::from_secs(5), server.shutdown())
        .await
        .expect("shutdown held up by a slow reader");
    flood.abort();
    drop(slow);
}
