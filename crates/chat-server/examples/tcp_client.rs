use std::env;
use std::error::Error;

use chat_protocol::framing::LineFramer;
use chat_protocol::text_codec::parse_frame;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Where to connect: env override or default.
    let addr = env::var("CHAT_CLIENT_ADDR").unwrap_or_else(|_| "127.0.0.1:4567".to_string());

    println!("Connecting to {}...", addr);
    let stream = TcpStream::connect(&addr).await?;
    println!("Connected.");
    println!("Type protocol lines like:");
    println!("  AUTH alice AS Alice USING secret");
    println!("  JOIN general AS Alice");
    println!("  MSG FROM Alice IS hello there");
    println!("  BYE FROM Alice");
    println!("Type 'quit' or 'exit' to leave.\n");

    let (reader, mut writer) = stream.into_split();
    let printer = tokio::spawn(print_server_lines(reader));

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = stdin.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.eq_ignore_ascii_case("quit") || trimmed.eq_ignore_ascii_case("exit") {
            println!("Exiting client.");
            break;
        }

        writer.write_all(trimmed.as_bytes()).await?;
        writer.write_all(b"\r\n").await?;
    }

    writer.shutdown().await?;
    printer.abort();
    Ok(())
}

async fn print_server_lines(mut reader: OwnedReadHalf) {
    let mut framer = LineFramer::new(64 * 1024);
    let mut chunk = [0u8; 4096];

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => {
                println!("Server closed the connection.");
                return;
            }
            Ok(n) => n,
            Err(e) => {
                eprintln!("Read error: {}", e);
                return;
            }
        };
        framer.extend(&chunk[..n]);

        loop {
            match framer.next_frame() {
                Ok(Some(frame)) => {
                    let text = String::from_utf8_lossy(&frame);
                    match parse_frame(&frame) {
                        Ok(msg) => println!("<< [{}] {}", msg.kind(), text),
                        Err(_) => println!("<< {}", text),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    eprintln!("Framing error: {}", e);
                    return;
                }
            }
        }
    }
}
