//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

/// A mock HAProxy runtime socket.
///
/// Accepts one command line per connection, records it, writes the
/// scripted response, and closes the stream (the runtime API signals
/// end-of-response with EOF).
pub struct MockRuntime {
    pub addr: SocketAddr,
    commands: Arc<Mutex<Vec<String>>>,
}

impl MockRuntime {
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn addr_string(&self) -> String {
        self.addr.to_string()
    }
}

/// Start a mock runtime socket with a scripted responder.
pub async fn start_mock_runtime<F>(respond: F) -> MockRuntime
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let commands = Arc::new(Mutex::new(Vec::new()));

    let log = commands.clone();
    let respond = Arc::new(respond);
    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            let log = log.clone();
            let respond = respond.clone();
            tokio::spawn(async move {
                let mut reader = BufReader::new(socket);
                let mut line = String::new();
                if reader.read_line(&mut line).await.is_ok() {
                    let command = line.trim_end().to_string();
                    let response = respond(&command);
                    log.lock().unwrap().push(command);
                    let mut socket = reader.into_inner();
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                }
            });
        }
    });

    MockRuntime { addr, commands }
}
