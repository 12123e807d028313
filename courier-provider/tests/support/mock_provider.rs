//! Mock provider HTTP server for testing the provider client
//!
//! Speaks just enough HTTP/1.1 to answer one request per connection with a
//! scripted status and JSON body, and records every request it receives.
#![allow(dead_code)] // Test utility module - not all methods used in every test
//!
//! # Example
//!
//! ```rust,no_run
//! use support::mock_provider::MockProviderServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = MockProviderServer::builder()
//!     .with_response(429, r#"{"ErrorCode":429,"Message":"Rate limit exceeded"}"#)
//!     .build()
//!     .await?;
//!
//! // Point the client at server.base_url()
//!
//! server.shutdown();
//! # Ok(())
//! # }
//! ```

use std::{
    collections::{HashMap, VecDeque},
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::Mutex,
    time::timeout,
};

/// A request as seen by the mock server
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub method: String,
    pub path: String,
    /// Header names are lowercased
    pub headers: HashMap<String, String>,
    pub body: serde_json::Value,
}

#[derive(Debug, Clone)]
struct ScriptedResponse {
    status: u16,
    body: String,
}

impl ScriptedResponse {
    fn accepted() -> Self {
        Self {
            status: 200,
            body: r#"{"ErrorCode":0,"Message":"OK"}"#.to_string(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!(
            "HTTP/1.1 {} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            self.status,
            self.body.len(),
            self.body
        )
        .into_bytes()
    }
}

#[derive(Default)]
struct MockState {
    responses: VecDeque<ScriptedResponse>,
    requests: Vec<ReceivedRequest>,
}

pub struct MockProviderServer {
    addr: SocketAddr,
    state: Arc<Mutex<MockState>>,
    shutdown: Arc<AtomicBool>,
}

impl MockProviderServer {
    #[must_use]
    pub fn builder() -> MockProviderServerBuilder {
        MockProviderServerBuilder::default()
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn requests(&self) -> Vec<ReceivedRequest> {
        self.state.lock().await.requests.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    async fn handle_client(
        stream: TcpStream,
        state: Arc<Mutex<MockState>>,
        response_delay: Option<Duration>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut reader = BufReader::new(stream);
        let mut line = String::new();

        reader.read_line(&mut line).await?;
        let mut request_line = line.split_whitespace();
        let method = request_line.next().unwrap_or_default().to_string();
        let path = request_line.next().unwrap_or_default().to_string();

        let mut headers = HashMap::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                break;
            }
            let header = line.trim_end();
            if header.is_empty() {
                break;
            }
            if let Some((name, value)) = header.split_once(':') {
                headers.insert(name.trim().to_lowercase(), value.trim().to_string());
            }
        }

        let length = headers
            .get("content-length")
            .and_then(|value| value.parse::<usize>().ok())
            .unwrap_or(0);
        let mut body = vec![0; length];
        reader.read_exact(&mut body).await?;

        let response = {
            let mut state = state.lock().await;
            state.requests.push(ReceivedRequest {
                method,
                path,
                headers,
                body: serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null),
            });
            state
                .responses
                .pop_front()
                .unwrap_or_else(ScriptedResponse::accepted)
        };

        if let Some(delay) = response_delay {
            tokio::time::sleep(delay).await;
        }

        let stream = reader.get_mut();
        stream.write_all(&response.to_bytes()).await?;
        stream.flush().await?;
        stream.shutdown().await?;

        Ok(())
    }
}

/// Builder for configuring a `MockProviderServer`
#[derive(Default)]
pub struct MockProviderServerBuilder {
    responses: VecDeque<ScriptedResponse>,
    response_delay: Option<Duration>,
}

impl MockProviderServerBuilder {
    /// Queue a response; once the queue is empty every request is accepted
    #[must_use]
    pub fn with_response(mut self, status: u16, body: impl Into<String>) -> Self {
        self.responses.push_back(ScriptedResponse {
            status,
            body: body.into(),
        });
        self
    }

    /// Add a delay before sending each response
    #[must_use]
    pub const fn with_response_delay(mut self, delay: Duration) -> Self {
        self.response_delay = Some(delay);
        self
    }

    /// Build and start the mock provider server
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to a port
    pub async fn build(self) -> Result<MockProviderServer, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let state = Arc::new(Mutex::new(MockState {
            responses: self.responses,
            requests: Vec::new(),
        }));
        let shutdown = Arc::new(AtomicBool::new(false));

        let state_clone = Arc::clone(&state);
        let shutdown_clone = Arc::clone(&shutdown);
        let response_delay = self.response_delay;

        tokio::spawn(async move {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }

                // Accept with a timeout so the shutdown flag is noticed
                let accept_result = timeout(Duration::from_millis(100), listener.accept()).await;

                if let Ok(Ok((stream, _peer))) = accept_result {
                    let state = Arc::clone(&state_clone);
                    tokio::spawn(async move {
                        let _ = MockProviderServer::handle_client(stream, state, response_delay).await;
                    });
                }
            }
        });

        Ok(MockProviderServer {
            addr,
            state,
            shutdown,
        })
    }
}
