//! Helpers shared by the gateway's unit tests.

use std::net::SocketAddr;

use axum::Router;
use mockall::Sequence;

use crate::proxy::{MockUpstreamTransport, RawResponse};

pub fn raw(status: u16, body: &str) -> RawResponse {
    RawResponse {
        status,
        body: body.to_string(),
    }
}

/// Transport answering exactly `replies.len()` calls, in order
pub fn replying(replies: &[(u16, &'static str)]) -> MockUpstreamTransport {
    let mut mock = MockUpstreamTransport::new();
    let mut seq = Sequence::new();
    for &(status, body) in replies {
        mock.expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(raw(status, body)));
    }
    mock
}

/// Transport that fails the test if anything is sent
pub fn silent() -> MockUpstreamTransport {
    let mut mock = MockUpstreamTransport::new();
    mock.expect_send().never();
    mock
}

/// Serve `app` on an ephemeral loopback port
pub async fn spawn_upstream(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}
