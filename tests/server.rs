use std::time::Duration;

use http::Method;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use rivet::errors::BoxError;
use rivet::{closer, BindError, Error, In, Input, Request, Router, Server};

#[derive(serde::Deserialize, schemars::JsonSchema)]
struct Hello {
    name: String,
}

impl Input for Hello {}

async fn hello(In(h): In<Hello>) -> Result<String, BoxError> {
    Ok(format!("hello {}", h.name))
}

async fn raw_http(addr: std::net::SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut out = String::new();
    stream.read_to_string(&mut out).await.unwrap();
    out
}

#[tokio::test]
async fn serves_and_shuts_down() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = Router::new().on(Method::POST, "/hello", hello);

    let (closed_tx, closed_rx) = oneshot::channel();
    closer::global().register("test resource", move || {
        let _ = closed_tx.send(());
        Ok::<(), std::io::Error>(())
    });

    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(
        Server::from_listener(listener)
            .shutdown_timeout(Duration::from_secs(2))
            .serve_with_shutdown(router, async {
                let _ = stopped.await;
            }),
    );

    let body = r#"{"name":"x"}"#;
    let response = raw_http(
        addr,
        &format!(
            "POST /hello HTTP/1.1\r\nhost: test\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        ),
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
    assert!(response.contains(r#""data":"hello x""#), "{response}");

    let missing = raw_http(addr, "GET /missing HTTP/1.1\r\nhost: test\r\nconnection: close\r\n\r\n").await;
    assert!(missing.starts_with("HTTP/1.1 404 Not Found"), "{missing}");
    assert!(missing.contains("ROUTE_NOT_FOUND"), "{missing}");

    stop.send(()).unwrap();
    server.await.unwrap().unwrap();
    closed_rx.await.unwrap();
    assert!(closer::global().is_closed());
}

#[tokio::test]
async fn unreadable_body_is_a_500_problem() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = Router::new().on(Method::POST, "/hello", hello);

    // Never shut down: closing would run the process-wide closer under the
    // other test's feet. The runtime drops the task when the test ends.
    tokio::spawn(Server::from_listener(listener).serve_with_shutdown(router, std::future::pending()));

    let response = raw_http(
        addr,
        "POST /hello HTTP/1.1\r\nhost: test\r\ntransfer-encoding: chunked\r\nconnection: close\r\n\r\nzz\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 500 Internal Server Error"), "{response}");
    assert!(response.contains("content-type: application/json"), "{response}");
    assert!(response.contains("failed to decode request"), "{response}");
}

#[tokio::test]
async fn refuses_to_start_with_unbindable_handler() {
    let router = Router::new().on(Method::GET, "/bad", |_: Request| async {});

    let err = Server::bind("127.0.0.1:0")
        .serve_with_shutdown(router, std::future::pending())
        .await
        .unwrap_err();
    match err {
        Error::Bind { path, source, .. } => {
            assert_eq!(path, "/bad");
            assert_eq!(source, BindError::HandlerMustSignalCompletion);
        }
        other => panic!("unexpected error: {other}"),
    }
}
