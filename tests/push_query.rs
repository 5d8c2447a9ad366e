//! Push queries against a local WebSocket server.

mod common;

use std::time::Duration;

use common::{TestResult, unused_listener};
use futures::{SinkExt, StreamExt, TryStreamExt};
use querywire::{QueryClient, QueryError, QueryRequest, Row};
use reqwest::Url;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    WebSocketStream,
    accept_hdr_async,
    tungstenite::{
        Message,
        handshake::server::{ErrorResponse, Request, Response},
    },
};
use tokio_util::sync::CancellationToken;

const CLOSE_WAIT: Duration = Duration::from_secs(5);

/// Accept one WebSocket client, returning the socket and the decoded
/// `request` query parameter.
async fn accept(listener: &TcpListener) -> TestResult<(WebSocketStream<TcpStream>, Value)> {
    let (stream, _) = listener.accept().await?;
    let mut target = None;
    let socket = accept_hdr_async(stream, |request: &Request, response: Response| {
        target = Some(request.uri().to_string());
        Ok::<_, ErrorResponse>(response)
    })
    .await?;

    let target = target.ok_or("handshake carried no uri")?;
    let url = Url::parse(&format!("ws://localhost{target}"))?;
    assert_eq!(url.path(), "/ws/query");
    let (_, request) = url
        .query_pairs()
        .find(|(key, _)| key == "request")
        .ok_or("missing request parameter")?;
    Ok((socket, serde_json::from_str(&request)?))
}

async fn send_all(socket: &mut WebSocketStream<TcpStream>, values: &[Value]) -> TestResult {
    for value in values {
        socket.send(Message::Text(value.to_string().into())).await?;
    }
    Ok(())
}

/// Returns `true` once the client has gone away.
async fn client_closed(socket: &mut WebSocketStream<TcpStream>) -> bool {
    loop {
        match tokio::time::timeout(CLOSE_WAIT, socket.next()).await {
            Ok(None | Some(Err(_) | Ok(Message::Close(_)))) => return true,
            Ok(Some(Ok(_))) => {}
            Err(_) => return false,
        }
    }
}

fn header() -> Value { json!({"header": {"ID": "BIGINT"}}) }

fn row(n: i64) -> Value { json!({"row": {"columns": [n]}}) }

#[tokio::test]
async fn cancelled_push_query_closes_socket() -> TestResult {
    let (listener, addr) = unused_listener().await?;
    let server = tokio::spawn(async move {
        let (mut socket, request) = accept(&listener).await?;
        send_all(&mut socket, &[header(), row(1), row(2)]).await?;
        let closed = client_closed(&mut socket).await;
        Ok::<_, Box<dyn std::error::Error + Send + Sync>>((request, closed))
    });

    let client = QueryClient::new(&format!("http://{addr}"))?;
    let request = QueryRequest::new("SELECT * FROM users EMIT CHANGES;")
        .with_property("ksql.streams.auto.offset.reset", "earliest");
    let token = CancellationToken::new();
    let mut rows = client
        .push_query(&request)
        .await?
        .with_cancellation(token.clone());

    assert_eq!(rows.try_next().await?, Some(Row::new(vec![json!(1)])));
    assert_eq!(rows.try_next().await?, Some(Row::new(vec![json!(2)])));

    token.cancel();
    assert!(rows.next().await.is_none());

    let (sent, closed) = server.await??;
    assert!(closed, "server should observe the socket closing");
    assert_eq!(
        sent,
        json!({
            "ksql": "SELECT * FROM users EMIT CHANGES;",
            "streamsProperties": {"ksql.streams.auto.offset.reset": "earliest"}
        })
    );
    Ok(())
}

#[tokio::test]
async fn close_frame_ends_stream_normally() -> TestResult {
    let (listener, addr) = unused_listener().await?;
    let server = tokio::spawn(async move {
        let (mut socket, _) = accept(&listener).await?;
        send_all(&mut socket, &[header(), row(1)]).await?;
        socket.send(Message::Close(None)).await?;
        Ok::<_, Box<dyn std::error::Error + Send + Sync>>(())
    });

    let client = QueryClient::new(&format!("http://{addr}"))?;
    let rows: Vec<Row> = client
        .push_query(&QueryRequest::new("SELECT * FROM users EMIT CHANGES;"))
        .await?
        .try_collect()
        .await?;

    assert_eq!(rows, [Row::new(vec![json!(1)])]);
    server.await??;
    Ok(())
}

#[tokio::test]
async fn in_band_error_ends_push_query() -> TestResult {
    let (listener, addr) = unused_listener().await?;
    let server = tokio::spawn(async move {
        let (mut socket, _) = accept(&listener).await?;
        send_all(
            &mut socket,
            &[header(), json!({"errorMessage": "syntax error"})],
        )
        .await?;
        Ok::<_, Box<dyn std::error::Error + Send + Sync>>(client_closed(&mut socket).await)
    });

    let client = QueryClient::new(&format!("http://{addr}"))?;
    let results: Vec<_> = client
        .push_query(&QueryRequest::new("SELEC * FROM users;"))
        .await?
        .collect()
        .await;

    assert_eq!(results.len(), 1);
    assert!(matches!(&results[0], Err(QueryError::Server { message }) if message == "syntax error"));
    assert!(server.await??, "socket should close after the error");
    Ok(())
}

#[tokio::test]
async fn stalled_handshake_times_out() -> TestResult {
    let (listener, addr) = unused_listener().await?;
    let client = QueryClient::builder(format!("http://{addr}"))
        .connect_timeout(Duration::from_millis(100))
        .build()?;

    let err = client
        .push_query(&QueryRequest::new("SELECT * FROM users EMIT CHANGES;"))
        .await
        .expect_err("handshake never completes");

    assert!(matches!(err, QueryError::ConnectTimeout));
    drop(listener);
    Ok(())
}
