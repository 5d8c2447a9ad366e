//! Pull queries against a local chunked HTTP server.

mod common;

use std::time::Duration;

use common::{TestResult, unused_listener};
use futures::TryStreamExt;
use querywire::{QueryClient, QueryError, QueryRequest, Row};
use serde_json::{Value, json};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};

const CHUNK_GAP: Duration = Duration::from_millis(20);

/// Request line, lower-cased headers and body seen by the server.
#[derive(Debug)]
struct Captured {
    request_line: String,
    headers: Vec<(String, String)>,
    body: Value,
}

impl Captured {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

async fn read_request(stream: &mut BufReader<TcpStream>) -> TestResult<Captured> {
    let mut request_line = String::new();
    stream.read_line(&mut request_line).await?;

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        stream.read_line(&mut line).await?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.push((key.trim().to_ascii_lowercase(), value.trim().to_owned()));
        }
    }

    let length: usize = headers
        .iter()
        .find(|(key, _)| key == "content-length")
        .map_or(Ok(0), |(_, value)| value.parse())?;
    let mut body = vec![0; length];
    stream.read_exact(&mut body).await?;

    Ok(Captured {
        request_line: request_line.trim_end().to_owned(),
        headers,
        body: serde_json::from_slice(&body)?,
    })
}

async fn write_chunk(stream: &mut BufReader<TcpStream>, chunk: &str) -> TestResult {
    stream
        .write_all(format!("{:x}\r\n{chunk}\r\n", chunk.len()).as_bytes())
        .await?;
    stream.flush().await?;
    Ok(())
}

async fn accept_request(listener: TcpListener) -> TestResult<(BufReader<TcpStream>, Captured)> {
    let (socket, _) = listener.accept().await?;
    let mut stream = BufReader::new(socket);
    let captured = read_request(&mut stream).await?;
    Ok((stream, captured))
}

/// Serve one chunked response, pausing between chunks so each arrives in
/// its own read.
async fn chunked_response(
    listener: TcpListener,
    chunks: &'static [&'static str],
) -> TestResult<Captured> {
    let (mut stream, captured) = accept_request(listener).await?;
    stream
        .write_all(
            b"HTTP/1.1 200 OK\r\ncontent-type: application/vnd.ksql.v1+json\r\n\
              transfer-encoding: chunked\r\n\r\n",
        )
        .await?;
    for chunk in chunks {
        write_chunk(&mut stream, chunk).await?;
        tokio::time::sleep(CHUNK_GAP).await;
    }
    stream.write_all(b"0\r\n\r\n").await?;
    stream.flush().await?;
    Ok(captured)
}

async fn status_response(
    listener: TcpListener,
    status: &'static str,
    body: String,
) -> TestResult<Captured> {
    let (mut stream, captured) = accept_request(listener).await?;
    let response = format!(
        "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(captured)
}

/// Send a header and one row, then report how many bytes the client sends
/// next; zero means the client closed the connection.
async fn open_response(listener: TcpListener) -> TestResult<usize> {
    let (mut stream, _) = accept_request(listener).await?;
    stream
        .write_all(b"HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n")
        .await?;
    write_chunk(&mut stream, "[{\"header\":{\"ID\":\"BIGINT\"}},\n").await?;
    write_chunk(&mut stream, "{\"row\":{\"columns\":[1]}}").await?;

    let mut buf = [0u8; 64];
    let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf)).await??;
    Ok(read)
}

#[tokio::test]
async fn pull_query_streams_rows_until_body_ends() -> TestResult {
    let (listener, addr) = unused_listener().await?;
    let server = tokio::spawn(chunked_response(
        listener,
        &[
            "[{\"header\":{\"ID\":\"BIGINT\",\"NAME\":\"STRING\"}},\n",
            "{\"row\":{\"columns\":[1,\"alice\"]}},\n",
            ",\n",
            "{\"row\":{\"columns\":[2,\"bob\"]}}",
            "]",
        ],
    ));

    let client = QueryClient::new(&format!("http://{addr}"))?;
    let request = QueryRequest::new("SELECT * FROM users;")
        .with_property("ksql.streams.auto.offset.reset", "earliest");
    let mut stream = client.pull_query(&request).await?;

    let mut rows = Vec::new();
    while let Some(row) = stream.try_next().await? {
        rows.push(row);
    }
    assert_eq!(
        rows,
        [
            Row::new(vec![json!(1), json!("alice")]),
            Row::new(vec![json!(2), json!("bob")]),
        ]
    );
    assert_eq!(
        stream.header().and_then(|header| header.declared_type("NAME")),
        Some("STRING")
    );

    let captured = server.await??;
    assert_eq!(captured.request_line, "POST /query HTTP/1.1");
    assert_eq!(
        captured.header("content-type"),
        Some("application/vnd.ksql.v1+json")
    );
    assert_eq!(
        captured.body,
        json!({
            "ksql": "SELECT * FROM users;",
            "streamsProperties": {"ksql.streams.auto.offset.reset": "earliest"}
        })
    );
    Ok(())
}

#[tokio::test]
async fn coalesced_pull_query_joins_split_values() -> TestResult {
    let (listener, addr) = unused_listener().await?;
    let server = tokio::spawn(chunked_response(
        listener,
        &[
            "[{\"header\":{\"ID\":\"BIG",
            "INT\"}},\n{\"row\":{\"colu",
            "mns\":[7]}}",
            "]",
        ],
    ));

    let client = QueryClient::builder(format!("http://{addr}"))
        .coalesce_chunks(true)
        .build()?;
    let rows: Vec<Row> = client
        .pull_query(&QueryRequest::new("SELECT * FROM users;"))
        .await?
        .try_collect()
        .await?;

    assert_eq!(rows, [Row::new(vec![json!(7)])]);
    server.await??;
    Ok(())
}

#[tokio::test]
async fn in_band_error_ends_pull_query() -> TestResult {
    let (listener, addr) = unused_listener().await?;
    let server = tokio::spawn(chunked_response(
        listener,
        &[
            "[{\"header\":{\"ID\":\"BIGINT\"}},\n",
            "{\"row\":{\"columns\":[1]}},\n",
            "{\"errorMessage\":\"query terminated\"}",
            "]",
        ],
    ));

    let client = QueryClient::new(&format!("http://{addr}"))?;
    let mut stream = client
        .pull_query(&QueryRequest::new("SELECT * FROM users;"))
        .await?;

    assert_eq!(stream.try_next().await?, Some(Row::new(vec![json!(1)])));
    let err = stream.try_next().await.expect_err("error envelope ends stream");
    assert!(matches!(err, QueryError::Server { ref message } if message == "query terminated"));
    assert!(stream.try_next().await?.is_none());
    // The client hangs up after the error, so the rest of the body may not be
    // written.
    server.abort();
    Ok(())
}

#[tokio::test]
async fn rejected_statement_surfaces_server_error() -> TestResult {
    let (listener, addr) = unused_listener().await?;
    let body = json!({
        "@type": "statement_error",
        "error_code": 40001,
        "message": "line 1:1: mismatched input 'SELEC'",
        "statementText": "SELEC 1;",
        "entities": []
    });
    let server = tokio::spawn(status_response(
        listener,
        "400 Bad Request",
        body.to_string(),
    ));

    let client = QueryClient::new(&format!("http://{addr}"))?;
    let err = client
        .pull_query(&QueryRequest::new("SELEC 1;"))
        .await
        .expect_err("statement should be rejected");

    let QueryError::Rejected(error) = err else {
        panic!("expected structured rejection, got {err:?}");
    };
    assert_eq!(error.error_code, Some(40001));
    assert_eq!(error.statement_text.as_deref(), Some("SELEC 1;"));
    server.await??;
    Ok(())
}

#[tokio::test]
async fn unstructured_rejection_keeps_status() -> TestResult {
    let (listener, addr) = unused_listener().await?;
    let server = tokio::spawn(status_response(
        listener,
        "503 Service Unavailable",
        "\"starting\"".into(),
    ));

    let client = QueryClient::new(&format!("http://{addr}"))?;
    let err = client
        .pull_query(&QueryRequest::new("SELECT 1;"))
        .await
        .expect_err("unavailable server should reject");

    assert!(matches!(err, QueryError::Status { status: 503, .. }));
    server.await??;
    Ok(())
}

#[tokio::test]
async fn dropping_stream_closes_connection() -> TestResult {
    let (listener, addr) = unused_listener().await?;
    let server = tokio::spawn(open_response(listener));

    let client = QueryClient::new(&format!("http://{addr}"))?;
    let mut stream = client
        .pull_query(&QueryRequest::new("SELECT * FROM users EMIT CHANGES;"))
        .await?;
    assert_eq!(stream.try_next().await?, Some(Row::new(vec![json!(1)])));
    drop(stream);
    drop(client);

    assert_eq!(server.await??, 0, "server should observe the connection closing");
    Ok(())
}
