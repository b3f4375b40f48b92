//! `RemoveBgClient` against a local HTTP stub.
//!
//! The stub accepts one connection per scripted response, records the raw
//! request and answers with `Connection: close` so every call opens a fresh
//! connection.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use vanish::{
    Candidate, DirectoryExporter, MediaType, PipelineState, RemoveBgClient, Session, SourceFile,
    TransformError, Transformer, VanishConfig, VanishError, PROCESSING_FAILED,
};

// ── Stub server ──────────────────────────────────────────────────────────────

struct Recorded {
    head: String,
    body: Vec<u8>,
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

async fn read_request(stream: &mut tokio::net::TcpStream) -> Recorded {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];

    let head_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed before sending headers");
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
    let content_length = head
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .map(|v| v.trim().parse::<usize>().unwrap());
    let chunked = head.contains("transfer-encoding: chunked");

    loop {
        let body = &buf[head_end..];
        let complete = match content_length {
            Some(len) => body.len() >= len,
            None if chunked => body.ends_with(b"0\r\n\r\n"),
            None => true,
        };
        if complete {
            break;
        }
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Recorded {
        head,
        body: buf[head_end..].to_vec(),
    }
}

/// Serve `responses` in order, one per connection. Returns the endpoint URL
/// and a handle yielding the recorded requests.
async fn serve(responses: Vec<(u16, Vec<u8>)>) -> (String, JoinHandle<Vec<Recorded>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let mut recorded = Vec::new();
        for (status, body) in responses {
            let (mut stream, _) = listener.accept().await.unwrap();
            recorded.push(read_request(&mut stream).await);
            let reason = if status == 200 { "OK" } else { "Error" };
            let head = format!(
                "HTTP/1.1 {status} {reason}\r\nContent-Type: image/png\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            stream.write_all(head.as_bytes()).await.unwrap();
            stream.write_all(&body).await.unwrap();
            stream.shutdown().await.ok();
        }
        recorded
    });
    (format!("http://{addr}/v1.0/removebg"), handle)
}

fn client(endpoint: &str, key: Option<&str>) -> RemoveBgClient {
    let mut builder = VanishConfig::builder().endpoint(endpoint);
    if let Some(key) = key {
        builder = builder.api_key(key);
    }
    RemoveBgClient::new(&builder.build().unwrap()).unwrap()
}

fn source(name: &str, bytes: Vec<u8>) -> SourceFile {
    SourceFile {
        name: name.to_string(),
        media_type: MediaType::Jpeg,
        bytes,
    }
}

fn jpeg(len: usize) -> Vec<u8> {
    let mut v = b"\xFF\xD8\xFF\xE0".to_vec();
    v.resize(len, 0x33);
    v
}

const RESULT_PNG: &[u8] = b"\x89PNG\r\n\x1a\n-transparent-result-";

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sends_multipart_with_credential_and_returns_body() {
    let (endpoint, server) = serve(vec![(200, RESULT_PNG.to_vec())]).await;
    let c = client(&endpoint, Some("test-key"));

    let out = c.transform(&source("cat.jpg", jpeg(512))).await.unwrap();
    assert_eq!(out, RESULT_PNG);

    let requests = server.await.unwrap();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert!(req.head.starts_with("post /v1.0/removebg "));
    assert!(req.head.contains("x-api-key: test-key"));
    assert!(req.head.contains("accept: image/*"));
    assert!(req.head.contains("content-type: multipart/form-data; boundary="));

    let body = String::from_utf8_lossy(&req.body).to_ascii_lowercase();
    assert!(body.contains("name=\"image_file\""));
    assert!(body.contains("filename=\"cat.jpg\""));
    assert!(body.contains("content-type: image/jpeg"));
    assert!(find(&req.body, &jpeg(512)).is_some(), "file bytes missing from body");
}

#[tokio::test]
async fn omits_credential_header_without_key() {
    let (endpoint, server) = serve(vec![(200, RESULT_PNG.to_vec())]).await;
    let c = client(&endpoint, None);

    c.transform(&source("cat.jpg", jpeg(64))).await.unwrap();

    let requests = server.await.unwrap();
    assert!(!requests[0].head.contains("x-api-key"));
}

#[tokio::test]
async fn error_status_maps_to_status_error() {
    let (endpoint, server) = serve(vec![(500, b"{\"errors\":[]}".to_vec())]).await;
    let c = client(&endpoint, Some("k"));

    let err = c.transform(&source("cat.jpg", jpeg(64))).await.unwrap_err();
    assert_eq!(err, TransformError::Status { status: 500 });
    server.await.unwrap();
}

#[tokio::test]
async fn empty_success_body_is_an_error() {
    let (endpoint, server) = serve(vec![(200, Vec::new())]).await;
    let c = client(&endpoint, Some("k"));

    let err = c.transform(&source("cat.jpg", jpeg(64))).await.unwrap_err();
    assert_eq!(err, TransformError::EmptyBody);
    server.await.unwrap();
}

#[tokio::test]
async fn session_over_http_fails_then_completes() {
    let dir = tempfile::tempdir().unwrap();
    let (endpoint, server) = serve(vec![
        (500, Vec::new()),
        (200, RESULT_PNG.to_vec()),
    ])
    .await;
    let config = VanishConfig::builder()
        .endpoint(&endpoint)
        .api_key("k")
        .build()
        .unwrap();
    let c = RemoveBgClient::new(&config).unwrap();

    let mut session = Session::new(config);
    session
        .ingest(Candidate::from_bytes("photo.jpeg", Some("image/jpeg"), jpeg(2048)))
        .await
        .unwrap();

    let err = session.transform(&c).await.unwrap_err();
    assert!(matches!(err, VanishError::Transform(TransformError::Status { status: 500 })));
    assert_eq!(
        session.state(),
        &PipelineState::Failed(PROCESSING_FAILED.to_string())
    );

    session.transform(&c).await.unwrap();
    assert_eq!(session.state(), &PipelineState::Completed);

    session
        .download(&DirectoryExporter::new(dir.path()))
        .await
        .unwrap();
    assert_eq!(
        std::fs::read(dir.path().join("processed-image.png")).unwrap(),
        RESULT_PNG
    );

    let requests = server.await.unwrap();
    assert_eq!(requests.len(), 2);
    // The retry resends the same source.
    assert!(find(&requests[1].body, &jpeg(2048)).is_some());
}
