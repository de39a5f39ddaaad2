//! The one HTTP/1 client both worker invocations and webhooks go through.
//!
//! A fresh connection per request; only `http://` URLs are accepted.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use tracing::debug;

use crate::invoke::InvokeError;

/// POST a JSON body over a fresh HTTP/1 connection.
///
/// Returns the status code and the full response body.
pub async fn post_json(url: &str, body: Bytes) -> Result<(u16, Bytes), InvokeError> {
    post(url, body, &[("content-type", "application/json")]).await
}

/// POST `body` with extra headers over a fresh HTTP/1 connection.
pub async fn post(
    url: &str,
    body: Bytes,
    headers: &[(&str, &str)],
) -> Result<(u16, Bytes), InvokeError> {
    let uri: http::Uri = url
        .parse()
        .map_err(|e: http::uri::InvalidUri| InvokeError::Transport(e.to_string()))?;
    if uri.scheme_str() != Some("http") {
        return Err(InvokeError::Transport(format!(
            "unsupported scheme in {url}; only http:// is supported"
        )));
    }
    let authority = uri
        .authority()
        .ok_or_else(|| InvokeError::Transport(format!("missing host in {url}")))?
        .clone();
    let address = match authority.port_u16() {
        Some(_) => authority.to_string(),
        None => format!("{}:80", authority.host()),
    };

    let stream = tokio::net::TcpStream::connect(&address)
        .await
        .map_err(|e| InvokeError::Transport(format!("connect {address}: {e}")))?;
    let io = hyper_util::rt::TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| InvokeError::Transport(e.to_string()))?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "connection closed with error");
        }
    });

    let mut builder = http::Request::builder()
        .method("POST")
        .uri(uri.path_and_query().map(|p| p.as_str()).unwrap_or("/"))
        .header("host", authority.as_str())
        .header("user-agent", "rendergrid/0.1");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder
        .body(Full::new(body))
        .map_err(|e| InvokeError::Transport(e.to_string()))?;

    let response = sender
        .send_request(request)
        .await
        .map_err(|e| InvokeError::Transport(e.to_string()))?;
    let status = response.status().as_u16();
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| InvokeError::Transport(e.to_string()))?
        .to_bytes();
    Ok((status, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Accept one connection, answer 204 and hand back the raw request.
    async fn capturing_server() -> (String, tokio::task::JoinHandle<String>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 4096];
            while !received.ends_with(b"}") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
            }
            socket
                .write_all(b"HTTP/1.1 204 No Content\r\ncontent-length: 0\r\n\r\n")
                .await
                .unwrap();
            String::from_utf8_lossy(&received).into_owned()
        });
        (format!("http://{addr}"), handle)
    }

    #[tokio::test]
    async fn extra_headers_and_body_reach_the_server() {
        let (base, handle) = capturing_server().await;
        let (status, body) = post(
            &format!("{base}/hooks/render?x=1"),
            Bytes::from_static(b"{\"ok\":true}"),
            &[("content-type", "application/json"), ("x-test-header", "abc")],
        )
        .await
        .unwrap();
        assert_eq!(status, 204);
        assert!(body.is_empty());

        let raw = handle.await.unwrap().to_ascii_lowercase();
        assert!(raw.starts_with("post /hooks/render?x=1 http/1.1"));
        assert!(raw.contains("x-test-header: abc"));
        assert!(raw.contains("content-type: application/json"));
        assert!(raw.ends_with("{\"ok\":true}"));
    }

    #[tokio::test]
    async fn https_is_rejected() {
        let err = post_json("https://example.com/x", Bytes::new()).await.unwrap_err();
        assert!(matches!(err, InvokeError::Transport(_)));
    }

    #[tokio::test]
    async fn relative_url_is_rejected() {
        let err = post_json("/relative/path", Bytes::new()).await.unwrap_err();
        assert!(matches!(err, InvokeError::Transport(_)));
    }
}
