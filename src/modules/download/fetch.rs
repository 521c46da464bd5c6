// Copyright © 2025 rustscribe.dev
// Licensed under RustScribe License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::{code::ErrorCode, RustScribeError, RustScribeResult};
use crate::raise_error;
use futures::StreamExt;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub fn http_client() -> RustScribeResult<Client> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| raise_error!(format!("{e}"), ErrorCode::InternalError))
}

fn classify_request_error(e: reqwest::Error) -> RustScribeError {
    if e.is_timeout() {
        raise_error!(format!("{e}"), ErrorCode::ConnectionTimeout)
    } else {
        raise_error!(format!("{e}"), ErrorCode::NetworkError)
    }
}

/// Streams `url` into `dest`, writing through a `.part` file that is only
/// renamed into place once the body completed. Returns the bytes written.
///
/// 4xx responses are permanent rejections (the source will not change its
/// mind), 5xx and transport errors are transient and left to the caller's
/// retry policy.
pub async fn fetch_url_to_file(client: &Client, url: &str, dest: &Path) -> RustScribeResult<u64> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(classify_request_error)?;

    let status = response.status();
    if status.is_client_error() {
        return Err(raise_error!(
            format!("source rejected '{url}' with status {status}"),
            ErrorCode::DownloadSourceRejected
        ));
    }
    if !status.is_success() {
        return Err(raise_error!(
            format!("'{url}' answered with status {status}"),
            ErrorCode::HttpResponseError
        ));
    }

    let part_path = dest.with_extension("part");
    match write_body_to_part(response, &part_path, dest).await {
        Ok(written) => {
            debug!("Fetched {} bytes from {} into {}", written, url, dest.display());
            Ok(written)
        }
        Err(e) => {
            // A failed transfer must not leave a half-written part file at
            // the destination, which may live outside the swept temp dir.
            if let Err(remove_err) = tokio::fs::remove_file(&part_path).await {
                if remove_err.kind() != std::io::ErrorKind::NotFound {
                    debug!(
                        "Could not remove partial download {}: {}",
                        part_path.display(),
                        remove_err
                    );
                }
            }
            Err(e)
        }
    }
}

async fn write_body_to_part(
    response: reqwest::Response,
    part_path: &Path,
    dest: &Path,
) -> RustScribeResult<u64> {
    let mut file = tokio::fs::File::create(part_path)
        .await
        .map_err(|e| raise_error!(format!("{e}"), ErrorCode::FileStoreError))?;

    let mut written = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(classify_request_error)?;
        file.write_all(&chunk)
            .await
            .map_err(|e| raise_error!(format!("{e}"), ErrorCode::FileStoreError))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|e| raise_error!(format!("{e}"), ErrorCode::FileStoreError))?;
    drop(file);

    tokio::fs::rename(part_path, dest)
        .await
        .map_err(|e| raise_error!(format!("{e}"), ErrorCode::FileStoreError))?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::io::AsyncReadExt;

    /// One-shot HTTP server that answers with the given body but advertises
    /// `content_length` bytes, then closes the connection.
    async fn serve_once(body: &'static [u8], content_length: usize) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let header = format!("HTTP/1.1 200 OK\r\ncontent-length: {content_length}\r\n\r\n");
            socket.write_all(header.as_bytes()).await.unwrap();
            socket.write_all(body).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{addr}/artifact")
    }

    #[tokio::test]
    async fn complete_body_lands_at_the_destination() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("thumb.jpg");
        let url = serve_once(b"hello", 5).await;

        let written = fetch_url_to_file(&http_client().unwrap(), &url, &dest)
            .await
            .unwrap();
        assert_eq!(written, 5);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello");
        assert!(!dest.with_extension("part").exists());
    }

    #[tokio::test]
    async fn truncated_body_leaves_no_partial_file_behind() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("thumb.jpg");
        // The server promises 100 bytes and hangs up after 5.
        let url = serve_once(b"hello", 100).await;

        let result = fetch_url_to_file(&http_client().unwrap(), &url, &dest).await;
        assert!(result.is_err());
        assert!(!dest.exists());
        assert!(!dest.with_extension("part").exists());
    }
}
