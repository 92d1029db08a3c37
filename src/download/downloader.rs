use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::AcquisitionError;

/// Suffix of an archive still being received.
pub const PARTIAL_SUFFIX: &str = ".part";

/// File name of the archive, taken from the last segment of the URL path.
pub fn archive_file_name(url: &str) -> Result<String, AcquisitionError> {
    let parsed =
        reqwest::Url::parse(url).map_err(|_| AcquisitionError::BadArchiveUrl(url.to_string()))?;
    parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AcquisitionError::BadArchiveUrl(url.to_string()))
}

/// Stream `url` into `dir`, reporting received/content-length through `on_progress`.
///
/// Bytes land in a uniquely named `<archive>.<random>.part` file that is renamed
/// into place only once the body is complete.
pub async fn download_archive(
    client: &reqwest::Client,
    url: &str,
    dir: &Path,
    cancel: &CancellationToken,
    mut on_progress: impl FnMut(f64),
) -> Result<PathBuf, AcquisitionError> {
    let file_name = archive_file_name(url)?;
    let destination = dir.join(&file_name);

    fs::create_dir_all(dir).await?;
    if cancel.is_cancelled() {
        return Err(AcquisitionError::Cancelled);
    }

    debug!(url, "requesting archive");
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(AcquisitionError::ArchiveStatus(status));
    }

    let (file, partial) = tempfile::Builder::new()
        .prefix(&format!("{}.", file_name))
        .suffix(PARTIAL_SUFFIX)
        .tempfile_in(dir)?
        .into_parts();
    let file = fs::File::from_std(file);

    let expected = response.content_length();
    match stream_to_file(response, file, expected, cancel, &mut on_progress).await {
        Ok(received) => {
            partial.persist(&destination).map_err(|e| e.error)?;
            info!(path = %destination.display(), bytes = received, "archive downloaded");
            Ok(destination)
        }
        Err(e) => {
            let path = partial.to_path_buf();
            if let Err(cleanup) = partial.close() {
                warn!(path = %path.display(), error = %cleanup, "failed to remove partial download");
            }
            Err(e)
        }
    }
}

async fn stream_to_file(
    response: reqwest::Response,
    mut file: fs::File,
    expected: Option<u64>,
    cancel: &CancellationToken,
    on_progress: &mut impl FnMut(f64),
) -> Result<u64, AcquisitionError> {
    let mut stream = response.bytes_stream();
    let mut received: u64 = 0;

    while let Some(chunk) = stream.next().await {
        if cancel.is_cancelled() {
            return Err(AcquisitionError::Cancelled);
        }
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        received += chunk.len() as u64;

        if let Some(total) = expected.filter(|total| *total > 0) {
            on_progress((received as f64 / total as f64).min(1.0));
        }
    }
    file.flush().await?;

    if let Some(total) = expected {
        if received != total {
            return Err(AcquisitionError::IncompleteDownload {
                received,
                expected: total,
            });
        }
    }
    Ok(received)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_archive_file_name() {
        assert_eq!(
            archive_file_name("https://cdn.example/a/b/webcatalog105.db.zip?sig=1").unwrap(),
            "webcatalog105.db.zip"
        );
        assert!(archive_file_name("https://cdn.example/").is_err());
        assert!(archive_file_name("not a url").is_err());
    }

    #[tokio::test]
    async fn test_streams_with_progress() {
        let server = MockServer::start().await;
        let body = vec![7u8; 64 * 1024];
        Mock::given(method("GET"))
            .and(path("/files/archive.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut progress = Vec::new();
        let url = format!("{}/files/archive.zip", server.uri());
        let path = download_archive(
            &reqwest::Client::new(),
            &url,
            dir.path(),
            &CancellationToken::new(),
            |p| progress.push(p),
        )
        .await
        .unwrap();

        assert_eq!(path, dir.path().join("archive.zip"));
        assert_eq!(std::fs::read(&path).unwrap(), body);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1, "partial renamed away");
        assert_eq!(progress.last().copied(), Some(1.0));
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_concurrent_downloads_of_one_archive() {
        let server = MockServer::start().await;
        let body: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        Mock::given(method("GET"))
            .and(path("/files/archive.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .expect(2)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = reqwest::Client::new();
        let cancel = CancellationToken::new();
        let url = format!("{}/files/archive.zip", server.uri());
        let (first, second) = tokio::join!(
            download_archive(&client, &url, dir.path(), &cancel, |_| {}),
            download_archive(&client, &url, dir.path(), &cancel, |_| {}),
        );

        let first = first.unwrap();
        assert_eq!(first, second.unwrap());
        assert_eq!(std::fs::read(&first).unwrap(), body);
        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["archive.zip".to_string()]);
    }

    #[tokio::test]
    async fn test_http_error_leaves_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let url = format!("{}/files/archive.zip", server.uri());
        let err = download_archive(
            &reqwest::Client::new(),
            &url,
            dir.path(),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AcquisitionError::ArchiveStatus(s) if s.as_u16() == 503));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 16]))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let url = format!("{}/archive.zip", server.uri());
        let err = download_archive(&reqwest::Client::new(), &url, dir.path(), &cancel, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, AcquisitionError::Cancelled));
    }
}
