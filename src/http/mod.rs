use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, ClientBuilder, Url, header::CONTENT_TYPE};
use std::time::Instant;
use tracing::{debug, info};

use crate::audio::{
    config::PlayerConfig,
    error::{AudioError, MediaError},
    traits::{MediaPayload, MediaSource},
};

/// Downloads track audio over plain HTTP(S). No signing or auth; the
/// storefront hands out URLs that are already resolvable.
pub struct HttpSource {
    client: Client,
    max_bytes: u64,
}

impl HttpSource {
    pub fn new(config: &PlayerConfig) -> Result<Self, AudioError> {
        Self::with_builder(Client::builder(), config)
    }

    fn with_builder(builder: ClientBuilder, config: &PlayerConfig) -> Result<Self, AudioError> {
        let client = builder
            .timeout(config.http_timeout)
            .user_agent(concat!("beatbazaar-player/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AudioError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            max_bytes: config.max_media_bytes,
        })
    }
}

#[async_trait]
impl MediaSource for HttpSource {
    async fn fetch(&self, url: &str) -> Result<MediaPayload, MediaError> {
        let start = Instant::now();
        let url = parse_media_url(url)?;

        let response = self
            .client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let type_hint = hint_from_content_type(content_type.as_deref())?;

        let expected = response.content_length();
        if let Some(len) = expected
            && len > self.max_bytes
        {
            return Err(too_large(len, self.max_bytes));
        }

        let capacity = expected.unwrap_or(0).min(self.max_bytes) as usize;
        let mut bytes = Vec::with_capacity(capacity);
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            let total = (bytes.len() + chunk.len()) as u64;
            if total > self.max_bytes {
                return Err(too_large(total, self.max_bytes));
            }
            bytes.extend_from_slice(&chunk);
        }

        if bytes.is_empty() {
            return Err(MediaError::decode("empty response body"));
        }

        let hint = type_hint
            .map(str::to_owned)
            .or_else(|| hint_from_url(&url).map(str::to_owned));

        info!(
            url = url.as_str(),
            bytes = bytes.len(),
            content_type = content_type.as_deref().unwrap_or("-"),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "http_media_fetched"
        );
        Ok(MediaPayload { bytes, hint })
    }
}

fn too_large(len: u64, max: u64) -> MediaError {
    MediaError::generic(format!("media is {len} bytes, limit is {max}"))
}

pub fn parse_media_url(raw: &str) -> Result<Url, MediaError> {
    let url = Url::parse(raw).map_err(|e| MediaError::generic(format!("invalid url {raw:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(MediaError::unsupported(format!("{other}:// urls cannot be played"))),
    }
}

/// Maps a response content type to a decoder hint. Non-audio types are
/// rejected; generic binary types yield no hint.
pub fn hint_from_content_type(content_type: Option<&str>) -> Result<Option<&'static str>, MediaError> {
    let Some(raw) = content_type else {
        return Ok(None);
    };
    let mime = raw
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    let hint = match mime.as_str() {
        "audio/mpeg" | "audio/mp3" | "audio/mpeg3" => Some("mp3"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        "audio/aac" | "audio/aacp" => Some("aac"),
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => Some("m4a"),
        "audio/wav" | "audio/wave" | "audio/x-wav" => Some("wav"),
        "application/octet-stream" | "binary/octet-stream" | "" => None,
        m if m.starts_with("audio/") => {
            debug!(mime = m, "http_unknown_audio_type");
            None
        }
        _ => return Err(MediaError::unsupported(format!("content type {raw}"))),
    };
    Ok(hint)
}

pub fn hint_from_url(url: &Url) -> Option<&'static str> {
    let file = url.path_segments()?.next_back()?;
    let (_, ext) = file.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "mp3" => Some("mp3"),
        "flac" => Some("flac"),
        "aac" => Some("aac"),
        "m4a" | "mp4" => Some("m4a"),
        "wav" => Some("wav"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::error::MediaErrorKind;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const LIMIT: u64 = 16;

    fn source() -> HttpSource {
        let config = PlayerConfig {
            max_media_bytes: LIMIT,
            ..PlayerConfig::default()
        };
        HttpSource::with_builder(Client::builder().no_proxy(), &config).unwrap()
    }

    /// Answers a single request on 127.0.0.1 with `response`, verbatim, and
    /// returns a URL pointing at it.
    async fn serve_once(response: impl Into<Vec<u8>>) -> String {
        let response = response.into();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let _ = socket.write_all(&response).await;
            let _ = socket.shutdown().await;
        });

        format!("http://{addr}/beats/night-drive.mp3")
    }

    async fn fetch(response: impl Into<Vec<u8>>) -> Result<MediaPayload, MediaError> {
        let url = serve_once(response).await;
        source().fetch(&url).await
    }

    #[tokio::test]
    async fn audio_response_is_returned_with_hint() {
        let payload = fetch(
            "HTTP/1.1 200 OK\r\nContent-Type: audio/wav\r\nContent-Length: 8\r\n\r\nRIFFdata",
        )
        .await
        .unwrap();

        assert_eq!(payload.bytes, b"RIFFdata");
        assert_eq!(payload.hint.as_deref(), Some("wav"));
    }

    #[tokio::test]
    async fn missing_content_type_falls_back_to_url_hint() {
        let payload = fetch("HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nID3\x04")
            .await
            .unwrap();

        assert_eq!(payload.bytes.len(), 4);
        assert_eq!(payload.hint.as_deref(), Some("mp3"));
    }

    #[tokio::test]
    async fn error_statuses_are_network_errors() {
        for status in ["404 Not Found", "500 Internal Server Error"] {
            let err = fetch(format!(
                "HTTP/1.1 {status}\r\nContent-Length: 0\r\n\r\n"
            ))
            .await
            .unwrap_err();
            assert_eq!(err.kind, MediaErrorKind::Network, "{status}: {err}");
        }
    }

    #[tokio::test]
    async fn declared_length_over_limit_is_rejected() {
        let err = fetch(
            "HTTP/1.1 200 OK\r\nContent-Type: audio/mpeg\r\nContent-Length: 4096\r\n\r\n",
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind, MediaErrorKind::Generic);
        assert!(err.message.contains("limit"), "{err}");
    }

    #[tokio::test]
    async fn undeclared_body_over_limit_is_rejected() {
        let mut response =
            b"HTTP/1.1 200 OK\r\nContent-Type: audio/mpeg\r\nConnection: close\r\n\r\n".to_vec();
        response.extend_from_slice(&[0u8; 64]);

        let err = fetch(response).await.unwrap_err();
        assert_eq!(err.kind, MediaErrorKind::Generic);
        assert!(err.message.contains("limit"), "{err}");
    }

    #[tokio::test]
    async fn chunked_body_over_limit_is_rejected() {
        let err = fetch(
            "HTTP/1.1 200 OK\r\nContent-Type: audio/mpeg\r\nTransfer-Encoding: chunked\r\n\r\n\
             c\r\n0123456789ab\r\nc\r\n0123456789ab\r\n0\r\n\r\n",
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind, MediaErrorKind::Generic);
        assert!(err.message.contains("limit"), "{err}");
    }

    #[tokio::test]
    async fn empty_body_is_a_decode_error() {
        let err = fetch(
            "HTTP/1.1 200 OK\r\nContent-Type: audio/mpeg\r\nContent-Length: 0\r\n\r\n",
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind, MediaErrorKind::Decode);
    }

    #[tokio::test]
    async fn html_response_is_unsupported() {
        let err = fetch(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: 15\r\n\r\n<html>no</html>",
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind, MediaErrorKind::UnsupportedFormat);
    }

    #[test]
    fn only_http_urls_are_accepted() {
        assert!(parse_media_url("https://cdn.example.com/beats/a.mp3").is_ok());
        assert!(parse_media_url("http://localhost:8080/a.mp3").is_ok());

        let err = parse_media_url("file:///tmp/a.mp3").unwrap_err();
        assert_eq!(err.kind, MediaErrorKind::UnsupportedFormat);

        let err = parse_media_url("not a url").unwrap_err();
        assert_eq!(err.kind, MediaErrorKind::Generic);
    }

    #[test]
    fn content_type_hints() {
        assert_eq!(hint_from_content_type(Some("audio/mpeg")).unwrap(), Some("mp3"));
        assert_eq!(
            hint_from_content_type(Some("Audio/X-WAV; charset=binary")).unwrap(),
            Some("wav")
        );
        assert_eq!(hint_from_content_type(Some("audio/opus")).unwrap(), None);
        assert_eq!(hint_from_content_type(Some("application/octet-stream")).unwrap(), None);
        assert_eq!(hint_from_content_type(None).unwrap(), None);
    }

    #[test]
    fn html_error_pages_are_unsupported() {
        let err = hint_from_content_type(Some("text/html; charset=utf-8")).unwrap_err();
        assert_eq!(err.kind, MediaErrorKind::UnsupportedFormat);
    }

    #[test]
    fn url_extension_hints() {
        let url = Url::parse("https://cdn.example.com/beats/Night%20Drive.MP3?sig=abc").unwrap();
        assert_eq!(hint_from_url(&url), Some("mp3"));

        let url = Url::parse("https://cdn.example.com/stream/1234").unwrap();
        assert_eq!(hint_from_url(&url), None);
    }
}
