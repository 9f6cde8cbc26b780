//! Source retrieval
//!
//! Fetches playlists and guides over HTTP(S) or from disk, inflating gzip
//! payloads on the way. There are no retries: a failed load is final for the
//! source that asked for it.

use flate2::read::GzDecoder;
use std::io::Read;
use std::time::Duration;
use tracing::debug;

use crate::config::DownloadConfig;
use crate::errors::LoadError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Anything that can turn a location into bytes
pub trait SourceLoader {
    /// Raw resource bytes, already decompressed when the payload was gzip
    fn load(&self, location: &str) -> Result<Vec<u8>, LoadError>;
}

/// Loader backed by a shared `ureq` agent
pub struct HttpLoader {
    agent: ureq::Agent,
    user_agent: String,
}

impl HttpLoader {
    pub fn new(config: &DownloadConfig) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.read_timeout_secs)))
            .timeout_connect(Some(Duration::from_secs(config.connect_timeout_secs)))
            .build()
            .new_agent();

        Self {
            agent,
            user_agent: config.user_agent.clone(),
        }
    }

    fn download(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        let response = self
            .agent
            .get(url)
            .header("User-Agent", &self.user_agent)
            .call()
            .map_err(|e| match e {
                ureq::Error::StatusCode(status) => LoadError::HttpStatus {
                    url: url.to_string(),
                    status,
                },
                other => LoadError::Request {
                    url: url.to_string(),
                    message: other.to_string(),
                },
            })?;

        check_status(url, response.status().as_u16())?;

        // Guides run to hundreds of MB; stream the body rather than use the
        // size-limited read_to_vec.
        let mut reader = response.into_body().into_reader();
        let mut body = Vec::new();
        reader.read_to_end(&mut body).map_err(|e| LoadError::Read {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        Ok(body)
    }
}

impl SourceLoader for HttpLoader {
    fn load(&self, location: &str) -> Result<Vec<u8>, LoadError> {
        debug!("Loading {}", location);
        let raw = if is_remote(location) {
            self.download(location)?
        } else {
            read_local(location)?
        };
        maybe_decompress(location, raw)
    }
}

/// Any 2xx answer carries a usable body
fn check_status(url: &str, status: u16) -> Result<(), LoadError> {
    if (200..300).contains(&status) {
        return Ok(());
    }
    Err(LoadError::HttpStatus {
        url: url.to_string(),
        status,
    })
}

fn is_remote(location: &str) -> bool {
    let lower = location.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn read_local(location: &str) -> Result<Vec<u8>, LoadError> {
    let path = location.strip_prefix("file://").unwrap_or(location);
    std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_string(),
        source,
    })
}

/// Inflate when the location ends in `.gz` or the bytes carry the gzip magic
pub fn maybe_decompress(location: &str, data: Vec<u8>) -> Result<Vec<u8>, LoadError> {
    let by_name = location.to_ascii_lowercase().ends_with(".gz");
    let by_magic = data.starts_with(&GZIP_MAGIC);
    if !by_name && !by_magic {
        return Ok(data);
    }

    let mut decoder = GzDecoder::new(data.as_slice());
    let mut inflated = Vec::new();
    decoder
        .read_to_end(&mut inflated)
        .map_err(|source| LoadError::Decompress {
            url: location.to_string(),
            source,
        })?;
    debug!("Decompressed {} -> {} bytes", data.len(), inflated.len());
    Ok(inflated)
}
