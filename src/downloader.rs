use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use log::info;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Proxy, StatusCode};

use crate::error::{Error, Result};

/// Callback type for reporting download progress.
/// Arguments: source URL, bytes downloaded, total bytes, MiB/s, is_complete
pub type ProgressFn = Arc<dyn Fn(&str, u64, u64, f64, bool) + Send + Sync>;

/// Blocking HTTP client for release metadata and asset bytes.
///
/// Header-opaque: every header, including auth, comes from the caller.
#[derive(Clone, Default)]
pub struct Downloader {
    /// Optional HTTP proxy URL.
    pub proxy: Option<String>,
    /// Optional progress callback.
    pub progress: Option<ProgressFn>,
}

impl Downloader {
    /// Create a downloader without proxy or progress reporting.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a downloader with explicit configuration.
    pub fn with_config(proxy: Option<String>, progress: Option<ProgressFn>) -> Self {
        Self { proxy, progress }
    }

    /// Build an HTTP client, optionally with proxy support.
    fn build_client(&self) -> Result<Client> {
        let mut builder =
            Client::builder().user_agent(concat!("release-installer/", env!("CARGO_PKG_VERSION")));
        if let Some(proxy_url) = &self.proxy {
            let proxy = Proxy::all(proxy_url)
                .map_err(Error::Client)?
                .no_proxy(reqwest::NoProxy::from_env());
            builder = builder.proxy(proxy);
        }
        builder.build().map_err(Error::Client)
    }

    /// Send a GET request with `headers`.
    ///
    /// A 404 becomes [`Error::NotFound`]; any other non-2xx status becomes
    /// [`Error::Status`].
    pub fn get(&self, url: &str, headers: &HashMap<String, String>) -> Result<Response> {
        let client = self.build_client()?;
        let resp = client
            .get(url)
            .headers(header_map(headers)?)
            .send()
            .map_err(|source| Error::Request {
                url: url.to_owned(),
                source,
            })?;

        match resp.status() {
            s if s.is_success() => Ok(resp),
            s if s == StatusCode::NOT_FOUND => Err(Error::NotFound {
                url: url.to_owned(),
            }),
            s => Err(Error::Status {
                url: url.to_owned(),
                status: s.as_u16(),
            }),
        }
    }

    /// GET `url` and decode the JSON body. Decode errors carry the line and
    /// column of the offending token.
    pub fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<T> {
        let body = self.get_text(url, headers)?;
        serde_json::from_str(&body).map_err(|source| Error::Json {
            url: url.to_owned(),
            source,
        })
    }

    /// GET `url` and return the body as text.
    pub fn get_text(&self, url: &str, headers: &HashMap<String, String>) -> Result<String> {
        self.get(url, headers)?
            .text()
            .map_err(|source| Error::Decode {
                url: url.to_owned(),
                source,
            })
    }

    /// Stream `url` into `dest`. A 404 means the asset is gone: [`Error::NoAsset`].
    pub fn download(&self, url: &str, dest: &Path, headers: &HashMap<String, String>) -> Result<()> {
        let filename = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!("Downloading {filename} from {url}");

        let mut resp = match self.get(url, headers) {
            Err(Error::NotFound { .. }) => return Err(Error::NoAsset),
            other => other?,
        };

        let total = resp.content_length().unwrap_or(0);
        let file = File::create(dest).map_err(|e| Error::io("create", dest, e))?;
        let mut out = BufWriter::new(file);

        let start = Instant::now();
        let mut downloaded: u64 = 0;
        let mut buffer = [0; 8192];
        loop {
            let n = resp
                .read(&mut buffer)
                .map_err(|e| Error::io("read response body for", dest, e))?;
            if n == 0 {
                break;
            }
            out.write_all(&buffer[..n])
                .map_err(|e| Error::io("write", dest, e))?;
            downloaded += n as u64;
            self.report(url, downloaded, total, start, false);
        }
        out.flush().map_err(|e| Error::io("write", dest, e))?;
        self.report(url, downloaded, total, start, true);

        info!("Downloaded {filename}");
        Ok(())
    }

    fn report(&self, src: &str, downloaded: u64, total: u64, start: Instant, complete: bool) {
        if let Some(progress) = &self.progress {
            let elapsed = start.elapsed().as_secs_f64();
            let mib_per_sec = if elapsed > 0.0 {
                (downloaded as f64) / (1024.0 * 1024.0) / elapsed
            } else {
                0.0
            };
            progress(src, downloaded, total, mib_per_sec, complete);
        }
    }
}

fn header_map(headers: &HashMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let key = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::InvalidHeader(name.clone()))?;
        let val = HeaderValue::from_str(value).map_err(|_| Error::InvalidHeader(name.clone()))?;
        map.insert(key, val);
    }
    Ok(map)
}
