use std::collections::HashMap;

use log::debug;
use serde::Deserialize;

use crate::downloader::Downloader;
use crate::error::{Error, Result};
use crate::provider::{encode_path_segment, RepoProvider};
use crate::release::{Asset, Release};

const GITHUB_API_BASE: &str = "https://api.github.com";

#[derive(Deserialize)]
struct GitHubAsset {
    name: String,
    url: String,
    browser_download_url: String,
}

#[derive(Deserialize)]
struct GitHubRelease {
    #[serde(default)]
    name: Option<String>,
    tag_name: String,
    #[serde(default)]
    assets: Vec<GitHubAsset>,
}

/// Releases of a GitHub repository in `owner/repo` form.
pub struct GitHub {
    repo: String,
    token: Option<String>,
    api_base: String,
    downloader: Downloader,
}

impl GitHub {
    pub fn new(downloader: Downloader, repo: &str, token: Option<&str>) -> Self {
        Self {
            repo: repo.to_owned(),
            token: token.filter(|t| !t.is_empty()).map(str::to_owned),
            api_base: GITHUB_API_BASE.to_owned(),
            downloader,
        }
    }

    /// Point at a different API root, e.g. GitHub Enterprise (builder).
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_owned();
        self
    }

    fn auth_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        if let Some(token) = &self.token {
            headers.insert("Authorization".to_owned(), format!("Bearer {token}"));
        }
        headers
    }

    fn fetch(&self, url: &str) -> Result<Release> {
        debug!("fetching GitHub release {url}");
        let mut headers = self.auth_headers();
        headers.insert("Accept".to_owned(), "application/vnd.github+json".to_owned());
        headers.insert("X-GitHub-Api-Version".to_owned(), "2022-11-28".to_owned());

        let release: GitHubRelease = match self.downloader.get_json(url, &headers) {
            Err(Error::NotFound { .. }) => return Err(Error::NoRelease),
            other => other?,
        };
        Ok(self.convert_release(release))
    }

    /// Authenticated downloads must go through the API asset URL with an
    /// octet-stream `Accept`; anonymous ones use the browser URL.
    fn convert_release(&self, release: GitHubRelease) -> Release {
        let mut auth_headers = self.auth_headers();
        if self.token.is_some() {
            auth_headers.insert("Accept".to_owned(), "application/octet-stream".to_owned());
        }
        let assets = release
            .assets
            .into_iter()
            .map(|a| {
                let url = if self.token.is_some() {
                    a.url
                } else {
                    a.browser_download_url
                };
                Asset { name: a.name, url }
            })
            .collect();

        Release {
            name: release.name.unwrap_or_default(),
            tag_name: release.tag_name,
            assets,
            auth_headers,
            name_pattern: None,
        }
    }
}

impl RepoProvider for GitHub {
    fn latest_release(&self) -> Result<Release> {
        self.fetch(&format!("{}/repos/{}/releases/latest", self.api_base, self.repo))
    }

    fn tagged_release(&self, tag: &str) -> Result<Release> {
        self.fetch(&format!(
            "{}/repos/{}/releases/tags/{}",
            self.api_base,
            self.repo,
            encode_path_segment(tag)
        ))
    }
}
