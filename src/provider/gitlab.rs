use std::collections::HashMap;

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::downloader::Downloader;
use crate::error::{Error, Result};
use crate::provider::{encode_path_segment, RepoProvider};
use crate::release::{Asset, Release};

pub const GITLAB_URL: &str = "https://gitlab.com";

static PERCENT_ENCODED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%[0-9A-Fa-f]{2}").expect("valid regex"));

#[derive(Deserialize)]
struct GitLabAssetsLink {
    name: String,
    direct_asset_url: String,
}

#[derive(Deserialize, Default)]
struct GitLabAssets {
    #[serde(default)]
    links: Vec<GitLabAssetsLink>,
}

#[derive(Deserialize)]
struct GitLabRelease {
    #[serde(default)]
    name: Option<String>,
    tag_name: String,
    #[serde(default)]
    assets: GitLabAssets,
}

/// Releases of a GitLab project, by numeric id or `group/project` path.
pub struct GitLab {
    api_url: String,
    project_id: String,
    token: Option<String>,
    downloader: Downloader,
}

impl GitLab {
    pub fn new(downloader: Downloader, base_url: &str, repo: &str, token: Option<&str>) -> Self {
        Self {
            api_url: format!("{}/api/v4", base_url.trim_end_matches('/')),
            project_id: project_id(repo),
            token: token.filter(|t| !t.is_empty()).map(str::to_owned),
            downloader,
        }
    }

    fn auth_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        if let Some(token) = &self.token {
            headers.insert("PRIVATE-TOKEN".to_owned(), token.clone());
        }
        headers
    }

    fn fetch<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("fetching GitLab release {url}");
        match self.downloader.get_json(url, &self.auth_headers()) {
            Err(Error::NotFound { .. }) => Err(Error::NoRelease),
            other => other,
        }
    }

    fn convert_release(&self, release: GitLabRelease) -> Release {
        Release {
            name: release.name.unwrap_or_default(),
            tag_name: release.tag_name,
            assets: release
                .assets
                .links
                .into_iter()
                .map(|link| Asset {
                    name: link.name,
                    url: link.direct_asset_url,
                })
                .collect(),
            auth_headers: self.auth_headers(),
            name_pattern: None,
        }
    }
}

impl RepoProvider for GitLab {
    fn latest_release(&self) -> Result<Release> {
        let url = format!("{}/projects/{}/releases?per_page=1", self.api_url, self.project_id);
        let releases: Vec<GitLabRelease> = self.fetch(&url)?;
        let release = releases.into_iter().next().ok_or(Error::NoRelease)?;
        Ok(self.convert_release(release))
    }

    fn tagged_release(&self, tag: &str) -> Result<Release> {
        let url = format!(
            "{}/projects/{}/releases/{}",
            self.api_url,
            self.project_id,
            encode_path_segment(tag)
        );
        let release: GitLabRelease = self.fetch(&url)?;
        Ok(self.convert_release(release))
    }
}

/// Numeric ids and already-encoded paths are used verbatim; anything else is
/// percent-encoded so `group/project` becomes `group%2Fproject`.
fn project_id(repo: &str) -> String {
    if repo.parse::<u64>().is_ok() || PERCENT_ENCODED_RE.is_match(repo) {
        repo.to_owned()
    } else {
        encode_path_segment(repo)
    }
}
