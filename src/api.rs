use std::path::{Path, PathBuf};

use log::{info, warn};
use regex::Regex;

use crate::downloader::{Downloader, ProgressFn};
use crate::error::{Error, Result};
use crate::install::{is_supported_archive, is_unsupported_archive, Install, InstallOutcome};
use crate::platform::PlatformDescriptor;
use crate::progress::default_progress_fn;
use crate::provider::{Apache, GitHub, GitLab, RepoProvider};
use crate::release::Release;
use crate::select::select_release_asset;

// ──────────────────────────────────────────────────────────────────────────────
// Api
// ──────────────────────────────────────────────────────────────────────────────

/// Top-level entry-point with a chainable builder API.
///
/// # Example
/// ```rust,no_run
/// use release_installer::Api;
///
/// let outcomes = Api::new()
///     .set_install_dir("./bin")
///     .github("prometheus/node_exporter", None)
///     .latest()
///     .install()
///     .unwrap();
/// for outcome in outcomes {
///     println!("{}", outcome.path().display());
/// }
/// ```
pub struct Api {
    install_dir: PathBuf,
    proxy: Option<String>,
    progress: Option<ProgressFn>,
    platform: Option<PlatformDescriptor>,
    pattern: Option<Regex>,
    exclude: Option<Regex>,
    binary_name: Option<String>,
}

impl Api {
    /// Create a new `Api` with sensible defaults.
    ///
    /// Proxy is read from `HTTP_PROXY` / `HTTPS_PROXY` environment variables.
    pub fn new() -> Self {
        let proxy = std::env::var("HTTP_PROXY")
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| std::env::var("HTTPS_PROXY").ok().filter(|s| !s.is_empty()));

        Self {
            install_dir: PathBuf::from("."),
            proxy,
            progress: Some(default_progress_fn()),
            platform: None,
            pattern: None,
            exclude: None,
            binary_name: None,
        }
    }

    /// Set the installation directory (builder).
    pub fn set_install_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.install_dir = dir.into();
        self
    }

    /// Override the progress callback (builder).
    pub fn set_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Disable progress output (builder).
    pub fn no_progress(mut self) -> Self {
        self.progress = None;
        self
    }

    /// Set an explicit HTTP/HTTPS proxy URL (builder).
    pub fn set_proxy(mut self, proxy: &str) -> Self {
        self.proxy = Some(proxy.to_owned());
        self
    }

    /// Target a platform other than the running one (builder).
    pub fn set_platform(mut self, platform: PlatformDescriptor) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Pick the asset whose name matches `pattern` instead of scoring (builder).
    pub fn set_pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Skip archive entries whose name matches `exclude` (builder).
    pub fn set_exclude(mut self, exclude: Regex) -> Self {
        self.exclude = Some(exclude);
        self
    }

    /// File name for assets that are a bare binary rather than an archive
    /// (builder). Defaults to the asset name.
    pub fn set_binary_name(mut self, name: &str) -> Self {
        self.binary_name = Some(name.to_owned());
        self
    }

    /// A [`Downloader`] carrying this configuration's proxy and progress.
    pub fn downloader(&self) -> Downloader {
        Downloader::with_config(self.proxy.clone(), self.progress.clone())
    }

    /// Select a GitHub repository (`owner/repo`).
    pub fn github(self, repo: &str, token: Option<&str>) -> RepoApi {
        let provider = GitHub::new(self.downloader(), repo, token);
        self.provider(Box::new(provider))
    }

    /// Select a GitLab project on the instance at `base_url`.
    pub fn gitlab(self, base_url: &str, repo: &str, token: Option<&str>) -> RepoApi {
        let provider = GitLab::new(self.downloader(), base_url, repo, token);
        self.provider(Box::new(provider))
    }

    /// Select an Apache-style directory listing.
    pub fn apache(self, url: &str) -> RepoApi {
        let provider = Apache::new(self.downloader(), url);
        self.provider(Box::new(provider))
    }

    /// Select any release source.
    pub fn provider(self, provider: Box<dyn RepoProvider>) -> RepoApi {
        RepoApi {
            api: self,
            provider,
        }
    }
}

impl Default for Api {
    fn default() -> Self {
        Self::new()
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// RepoApi
// ──────────────────────────────────────────────────────────────────────────────

/// Intermediate builder after a release source has been specified.
pub struct RepoApi {
    api: Api,
    provider: Box<dyn RepoProvider>,
}

impl RepoApi {
    /// Target the latest release.
    pub fn latest(self) -> VersionApi {
        VersionApi {
            api: self.api,
            provider: self.provider,
            tag: None,
        }
    }

    /// Target a specific release tag. A leading `v` may be omitted.
    pub fn tag(self, tag: &str) -> VersionApi {
        VersionApi {
            api: self.api,
            provider: self.provider,
            tag: Some(tag.to_owned()),
        }
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// VersionApi
// ──────────────────────────────────────────────────────────────────────────────

/// Intermediate builder after a release has been chosen.
pub struct VersionApi {
    api: Api,
    provider: Box<dyn RepoProvider>,
    tag: Option<String>,
}

impl VersionApi {
    /// Resolve the release. A tag without a leading `v` that is not found is
    /// retried once as `v<tag>`.
    pub fn release(&self) -> Result<Release> {
        let Some(tag) = &self.tag else {
            return self.provider.latest_release();
        };
        match self.provider.tagged_release(tag) {
            Err(Error::NoRelease) if !tag.starts_with('v') => {
                info!("No release tagged {tag}, trying v{tag}");
                self.provider.tagged_release(&format!("v{tag}"))
            }
            other => other,
        }
    }

    /// Resolve the release, pick its asset for the target platform, download
    /// it and install its executables.
    pub fn install(self) -> Result<Vec<InstallOutcome>> {
        let install =
            Install::new(&self.api.install_dir).with_exclude(self.api.exclude.clone());
        install.ensure_install_dir()?;

        let mut release = self.release()?;
        info!("Found release {}", release.tag_name);
        release.name_pattern = self.api.pattern.clone();

        let platform = self
            .api
            .platform
            .clone()
            .unwrap_or_else(PlatformDescriptor::detect);
        let asset = select_release_asset(&release, &platform)?;
        info!("Selected asset {}", asset.name);

        if is_unsupported_archive(&asset.name) {
            return Err(Error::UnsupportedArchive(asset.name.clone()));
        }

        let temp_dir = tempfile::Builder::new()
            .prefix("release-installer")
            .tempdir()
            .map_err(|e| Error::io("create temp dir in", std::env::temp_dir(), e))?;
        let file_name = Path::new(&asset.name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "download".to_owned());
        let download_path = temp_dir.path().join(&file_name);

        self.api
            .downloader()
            .download(&asset.url, &download_path, &release.auth_headers)?;

        if is_supported_archive(&file_name) {
            let outcomes = install.install_archive(&download_path)?;
            if outcomes.is_empty() {
                warn!("No executable found in {file_name}");
            }
            Ok(outcomes)
        } else {
            let name = self.api.binary_name.as_deref().unwrap_or(&file_name);
            Ok(vec![install.install_binary(&download_path, name)?])
        }
    }
}
