use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use log::{error, info};
use regex::Regex;

use release_installer::provider::GITLAB_URL;
use release_installer::{Api, InstallOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Provider {
    Github,
    Gitlab,
    Apache,
}

/// Install the right release binary for this machine.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Repository (`owner/repo`, GitLab project path or id)
    repo: String,

    /// Installation directory
    #[arg(long, default_value = "/usr/local/bin")]
    dir: PathBuf,

    /// Release provider [default: github, or gitlab when --url mentions it]
    #[arg(long, value_enum)]
    provider: Option<Provider>,

    /// Base URL, e.g. https://gitlab.example.com
    #[arg(long)]
    url: Option<String>,

    /// Token for private repositories
    #[arg(long, env = "RELEASE_INSTALLER_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Tag name; the leading `v` can be omitted
    #[arg(long)]
    tag: Option<String>,

    /// Pick the asset whose name matches this regex
    #[arg(long)]
    pattern: Option<Regex>,

    /// Skip archive entries whose name matches this regex
    #[arg(long)]
    exclude: Option<Regex>,
}

impl Cli {
    fn provider(&self) -> Result<Provider, String> {
        let provider = match (self.provider, &self.url) {
            (Some(p), _) => p,
            (None, Some(url)) if url.to_lowercase().contains("gitlab") => Provider::Gitlab,
            (None, _) => Provider::Github,
        };
        if provider == Provider::Apache && self.url.is_none() {
            return Err("--url is required with apache provider".to_owned());
        }
        Ok(provider)
    }

    /// Name for a bare-binary asset: the last segment of the repository.
    fn binary_name(&self) -> &str {
        self.repo
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&self.repo)
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let provider = match cli.provider() {
        Ok(p) => p,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let mut api = Api::new()
        .set_install_dir(&cli.dir)
        .set_binary_name(cli.binary_name());
    if let Some(pattern) = &cli.pattern {
        api = api.set_pattern(pattern.clone());
    }
    if let Some(exclude) = &cli.exclude {
        api = api.set_exclude(exclude.clone());
    }

    let token = cli.token.as_deref();
    let repo_api = match provider {
        Provider::Github => api.github(&cli.repo, token),
        Provider::Gitlab => api.gitlab(cli.url.as_deref().unwrap_or(GITLAB_URL), &cli.repo, token),
        Provider::Apache => api.apache(cli.url.as_deref().unwrap_or_default()),
    };
    let version_api = match &cli.tag {
        Some(tag) => repo_api.tag(tag),
        None => repo_api.latest(),
    };

    match version_api.install() {
        Ok(outcomes) => {
            for outcome in outcomes {
                match outcome {
                    InstallOutcome::Installed(path) => info!("{} installed", path.display()),
                    InstallOutcome::UpToDate(path) => {
                        info!("{} already up to date", path.display())
                    }
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) if e.is_not_found() => {
            info!("{e}, nothing to install");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                error!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
