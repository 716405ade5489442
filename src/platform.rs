//! Target platform description.
//!
//! OS and architecture are expressed as Go-style tokens (`linux`, `darwin`,
//! `amd64`, `arm64`, ...) because that is how most release assets are named.

use log::debug;
use once_cell::sync::OnceCell;

/// Glob matched against the filesystem to detect a musl-linked host.
const MUSL_LIBC_GLOB: &str = "/lib/libc.musl-*";

static HOST_IS_MUSL: OnceCell<bool> = OnceCell::new();

/// The platform an asset is being chosen for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformDescriptor {
    pub os: String,
    pub arch: String,
    pub host_is_musl: bool,
}

impl PlatformDescriptor {
    pub fn new(os: &str, arch: &str, host_is_musl: bool) -> Self {
        Self {
            os: os.to_lowercase(),
            arch: arch.to_lowercase(),
            host_is_musl,
        }
    }

    /// Describe the running machine.
    pub fn detect() -> Self {
        let platform = Self::new(
            os_token(std::env::consts::OS),
            arch_token(std::env::consts::ARCH),
            host_is_musl(),
        );
        debug!(
            "detected platform os={} arch={} musl={}",
            platform.os, platform.arch, platform.host_is_musl
        );
        platform
    }
}

/// Whether the running host links against musl libc. Probed once per process.
pub fn host_is_musl() -> bool {
    *HOST_IS_MUSL.get_or_init(|| probe_musl(MUSL_LIBC_GLOB))
}

fn probe_musl(pattern: &str) -> bool {
    match glob::glob(pattern) {
        Ok(mut paths) => paths.any(|p| p.is_ok()),
        Err(_) => false,
    }
}

fn os_token(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        other => other,
    }
}

fn arch_token(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "powerpc" => "ppc",
        "powerpc64" => "ppc64",
        "loongarch64" => "loong64",
        other => other,
    }
}
