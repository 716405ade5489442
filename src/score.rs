//! Additive platform-fit weight for a single asset.

use crate::install::is_supported_archive;
use crate::matcher;
use crate::platform::PlatformDescriptor;
use crate::release::Asset;

/// Facts derived from an asset name for one target platform.
///
/// Every fact contributes one point to [`AssetFacts::weight`]. A name that
/// only says `linux` still outranks one naming neither OS nor arch, but never
/// one naming both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetFacts {
    pub contains_os: bool,
    pub contains_arch: bool,
    pub matches_os: bool,
    pub matches_arch: bool,
    pub supported_archive_format: bool,
    /// 1 when the asset's musl-ness equals the host's.
    pub libc_score: u32,
}

impl AssetFacts {
    pub fn new(name: &str, platform: &PlatformDescriptor) -> Self {
        let is_musl = matcher::contains_musl(name);
        Self {
            contains_os: matcher::contains_os(name),
            contains_arch: matcher::contains_arch(name),
            matches_os: matcher::matches_os(name, &platform.os),
            matches_arch: matcher::matches_arch(name, &platform.arch),
            supported_archive_format: is_supported_archive(name),
            libc_score: u32::from(is_musl == platform.host_is_musl),
        }
    }

    pub fn weight(&self) -> u32 {
        u32::from(self.contains_os)
            + u32::from(self.contains_arch)
            + u32::from(self.matches_os)
            + u32::from(self.matches_arch)
            + u32::from(self.supported_archive_format)
            + self.libc_score
    }
}

/// Weight of `asset` for `platform`; higher is a better fit.
pub fn weight(asset: &Asset, platform: &PlatformDescriptor) -> u32 {
    AssetFacts::new(&asset.name, platform).weight()
}
