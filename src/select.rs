//! Picks exactly one asset out of a release, or explains why it cannot.

use log::debug;
use regex::Regex;

use crate::error::{Error, Result};
use crate::matcher::is_ignored_file;
use crate::platform::PlatformDescriptor;
use crate::release::{Asset, Release};
use crate::score::weight;

/// Select the single asset to install from `assets`.
///
/// Checksum listings are dropped first. With a `pattern`, exactly one asset
/// must match it. Without one, the highest-weight asset wins and a shared top
/// weight is an error naming every tied asset.
pub fn select<'a>(
    assets: &'a [Asset],
    platform: &PlatformDescriptor,
    pattern: Option<&Regex>,
) -> Result<&'a Asset> {
    let candidates: Vec<&Asset> = assets
        .iter()
        .filter(|asset| !is_ignored_file(&asset.name))
        .collect();

    match pattern {
        Some(re) => select_by_pattern(candidates, re),
        None => select_by_weight(candidates, platform),
    }
}

/// [`select`] over a release, honouring its name pattern.
pub fn select_release_asset<'a>(
    release: &'a Release,
    platform: &PlatformDescriptor,
) -> Result<&'a Asset> {
    select(&release.assets, platform, release.name_pattern.as_ref())
}

fn select_by_pattern<'a>(candidates: Vec<&'a Asset>, re: &Regex) -> Result<&'a Asset> {
    let mut matched: Vec<&Asset> = candidates
        .into_iter()
        .filter(|asset| re.is_match(&asset.name))
        .collect();

    match matched.len() {
        0 => Err(Error::NoPatternMatch),
        1 => Ok(matched.remove(0)),
        _ => Err(Error::MultiplePatternMatches(
            matched.iter().map(|asset| asset.name.clone()).collect(),
        )),
    }
}

fn select_by_weight<'a>(
    candidates: Vec<&'a Asset>,
    platform: &PlatformDescriptor,
) -> Result<&'a Asset> {
    let mut weighted: Vec<(&Asset, u32)> = candidates
        .into_iter()
        .map(|asset| (asset, weight(asset, platform)))
        .collect();
    // Stable: equal weights keep their release order.
    weighted.sort_by(|a, b| b.1.cmp(&a.1));

    for (asset, w) in &weighted {
        debug!("asset {} weight {}", asset.name, w);
    }

    let Some(&(best, top)) = weighted.first() else {
        return Err(Error::NoAsset);
    };

    let tied: Vec<(String, u32)> = weighted
        .iter()
        .take_while(|(_, w)| *w == top)
        .map(|(asset, w)| (asset.name.clone(), *w))
        .collect();
    if tied.len() > 1 {
        return Err(Error::MultipleMaxWeightAssets(tied));
    }

    Ok(best)
}
