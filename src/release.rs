use std::collections::HashMap;

use regex::Regex;

/// One downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub name: String,
    pub url: String,
}

impl Asset {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_owned(),
            url: url.to_owned(),
        }
    }
}

/// A tagged release, normalized from whichever provider produced it.
#[derive(Debug, Clone, Default)]
pub struct Release {
    pub name: String,
    pub tag_name: String,
    pub assets: Vec<Asset>,
    /// Headers required to download this release's assets.
    pub auth_headers: HashMap<String, String>,
    /// Optional user-supplied asset name filter.
    pub name_pattern: Option<Regex>,
}
