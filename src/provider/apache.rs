use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;

use html5ever::tendril::TendrilSink;
use html5ever::{parse_document, Attribute};
use log::debug;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use percent_encoding::percent_decode_str;
use url::Url;

use crate::downloader::Downloader;
use crate::error::{Error, Result};
use crate::provider::RepoProvider;
use crate::release::{Asset, Release};

/// One `<a href>` of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Link {
    name: String,
    url: String,
}

/// Releases published as sub-directories of an Apache-style directory
/// listing, e.g. `https://downloads.apache.org/zookeeper/`.
pub struct Apache {
    url: String,
    downloader: Downloader,
}

impl Apache {
    pub fn new(downloader: Downloader, url: &str) -> Self {
        Self {
            url: url.to_owned(),
            downloader,
        }
    }

    /// Links of the base listing; each one is a release directory.
    fn releases(&self) -> Result<Vec<Link>> {
        let links = match self.links(&self.url) {
            Err(Error::NotFound { .. }) => return Err(Error::NoRelease),
            other => other?,
        };
        if links.is_empty() {
            return Err(Error::NoRelease);
        }
        Ok(links)
    }

    fn release(&self, link: &Link) -> Result<Release> {
        let links = match self.links(&link.url) {
            Err(Error::NotFound { .. }) => return Err(Error::NoRelease),
            other => other?,
        };
        Ok(Release {
            name: link.name.clone(),
            tag_name: link.name.clone(),
            assets: links
                .into_iter()
                .map(|l| Asset {
                    name: l.name,
                    url: l.url,
                })
                .collect(),
            auth_headers: HashMap::new(),
            name_pattern: None,
        })
    }

    fn links(&self, base: &str) -> Result<Vec<Link>> {
        let base_url = directory_url(base)?;
        debug!("listing {base_url}");
        let body = self.downloader.get_text(base_url.as_str(), &HashMap::new())?;
        parse_links(&base_url, &body)
    }
}

impl RepoProvider for Apache {
    fn latest_release(&self) -> Result<Release> {
        let releases = self.releases()?;
        let latest = releases
            .iter()
            .max_by(|a, b| compare_versions(&a.name, &b.name))
            .ok_or(Error::NoRelease)?;
        self.release(latest)
    }

    fn tagged_release(&self, tag: &str) -> Result<Release> {
        let releases = self.releases()?;
        let found = releases
            .iter()
            .find(|r| r.name == tag)
            .ok_or(Error::NoRelease)?;
        self.release(found)
    }
}

/// Extract the listing's links, resolved against `base_url`. Sort links (`?C=N`)
/// and the parent directory are dropped; names lose their trailing `/`.
fn parse_links(base_url: &Url, body: &str) -> Result<Vec<Link>> {
    let dom = parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut body.as_bytes())
        .map_err(|source| Error::Listing {
            url: base_url.to_string(),
            source,
        })?;

    let mut anchors = Vec::new();
    collect_anchors(&dom.document, &mut anchors);

    let mut links = Vec::new();
    for (href, text) in anchors {
        if href.contains('?') || text == "Parent Directory" {
            continue;
        }
        let url = base_url.join(&href).map_err(|source| Error::InvalidUrl {
            url: href.clone(),
            source,
        })?;
        // Icon-only anchors carry no text; name them after the target when it
        // lives inside this listing.
        let name = if !text.is_empty() {
            text
        } else if url.as_str().starts_with(base_url.as_str()) {
            last_segment(&url)
        } else {
            continue;
        };
        let name = name.trim_end_matches('/');
        if name.is_empty() {
            continue;
        }
        links.push(Link {
            name: name.to_owned(),
            url: url.to_string(),
        });
    }
    Ok(links)
}

/// `(href, text)` of every `<a href>` below `handle`, in document order.
fn collect_anchors(handle: &Handle, out: &mut Vec<(String, String)>) {
    if let NodeData::Element { name, attrs, .. } = &handle.data {
        if &*name.local == "a" {
            if let Some(href) = get_attr(attrs, "href") {
                out.push((href, collect_text(handle).trim().to_owned()));
            }
            return;
        }
    }
    for child in handle.children.borrow().iter() {
        collect_anchors(child, out);
    }
}

fn get_attr(attrs: &RefCell<Vec<Attribute>>, name: &str) -> Option<String> {
    attrs
        .borrow()
        .iter()
        .find(|attr| &*attr.name.local == name)
        .map(|attr| attr.value.to_string())
}

fn collect_text(handle: &Handle) -> String {
    let mut text = String::new();
    for child in handle.children.borrow().iter() {
        match &child.data {
            NodeData::Text { contents } => text.push_str(&contents.borrow()),
            NodeData::Element { .. } => text.push_str(&collect_text(child)),
            _ => {}
        }
    }
    text
}

fn last_segment(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or_default();
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

/// `base` with a trailing slash, so relative hrefs resolve inside it.
fn directory_url(base: &str) -> Result<Url> {
    let with_slash = if base.ends_with('/') {
        base.to_owned()
    } else {
        format!("{base}/")
    };
    Url::parse(&with_slash).map_err(|source| Error::InvalidUrl {
        url: base.to_owned(),
        source,
    })
}

/// Compare dotted versions numerically. A leading `v` is ignored and
/// non-numeric components count as zero.
pub fn compare_versions(v1: &str, v2: &str) -> Ordering {
    let v1 = v1.to_lowercase();
    let v2 = v2.to_lowercase();
    let parts1: Vec<&str> = v1.strip_prefix('v').unwrap_or(&v1).split('.').collect();
    let parts2: Vec<&str> = v2.strip_prefix('v').unwrap_or(&v2).split('.').collect();

    let num = |parts: &[&str], i: usize| -> u64 {
        parts.get(i).and_then(|p| p.parse().ok()).unwrap_or(0)
    };

    for i in 0..parts1.len().max(parts2.len()) {
        match num(&parts1, i).cmp(&num(&parts2, i)) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}
