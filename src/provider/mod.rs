//! Release sources. Each backend turns "latest" or a tag into a [`Release`].

mod apache;
mod github;
mod gitlab;

pub use apache::{compare_versions, Apache};
pub use github::GitHub;
pub use gitlab::{GitLab, GITLAB_URL};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::Result;
use crate::release::Release;

/// Bytes escaped inside a single URL path segment. Sub-delimiters that are
/// legal in a segment stay readable; `/`, `?` and `#` never do.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'=')
    .remove(b':')
    .remove(b'@');

/// A place releases can be looked up.
///
/// Both methods return [`crate::Error::NoRelease`] when the release does not
/// exist.
pub trait RepoProvider {
    fn latest_release(&self) -> Result<Release>;

    fn tagged_release(&self, tag: &str) -> Result<Release>;
}

/// Escape `s` for use as one path segment of a provider API URL.
pub(crate) fn encode_path_segment(s: &str) -> String {
    utf8_percent_encode(s, PATH_SEGMENT).to_string()
}
