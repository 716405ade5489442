//! Filename heuristics: which OS/architecture a release asset is built for,
//! whether it is a musl build, and whether it is only a checksum listing.
//!
//! All matching is case-insensitive substring containment. Asset names are
//! free text (`linux-arm64`, `Linux_x86_64`, `-lnx`), so tokenizing them
//! would reject more real-world names than it would save.

use once_cell::sync::Lazy;
use regex::Regex;

static HASH_FILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(checksums?|(md5|sha1|sha128|sha256|sha512)(sums?)?)\b").expect("valid regex")
});

static MUSL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \-_.]musl(?:[ \-_.]|\b)").expect("valid regex"));

const KNOWN_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "js", "linux",
    "nacl", "netbsd", "openbsd", "plan9", "solaris", "wasip1", "windows", "zos",
];

const KNOWN_ARCH: &[&str] = &[
    "386",
    "amd64",
    "amd64p32",
    "arm",
    "armbe",
    "arm64",
    "arm64be",
    "loong64",
    "mips",
    "mipsle",
    "mips64",
    "mips64le",
    "mips64p32",
    "mips64p32le",
    "ppc",
    "ppc64",
    "ppc64le",
    "riscv",
    "riscv64",
    "s390",
    "s390x",
    "sparc",
    "sparc64",
    "wasm",
];

const OS_ALIASES: &[(&str, &[&str])] = &[
    ("darwin", &["mac"]),
    ("linux", &["lnx"]),
    ("windows", &["win"]),
];

const ARCH_ALIASES: &[(&str, &[&str])] = &[
    ("amd64", &["x86_64", "x64", "64bit"]),
    ("arm64", &["aarch64"]),
];

/// A table of known tokens plus the aliases some of them go by.
struct TokenTable {
    known: &'static [&'static str],
    aliases: &'static [(&'static str, &'static [&'static str])],
}

const OS_TABLE: TokenTable = TokenTable {
    known: KNOWN_OS,
    aliases: OS_ALIASES,
};

const ARCH_TABLE: TokenTable = TokenTable {
    known: KNOWN_ARCH,
    aliases: ARCH_ALIASES,
};

impl TokenTable {
    fn contains_any(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.known.iter().any(|token| name.contains(token))
            || self
                .aliases
                .iter()
                .flat_map(|(_, aliases)| aliases.iter())
                .any(|alias| name.contains(alias))
    }

    fn matches(&self, name: &str, target: &str) -> bool {
        let name = name.to_lowercase();
        let target = target.to_lowercase();
        if name.contains(&target) {
            return true;
        }
        self.aliases_of(&target)
            .iter()
            .any(|alias| self.contains_alias(&name, alias, &target))
    }

    fn aliases_of(&self, target: &str) -> &'static [&'static str] {
        self.aliases
            .iter()
            .find(|(token, _)| *token == target)
            .map(|(_, aliases)| *aliases)
            .unwrap_or(&[])
    }

    /// An alias only counts when it shows up outside every other known token
    /// that happens to contain it (`win` inside `darwin`).
    fn contains_alias(&self, name: &str, alias: &str, target: &str) -> bool {
        let mut masked = name.to_owned();
        for token in self
            .known
            .iter()
            .filter(|token| **token != target && token.contains(alias))
        {
            masked = masked.replace(token, " ");
        }
        masked.contains(alias)
    }
}

/// Whether `name` mentions any recognized operating system.
pub fn contains_os(name: &str) -> bool {
    OS_TABLE.contains_any(name)
}

/// Whether `name` mentions any recognized architecture.
pub fn contains_arch(name: &str) -> bool {
    ARCH_TABLE.contains_any(name)
}

/// Whether `name` names the operating system `os`, directly or by alias.
pub fn matches_os(name: &str, os: &str) -> bool {
    OS_TABLE.matches(name, os)
}

/// Whether `name` names the architecture `arch`, directly or by alias.
pub fn matches_arch(name: &str, arch: &str) -> bool {
    ARCH_TABLE.matches(name, arch)
}

/// Whether `name` carries a delimited `musl` token.
pub fn contains_musl(name: &str) -> bool {
    MUSL_RE.is_match(&name.to_lowercase())
}

/// Checksum and hash listings are published next to binaries but are never
/// installable.
pub fn is_ignored_file(name: &str) -> bool {
    HASH_FILE_RE.is_match(&name.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_files_are_ignored() {
        for name in [
            "release-installer_0.5.0_checksums.txt",
            "checksums",
            "checksums.txt",
            "checksum.json",
            "sha256sums.txt",
            "SHA256SUMS",
            "tool.md5",
            "beanstalkd_exporter-1.0.5.linux-amd64.sha256",
            "php-fpm-exporter.linux.amd64.sha256.txt",
        ] {
            assert!(is_ignored_file(name), "{name} should be ignored");
        }
    }

    #[test]
    fn test_binaries_are_not_ignored() {
        for name in [
            "node_exporter-1.8.2.linux-amd64.tar.gz",
            "tool_windows_amd64.zip",
            "shasta-linux-amd64",
        ] {
            assert!(!is_ignored_file(name), "{name} should not be ignored");
        }
    }

    #[test]
    fn test_contains_os() {
        assert!(contains_os("node_exporter-1.8.2.linux-arm64.tar.gz"));
        assert!(contains_os("couchdb-exporter_Linux_x86_64.tar.gz"));
        assert!(contains_os("prosafe_exporter-v0.2.8-x86_64-lnx.zip"));
        assert!(contains_os("tool-mac.zip"));
        assert!(!contains_os("aerospike-prometheus-exporter_1.17.0_x86_64.tgz"));
    }

    #[test]
    fn test_contains_arch() {
        assert!(contains_arch("tool-linux-arm64.tar.gz"));
        assert!(contains_arch("tool_1.1_linux_64bit.tar.gz"));
        assert!(contains_arch("tool-aarch64-unknown-linux-gnu"));
        assert!(!contains_arch("prometheus-exporter-linux-1.0.1.tgz"));
    }

    #[test]
    fn test_matches_os_with_aliases() {
        assert!(matches_os("Tool_Linux_x86_64.tar.gz", "linux"));
        assert!(matches_os("tool-x86_64-lnx.zip", "linux"));
        assert!(matches_os("tool-mac-universal.zip", "darwin"));
        assert!(matches_os("tool-win64.zip", "windows"));
        assert!(!matches_os("tool-linux-amd64.tar.gz", "darwin"));
    }

    #[test]
    fn test_windows_alias_ignores_darwin() {
        assert!(!matches_os("tool-darwin-amd64.tar.gz", "windows"));
        assert!(matches_os("tool-darwin-win-amd64.zip", "windows"));
    }

    #[test]
    fn test_matches_arch_with_aliases() {
        assert!(matches_arch("tool-linux-x86_64.tar.gz", "amd64"));
        assert!(matches_arch("tool-linux-x64.tar.gz", "amd64"));
        assert!(matches_arch("tool_linux_64bit.tar.gz", "amd64"));
        assert!(matches_arch("tool-aarch64-apple-darwin.tar.gz", "arm64"));
        assert!(!matches_arch("tool-aarch64-unknown-linux-gnu", "amd64"));
        assert!(!matches_arch("tool-linux-arm64.tar.gz", "amd64"));
    }

    #[test]
    fn test_unknown_target_uses_plain_containment() {
        assert!(matches_arch("tool-linux-e2k.tar.gz", "e2k"));
        assert!(!matches_arch("tool-linux-amd64.tar.gz", "e2k"));
    }

    #[test]
    fn test_musl_token() {
        assert!(contains_musl("monit-5.34.0-linux-x64-musl.tar.gz"));
        assert!(contains_musl("tool-x86_64-unknown-linux-musl"));
        assert!(contains_musl("tool_musl_amd64.zip"));
        assert!(contains_musl("tool-linux-MUSL.tar.gz"));
        assert!(!contains_musl("monit-5.34.0-linux-x64.tar.gz"));
        assert!(!contains_musl("tool-linux-musli.tar.gz"));
        assert!(!contains_musl("muslbox.tar.gz"));
    }
}
