//! Distribution filename and version heuristics
//!
//! Every other component relies on these helpers to split a distribution
//! filename into a project name and version, to order versions, and to decide
//! whether a version is a pre-release.
//!
//! Version ordering uses the legacy setuptools scheme: a version string is
//! broken into numeric runs (zero padded to eight digits) and qualifier tokens
//! (prefixed with `*`), with `*final` appended as a sentinel. Comparing the
//! resulting token lists lexicographically gives conventional ordering:
//!
//! ```text
//! 1.0.dev9  -> 00000001 *@ 00000009 *final
//! 1.0c1     -> 00000001 *c 00000001 *final
//! 1.0       -> 00000001 *final
//! 1.0.1     -> 00000001 00000000 00000001 *final
//! ```

use std::cmp::Ordering;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{IndexError, IndexResult};

/// Archive extensions stripped from distribution filenames.
pub const ARCHIVE_EXTENSIONS: &[&str] = &[".tar.gz", ".tar.bz2", ".tgz", ".zip"];

/// Extensions that are never accepted as distributions.
pub const REJECTED_EXTENSIONS: &[&str] = &[".exe"];

/// Sentinel appended to every parsed version.
const FINAL: &str = "*final";

/// Marker produced by a `-` separator (patch level, e.g. `1.0-1`).
const PATCH_LEVEL: &str = "*final-";

const ZERO: &str = "00000000";

static COMPONENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d+|[a-z]+|\.|-").unwrap_or_else(|e| {
        panic!("Failed to compile version component regex: {e}")
    })
});

/// Does the filename end in one of the known archive extensions?
pub fn has_archive_extension(filename: &str) -> bool {
    ARCHIVE_EXTENSIONS.iter().any(|ext| filename.ends_with(ext))
}

/// Strip the first matching archive extension, if any.
pub fn strip_archive_extension(filename: &str) -> &str {
    ARCHIVE_EXTENSIONS
        .iter()
        .find_map(|ext| filename.strip_suffix(ext))
        .unwrap_or(filename)
}

/// Guess a distribution's project name and version from its filename.
///
/// The filename is split on the first `-` when the remainder starts with a
/// digit (`foo-1.0-bar` -> `foo`, `1.0-bar`), otherwise on the last `-`
/// (`foo-bar-1.0` -> `foo-bar`, `1.0`).
///
/// # Examples
///
/// ```
/// # use vm_package_index::versions::parse_name_and_version;
/// let (name, version) = parse_name_and_version("foo-bar-1.0.tar.gz").unwrap();
/// assert_eq!(name, "foo-bar");
/// assert_eq!(version, "1.0");
/// ```
pub fn parse_name_and_version(filename: &str) -> IndexResult<(String, String)> {
    if REJECTED_EXTENSIONS.iter().any(|ext| filename.ends_with(ext)) {
        return Err(IndexError::Parse(format!(
            "{filename}: expected a valid package extension"
        )));
    }

    let rest = strip_archive_extension(filename);

    let (name, version) = rest
        .split_once('-')
        .ok_or_else(|| IndexError::Parse(format!("{filename}: no version separator")))?;

    let (name, version) = if version.starts_with(|c: char| c.is_ascii_digit()) {
        (name, version)
    } else {
        rest.rsplit_once('-')
            .ok_or_else(|| IndexError::Parse(format!("{filename}: no version separator")))?
    };

    if name.is_empty() || version.is_empty() {
        return Err(IndexError::Parse(format!(
            "{filename}: empty name or version"
        )));
    }

    Ok((name.to_string(), version.to_string()))
}

/// Normalize a project name for comparison: case-folded, `_` treated as `-`.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase().replace('_', "-")
}

/// Compare two project names, ignoring case and `_`/`-` differences.
pub fn name_match(this: &str, that: &str) -> bool {
    normalize_name(this) == normalize_name(that)
}

/// A version broken into comparable tokens.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComparableVersion(Vec<String>);

impl ComparableVersion {
    /// Parse a bare version string (not a filename).
    pub fn parse(version: &str) -> Self {
        let lowered = version.to_lowercase();
        let mut parts: Vec<String> = Vec::new();

        for part in raw_parts(&lowered) {
            if part.starts_with('*') {
                // drop the patch-level marker in front of a pre-release tag
                if part.as_str() < FINAL {
                    while parts.last().is_some_and(|last| last == PATCH_LEVEL) {
                        parts.pop();
                    }
                }
                // trailing zeros of a numeric series are insignificant
                while parts.last().is_some_and(|last| last == ZERO) {
                    parts.pop();
                }
            }
            parts.push(part);
        }

        ComparableVersion(parts)
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// Whether this version is a pre-release.
    ///
    /// Tokens are read left to right:
    ///
    /// - before any patch-level marker (`-`), every qualifier (`a`, `c`,
    ///   `dev`, ...) marks a pre-release;
    /// - after it, only qualifiers that sort before final (`a`, `b`, `c`,
    ///   `dev`) do, so unknown suffixes such as `xx` stay releases.
    ///
    /// So `1.0-1` and `1.0-xx` are releases while `1.0-rc1` and `1.0-xx.dev1`
    /// are pre-releases. Neither "any patch level is a release" nor "any
    /// qualifier is a pre-release" alone gives that classification.
    pub fn is_pre_release(&self) -> bool {
        let mut in_patch_level = false;
        for part in &self.0 {
            match part.as_str() {
                FINAL => {}
                PATCH_LEVEL => in_patch_level = true,
                numeric if numeric.bytes().all(|b| b.is_ascii_digit()) => {}
                qualifier if in_patch_level => {
                    if qualifier < FINAL {
                        return true;
                    }
                }
                _ => return true,
            }
        }
        false
    }
}

/// Tokenize a lower-cased version into padded numbers and `*` qualifiers,
/// followed by the final sentinel.
fn raw_parts(version: &str) -> Vec<String> {
    let mut tokens: Vec<&str> = Vec::new();
    let mut last_end = 0;
    for m in COMPONENT_RE.find_iter(version) {
        tokens.push(&version[last_end..m.start()]);
        tokens.push(m.as_str());
        last_end = m.end();
    }
    tokens.push(&version[last_end..]);

    let mut parts: Vec<String> = tokens
        .into_iter()
        .map(|token| match token {
            "pre" | "preview" | "rc" => "c",
            "-" => "final-",
            "dev" => "@",
            other => other,
        })
        .filter(|token| !token.is_empty() && *token != ".")
        .map(|token| {
            if token.starts_with(|c: char| c.is_ascii_digit()) {
                format!("{token:0>8}")
            } else {
                format!("*{token}")
            }
        })
        .collect();
    parts.push(FINAL.to_string());
    parts
}

/// Comparable version for a distribution filename.
pub fn sort_key(filename: &str) -> IndexResult<ComparableVersion> {
    let (_, version) = parse_name_and_version(filename)?;
    Ok(ComparableVersion::parse(&version))
}

/// Whether a distribution filename names a pre-release.
pub fn is_pre_release(filename: &str) -> IndexResult<bool> {
    Ok(sort_key(filename)?.is_pre_release())
}

/// Order distribution filenames by version; unparseable names sort last.
pub fn sort_filenames<I, S>(filenames: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut keyed: Vec<(Option<ComparableVersion>, String)> = filenames
        .into_iter()
        .map(Into::into)
        .map(|filename| (sort_key(&filename).ok(), filename))
        .collect();

    keyed.sort_by(|(a_key, a_name), (b_key, b_name)| match (a_key, b_key) {
        (Some(a), Some(b)) => a.cmp(b).then_with(|| a_name.cmp(b_name)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a_name.cmp(b_name),
    });

    keyed.into_iter().map(|(_, filename)| filename).collect()
}
