//! Crawl origins and locally-routable remote paths.
//!
//! A link found on an upstream page is rewritten into a path under
//! `/remote` that carries the upstream base URL in its query:
//!
//! ```text
//! href      ../../packages/foo-1.0.tar.gz#md5=abc
//! location  https://pypi.org/simple/foo/
//! path      /remote/packages/foo-1.0.tar.gz?base=https%3A%2F%2Fpypi.org#md5=abc
//! ```
//!
//! [`resolve_remote_path`] turns such a path back into the upstream URL.

use url::form_urlencoded;
use url::Url;

use crate::error::{IndexError, IndexResult};

/// Path prefix under which remote distributions are served.
pub const REMOTE_PATH_PREFIX: &str = "/remote";

/// The scheme, authority and path a raw URL reference overrides.
#[derive(Debug, Default, PartialEq, Eq)]
struct UrlReference<'a> {
    scheme: Option<&'a str>,
    authority: Option<&'a str>,
    path: &'a str,
}

/// Split a possibly relative URL reference without resolving it.
fn split_reference(reference: &str) -> UrlReference<'_> {
    let end = reference.find(['?', '#']).unwrap_or(reference.len());
    let mut rest = &reference[..end];

    let mut scheme = None;
    if let Some((candidate, after)) = rest.split_once(':') {
        let valid = candidate.starts_with(|c: char| c.is_ascii_alphabetic())
            && candidate
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if valid {
            scheme = Some(candidate);
            rest = after;
        }
    }

    let mut authority = None;
    if let Some(after) = rest.strip_prefix("//") {
        let split = after.find('/').unwrap_or(after.len());
        authority = Some(&after[..split]);
        rest = &after[split..];
    }

    UrlReference {
        scheme,
        authority,
        path: rest,
    }
}

/// Replay redirect `Location` headers against the request URL.
///
/// Each header replaces only the parts it names: a scheme, an authority, a
/// path. Query and fragment are dropped from the result.
pub fn request_location<'a, I>(request_url: &str, locations: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let request = split_reference(request_url);
    let mut scheme = request.scheme.unwrap_or_default();
    let mut authority = request.authority.unwrap_or_default();
    let mut path = request.path;

    for location in locations {
        let redirect = split_reference(location);
        if let Some(redirect_scheme) = redirect.scheme.filter(|s| !s.is_empty()) {
            scheme = redirect_scheme;
        }
        if let Some(redirect_authority) = redirect.authority.filter(|a| !a.is_empty()) {
            authority = redirect_authority;
        }
        if !redirect.path.is_empty() {
            path = redirect.path;
        }
    }

    format!("{scheme}://{authority}{path}")
}

/// `scheme://host[:port]`; default ports are not spelled out.
pub fn base_url(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{host}:{port}", url.scheme()),
        None => format!("{}://{host}", url.scheme()),
    }
}

fn has_scheme(href: &str) -> bool {
    split_reference(href).scheme.is_some()
}

/// Rewrite a link found on a page at `location` into a `/remote` path.
///
/// Absolute hrefs keep their own base URL; relative ones resolve against the
/// crawl origin. The href's query is dropped and its fragment is re-appended
/// after the `base` parameter.
pub fn build_remote_path(href: &str, location: &str) -> IndexResult<String> {
    let (target, fragment) = match href.split_once('#') {
        Some((target, fragment)) => (target, Some(fragment)),
        None => (href, None),
    };

    let invalid = |e: url::ParseError| {
        IndexError::BadRequest(format!("Invalid link {href} on {location}: {e}"))
    };
    let url = if has_scheme(target) {
        Url::parse(target).map_err(invalid)?
    } else {
        Url::parse(location).and_then(|base| base.join(target)).map_err(invalid)?
    };

    let base: String = form_urlencoded::byte_serialize(base_url(&url).as_bytes()).collect();
    let mut path = format!("{REMOTE_PATH_PREFIX}{}?base={base}", url.path());
    if let Some(fragment) = fragment {
        path.push('#');
        path.push_str(fragment);
    }
    Ok(path)
}

/// Turn a `/remote` path back into the absolute upstream URL.
///
/// Absolute URLs are returned unchanged.
pub fn resolve_remote_path(path: &str) -> IndexResult<String> {
    if has_scheme(path) {
        return Ok(path.to_string());
    }

    let (path, fragment) = match path.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (path, None),
    };
    let (path, query) = path.split_once('?').unwrap_or((path, ""));
    let path = path.strip_prefix(REMOTE_PATH_PREFIX).unwrap_or(path);

    let base = form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "base")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| IndexError::BadRequest(format!("Remote path has no base URL: {path}")))?;

    let mut url = format!("{}{path}", base.trim_end_matches('/'));
    if let Some(fragment) = fragment {
        url.push('#');
        url.push_str(fragment);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_location_defaults_to_request_url() {
        let url = "http://pypi.python.org/simple/foo";
        assert_eq!(request_location(url, std::iter::empty()), url);
    }

    #[test]
    fn test_request_location_follows_redirects() {
        let url = "http://pypi.python.org/simple/foo";
        assert_eq!(
            request_location(url, ["http://pypi.python.org/simple/foo/"]),
            "http://pypi.python.org/simple/foo/"
        );
        assert_eq!(
            request_location(
                url,
                [
                    "https://pypi.python.org/simple/foo",
                    "https://pypi.python.org/simple/foo/"
                ]
            ),
            "https://pypi.python.org/simple/foo/"
        );
    }

    #[test]
    fn test_request_location_partial_redirects() {
        let url = "http://pypi.python.org/simple/foo-bar";
        let locations = [
            "https://pypi.python.org/simple/foo-bar",
            "/simple/foo-bar/",
            "/simple/foo_bar",
            "/simple/foo_bar/",
        ];
        assert_eq!(
            request_location(url, locations),
            "https://pypi.python.org/simple/foo_bar/"
        );
    }

    #[test]
    fn test_request_location_drops_query() {
        assert_eq!(
            request_location("http://example.com/simple/foo?x=1", ["/moved/?y=2#top"]),
            "http://example.com/moved/"
        );
    }

    #[test]
    fn test_base_url() {
        let url = Url::parse("http://foo.com/bar/baz").unwrap();
        assert_eq!(base_url(&url), "http://foo.com");
        let url = Url::parse("http://foo.com:8080/foo/bar").unwrap();
        assert_eq!(base_url(&url), "http://foo.com:8080");
    }

    #[test]
    fn test_build_remote_path() {
        let cases = [
            (
                "../../packages/2.4/m/mock/mock-0.4.0-py2.4.egg#md5=e948e25b46f75d343a7fcdf24a36005c",
                "https://pypi.python.org/simple/mock/",
                "/remote/packages/2.4/m/mock/mock-0.4.0-py2.4.egg?base=https%3A%2F%2Fpypi.python.org#md5=e948e25b46f75d343a7fcdf24a36005c",
            ),
            (
                "http://effbot.org/media/downloads/PIL-1.1.7a2-py2.5-macosx10.5.mpkg.zip",
                "http://effbot.org/downloads/",
                "/remote/media/downloads/PIL-1.1.7a2-py2.5-macosx10.5.mpkg.zip?base=http%3A%2F%2Feffbot.org",
            ),
            (
                "http://effbot.org/media/downloads/PIL-1.1.7.tar.gz#sha256=abc",
                "http://effbot.org/downloads/",
                "/remote/media/downloads/PIL-1.1.7.tar.gz?base=http%3A%2F%2Feffbot.org#sha256=abc",
            ),
            (
                "/packages/foo-1.0.tar.gz?token=x",
                "http://localhost:8080/simple/foo/",
                "/remote/packages/foo-1.0.tar.gz?base=http%3A%2F%2Flocalhost%3A8080",
            ),
        ];
        for (href, location, expected) in cases {
            assert_eq!(build_remote_path(href, location).unwrap(), expected, "{href}");
        }
    }

    #[test]
    fn test_resolve_remote_path() {
        assert_eq!(
            resolve_remote_path(
                "/remote/packages/foo-1.0.tar.gz?base=https%3A%2F%2Fpypi.python.org#md5=abc"
            )
            .unwrap(),
            "https://pypi.python.org/packages/foo-1.0.tar.gz#md5=abc"
        );
        assert_eq!(
            resolve_remote_path("http://example.com/foo-1.0.tar.gz").unwrap(),
            "http://example.com/foo-1.0.tar.gz"
        );
        assert!(resolve_remote_path("/remote/packages/foo-1.0.tar.gz").is_err());
    }

    #[test]
    fn test_build_then_resolve() {
        let path = build_remote_path("../../packages/foo-1.0.tar.gz", "http://localhost:3141/simple/foo/")
            .unwrap();
        assert_eq!(
            resolve_remote_path(&path).unwrap(),
            "http://localhost:3141/packages/foo-1.0.tar.gz"
        );
    }
}
