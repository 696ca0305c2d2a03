//! Anchor scanning for upstream listing pages.
//!
//! Listing pages are simple, machine-generated HTML, so a tolerant regex
//! scanner is enough: attributes in any order and either quote style, inner
//! markup stripped from the link text, common entities decoded.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::storage::base_name;
use crate::versions::{has_archive_extension, name_match, parse_name_and_version};

static ANCHOR_OPEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<a\b([^>]*)>")
        .unwrap_or_else(|e| panic!("Failed to compile anchor regex: {e}"))
});

static ANCHOR_END: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)</a\s*>|<a\b")
        .unwrap_or_else(|e| panic!("Failed to compile anchor end regex: {e}"))
});

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .unwrap_or_else(|e| panic!("Failed to compile attribute regex: {e}"))
});

static TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<[^>]*>").unwrap_or_else(|e| panic!("Failed to compile tag regex: {e}"))
});

static ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[0-9]+|#[xX][0-9A-Fa-f]+|[A-Za-z]+);")
        .unwrap_or_else(|e| panic!("Failed to compile entity regex: {e}"))
});

/// An `<a>` element with an `href`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub text: String,
    pub href: String,
    pub rel: Option<String>,
}

impl Anchor {
    fn is_download(&self) -> bool {
        self.rel
            .as_deref()
            .is_some_and(|rel| rel.split_whitespace().any(|token| token.eq_ignore_ascii_case("download")))
    }
}

/// A link worth following on a project listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionLink {
    /// A distribution, keyed by its filename
    Direct { filename: String, href: String },
    /// Another page that may list distributions
    Recursive { href: String },
}

fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &Captures| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .or_else(|| entity.strip_prefix('#').map(str::parse::<u32>))
                    .and_then(Result::ok)
                    .and_then(char::from_u32),
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

fn parse_attributes(raw: &str) -> HashMap<String, String> {
    ATTRIBUTE
        .captures_iter(raw)
        .map(|caps| {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map_or("", |m| m.as_str());
            (caps[1].to_lowercase(), decode_entities(value))
        })
        .collect()
}

/// Anchors with an `href`, in document order.
pub fn extract_anchors(html: &str) -> Vec<Anchor> {
    let mut anchors = Vec::new();

    for open in ANCHOR_OPEN.captures_iter(html) {
        let (Some(whole), Some(raw_attributes)) = (open.get(0), open.get(1)) else {
            continue;
        };
        let mut attributes = parse_attributes(raw_attributes.as_str());
        let Some(href) = attributes.remove("href") else {
            continue;
        };

        let rest = &html[whole.end()..];
        let end = ANCHOR_END.find(rest).map_or(rest.len(), |m| m.start());
        let text = decode_entities(&TAG.replace_all(&rest[..end], ""));

        anchors.push(Anchor {
            text: text.trim().to_string(),
            href: href.trim().to_string(),
            rel: attributes.remove("rel"),
        });
    }

    anchors
}

/// Classify one anchor of the listing page for project `name`.
///
/// - text that parses as a distribution of `name`: direct link keyed by the text
/// - text that parses as another project: ignored
/// - href ending in an archive extension: direct link keyed by its basename
/// - `rel="download"`: recursive link
pub fn classify(anchor: &Anchor, name: &str) -> Option<VersionLink> {
    match parse_name_and_version(&anchor.text) {
        Ok((guessed_name, _)) => name_match(&guessed_name, name).then(|| VersionLink::Direct {
            filename: anchor.text.clone(),
            href: anchor.href.clone(),
        }),
        Err(_) => {
            let target = anchor
                .href
                .split(['#', '?'])
                .next()
                .unwrap_or(&anchor.href);
            if has_archive_extension(target) {
                Some(VersionLink::Direct {
                    filename: base_name(target).to_string(),
                    href: anchor.href.clone(),
                })
            } else if anchor.is_download() {
                Some(VersionLink::Recursive {
                    href: anchor.href.clone(),
                })
            } else {
                None
            }
        }
    }
}

/// Version links on a listing page, in document order.
pub fn version_links(html: &str, name: &str) -> Vec<VersionLink> {
    extract_anchors(html)
        .iter()
        .filter_map(|anchor| classify(anchor, name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"<html>
  <body>
  <a/>
  <a href="../../packages/foo-1.0.tar.gz"/>foo-1.0.tar.gz</a>
  <a href="../../packages/bar-1.0.tar.gz"/>bar-1.0.tar.gz</a>
  <a href="http://foo.com/foo" rel="download"/>foo download link</a>
  <a href="http://foo.com/files/foo-0.1.0.zip" rel="download">0.1.0 download_url</a><br/>
  </body>
</html>"#;

    #[test]
    fn test_version_links() {
        let links = version_links(LISTING, "foo");
        assert_eq!(
            links,
            [
                VersionLink::Direct {
                    filename: "foo-1.0.tar.gz".to_string(),
                    href: "../../packages/foo-1.0.tar.gz".to_string(),
                },
                VersionLink::Recursive {
                    href: "http://foo.com/foo".to_string(),
                },
                VersionLink::Direct {
                    filename: "foo-0.1.0.zip".to_string(),
                    href: "http://foo.com/files/foo-0.1.0.zip".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_extract_anchors_attribute_styles() {
        let html = r#"<A REL='download' HREF='/a?x=1&amp;y=2'><b>Home</b> &amp; more</A>
<a class=link href=/packages/foo-2.0.tar.gz>foo-2.0.tar.gz</a>
<a name="top">no href</a>"#;
        let anchors = extract_anchors(html);
        assert_eq!(anchors.len(), 2);
        assert_eq!(anchors[0].href, "/a?x=1&y=2");
        assert_eq!(anchors[0].text, "Home & more");
        assert_eq!(anchors[0].rel.as_deref(), Some("download"));
        assert_eq!(anchors[1].href, "/packages/foo-2.0.tar.gz");
        assert_eq!(anchors[1].rel, None);
    }

    #[test]
    fn test_classify_matches_names_loosely() {
        let anchor = Anchor {
            text: "Foo_Bar-1.0.tar.gz".to_string(),
            href: "/packages/Foo_Bar-1.0.tar.gz#sha256=abc".to_string(),
            rel: None,
        };
        assert!(matches!(
            classify(&anchor, "foo-bar"),
            Some(VersionLink::Direct { .. })
        ));
        assert_eq!(classify(&anchor, "foo"), None);
    }

    #[test]
    fn test_classify_archive_href_with_fragment() {
        let anchor = Anchor {
            text: "download".to_string(),
            href: "https://files.example.com/foo-1.0.tar.gz#md5=abc".to_string(),
            rel: None,
        };
        assert_eq!(
            classify(&anchor, "foo"),
            Some(VersionLink::Direct {
                filename: "foo-1.0.tar.gz".to_string(),
                href: "https://files.example.com/foo-1.0.tar.gz#md5=abc".to_string(),
            })
        );
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("a &lt;b&gt; &#65;&#x42; &bogus;"), "a <b> AB &bogus;");
    }
}
