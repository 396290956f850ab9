use regex::Regex;
use std::{fmt, str::FromStr, sync::OnceLock};

/// Registry assumed when a reference has no domain component.
pub const DEFAULT_DOMAIN: &str = "docker.io";

/// Namespace prefixed to single-segment paths on the default registry.
pub const DEFAULT_NAMESPACE: &str = "library";

pub const DEFAULT_TAG: &str = "latest";

// The digest is split off before this grammar is applied: a single pass
// cannot match both a tag and a digest.
const REFERENCE_GRAMMAR: &str = concat!(
    r"^(?:(?P<domain>(?:localhost|[A-Za-z0-9_-]+(?:\.[A-Za-z0-9_-]+)+)(?::[0-9]+)?|[A-Za-z0-9_]+:[0-9]+)/)?",
    r"/?",
    r"(?P<namespace>(?:[a-z0-9]+(?:(?:[._]|__|-*)[a-z0-9]+)*/)*)",
    r"(?P<repo>[a-z0-9-]+)",
    r"(?::(?P<tag>[A-Za-z0-9_][A-Za-z0-9_.-]{0,127})?)?$",
);

const DIGEST_GRAMMAR: &str = r"^[A-Za-z][A-Za-z0-9]*(?:[-_+.][A-Za-z][A-Za-z0-9]*)*:[0-9A-Fa-f]+$";

/// A normalized container image reference.
///
/// ```text
/// maven           -> docker.io/library/maven:latest
/// docker.io/maven -> docker.io/library/maven:latest
/// maven@sha256:.. -> docker.io/library/maven@sha256:..
/// ```
///
/// Parsing is deliberately lenient: it only splits a reference into the
/// pieces rules are applied to. Strict validation is left to the cluster.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImageReference {
    domain: String,
    path: String,
    tag: Option<String>,
    digest: Option<String>,
    name: String,
    reference: String,
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("invalid image reference: {0}")]
pub struct InvalidReference(String);

fn reference_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(REFERENCE_GRAMMAR).expect("reference grammar must compile"))
}

fn digest_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(DIGEST_GRAMMAR).expect("digest grammar must compile"))
}

// === impl ImageReference ===

impl ImageReference {
    /// Parses and normalizes an image reference, returning `None` when the
    /// string does not look like an image reference at all.
    pub fn parse(raw: &str) -> Option<Self> {
        let (raw, digest) = match raw.split_once('@') {
            Some((raw, digest)) => {
                if !digest_regex().is_match(digest) {
                    return None;
                }
                (raw, Some(digest.to_string()))
            }
            None => (raw, None),
        };

        let caps = reference_regex().captures(raw)?;

        let domain = caps
            .name("domain")
            .map(|m| m.as_str())
            .unwrap_or(DEFAULT_DOMAIN)
            .to_string();

        let repo = caps.name("repo").map(|m| m.as_str()).unwrap_or_default();
        let namespace = caps
            .name("namespace")
            .map(|m| m.as_str())
            .unwrap_or_default();
        let path = if namespace.is_empty() && domain == DEFAULT_DOMAIN {
            format!("{DEFAULT_NAMESPACE}/{repo}")
        } else {
            format!("{namespace}{repo}")
        };

        let tag = caps
            .name("tag")
            .map(|m| m.as_str().to_string())
            .or_else(|| digest.is_none().then(|| DEFAULT_TAG.to_string()));

        Some(Self::new(domain, path, tag, digest))
    }

    fn new(domain: String, path: String, tag: Option<String>, digest: Option<String>) -> Self {
        let name = format!("{domain}/{path}");
        let mut reference = name.clone();
        if let Some(tag) = &tag {
            reference.push(':');
            reference.push_str(tag);
        }
        if let Some(digest) = &digest {
            reference.push('@');
            reference.push_str(digest);
        }
        Self {
            domain,
            path,
            tag,
            digest,
            name,
            reference,
        }
    }

    /// The registry domain, e.g. `docker.io`.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The repository path without the domain, e.g. `library/maven`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Domain and path, without tag or digest.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// The full normalized reference: `name[:tag][@digest]`.
    pub fn reference(&self) -> &str {
        &self.reference
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reference)
    }
}

impl FromStr for ImageReference {
    type Err = InvalidReference;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| InvalidReference(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const DIGEST: &str = "sha256:5a156ff125e5a12ac7ff43ee5120fa249cf62";

    #[rstest]
    #[case("maven", "docker.io", "library/maven", Some("latest"), None)]
    #[case("docker.io/maven", "docker.io", "library/maven", Some("latest"), None)]
    #[case("docker.io/library/maven", "docker.io", "library/maven", Some("latest"), None)]
    #[case("docker.io/library/maven:3", "docker.io", "library/maven", Some("3"), None)]
    #[case("docker.io/library/maven:@sha256:5a156ff125e5a12ac7ff43ee5120fa249cf62", "docker.io", "library/maven", None, Some(DIGEST))]
    #[case("docker.io/library/maven:3@sha256:5a156ff125e5a12ac7ff43ee5120fa249cf62", "docker.io", "library/maven", Some("3"), Some(DIGEST))]
    #[case("maven@sha256:5a156ff125e5a12ac7ff43ee5120fa249cf62", "docker.io", "library/maven", None, Some(DIGEST))]
    #[case("example.com/maven", "example.com", "maven", Some("latest"), None)]
    #[case("localhost/tools/maven:3.9", "localhost", "tools/maven", Some("3.9"), None)]
    #[case("registry:5000/team/app:v1", "registry:5000", "team/app", Some("v1"), None)]
    #[case("bitnami/kubectl", "docker.io", "bitnami/kubectl", Some("latest"), None)]
    fn parses(
        #[case] input: &str,
        #[case] domain: &str,
        #[case] path: &str,
        #[case] tag: Option<&str>,
        #[case] digest: Option<&str>,
    ) {
        let r = ImageReference::parse(input).expect("reference must parse");
        assert_eq!(r.domain(), domain);
        assert_eq!(r.path(), path);
        assert_eq!(r.name(), format!("{domain}/{path}"));
        assert_eq!(r.tag(), tag);
        assert_eq!(r.digest(), digest);
        assert_eq!(r.to_string(), r.reference());
    }

    #[rstest]
    #[case("maven%dogs")]
    #[case("not a valid ref")]
    #[case("$foo")]
    #[case("")]
    #[case("maven@")]
    #[case("maven@sha256:xyz")]
    fn rejects_invalid(#[case] input: &str) {
        assert_eq!(ImageReference::parse(input), None);
        assert!(input.parse::<ImageReference>().is_err());
    }

    #[test]
    fn default_registry_and_tag() {
        let r = ImageReference::parse("maven").unwrap();
        assert_eq!(r.domain(), DEFAULT_DOMAIN);
        assert_eq!(r.path(), "library/maven");
        assert_eq!(r.tag(), Some("latest"));
        assert_eq!(r.digest(), None);
        assert_eq!(r.reference(), "docker.io/library/maven:latest");
    }

    #[test]
    fn tag_and_digest_are_kept() {
        let digest = format!("sha256:{}", "a".repeat(64));
        let r = ImageReference::parse(&format!("docker.io/library/maven:3@{digest}")).unwrap();
        assert_eq!(r.tag(), Some("3"));
        assert_eq!(r.digest(), Some(digest.as_str()));
        assert_eq!(r.name(), "docker.io/library/maven");
    }

    #[rstest]
    #[case("maven")]
    #[case("docker.io/maven:3")]
    #[case("maven@sha256:5a156ff125e5a12ac7ff43ee5120fa249cf62")]
    #[case("ghcr.io/org/team/tool:1.2.3@sha256:5a156ff125e5a12ac7ff43ee5120fa249cf62")]
    #[case("localhost:5000/app")]
    fn normalization_is_idempotent(#[case] input: &str) {
        let once = ImageReference::parse(input).unwrap();
        let twice = ImageReference::parse(once.reference()).unwrap();
        assert_eq!(once, twice);
    }
}
