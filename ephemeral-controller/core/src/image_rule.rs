use crate::{Action, ContainerRequest, Decision, ImageReference, Rule};
use regex::Regex;
use std::fmt;

/// Matches the normalized image name of a request against wildcard patterns.
///
/// Patterns are separated by newlines; `*` matches any run of characters and
/// lines starting with `#` are ignored. Only the name (domain and path) is
/// matched, never the tag or digest.
///
/// An `Allow` rule is an allow-list: images that do not match are rejected.
/// A `Reject` rule is a deny-list: images that do not match pass through.
/// Invalid image references are always rejected.
#[derive(Clone, Debug)]
pub struct ContainerImageRule {
    names: String,
    action: Action,
    regex: Option<Regex>,
}

// === impl ContainerImageRule ===

impl ContainerImageRule {
    pub fn new(names: &str, action: Action) -> Result<Self, regex::Error> {
        let names = names.trim().to_string();
        let pattern = wildcard_patterns_to_regex(&names);
        let regex = if pattern.is_empty() {
            None
        } else {
            Some(Regex::new(&pattern)?)
        };
        Ok(Self {
            names,
            action,
            regex,
        })
    }

    /// The newline separated image name patterns.
    pub fn names(&self) -> &str {
        &self.names
    }

    pub fn action(&self) -> Action {
        self.action
    }

    fn matches(&self, name: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(name))
    }
}

impl Rule for ContainerImageRule {
    fn test(&self, request: &ContainerRequest) -> Option<Decision> {
        let image = request.image();
        let Some(reference) = ImageReference::parse(image) else {
            return Some(Decision::reject("Invalid image reference"));
        };

        if self.matches(reference.name()) {
            return Some(match self.action {
                Action::Reject => Decision::reject(format!(
                    "Image '{image}' has been disallowed by cluster administrators."
                )),
                Action::Allow => Decision::allow(),
            });
        }

        match self.action {
            Action::Allow => Some(Decision::reject(format!(
                "Image '{image}' not in allow list"
            ))),
            Action::Reject => None,
        }
    }
}

impl fmt::Display for ContainerImageRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ContainerImageRule[action={},names={:?}]",
            self.action, self.names
        )
    }
}

/// Compiles newline separated wildcard patterns into a single anchored
/// alternation. Returns an empty string when there are no patterns.
pub(crate) fn wildcard_patterns_to_regex(patterns: &str) -> String {
    let alternatives = patterns
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(wildcard_to_regex)
        .collect::<Vec<_>>();

    if alternatives.is_empty() {
        return String::new();
    }
    format!("^({})$", alternatives.join("|"))
}

fn wildcard_to_regex(pattern: &str) -> String {
    pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*")
}
