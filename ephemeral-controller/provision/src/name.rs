use ephemeral_controller_core::ContainerRequest;
use rand::{distributions::Alphanumeric, Rng};
use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

const PREFIX: &str = "ephemeral";
const SUFFIX_LEN: usize = 5;

/// Generates a name for a container created from `request`.
///
/// Names share a stable component derived from the request and end with a
/// random suffix, so each attempt gets a distinct name.
pub fn container_name(request: &ContainerRequest) -> String {
    let mut hasher = DefaultHasher::new();
    request.hash(&mut hasher);
    let hash = hasher.finish() as u32;
    let suffix = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(|b| char::from(b.to_ascii_lowercase()))
        .collect::<String>();
    format!("{PREFIX}-{hash:08x}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_dns_labels() {
        let name = container_name(&ContainerRequest::new("maven:3"));
        assert!(name.len() <= 63, "{name}");
        assert!(name.starts_with("ephemeral-"), "{name}");
        assert!(
            name.chars()
                .all(|c| c == '-' || c.is_ascii_lowercase() || c.is_ascii_digit()),
            "{name}"
        );
    }

    #[test]
    fn same_request_shares_stem() {
        let req = ContainerRequest::new("maven:3").with_env("A", "1");
        let a = container_name(&req);
        let b = container_name(&req);
        assert_eq!(a[..a.len() - SUFFIX_LEN], b[..b.len() - SUFFIX_LEN]);

        let other = container_name(&ContainerRequest::new("node:20"));
        assert_ne!(a[..a.len() - SUFFIX_LEN], other[..other.len() - SUFFIX_LEN]);
    }
}
