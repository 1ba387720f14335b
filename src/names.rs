//! Unique resource names
//!
//! Scenarios share one cluster and one Git organization with no locking;
//! collision avoidance rests entirely on unique generated names. The
//! identifiers are lowercase alphanumeric so they are valid in DNS
//! labels, Kubernetes names, and repository names alike.

use rand::Rng;

const ID_LENGTH: usize = 8;
const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// 8 random lowercase alphanumerics, e.g. `x7k2m9ab`.
pub fn short_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_LENGTH)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// `<prefix>-<short_id>`, e.g. `app-x7k2m9ab`.
pub fn unique_name(prefix: &str) -> String {
    format!("{prefix}-{}", short_id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_dns_label_safe() {
        for _ in 0..100 {
            let id = short_id();
            assert_eq!(id.len(), 8);
            assert!(id
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn names_do_not_collide_in_practice() {
        let names: HashSet<String> = (0..1000).map(|_| unique_name("app")).collect();
        assert_eq!(names.len(), 1000);
    }

    #[test]
    fn unique_name_keeps_the_prefix() {
        let name = unique_name("app");
        assert!(name.starts_with("app-"));
        assert_eq!(name.len(), "app-".len() + 8);
    }
}
