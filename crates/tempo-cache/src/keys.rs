//! Cache key construction.
//!
//! Keys are `:`-delimited, so every caller-influenced segment goes through
//! [`sanitize_key`] first. Two different queries must never share a key.

use std::fmt::Display;

/// Namespace of the per-client check-in list cache.
pub const CHECKIN_NAMESPACE: &str = "checkins";
/// Namespace of the per-(client, range) insight cache.
pub const INSIGHT_NAMESPACE: &str = "insight";

/// Replace delimiter and whitespace characters in a key segment.
pub fn sanitize_key(segment: &str) -> String {
    segment
        .chars()
        .map(|c| match c {
            ':' | '|' | '*' | '?' | '[' | ']' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}

/// Counter holding the current generation of one entity's collection.
pub fn version_key(namespace: &str, entity: impl Display) -> String {
    format!("{namespace}_version:{entity}")
}

/// Entry key tagged with the generation it was built under.
pub fn versioned_key(
    namespace: &str,
    entity: impl Display,
    version: u64,
    parts: &[String],
) -> String {
    let mut key = format!("{namespace}:v{version}:{entity}");
    for part in parts {
        key.push(':');
        key.push_str(&sanitize_key(part));
    }
    key
}

/// Entry key for values invalidated by explicit deletion.
pub fn scoped_key(namespace: &str, entity: impl Display, parts: &[&str]) -> String {
    let mut key = format!("{namespace}:{entity}");
    for part in parts {
        key.push(':');
        key.push_str(&sanitize_key(part));
    }
    key
}

/// Idempotency record for one (actor, route, client key).
pub fn idempotency_key(actor: impl Display, route: &str, key: impl Display) -> String {
    format!("idem|{actor}|{}|{key}", sanitize_key(route))
}

/// Fixed-window counter for one caller.
pub fn rate_limit_key(prefix: &str, identity: &str) -> String {
    format!("{prefix}_{}", sanitize_key(identity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("a:b|c"), "a_b_c");
        assert_eq!(sanitize_key("2026-01-01"), "2026-01-01");
        assert_eq!(sanitize_key("has space"), "has_space");
    }

    #[test]
    fn test_version_key() {
        assert_eq!(version_key("checkins", "c1"), "checkins_version:c1");
    }

    #[test]
    fn test_versioned_key_embeds_version_and_every_part() {
        let parts = vec![
            "2026-01-01".to_string(),
            "2026-01-31".to_string(),
            "30".to_string(),
            String::new(),
        ];
        assert_eq!(
            versioned_key("checkins", "c1", 4, &parts),
            "checkins:v4:c1:2026-01-01:2026-01-31:30:"
        );
        assert_ne!(
            versioned_key("checkins", "c1", 4, &parts),
            versioned_key("checkins", "c1", 5, &parts)
        );
    }

    #[test]
    fn test_injected_delimiters_cannot_collide() {
        let a = versioned_key("n", "e", 1, &["x:y".to_string()]);
        let b = versioned_key("n", "e", 1, &["x".to_string(), "y".to_string()]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_scoped_and_idempotency_keys() {
        assert_eq!(
            scoped_key("insight", "c1", &["2026-01-01", "2026-01-31"]),
            "insight:c1:2026-01-01:2026-01-31"
        );
        assert_eq!(
            idempotency_key("coach", "POST /clients", "k"),
            "idem|coach|POST_/clients|k"
        );
        assert_eq!(rate_limit_key("rl", "coach"), "rl_coach");
    }
}
