//! Cache key derivation.
//!
//! A key is `<namespace>:<body>` where the body is the request's parameters
//! sorted by name and joined as `name=value|name=value`. Bodies longer than
//! the threshold are replaced by their SHA-256 hex digest. The namespace stays
//! readable either way so `instance:*` style invalidation keeps working.

use glob::Pattern;
use sha2::{Digest, Sha256};

use crate::error::{PricingError, PricingResult};
use crate::models::PriceRequest;

/// Default body length above which the body is hashed
pub const DEFAULT_HASH_THRESHOLD: usize = 200;

/// Derive the cache key for a request
pub fn cache_key(request: &PriceRequest, hash_threshold: usize) -> String {
    key_from_params(request.namespace(), request.key_params(), hash_threshold)
}

/// Derive a key from a namespace and unordered parameters
pub fn key_from_params(
    namespace: &str,
    mut params: Vec<(&str, String)>,
    hash_threshold: usize,
) -> String {
    params.sort();
    let body = params
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("|");

    if body.len() > hash_threshold {
        let digest = const_hex::encode(Sha256::digest(body.as_bytes()));
        format!("{namespace}:{digest}")
    } else {
        format!("{namespace}:{body}")
    }
}

/// Compile an invalidation pattern.
///
/// `*`, `?` and `[..]` classes mean the same thing to the local matcher and to
/// Redis `MATCH`. Backslash escapes and `[^..]` negation are read differently
/// by the two, so they are rejected rather than applied to one tier only.
pub fn key_pattern(pattern: &str) -> PricingResult<Pattern> {
    if pattern.contains('\\') || pattern.contains("[^") {
        return Err(PricingError::InvalidInput(format!(
            "unsupported cache pattern '{pattern}': use [..] classes instead of escapes or [^..]"
        )));
    }
    Pattern::new(pattern).map_err(|e| {
        PricingError::InvalidInput(format!("invalid cache pattern '{pattern}': {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InstanceRequest, OperatingSystem, StorageRequest};

    #[test]
    fn test_key_is_order_independent() {
        let a = key_from_params(
            "instance",
            vec![("region", "us-east-1".into()), ("instance_type", "m5.large".into())],
            DEFAULT_HASH_THRESHOLD,
        );
        let b = key_from_params(
            "instance",
            vec![("instance_type", "m5.large".into()), ("region", "us-east-1".into())],
            DEFAULT_HASH_THRESHOLD,
        );
        assert_eq!(a, b);
        assert_eq!(a, "instance:instance_type=m5.large|region=us-east-1");
    }

    #[test]
    fn test_long_keys_are_hashed_deterministically() {
        let request = PriceRequest::Instance(InstanceRequest::on_demand(
            "m5.large",
            "us-east-1",
            OperatingSystem::Linux,
        ));
        let hashed = cache_key(&request, 10);
        assert!(hashed.starts_with("instance:"));
        assert_eq!(hashed.len(), "instance:".len() + 64);
        assert_eq!(hashed, cache_key(&request, 10));

        let plain = cache_key(&request, DEFAULT_HASH_THRESHOLD);
        assert!(plain.contains("instance_type=m5.large"));
    }

    #[test]
    fn test_distinct_requests_get_distinct_keys() {
        let gp3 = PriceRequest::Storage(StorageRequest::new("gp3", "us-east-1"));
        let gp2 = PriceRequest::Storage(StorageRequest::new("gp2", "us-east-1"));
        assert_ne!(cache_key(&gp3, 0), cache_key(&gp2, 0));
    }

    fn pattern_matches(pattern: &str, key: &str) -> bool {
        key_pattern(pattern).unwrap().matches(key)
    }

    #[test]
    fn test_long_key_digest_is_lowercase_hex() {
        let key = key_from_params("storage", vec![("volume_type", "gp3".into())], 0);
        let expected = const_hex::encode(Sha256::digest(b"volume_type=gp3"));
        assert_eq!(key, format!("storage:{expected}"));
        assert!(key["storage:".len()..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_key_pattern_wildcards() {
        assert!(pattern_matches("*", "instance:a"));
        assert!(pattern_matches("instance:*", "instance:region=us-east-1"));
        assert!(!pattern_matches("instance:*", "storage:region=us-east-1"));
        assert!(pattern_matches("*region=us-east-1*", "storage:region=us-east-1|volume_type=gp3"));
        assert!(pattern_matches("instance:*|region=eu-*", "instance:os=linux|region=eu-west-1"));
        assert!(!pattern_matches("a*a", "a"));
        assert!(pattern_matches("exact", "exact"));
        assert!(!pattern_matches("exact", "exactly"));
    }

    #[test]
    fn test_key_pattern_single_char_and_classes() {
        assert!(pattern_matches("instance:m5.?arge", "instance:m5.large"));
        assert!(pattern_matches("instance:m[56].large", "instance:m5.large"));
        assert!(pattern_matches("instance:m[56].large", "instance:m6.large"));
        assert!(!pattern_matches("instance:m[56].large", "instance:m7.large"));
    }

    #[test]
    fn test_key_pattern_rejects_tier_dependent_syntax() {
        assert!(matches!(key_pattern("instance:\\*"), Err(PricingError::InvalidInput(_))));
        assert!(matches!(key_pattern("instance:m[^5]*"), Err(PricingError::InvalidInput(_))));
        assert!(matches!(key_pattern("instance:[a"), Err(PricingError::InvalidInput(_))));
    }
}
