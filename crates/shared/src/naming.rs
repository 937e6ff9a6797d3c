//! Identifiers & Naming (spec 4.1). `storeId` doubles as the namespace and
//! the chart release name by construction, so `store_id_to_namespace` and
//! `store_id_to_helm_release` are identity functions kept as named
//! conversions for call-site clarity rather than raw field access.

use rand::RngCore;

const STORE_ID_PREFIX: &str = "store-";
const REQUEST_ID_PREFIX: &str = "req_";

fn random_hex(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// `store-[0-9a-f]{8}` — 4 cryptographically random bytes, hex-encoded.
pub fn generate_store_id() -> String {
    format!("{STORE_ID_PREFIX}{}", random_hex(4))
}

/// `req_[0-9a-f]{12}` — 6 random bytes, hex-encoded.
pub fn generate_request_id() -> String {
    format!("{REQUEST_ID_PREFIX}{}", random_hex(6))
}

pub fn is_valid_store_id(candidate: &str) -> bool {
    let Some(suffix) = candidate.strip_prefix(STORE_ID_PREFIX) else {
        return false;
    };
    suffix.len() == 8 && suffix.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

/// Identity by construction: `namespace == releaseName == id`.
pub fn store_id_to_namespace(store_id: &str) -> String {
    store_id.to_string()
}

pub fn store_id_to_helm_release(store_id: &str) -> String {
    store_id.to_string()
}

/// Resolved per spec 9's Open Question: colocated with naming (not config),
/// formula `scheme + storeId + domainSuffix + (":"+port if port)`.
pub fn build_store_url(scheme: &str, store_id: &str, domain_suffix: &str, port: Option<u16>) -> String {
    let mut url = format!("{scheme}://{store_id}{domain_suffix}");
    if let Some(port) = port {
        url.push(':');
        url.push_str(&port.to_string());
    }
    url
}

pub fn admin_url_suffix(engine: &crate::models::Engine) -> &'static str {
    match engine {
        crate::models::Engine::Woocommerce => "/wp-admin",
        crate::models::Engine::Medusa => "/admin",
    }
}

const RESERVED_STORE_NAMES: &[&str] = &[
    "admin", "api", "www", "root", "system", "kube", "kubernetes", "default", "kube-system",
    "kube-public", "internal", "null", "undefined", "test", "localhost",
];

/// `^[a-z0-9][a-z0-9-]*[a-z0-9]$`, 3-63 chars, no consecutive hyphens, not
/// in the reserved/profanity set.
pub fn validate_store_name(name: &str) -> Result<(), &'static str> {
    if name.len() < 3 || name.len() > 63 {
        return Err("name must be between 3 and 63 characters");
    }

    let bytes = name.as_bytes();
    let is_label_char = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-';
    if !bytes.iter().all(|&b| is_label_char(b)) {
        return Err("name may only contain lowercase letters, digits, and hyphens");
    }
    if bytes[0] == b'-' || bytes[bytes.len() - 1] == b'-' {
        return Err("name must start and end with a letter or digit");
    }
    if name.contains("--") {
        return Err("name must not contain consecutive hyphens");
    }
    if RESERVED_STORE_NAMES.contains(&name) {
        return Err("name is reserved");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_ids_match_the_documented_pattern() {
        for _ in 0..50 {
            let id = generate_store_id();
            assert!(is_valid_store_id(&id), "{id} should be valid");
        }
    }

    #[test]
    fn naming_determinism_holds_for_any_valid_id() {
        let id = generate_store_id();
        assert_eq!(store_id_to_namespace(&id), id);
        assert_eq!(store_id_to_helm_release(&id), id);
    }

    #[test]
    fn request_ids_carry_the_expected_prefix_and_length() {
        let id = generate_request_id();
        assert!(id.starts_with("req_"));
        assert_eq!(id.len(), "req_".len() + 12);
    }

    #[test]
    fn store_url_appends_port_only_when_present() {
        assert_eq!(
            build_store_url("http", "store-abcd1234", ".localhost", None),
            "http://store-abcd1234.localhost"
        );
        assert_eq!(
            build_store_url("http", "store-abcd1234", ".localhost", Some(8080)),
            "http://store-abcd1234.localhost:8080"
        );
    }

    #[test]
    fn valid_names_are_accepted() {
        assert!(validate_store_name("shop-a").is_ok());
        assert!(validate_store_name("acme-storefront-001").is_ok());
    }

    #[test]
    fn invalid_names_are_rejected() {
        assert!(validate_store_name("ab").is_err());
        assert!(validate_store_name("-shop").is_err());
        assert!(validate_store_name("shop-").is_err());
        assert!(validate_store_name("Shop").is_err());
        assert!(validate_store_name("shop--a").is_err());
        assert!(validate_store_name("admin").is_err());
        assert!(validate_store_name(&"a".repeat(64)).is_err());
    }
}
