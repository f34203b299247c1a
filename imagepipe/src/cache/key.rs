//! Cache key derivation.

use crate::request::ImageRequest;
use sha2::{Digest, Sha256};
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyKind {
    Custom(String),
    Derived {
        image_id: String,
        processors: Vec<String>,
    },
}

/// Identifies a cached image.
///
/// A key is either *custom* (a caller-supplied string) or *derived* from a
/// request's normalized resource identity and the ordered identifiers of its
/// processors. Equality and hashing only look at the kind and its value; the
/// description and processor list kept for diagnostics do not participate.
///
/// # Example
///
/// ```
/// use imagepipe::cache::ImageCacheKey;
/// use imagepipe::ImageRequest;
///
/// let a = ImageCacheKey::from_request(&ImageRequest::new("HTTPS://Example.com/a.png"));
/// let b = ImageCacheKey::from_request(&ImageRequest::new("https://example.com/a.png"));
/// assert_eq!(a, b);
///
/// assert_ne!(a, ImageCacheKey::custom("https://example.com/a.png"));
/// ```
#[derive(Debug, Clone)]
pub struct ImageCacheKey {
    kind: KeyKind,
    description: String,
    processors: Vec<String>,
}

impl ImageCacheKey {
    /// Creates a key from a caller-supplied string.
    pub fn custom(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            description: key.clone(),
            kind: KeyKind::Custom(key),
            processors: Vec::new(),
        }
    }

    /// Derives the key for a request.
    pub fn from_request(request: &ImageRequest) -> Self {
        let image_id = request.image_id();
        let processors = request.processor_identifiers();
        Self {
            description: request
                .locator()
                .map(str::to_string)
                .unwrap_or_else(|| image_id.clone()),
            kind: KeyKind::Derived {
                image_id,
                processors: processors.clone(),
            },
            processors,
        }
    }

    /// Human-readable origin of the key, usually the request locator.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Identifiers of the processors the cached image went through.
    pub fn processors(&self) -> &[String] {
        &self.processors
    }

    pub fn is_custom(&self) -> bool {
        matches!(self.kind, KeyKind::Custom(_))
    }

    /// Stable SHA-256 hex digest of the key's identity.
    ///
    /// Suitable for file names; components are length-prefixed so that
    /// different splits of the same characters never collide.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        match &self.kind {
            KeyKind::Custom(key) => {
                hasher.update(b"custom");
                update_component(&mut hasher, key);
            }
            KeyKind::Derived {
                image_id,
                processors,
            } => {
                hasher.update(b"derived");
                update_component(&mut hasher, image_id);
                for processor in processors {
                    update_component(&mut hasher, processor);
                }
            }
        }
        hex::encode(hasher.finalize())
    }
}

fn update_component(hasher: &mut Sha256, component: &str) {
    hasher.update((component.len() as u64).to_le_bytes());
    hasher.update(component.as_bytes());
}

impl PartialEq for ImageCacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for ImageCacheKey {}

impl Hash for ImageCacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
    }
}

impl From<&ImageRequest> for ImageCacheKey {
    fn from(request: &ImageRequest) -> Self {
        Self::from_request(request)
    }
}

impl fmt::Display for ImageCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            KeyKind::Custom(key) => write!(f, "custom:{}", key),
            KeyKind::Derived {
                image_id,
                processors,
            } if processors.is_empty() => f.write_str(image_id),
            KeyKind::Derived {
                image_id,
                processors,
            } => write!(f, "{} [{}]", image_id, processors.join(", ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::AnonymousProcessor;
    use proptest::prelude::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(key: &ImageCacheKey) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    fn request(locator: &str, processors: &[&str]) -> ImageRequest {
        processors.iter().fold(ImageRequest::new(locator), |r, id| {
            r.with_processor(AnonymousProcessor::new(*id, Ok))
        })
    }

    #[test]
    fn test_same_request_same_key() {
        let a = ImageCacheKey::from(&request("https://example.com/a.png", &["resize"]));
        let b = ImageCacheKey::from(&request("https://example.com/a.png", &["resize"]));
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_processor_order_and_count_matter() {
        let base = ImageCacheKey::from(&request("a.png", &["resize", "blur"]));
        let reordered = ImageCacheKey::from(&request("a.png", &["blur", "resize"]));
        let extra = ImageCacheKey::from(&request("a.png", &["resize", "blur", "round"]));
        let other = ImageCacheKey::from(&request("b.png", &["resize", "blur"]));

        assert_ne!(base, reordered);
        assert_ne!(base, extra);
        assert_ne!(base, other);
    }

    #[test]
    fn test_description_does_not_affect_equality() {
        let a = ImageCacheKey::from(
            &ImageRequest::new("https://cdn-1.example.com/a.png?sig=1").with_image_id("a"),
        );
        let b = ImageCacheKey::from(
            &ImageRequest::new("https://cdn-2.example.com/a.png?sig=2").with_image_id("a"),
        );

        assert_ne!(a.description(), b.description());
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_custom_never_equals_derived() {
        let custom = ImageCacheKey::custom("a.png");
        let derived = ImageCacheKey::from(&request("a.png", &[]));

        assert!(custom.is_custom());
        assert!(!derived.is_custom());
        assert_ne!(custom, derived);
        assert_ne!(custom.fingerprint(), derived.fingerprint());
        assert_eq!(custom, ImageCacheKey::custom("a.png"));
    }

    #[test]
    fn test_display() {
        assert_eq!(ImageCacheKey::custom("k").to_string(), "custom:k");
        assert_eq!(
            ImageCacheKey::from(&request("a.png", &["resize", "blur"])).to_string(),
            "a.png [resize, blur]"
        );
        assert_eq!(ImageCacheKey::from(&request("a.png", &[])).to_string(), "a.png");
    }

    #[test]
    fn test_fingerprint_is_hex_sha256() {
        let fp = ImageCacheKey::custom("x").fingerprint();
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    proptest! {
        #[test]
        fn prop_key_equality_tracks_identity(
            a in "[a-z]{1,8}",
            b in "[a-z]{1,8}",
            pa in proptest::collection::vec("[a-z]{1,4}", 0..3),
            pb in proptest::collection::vec("[a-z]{1,4}", 0..3),
        ) {
            let pa_refs: Vec<&str> = pa.iter().map(String::as_str).collect();
            let pb_refs: Vec<&str> = pb.iter().map(String::as_str).collect();
            let ka = ImageCacheKey::from(&request(&a, &pa_refs));
            let kb = ImageCacheKey::from(&request(&b, &pb_refs));

            prop_assert_eq!(ka == kb, a == b && pa == pb);
            prop_assert_eq!(ka.fingerprint() == kb.fingerprint(), a == b && pa == pb);
            if ka == kb {
                prop_assert_eq!(hash_of(&ka), hash_of(&kb));
            }
        }
    }
}
