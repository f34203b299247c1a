//! Memory cache inspection.

use super::format::ByteCountFormatter;
use crate::cache::{ImageCacheKey, ImageCaching};
use crate::container::ImageContainer;
use regex::Regex;
use std::sync::OnceLock;

/// Maps locator substrings to a coarse image kind.
///
/// Rules are checked in order and the first matching needle wins. This is a
/// heuristic for eyeballing cache contents, not a classification service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindClassifier {
    rules: Vec<(String, String)>,
}

impl KindClassifier {
    /// Creates a classifier from `(needle, kind)` pairs.
    pub fn new(rules: Vec<(String, String)>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[(String, String)] {
        &self.rules
    }

    /// Returns the kind of the first rule whose needle occurs in `locator`.
    pub fn classify(&self, locator: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|(needle, _)| locator.contains(needle.as_str()))
            .map(|(_, kind)| kind.as_str())
    }
}

impl Default for KindClassifier {
    fn default() -> Self {
        let rules = [
            ("lh3", "place"),
            ("bestFill", "sliced"),
            ("small", "small"),
            ("medium", "medium"),
            ("large", "large"),
        ];
        Self::new(
            rules
                .iter()
                .map(|(needle, kind)| (needle.to_string(), kind.to_string()))
                .collect(),
        )
    }
}

/// One memory cache entry, as shown in inspection output.
#[derive(Debug, Clone)]
pub struct ImageCacheDebugInfo {
    pub image: ImageContainer,
    /// URL found in the key description, or the description itself
    pub locator: Option<String>,
    /// Decoded cost in bytes
    pub cost: usize,
    /// Short summary of the processors applied
    pub processors_info: String,
}

impl ImageCacheDebugInfo {
    pub fn from_entry(key: &ImageCacheKey, image: ImageContainer) -> Self {
        let description = key.description();
        let locator = locator_from(description)
            .or_else(|| (!description.is_empty()).then(|| description.to_string()));
        Self {
            cost: image.cost(),
            image,
            locator,
            processors_info: processors_summary(key.processors()),
        }
    }

    /// Snapshot of every entry in `cache`, most recently used first.
    pub fn entries(cache: &dyn ImageCaching) -> Vec<Self> {
        cache
            .debug_entries()
            .into_iter()
            .map(|(key, image)| Self::from_entry(&key, image))
            .collect()
    }

    /// Kind guessed from the locator, if any rule matches.
    pub fn kind(&self, classifier: &KindClassifier) -> Option<String> {
        let locator = self.locator.as_deref()?;
        classifier.classify(locator).map(str::to_string)
    }

    pub fn data_size(&self, formatter: &ByteCountFormatter) -> String {
        formatter.format(self.cost as u64)
    }
}

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"(?i)\b(?:https?|file)://[^\s<>"']+"#).unwrap())
}

/// Returns the first URL embedded in `text`.
pub fn locator_from(text: &str) -> Option<String> {
    url_pattern()
        .find(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ')', ']']).to_string())
}

/// Shortens processor identifiers into a comma-separated summary.
///
/// A trailing `ImageProcessor` or `Processor` is dropped, so
/// `ResizeImageProcessor` becomes `Resize`. Every identifier is listed; there
/// is no fixed table of known processors, so unrecognised ones appear as-is
/// (`profileGradient` stays `profileGradient`).
pub fn processors_summary<S: AsRef<str>>(identifiers: &[S]) -> String {
    identifiers
        .iter()
        .map(|id| {
            let id = id.as_ref();
            id.strip_suffix("ImageProcessor")
                .or_else(|| id.strip_suffix("Processor"))
                .filter(|short| !short.is_empty())
                .unwrap_or(id)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ImageCache;
    use crate::processor::AnonymousProcessor;
    use crate::request::ImageRequest;
    use image::DynamicImage;

    #[test]
    fn test_default_classifier_is_ordered() {
        let classifier = KindClassifier::default();
        assert_eq!(
            classifier.classify("https://lh3.example.com/large.png"),
            Some("place")
        );
        assert_eq!(
            classifier.classify("https://cdn.example.com/bestFill/small"),
            Some("sliced")
        );
        assert_eq!(classifier.classify("https://cdn.example.com/medium.jpg"), Some("medium"));
        assert_eq!(classifier.classify("https://cdn.example.com/a.jpg"), None);
    }

    #[test]
    fn test_locator_from_finds_first_url() {
        assert_eq!(
            locator_from("key(https://example.com/a.png?x=1), other http://b.com"),
            Some("https://example.com/a.png?x=1".to_string())
        );
        assert_eq!(locator_from("no links here"), None);
    }

    #[test]
    fn test_processors_summary() {
        assert_eq!(
            processors_summary(&["ResizeImageProcessor", "profileGradient", "Processor"]),
            "Resize, profileGradient, Processor"
        );
        assert_eq!(processors_summary::<&str>(&[]), "");
    }

    #[test]
    fn test_entries_from_cache() {
        let cache = ImageCache::default();
        let request = ImageRequest::new("https://cdn.example.com/small/a.png")
            .with_processor(AnonymousProcessor::new("ResizeImageProcessor", Ok));
        cache.set(
            ImageCacheKey::from_request(&request),
            ImageContainer::new(DynamicImage::new_rgba8(10, 10)),
        );

        let entries = ImageCacheDebugInfo::entries(&cache);
        assert_eq!(entries.len(), 1);

        let info = &entries[0];
        assert_eq!(info.locator.as_deref(), Some("https://cdn.example.com/small/a.png"));
        assert_eq!(info.cost, 400);
        assert_eq!(info.processors_info, "Resize");
        assert_eq!(info.kind(&KindClassifier::default()).as_deref(), Some("small"));
        assert_eq!(info.data_size(&ByteCountFormatter::new()), "0.4 KB");
    }

    #[test]
    fn test_non_url_description_is_kept() {
        let info = ImageCacheDebugInfo::from_entry(
            &ImageCacheKey::custom("avatar-42"),
            ImageContainer::new(DynamicImage::new_rgba8(1, 1)),
        );
        assert_eq!(info.locator.as_deref(), Some("avatar-42"));
        assert_eq!(info.kind(&KindClassifier::default()), None);
    }
}
