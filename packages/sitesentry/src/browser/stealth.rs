//! Anti-automation hardening.
//!
//! A fixed JavaScript prelude installed before any site script runs. Hides
//! the automation fingerprints defaced sites sometimes probe for before
//! serving cloaked content to monitoring bots.

pub const STEALTH_PRELUDE: &str = r#"
// navigator.webdriver is the first thing fingerprinting scripts check
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });

// Headless Chrome ships no plugins or mime types
Object.defineProperty(navigator, 'plugins', {
    get: () => [1, 2, 3, 4, 5],
});
Object.defineProperty(navigator, 'languages', {
    get: () => ['en-US', 'en'],
});

// window.chrome is absent in headless mode
if (!window.chrome) {
    window.chrome = { runtime: {} };
}

// Permissions API behaves differently under automation
const originalQuery = window.navigator.permissions.query;
window.navigator.permissions.query = (parameters) =>
    parameters.name === 'notifications'
        ? Promise.resolve({ state: Notification.permission })
        : originalQuery(parameters);
"#;

/// CDP URL patterns for a blocked resource type.
pub fn blocked_url_patterns(resource_types: &[String]) -> Vec<String> {
    let mut patterns = Vec::new();
    for resource in resource_types {
        match resource.as_str() {
            "image" => patterns.extend(
                ["*.png", "*.jpg", "*.jpeg", "*.gif", "*.webp", "*.ico", "*.svg"]
                    .map(String::from),
            ),
            "media" => patterns.extend(
                ["*.mp4", "*.webm", "*.mp3", "*.wav", "*.ogg", "*.avi", "*.mov"]
                    .map(String::from),
            ),
            "font" => patterns.extend(["*.woff", "*.woff2", "*.ttf", "*.otf"].map(String::from)),
            other => tracing::warn!(resource = other, "unknown blocked resource type"),
        }
    }
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_and_media_patterns_expand() {
        let patterns = blocked_url_patterns(&["image".to_string(), "media".to_string()]);
        assert!(patterns.contains(&"*.png".to_string()));
        assert!(patterns.contains(&"*.mp4".to_string()));
    }

    #[test]
    fn unknown_resource_type_is_ignored() {
        assert!(blocked_url_patterns(&["hologram".to_string()]).is_empty());
    }

    #[test]
    fn prelude_hides_webdriver() {
        assert!(STEALTH_PRELUDE.contains("webdriver"));
    }
}
