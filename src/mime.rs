//! Extension-to-MIME-type registry.
//!
//! `mklib_mimetype_add` lets the embedder register extensions at configuration time, looked up
//! later by `mk_request_set_type`; `mklib_mimetype_list` returns the full table for introspection.
//! This keeps the same append-before-start shape but as a plain `HashMap` behind the typed config
//! API instead of a growable static array.

use std::collections::HashMap;

/// A set of file-extension-to-MIME-type mappings, plus the type served when nothing matches.
#[derive(Debug, Clone)]
pub struct MimeRegistry {
    types: HashMap<String, String>,
    default: String,
}

impl MimeRegistry {
    pub fn new(default: impl Into<String>) -> Self {
        let mut registry = Self {
            types: HashMap::new(),
            default: default.into(),
        };
        registry.add_defaults();
        registry
    }

    fn add_defaults(&mut self) {
        for (ext, mime) in [
            ("html", "text/html"),
            ("htm", "text/html"),
            ("css", "text/css"),
            ("js", "text/javascript"),
            ("json", "application/json"),
            ("txt", "text/plain"),
            ("xml", "text/xml"),
            ("png", "image/png"),
            ("jpg", "image/jpeg"),
            ("jpeg", "image/jpeg"),
            ("gif", "image/gif"),
            ("svg", "image/svg+xml"),
            ("ico", "image/x-icon"),
            ("pdf", "application/pdf"),
            ("wasm", "application/wasm"),
        ] {
            self.types.insert(ext.to_string(), mime.to_string());
        }
    }

    /// Registers or overrides a MIME type for `extension` (without a leading dot).
    pub fn add(&mut self, extension: impl Into<String>, mime_type: impl Into<String>) {
        self.types.insert(extension.into(), mime_type.into());
    }

    /// Looks up the MIME type for a file path by its extension, falling back to the configured
    /// default when the extension is unregistered or absent.
    pub fn lookup(&self, path: &std::path::Path) -> &str {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.types.get(&ext.to_ascii_lowercase()))
            .map(String::as_str)
            .unwrap_or(&self.default)
    }

    /// All registered extension/MIME-type pairs, for the embedding API's introspection call.
    pub fn list(&self) -> Vec<(&str, &str)> {
        self.types.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::path::Path;

    #[test]
    fn looks_up_default_extensions() {
        let registry = MimeRegistry::new("application/octet-stream");
        assert_eq!(registry.lookup(Path::new("index.html")), "text/html");
    }

    #[test]
    fn falls_back_to_default_for_unknown_extension() {
        let registry = MimeRegistry::new("application/octet-stream");
        assert_eq!(registry.lookup(Path::new("file.unknown")), "application/octet-stream");
    }

    #[test]
    fn custom_registration_overrides_default() {
        let mut registry = MimeRegistry::new("application/octet-stream");
        registry.add("html", "text/x-custom-html");
        assert_eq!(registry.lookup(Path::new("index.html")), "text/x-custom-html");
    }
}
