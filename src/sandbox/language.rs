use std::fmt;

/// Languages accepted by the service
///
/// Anything outside the supported set parses to `Unsupported` so the
/// dispatcher can answer it explicitly instead of falling through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Language {
    JavaScript,
    Python,
    Java,
    Unsupported(String),
}

impl Language {
    pub const SUPPORTED: [Language; 3] = [Language::JavaScript, Language::Python, Language::Java];

    /// Case-insensitive parse of a request's language field
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "javascript" => Self::JavaScript,
            "python" => Self::Python,
            "java" => Self::Java,
            _ => Self::Unsupported(value.trim().to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::JavaScript => "javascript",
            Self::Python => "python",
            Self::Java => "java",
            Self::Unsupported(name) => name,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
