// Folio shared data types
//
// Small enums shared between the session engine, the persistence layer and
// the presentation layer. Ids are plain uuid strings throughout; the
// database stores them as TEXT.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a document's content lives: a file on disk, or an item in the
/// local reading library (store-backed, no file path).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentSource {
    File,
    Library,
}

impl DocumentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentSource::File => "file",
            DocumentSource::Library => "library",
        }
    }

    /// Parse from the stored TEXT column value.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "file" => Some(DocumentSource::File),
            "library" => Some(DocumentSource::Library),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Highlight marker colors offered by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightColor {
    Yellow,
    Green,
    Blue,
    Pink,
    Orange,
}

impl HighlightColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            HighlightColor::Yellow => "yellow",
            HighlightColor::Green => "green",
            HighlightColor::Blue => "blue",
            HighlightColor::Pink => "pink",
            HighlightColor::Orange => "orange",
        }
    }

    /// Parse from the stored TEXT column value.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "yellow" => Some(HighlightColor::Yellow),
            "green" => Some(HighlightColor::Green),
            "blue" => Some(HighlightColor::Blue),
            "pink" => Some(HighlightColor::Pink),
            "orange" => Some(HighlightColor::Orange),
            _ => None,
        }
    }
}

impl fmt::Display for HighlightColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_source_roundtrip() {
        assert_eq!(DocumentSource::from_str("file"), Some(DocumentSource::File));
        assert_eq!(
            DocumentSource::from_str("library"),
            Some(DocumentSource::Library)
        );
        assert_eq!(DocumentSource::from_str("web"), None);
        assert_eq!(DocumentSource::Library.as_str(), "library");
    }

    #[test]
    fn test_highlight_color_roundtrip() {
        for color in [
            HighlightColor::Yellow,
            HighlightColor::Green,
            HighlightColor::Blue,
            HighlightColor::Pink,
            HighlightColor::Orange,
        ] {
            assert_eq!(HighlightColor::from_str(color.as_str()), Some(color));
        }
        assert_eq!(HighlightColor::from_str("red"), None);
    }

    #[test]
    fn test_serde_uses_lowercase() {
        let json = serde_json::to_string(&HighlightColor::Pink).unwrap();
        assert_eq!(json, "\"pink\"");
    }
}
