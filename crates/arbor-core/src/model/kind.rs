use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The document domains that each keep an independent category forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Project,
    Review,
    Pilot,
    Note,
    Favorite,
    DesignSystem,
    DbAdmin,
}

impl Domain {
    pub const ALL: [Self; 7] = [
        Self::Project,
        Self::Review,
        Self::Pilot,
        Self::Note,
        Self::Favorite,
        Self::DesignSystem,
        Self::DbAdmin,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Review => "review",
            Self::Pilot => "pilot",
            Self::Note => "note",
            Self::Favorite => "favorite",
            Self::DesignSystem => "design_system",
            Self::DbAdmin => "db_admin",
        }
    }
}

/// Descriptive tag on a category. Never affects ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    Root,
    Note,
    Mermaid,
    Qa,
    File,
    Github,
    Faq,
    Member,
}

impl Default for CategoryKind {
    fn default() -> Self {
        Self::Note
    }
}

impl CategoryKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Note => "note",
            Self::Mermaid => "mermaid",
            Self::Qa => "qa",
            Self::File => "file",
            Self::Github => "github",
            Self::Faq => "faq",
            Self::Member => "member",
        }
    }
}

/// Body type of a content leaf. The body itself is opaque to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Note,
    Mermaid,
    Qa,
    Figma,
    File,
}

impl Default for ContentKind {
    fn default() -> Self {
        Self::Note
    }
}

impl ContentKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Mermaid => "mermaid",
            Self::Qa => "qa",
            Self::Figma => "figma",
            Self::File => "file",
        }
    }
}

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for CategoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize(input: &str) -> String {
    input.trim().to_ascii_lowercase().replace('-', "_")
}

impl FromStr for Domain {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        Self::ALL
            .into_iter()
            .find(|domain| domain.as_str() == normalized)
            .ok_or_else(|| ParseEnumError {
                expected: "domain",
                got: s.to_string(),
            })
    }
}

impl FromStr for CategoryKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        match normalized.as_str() {
            "root" => Ok(Self::Root),
            "note" => Ok(Self::Note),
            "mermaid" => Ok(Self::Mermaid),
            "qa" => Ok(Self::Qa),
            "file" => Ok(Self::File),
            "github" => Ok(Self::Github),
            "faq" => Ok(Self::Faq),
            "member" => Ok(Self::Member),
            _ => Err(ParseEnumError {
                expected: "category kind",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for ContentKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        match normalized.as_str() {
            "note" => Ok(Self::Note),
            "mermaid" => Ok(Self::Mermaid),
            "qa" => Ok(Self::Qa),
            "figma" => Ok(Self::Figma),
            "file" => Ok(Self::File),
            _ => Err(ParseEnumError {
                expected: "content kind",
                got: s.to_string(),
            }),
        }
    }
}
