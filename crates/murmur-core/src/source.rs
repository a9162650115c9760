use serde::{Deserialize, Serialize};

/// A named external platform that publications are harvested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Reddit,
    Twitter,
    #[serde(rename = "linkedin")]
    LinkedIn,
    Instagram,
    Facebook,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown source '{0}'")]
pub struct ParseSourceError(pub String);

impl Source {
    pub const ALL: [Source; 5] = [
        Source::Reddit,
        Source::Twitter,
        Source::LinkedIn,
        Source::Instagram,
        Source::Facebook,
    ];

    /// Stable lowercase key used in storage and on the command line.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Reddit => "reddit",
            Source::Twitter => "twitter",
            Source::LinkedIn => "linkedin",
            Source::Instagram => "instagram",
            Source::Facebook => "facebook",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Source {
    type Err = ParseSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reddit" => Ok(Source::Reddit),
            "twitter" | "x" => Ok(Source::Twitter),
            "linkedin" => Ok(Source::LinkedIn),
            "instagram" => Ok(Source::Instagram),
            "facebook" => Ok(Source::Facebook),
            _ => Err(ParseSourceError(s.to_string())),
        }
    }
}
