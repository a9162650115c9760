use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::source::Source;
use crate::text::{sanitize, RAW_TEXT_MAX_CHARS};

/// Cap applied to id, topic and publication date fields.
const FIELD_MAX_CHARS: usize = 256;

/// One harvested post plus its comments, keyed by `(source, topic, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    pub id: String,
    pub source: Source,
    pub topic: String,
    pub requested_at: DateTime<Utc>,
    /// Opaque; sources report dates in heterogeneous formats.
    pub published_at: String,
    pub raw_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidPublication {
    #[error("publication id is empty after sanitizing")]
    EmptyId,
    #[error("topic is empty after sanitizing")]
    EmptyTopic,
    #[error("raw text is empty after sanitizing")]
    EmptyText,
}

impl Publication {
    /// Coerce every text field into storage shape.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPublication`] when a key field or the text is left empty.
    pub fn sanitized(&self) -> Result<Publication, InvalidPublication> {
        let id = sanitize(&self.id, FIELD_MAX_CHARS);
        if id.is_empty() {
            return Err(InvalidPublication::EmptyId);
        }
        let topic = sanitize(&self.topic, FIELD_MAX_CHARS);
        if topic.is_empty() {
            return Err(InvalidPublication::EmptyTopic);
        }
        let raw_text = sanitize(&self.raw_text, RAW_TEXT_MAX_CHARS);
        if raw_text.is_empty() {
            return Err(InvalidPublication::EmptyText);
        }
        Ok(Publication {
            id,
            source: self.source,
            topic,
            requested_at: self.requested_at,
            published_at: sanitize(&self.published_at, FIELD_MAX_CHARS),
            raw_text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Publication {
        Publication {
            id: " RD_abc\n".into(),
            source: Source::Reddit,
            topic: "climate   policy".into(),
            requested_at: Utc::now(),
            published_at: "2024-05-01\t12:00".into(),
            raw_text: "post\u{0000} text |  a comment 🌍".into(),
        }
    }

    #[test]
    fn sanitized_normalizes_all_fields() {
        let p = sample().sanitized().unwrap();
        assert_eq!(p.id, "RD_abc");
        assert_eq!(p.topic, "climate policy");
        assert_eq!(p.published_at, "2024-05-01 12:00");
        assert_eq!(p.raw_text, "post text | a comment");
    }

    #[test]
    fn sanitized_caps_raw_text() {
        let mut p = sample();
        p.raw_text = "x".repeat(RAW_TEXT_MAX_CHARS + 50);
        assert_eq!(p.sanitized().unwrap().raw_text.chars().count(), RAW_TEXT_MAX_CHARS);
    }

    #[test]
    fn empty_fields_are_rejected() {
        let mut p = sample();
        p.id = "\u{0007}  ".into();
        assert_eq!(p.sanitized(), Err(InvalidPublication::EmptyId));

        let mut p = sample();
        p.topic = String::new();
        assert_eq!(p.sanitized(), Err(InvalidPublication::EmptyTopic));

        let mut p = sample();
        p.raw_text = "🎉🎉".into();
        assert_eq!(p.sanitized(), Err(InvalidPublication::EmptyText));
    }
}
