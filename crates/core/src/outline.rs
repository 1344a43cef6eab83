use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single entry of a generated outline.
///
/// Both fields are required on deserialization. An entry without `title` or
/// `bullets` means the generation endpoint broke its output contract, which
/// callers treat as fatal rather than recoverable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideContent {
    pub title: String,
    pub bullets: Vec<String>,
}

/// Ordered slide outline produced by the generation step.
///
/// The first entry is the cover (title only); the remaining entries render
/// title plus bullets. Immutable once constructed: the constructor is the
/// only place the non-empty invariant is checked, so downstream code can
/// rely on a cover being present.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Outline {
    slides: Vec<SlideContent>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OutlineError {
    #[error("outline has no entries; at least a cover slide is required")]
    Empty,
    #[error("outline reply is not the expected JSON array of {{title, bullets}}: {0}")]
    Malformed(String),
}

impl Outline {
    pub fn new(slides: Vec<SlideContent>) -> Result<Self, OutlineError> {
        if slides.is_empty() {
            return Err(OutlineError::Empty);
        }
        Ok(Self { slides })
    }

    /// Parse the raw completion text returned by the generation endpoint.
    ///
    /// The endpoint is contracted to emit only a JSON array of
    /// `{title, bullets}` objects; anything else is a contract violation.
    pub fn from_reply(reply: &str) -> Result<Self, OutlineError> {
        let slides: Vec<SlideContent> = serde_json::from_str(reply.trim())
            .map_err(|error| OutlineError::Malformed(error.to_string()))?;
        Self::new(slides)
    }

    pub fn cover(&self) -> &SlideContent {
        &self.slides[0]
    }

    pub fn body(&self) -> &[SlideContent] {
        &self.slides[1..]
    }

    pub fn slides(&self) -> &[SlideContent] {
        &self.slides
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{Outline, OutlineError, SlideContent};

    #[test]
    fn parses_contracted_reply_shape() {
        let reply = r#"[
            {"title": "Dubai Overview", "bullets": []},
            {"title": "Burj Khalifa", "bullets": ["Tallest building", "Observation deck", "Evening light show"]}
        ]"#;

        let outline = Outline::from_reply(reply).expect("reply matches the contract");

        assert_eq!(outline.len(), 2);
        assert_eq!(outline.cover().title, "Dubai Overview");
        assert_eq!(outline.body().len(), 1);
        assert_eq!(outline.body()[0].bullets.len(), 3);
    }

    #[test]
    fn tolerates_surrounding_whitespace() {
        let outline = Outline::from_reply("\n  [{\"title\": \"T\", \"bullets\": []}]  \n")
            .expect("whitespace around the array is fine");
        assert_eq!(outline.len(), 1);
    }

    #[test]
    fn missing_bullets_field_is_malformed() {
        let result = Outline::from_reply(r#"[{"title": "Only a title"}]"#);
        assert!(matches!(result, Err(OutlineError::Malformed(_))));
    }

    #[test]
    fn missing_title_field_is_malformed() {
        let result = Outline::from_reply(r#"[{"bullets": ["a"]}]"#);
        assert!(matches!(result, Err(OutlineError::Malformed(_))));
    }

    #[test]
    fn prose_reply_is_malformed() {
        let result = Outline::from_reply("Here is your outline: ...");
        assert!(matches!(result, Err(OutlineError::Malformed(_))));
    }

    #[test]
    fn empty_array_is_rejected() {
        assert_eq!(Outline::from_reply("[]"), Err(OutlineError::Empty));
        assert_eq!(Outline::new(Vec::new()), Err(OutlineError::Empty));
    }

    #[test]
    fn extra_keys_are_ignored() {
        let outline =
            Outline::from_reply(r#"[{"title": "T", "bullets": ["b"], "notes": "ignored"}]"#)
                .expect("unknown keys do not violate the contract");
        assert_eq!(outline.cover().title, "T");
    }

    #[test]
    fn slides_preserve_input_order() {
        let slides = vec![
            SlideContent { title: "one".into(), bullets: vec![] },
            SlideContent { title: "two".into(), bullets: vec!["a".into()] },
            SlideContent { title: "three".into(), bullets: vec!["b".into(), "c".into()] },
        ];
        let outline = Outline::new(slides.clone()).expect("non-empty");
        assert_eq!(outline.slides(), slides.as_slice());
    }
}
