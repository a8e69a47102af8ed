//! Content validation and per-platform adaptation
//!
//! Validation is pure and fails fast on the first broken rule, before any
//! network call. Adaptation runs only on validated content and produces a
//! derived copy; the caller's [`Content`] is never modified.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::ValidationError;
use crate::platforms::PlatformCapabilities;
use crate::types::{Content, Orientation};

/// Content that passed validation for one platform, possibly adapted to it
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedContent {
    original: Content,
    description: String,
    tags: Vec<String>,
}

impl ValidatedContent {
    /// The content as the caller supplied it
    pub fn original(&self) -> &Content {
        &self.original
    }

    /// Description to publish, after any truncation
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Tags to publish, empty when the platform does not take tags
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn title(&self) -> Option<&str> {
        self.original.title()
    }

    pub fn video_file(&self) -> Option<&Path> {
        self.original.video_file()
    }

    pub fn image_file(&self) -> Option<&Path> {
        self.original.image_file()
    }

    pub fn language_code(&self) -> Option<&str> {
        self.original.language_code()
    }

    pub fn orientation(&self) -> Orientation {
        self.original.orientation()
    }

    pub fn subtitle_files(&self) -> &BTreeMap<String, PathBuf> {
        self.original.subtitle_files()
    }

    pub fn was_truncated(&self) -> bool {
        self.description != self.original.description()
    }
}

/// Check content against a platform's rules, stopping at the first failure
///
/// Rules, in order: non-empty description, required video, media presence for
/// platforms without text-only posts, per-tag length, tag count, total tag length.
pub fn validate(
    content: &Content,
    capabilities: &PlatformCapabilities,
) -> Result<ValidatedContent, ValidationError> {
    if content.description().trim().is_empty() {
        return Err(ValidationError::MissingField("description".to_string()));
    }

    if capabilities.requires_video && content.video_file().is_none() {
        return Err(ValidationError::MissingMedia(
            "a video file is required".to_string(),
        ));
    }

    if !capabilities.supports_text_only && content.is_text_only() {
        return Err(ValidationError::MissingMedia(
            "a video or image file is required".to_string(),
        ));
    }

    for tag in content.tags() {
        let length = tag.chars().count();
        if length > capabilities.max_tag_length {
            return Err(ValidationError::TagTooLong {
                tag: tag.clone(),
                length,
                max: capabilities.max_tag_length,
            });
        }
    }

    if let Some(max) = capabilities.max_tags {
        if content.tags().len() > max {
            return Err(ValidationError::TooManyTags {
                count: content.tags().len(),
                max,
            });
        }
    }

    if let Some(max) = capabilities.max_total_tag_length {
        let total: usize = content.tags().iter().map(|t| t.chars().count()).sum();
        if total > max {
            return Err(ValidationError::TagsTooLongInTotal { total, max });
        }
    }

    Ok(ValidatedContent {
        original: content.clone(),
        description: content.description().to_string(),
        tags: content.tags().to_vec(),
    })
}

/// Adapt validated content to a platform
///
/// Returns the adapted copy and a note for every change made (or platform
/// preference not met). An empty note list means the content is published as is.
pub fn adapt(
    validated: &ValidatedContent,
    capabilities: &PlatformCapabilities,
) -> (ValidatedContent, Vec<String>) {
    let mut adapted = validated.clone();
    let mut notes = Vec::new();

    if let Some(max) = capabilities.max_description_length {
        let original_length = adapted.description.chars().count();
        if original_length > max {
            adapted.description = truncate_description(&adapted.description, max);
            notes.push(format!(
                "description truncated from {} to {} characters",
                original_length,
                adapted.description.chars().count()
            ));
        }
    }

    if !capabilities.supports_tags && !adapted.tags.is_empty() {
        notes.push(format!(
            "{} tag(s) omitted, platform does not support tags",
            adapted.tags.len()
        ));
        adapted.tags.clear();
    }

    if let Some(preferred) = capabilities.preferred_orientation {
        if adapted.video_file().is_some() && adapted.orientation() != preferred {
            notes.push(format!(
                "platform prefers {} video, publishing {}",
                preferred,
                adapted.orientation()
            ));
        }
    }

    (adapted, notes)
}

/// Truncate to at most `max` characters, backing off to a word boundary when one exists
///
/// The result is always a prefix of `text`.
pub fn truncate_description(text: &str, max: usize) -> String {
    let cut = match text.char_indices().nth(max) {
        Some((index, _)) => index,
        None => return text.to_string(),
    };

    let head = &text[..cut];
    let cut_on_boundary = text[cut..].starts_with(char::is_whitespace);

    let kept = if cut_on_boundary {
        head
    } else {
        match head.rfind(char::is_whitespace) {
            Some(index) if !head[..index].trim_end().is_empty() => &head[..index],
            _ => head,
        }
    };

    let trimmed = kept.trim_end();
    if trimmed.is_empty() {
        head.to_string()
    } else {
        trimmed.to_string()
    }
}
