//! Core types for the content publisher

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PublisherError, Result, ValidationError};

/// Total characters of hashtags kept when extracting tags from a description
pub const MAX_EXTRACTED_TAGS_LENGTH: usize = 500;

/// Description file names, in order of preference, when a directory has several `.txt` files
const DESCRIPTION_FILE_NAMES: [&str; 5] = [
    "video-description.txt",
    "description.txt",
    "video-content.txt",
    "video.txt",
    "content.txt",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Landscape,
    Portrait,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Landscape => "landscape",
            Orientation::Portrait => "portrait",
        }
    }
}

impl FromStr for Orientation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "landscape" => Ok(Orientation::Landscape),
            "portrait" => Ok(Orientation::Portrait),
            _ => Err(format!(
                "Invalid orientation: '{}'. Valid options: landscape, portrait",
                s
            )),
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One unit of content to publish
///
/// Content is immutable once built. Adapting it for a platform (see
/// [`crate::validation::adapt`]) produces a derived copy and leaves this
/// value untouched, so a trace can always be read against the original request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Content {
    description: String,
    video_file: Option<PathBuf>,
    image_file: Option<PathBuf>,
    title: Option<String>,
    language_code: Option<String>,
    tags: Vec<String>,
    subtitle_files: BTreeMap<String, PathBuf>,
    orientation: Orientation,
}

impl Content {
    /// Start building content around a description
    pub fn builder(description: impl Into<String>) -> ContentBuilder {
        ContentBuilder {
            description: description.into(),
            video_file: None,
            image_file: None,
            title: None,
            language_code: None,
            tags: Vec::new(),
            subtitle_files: BTreeMap::new(),
            orientation: Orientation::default(),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn video_file(&self) -> Option<&Path> {
        self.video_file.as_deref()
    }

    pub fn image_file(&self) -> Option<&Path> {
        self.image_file.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn language_code(&self) -> Option<&str> {
        self.language_code.as_deref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Subtitle files keyed by language code
    pub fn subtitle_files(&self) -> &BTreeMap<String, PathBuf> {
        &self.subtitle_files
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// True when neither a video nor an image is attached
    pub fn is_text_only(&self) -> bool {
        self.video_file.is_none() && self.image_file.is_none()
    }

    /// Build content from a prepared content directory
    ///
    /// The directory layout is:
    ///
    /// - one description `.txt` file (or several, with one of the preferred names)
    /// - `video-<orientation>.mp4` or `video.mp4`
    /// - `cover-<orientation>.jpg|jpeg` or `cover.jpg|jpeg`
    /// - `subtitles/<name>.<lang>.srt|vtt`
    ///
    /// When `title` is not given, the name of a second `.txt` file supplies it,
    /// otherwise the directory name is humanized. With `extract_tags`, hashtags found in the
    /// description become the content tags.
    ///
    /// # Errors
    ///
    /// Returns `PublisherError::InvalidInput` if the directory is missing, has no
    /// description file or has ambiguous description files.
    pub fn from_dir(
        dir: &Path,
        title: Option<&str>,
        orientation: Orientation,
        language_code: Option<&str>,
        extract_tags: bool,
    ) -> Result<Self> {
        if !dir.is_dir() {
            return Err(PublisherError::InvalidInput(format!(
                "Invalid content directory: {}",
                dir.display()
            )));
        }

        let mut text_files: Vec<String> = std::fs::read_dir(dir)
            .map_err(|e| {
                PublisherError::InvalidInput(format!(
                    "Failed to read content directory {}: {}",
                    dir.display(),
                    e
                ))
            })?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .filter(|name| name.ends_with(".txt"))
            .collect();
        text_files.sort();

        let description_file = choose_description_file(&text_files, dir)?;
        let description = read_text(&dir.join(&description_file))?;
        tracing::debug!(
            "Description length {} chars from {}",
            description.chars().count(),
            description_file
        );

        let title = match title {
            Some(title) if !title.trim().is_empty() => title.trim().to_string(),
            _ => {
                let others: Vec<&String> =
                    text_files.iter().filter(|f| **f != description_file).collect();
                match others.as_slice() {
                    [title_file] => title_file.trim_end_matches(".txt").trim().to_string(),
                    _ => humanize_dir_name(dir),
                }
            }
        };

        let video_file = first_existing(
            dir,
            &[
                format!("video-{}.mp4", orientation),
                "video.mp4".to_string(),
            ],
        );
        let image_file = first_existing(
            dir,
            &[
                format!("cover-{}.jpg", orientation),
                format!("cover-{}.jpeg", orientation),
                "cover.jpg".to_string(),
                "cover.jpeg".to_string(),
            ],
        );

        let subtitle_files = find_subtitle_files(&dir.join("subtitles"));

        let tags = if extract_tags {
            let tags = extract_hashtags(&description, MAX_EXTRACTED_TAGS_LENGTH);
            tracing::debug!("Extracted tags from description: {:?}", tags);
            tags
        } else {
            Vec::new()
        };

        let mut builder = Content::builder(description)
            .title(title)
            .orientation(orientation)
            .tags(tags)
            .subtitle_files(subtitle_files);
        if let Some(video) = video_file {
            builder = builder.video_file(video);
        }
        if let Some(image) = image_file {
            builder = builder.image_file(image);
        }
        if let Some(code) = language_code {
            builder = builder.language_code(code);
        }

        Ok(builder.build()?)
    }
}

/// Builder for [`Content`]
#[derive(Debug, Clone)]
pub struct ContentBuilder {
    description: String,
    video_file: Option<PathBuf>,
    image_file: Option<PathBuf>,
    title: Option<String>,
    language_code: Option<String>,
    tags: Vec<String>,
    subtitle_files: BTreeMap<String, PathBuf>,
    orientation: Orientation,
}

impl ContentBuilder {
    pub fn video_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.video_file = Some(path.into());
        self
    }

    pub fn image_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.image_file = Some(path.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn language_code(mut self, code: impl Into<String>) -> Self {
        self.language_code = Some(code.into());
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn subtitle(mut self, language: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.subtitle_files.insert(language.into(), path.into());
        self
    }

    pub fn subtitle_files(mut self, files: BTreeMap<String, PathBuf>) -> Self {
        self.subtitle_files = files;
        self
    }

    pub fn orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    /// Finish the content, checking that every referenced file exists
    pub fn build(self) -> std::result::Result<Content, ValidationError> {
        let media = self
            .video_file
            .iter()
            .chain(self.image_file.iter())
            .chain(self.subtitle_files.values());
        for path in media {
            if !path.exists() {
                return Err(ValidationError::MediaNotFound(path.display().to_string()));
            }
        }

        Ok(Content {
            description: self.description,
            video_file: self.video_file,
            image_file: self.image_file,
            title: self.title,
            language_code: self.language_code,
            tags: self.tags,
            subtitle_files: self.subtitle_files,
            orientation: self.orientation,
        })
    }
}

fn choose_description_file(text_files: &[String], dir: &Path) -> Result<String> {
    match text_files {
        [] => Err(PublisherError::InvalidInput(format!(
            "No .txt file found in directory: {}",
            dir.display()
        ))),
        [only] => Ok(only.clone()),
        _ => DESCRIPTION_FILE_NAMES
            .iter()
            .find(|name| text_files.iter().any(|f| f == *name))
            .map(|name| name.to_string())
            .ok_or_else(|| {
                PublisherError::InvalidInput(format!(
                    "Multiple .txt files found in directory: {}. Keep a single description file \
                     or name one 'video-description.txt' or 'description.txt'.",
                    dir.display()
                ))
            }),
    }
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        PublisherError::InvalidInput(format!("Failed to read {}: {}", path.display(), e))
    })
}

fn first_existing(dir: &Path, candidates: &[String]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

fn humanize_dir_name(dir: &Path) -> String {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
        .replace('-', " ")
        .replace("   ", " - ");
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => name,
    }
}

fn find_subtitle_files(subtitles_dir: &Path) -> BTreeMap<String, PathBuf> {
    let mut files = BTreeMap::new();
    let Ok(entries) = std::fs::read_dir(subtitles_dir) else {
        return files;
    };

    for entry in entries.filter_map(|e| e.ok()) {
        let file_name = entry.file_name().to_string_lossy().to_string();
        if !(file_name.ends_with(".srt") || file_name.ends_with(".vtt")) {
            continue;
        }
        let parts: Vec<&str> = file_name.split('.').collect();
        let lang_code = parts[parts.len().saturating_sub(2)];
        if !is_valid_language_code(lang_code) {
            tracing::debug!(
                "Skipping subtitle file with invalid language code '{}': {}",
                lang_code,
                file_name
            );
            continue;
        }
        tracing::debug!("Found subtitle file for {}: {}", lang_code, file_name);
        files.insert(lang_code.to_string(), entry.path());
    }

    files
}

/// Accepts `xx` or `xx-YY` style codes
pub fn is_valid_language_code(code: &str) -> bool {
    let bytes = code.as_bytes();
    match bytes.len() {
        2 => bytes.iter().all(u8::is_ascii_alphabetic),
        5 => {
            bytes[2] == b'-'
                && bytes[..2].iter().all(u8::is_ascii_alphabetic)
                && bytes[3..].iter().all(u8::is_ascii_alphabetic)
        }
        _ => false,
    }
}

/// Extract `#hashtags` from text, in order, keeping their comma-joined length within `max_total`
pub fn extract_hashtags(text: &str, max_total: usize) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let mut total = 0;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '#' {
            continue;
        }
        let mut tag = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_alphanumeric() || next == '_' {
                tag.push(next);
                chars.next();
            } else {
                break;
            }
        }
        if tag.is_empty() {
            continue;
        }
        let added = tag.chars().count() + usize::from(!tags.is_empty());
        if total + added > max_total {
            break;
        }
        total += added;
        tags.push(tag);
    }

    tags
}

/// OAuth token material for one platform account
///
/// `expires_at` is always UTC. A credential is usable while
/// `now < expires_at - safety_margin`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub platform: String,
    pub account_id: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub scopes: BTreeSet<String>,
}

impl Credential {
    /// Whether the token is still usable at `now`, keeping `margin` in reserve
    pub fn is_valid_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        let margin = chrono::Duration::from_std(margin).unwrap_or(chrono::Duration::MAX);
        match self.expires_at.checked_sub_signed(margin) {
            Some(deadline) => now < deadline,
            None => false,
        }
    }

    pub fn is_refreshable(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|token| !token.is_empty())
    }

    /// True if every requested scope was granted to this token
    pub fn covers_scopes(&self, requested: &[String]) -> bool {
        self.scopes.is_empty() || requested.iter().all(|s| self.scopes.contains(s))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("platform", &self.platform)
            .field("account_id", &self.account_id)
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Platform confirmation for a published item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub platform: String,
    /// Platform-assigned identifier of the published item
    pub id: String,
    pub url: Option<String>,
    /// Non-fatal remarks about the publish (e.g. a skipped moderation step)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl PublishReceipt {
    pub fn new(platform: &str, id: impl Into<String>) -> Self {
        Self {
            platform: platform.to_string(),
            id: id.into(),
            url: None,
            notes: Vec::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}
