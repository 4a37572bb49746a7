//! Vision-model annotation and the grammar of its text response.
//!
//! The model is asked to answer in exactly this shape:
//!
//! ```text
//! TAGS: tag1, tag2, tag3 DESCRIPTION: One sentence. COLORS: #AABBCC, #112233, #FFFFFF
//! ```
//!
//! Each label must appear once and in this order. Sections may be empty.
//! Models tend to decorate the answer, so the parser ignores markdown
//! emphasis (`**TAGS:**`) and any lead-in text before `TAGS:`, and drops
//! color items that carry no usable hex code.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Prompt sent alongside the image.
pub const ANNOTATION_PROMPT: &str = "Analyze this image and provide: 1. 5-10 relevant tags (comma-separated), 2. One descriptive sentence, 3. Top 3 dominant colors in HEX format (comma-separated). Format your response as: TAGS: tag1, tag2, tag3... DESCRIPTION: A descriptive sentence. COLORS: #color1, #color2, #color3";

/// Parsed annotation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Annotation {
    pub tags: Vec<String>,
    pub description: String,
    pub colors: Vec<String>,
}

/// Labeled section of the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Tags,
    Description,
    Colors,
}

impl Section {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Tags => "TAGS:",
            Self::Description => "DESCRIPTION:",
            Self::Colors => "COLORS:",
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label().trim_end_matches(':'))
    }
}

/// Malformed model output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnnotationParseError {
    #[error("missing {0} section")]
    MissingSection(Section),

    #[error("{0} section appears more than once")]
    DuplicateSection(Section),

    #[error("sections must appear as TAGS, DESCRIPTION, COLORS")]
    OutOfOrder,
}

impl Annotation {
    /// Parse the model's reply.
    pub fn parse(text: &str) -> Result<Self, AnnotationParseError> {
        let text = text.replace('*', "");
        let tags_at = locate(&text, Section::Tags)?;
        let description_at = locate(&text, Section::Description)?;
        let colors_at = locate(&text, Section::Colors)?;

        if !(tags_at < description_at && description_at < colors_at) {
            return Err(AnnotationParseError::OutOfOrder);
        }

        let tags_body = &text[tags_at + Section::Tags.label().len()..description_at];
        let description_body =
            &text[description_at + Section::Description.label().len()..colors_at];
        let colors_body = &text[colors_at + Section::Colors.label().len()..];

        Ok(Self {
            tags: split_list(tags_body),
            description: description_body.trim().to_string(),
            colors: split_list(colors_body)
                .iter()
                .filter_map(|item| leading_hex_color(item))
                .collect(),
        })
    }
}

/// Byte offset of the section label; it must occur exactly once.
fn locate(text: &str, section: Section) -> Result<usize, AnnotationParseError> {
    let mut hits = text.match_indices(section.label()).map(|(at, _)| at);
    let first = hits
        .next()
        .ok_or(AnnotationParseError::MissingSection(section))?;
    if hits.next().is_some() {
        return Err(AnnotationParseError::DuplicateSection(section));
    }
    Ok(first)
}

fn split_list(body: &str) -> Vec<String> {
    body.split([',', '\n'])
        .map(|item| item.trim().trim_end_matches('.').trim())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// First hex code in a list item such as `#FF5733 (orange)`.
fn leading_hex_color(item: &str) -> Option<String> {
    item.split_whitespace()
        .map(|token| token.trim_matches(|c: char| !(c == '#' || c.is_ascii_hexdigit())))
        .find_map(normalize_hex_color)
}

/// Canonical `#RRGGBB` upper-case form of `#RGB` / `#RRGGBB`, or `None`.
pub fn normalize_hex_color(raw: &str) -> Option<String> {
    let digits = raw.trim().strip_prefix('#')?;
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let expanded: String = match digits.len() {
        3 => digits.chars().flat_map(|c| [c, c]).collect(),
        6 => digits.to_string(),
        _ => return None,
    };
    Some(format!("#{}", expanded.to_ascii_uppercase()))
}
