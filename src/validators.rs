//! Request validation, one function per input shape.
//!
//! Each validator either yields a typed, already-checked value or an
//! [`AppError::Validation`] carrying every issue found, joined with `", "`.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_PROMPT_CHARS: usize = 500;
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
pub const IMAGE_TOO_LARGE: &str = "Image must be 10 MiB or smaller";
pub const ALLOWED_IMAGE_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Style {
    #[default]
    Streetwear,
    Minimal,
    #[serde(rename = "Avant-garde")]
    AvantGarde,
    Vintage,
}

impl Style {
    pub const ALL: [Style; 4] = [
        Style::Streetwear,
        Style::Minimal,
        Style::AvantGarde,
        Style::Vintage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Style::Streetwear => "Streetwear",
            Style::Minimal => "Minimal",
            Style::AvantGarde => "Avant-garde",
            Style::Vintage => "Vintage",
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Style {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Style::ALL
            .into_iter()
            .find(|style| style.as_str() == s)
            .ok_or_else(|| {
                let expected = Style::ALL
                    .iter()
                    .map(|style| format!("'{}'", style))
                    .collect::<Vec<_>>()
                    .join(" | ");
                format!("Invalid enum value. Expected {}, received '{}'", expected, s)
            })
    }
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Email + password pair that passed the signup/login rules.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

pub fn validate_credentials(email: &str, password: &str) -> Result<Credentials, AppError> {
    let mut issues = Vec::new();
    if !is_valid_email(email) {
        issues.push("Invalid email".to_string());
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        issues.push(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        ));
    }
    if !issues.is_empty() {
        return Err(AppError::Validation(issues.join(", ")));
    }
    Ok(Credentials {
        email: email.to_string(),
        password: password.to_string(),
    })
}

/// An uploaded file as received from the multipart body.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Raw generation form; every field may be missing.
#[derive(Debug, Clone, Default)]
pub struct GenerationForm {
    pub prompt: Option<String>,
    pub style: Option<String>,
    pub image: Option<ImageUpload>,
}

#[derive(Debug, Clone)]
pub struct ValidImage {
    pub content_type: &'static str,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
pub struct ValidGeneration {
    pub prompt: String,
    pub style: Style,
    pub image: ValidImage,
}

pub fn validate_generation(form: GenerationForm) -> Result<ValidGeneration, AppError> {
    let mut issues = Vec::new();

    let prompt = form.prompt.unwrap_or_default();
    let prompt_len = prompt.chars().count();
    if prompt_len < 1 {
        issues.push("Prompt is required".to_string());
    } else if prompt_len > MAX_PROMPT_CHARS {
        issues.push(format!(
            "Prompt must be at most {} characters",
            MAX_PROMPT_CHARS
        ));
    }

    let style = match form.style.as_deref() {
        None => {
            issues.push("Style is required".to_string());
            None
        }
        Some(raw) => match raw.parse::<Style>() {
            Ok(style) => Some(style),
            Err(msg) => {
                issues.push(msg);
                None
            }
        },
    };

    if !issues.is_empty() {
        return Err(AppError::Validation(issues.join(", ")));
    }

    let style = style.ok_or_else(|| AppError::Validation("Style is required".into()))?;
    let image = form
        .image
        .ok_or_else(|| AppError::Validation("Image upload is required".into()))?;
    let image = validate_image(image)?;

    Ok(ValidGeneration {
        prompt,
        style,
        image,
    })
}

fn validate_image(image: ImageUpload) -> Result<ValidImage, AppError> {
    let content_type = image
        .content_type
        .as_deref()
        .and_then(|ct| ALLOWED_IMAGE_TYPES.iter().find(|allowed| **allowed == ct))
        .copied()
        .ok_or_else(|| AppError::Validation("Only JPEG/PNG allowed".into()))?;

    if image.body.is_empty() {
        return Err(AppError::Validation("Image upload is required".into()));
    }
    if image.body.len() > MAX_IMAGE_BYTES {
        return Err(AppError::Validation(IMAGE_TOO_LARGE.into()));
    }

    Ok(ValidImage {
        content_type,
        body: image.body,
    })
}
