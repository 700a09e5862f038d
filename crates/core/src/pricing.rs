//! Image-token pricing.
//!
//! Every generation is billed in image tokens. The cost of one image is a
//! function of quality and output size; template submissions additionally
//! apply an integer cost multiplier. The table mirrors the per-image token
//! consumption of the `gpt-image-1` model family.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Rendering quality requested for a generation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    Medium,
    High,
}

impl Default for Quality {
    fn default() -> Self {
        Self::Medium
    }
}

impl core::fmt::Display for Quality {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
        };
        f.write_str(s)
    }
}

impl FromStr for Quality {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Quality::Low),
            "medium" => Ok(Quality::Medium),
            "high" => Ok(Quality::High),
            other => Err(DomainError::validation(format!("unknown quality: {other}"))),
        }
    }
}

/// Output size of a generated image.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageSize {
    /// 1024x1024
    #[serde(rename = "1024x1024")]
    Square,
    /// 1024x1536 (portrait)
    #[serde(rename = "1024x1536")]
    Portrait,
    /// 1536x1024 (landscape)
    #[serde(rename = "1536x1024")]
    Landscape,
}

impl Default for ImageSize {
    fn default() -> Self {
        Self::Square
    }
}

impl core::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            ImageSize::Square => "1024x1024",
            ImageSize::Portrait => "1024x1536",
            ImageSize::Landscape => "1536x1024",
        };
        f.write_str(s)
    }
}

impl FromStr for ImageSize {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1024x1024" => Ok(ImageSize::Square),
            "1024x1536" => Ok(ImageSize::Portrait),
            "1536x1024" => Ok(ImageSize::Landscape),
            other => Err(DomainError::validation(format!("unknown size: {other}"))),
        }
    }
}

/// Tokens consumed by one image at the given quality and size.
pub fn image_tokens(quality: Quality, size: ImageSize) -> i64 {
    match (quality, size) {
        (Quality::Low, ImageSize::Square) => 272,
        (Quality::Low, ImageSize::Portrait) => 408,
        (Quality::Low, ImageSize::Landscape) => 400,
        (Quality::Medium, ImageSize::Square) => 1_056,
        (Quality::Medium, ImageSize::Portrait) => 1_584,
        (Quality::Medium, ImageSize::Landscape) => 1_568,
        (Quality::High, ImageSize::Square) => 4_160,
        (Quality::High, ImageSize::Portrait) => 6_240,
        (Quality::High, ImageSize::Landscape) => 6_208,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_quality_costs_more() {
        for size in [ImageSize::Square, ImageSize::Portrait, ImageSize::Landscape] {
            assert!(image_tokens(Quality::Low, size) < image_tokens(Quality::Medium, size));
            assert!(image_tokens(Quality::Medium, size) < image_tokens(Quality::High, size));
        }
    }

    #[test]
    fn quality_and_size_round_trip_through_strings() {
        for q in [Quality::Low, Quality::Medium, Quality::High] {
            assert_eq!(q.to_string().parse::<Quality>().unwrap(), q);
        }
        for s in [ImageSize::Square, ImageSize::Portrait, ImageSize::Landscape] {
            assert_eq!(s.to_string().parse::<ImageSize>().unwrap(), s);
        }
    }

    #[test]
    fn unknown_quality_is_a_validation_error() {
        let err = "ultra".parse::<Quality>().unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
