//! Shared types used across the upload pipeline.
//!
//! [`AspectPreset`] is persisted inside session snapshots, so its serialized
//! names (`square`, `portrait`, ...) are part of the draft file format.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The fixed set of output shapes a post or avatar can be cropped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AspectPreset {
    /// 1:1 feed post.
    #[default]
    Square,
    /// 4:5 feed post.
    Portrait,
    /// 1.91:1 feed post.
    Landscape,
    /// 9:16 full-screen story.
    Story,
    /// 1:1 profile picture, displayed inside a circle.
    Profile,
}

/// Output geometry of a preset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AspectRatioSpec {
    pub name: &'static str,
    /// Width / height.
    pub ratio: f64,
    pub output_width: u32,
    pub output_height: u32,
    /// Render with a circular mask on a square canvas.
    pub circular: bool,
}

impl AspectPreset {
    pub const ALL: [AspectPreset; 5] = [
        AspectPreset::Square,
        AspectPreset::Portrait,
        AspectPreset::Landscape,
        AspectPreset::Story,
        AspectPreset::Profile,
    ];

    pub fn spec(self) -> AspectRatioSpec {
        match self {
            AspectPreset::Square => AspectRatioSpec {
                name: "square",
                ratio: 1.0,
                output_width: 1080,
                output_height: 1080,
                circular: false,
            },
            AspectPreset::Portrait => AspectRatioSpec {
                name: "portrait",
                ratio: 4.0 / 5.0,
                output_width: 1080,
                output_height: 1350,
                circular: false,
            },
            AspectPreset::Landscape => AspectRatioSpec {
                name: "landscape",
                ratio: 1.91,
                output_width: 1080,
                output_height: 566,
                circular: false,
            },
            AspectPreset::Story => AspectRatioSpec {
                name: "story",
                ratio: 9.0 / 16.0,
                output_width: 1080,
                output_height: 1920,
                circular: false,
            },
            AspectPreset::Profile => AspectRatioSpec {
                name: "profile",
                ratio: 1.0,
                output_width: 400,
                output_height: 400,
                circular: true,
            },
        }
    }

    pub fn ratio(self) -> f64 {
        self.spec().ratio
    }
}

impl fmt::Display for AspectPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.spec().name)
    }
}

impl FromStr for AspectPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        AspectPreset::ALL
            .into_iter()
            .find(|p| p.spec().name == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = AspectPreset::ALL.iter().map(|p| p.spec().name).collect();
                format!("unknown preset '{s}' (expected one of: {})", names.join(", "))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_sizes_match_ratios() {
        for preset in AspectPreset::ALL {
            let spec = preset.spec();
            let actual = spec.output_width as f64 / spec.output_height as f64;
            assert!(
                (actual - spec.ratio).abs() < 0.01,
                "{preset}: {actual} vs {}",
                spec.ratio
            );
        }
    }

    #[test]
    fn only_profile_is_circular() {
        let circular: Vec<_> = AspectPreset::ALL
            .into_iter()
            .filter(|p| p.spec().circular)
            .collect();
        assert_eq!(circular, vec![AspectPreset::Profile]);
    }

    #[test]
    fn parse_round_trips_display() {
        for preset in AspectPreset::ALL {
            assert_eq!(preset.to_string().parse::<AspectPreset>(), Ok(preset));
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("Story".parse::<AspectPreset>(), Ok(AspectPreset::Story));
    }

    #[test]
    fn parse_unknown_lists_choices() {
        let err = "panorama".parse::<AspectPreset>().unwrap_err();
        assert!(err.contains("square"));
        assert!(err.contains("profile"));
    }

    #[test]
    fn serde_uses_kebab_names() {
        let json = serde_json::to_string(&AspectPreset::Landscape).unwrap();
        assert_eq!(json, "\"landscape\"");
    }
}
