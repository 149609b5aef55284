//! Visual representation handed to whatever draws the floor
//!
//! The simulation never draws anything itself. Agents load their sprite once
//! at construction; a missing or unreadable asset is not fatal and degrades to
//! a plain shape.

use std::path::{Path, PathBuf};

use image::GenericImageView;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Shape {
    Square,
    Circle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Appearance {
    Sprite {
        path: PathBuf,
        width: u32,
        height: u32,
    },
    Fallback {
        shape: Shape,
        color: [u8; 3],
    },
}

impl Appearance {
    pub const PLAYER: Appearance = Appearance::Fallback {
        shape: Shape::Circle,
        color: [255, 255, 255],
    };
    pub const CASHIER: Appearance = Appearance::Fallback {
        shape: Shape::Square,
        color: [128, 128, 128],
    };
    pub const SLOT_MACHINE: Appearance = Appearance::Fallback {
        shape: Shape::Circle,
        color: [255, 150, 250],
    };
    pub const CROUPIER: Appearance = Appearance::Fallback {
        shape: Shape::Circle,
        color: [113, 255, 1],
    };

    /// Load `file` from `assets_dir`, or fall back if there is no asset
    /// directory or the image cannot be decoded
    pub fn load(assets_dir: Option<&str>, file: &str, fallback: Appearance) -> Self {
        let Some(dir) = assets_dir else {
            return fallback;
        };
        let path = Path::new(dir).join(file);
        match image::open(&path) {
            Ok(img) => {
                let (width, height) = img.dimensions();
                Appearance::Sprite {
                    path,
                    width,
                    height,
                }
            }
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "Couldn't load agent image asset, using fallback shape"
                );
                fallback
            }
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Appearance::Fallback { .. })
    }
}
