//! Typed render settings.
//!
//! Numeric fields are held in types wider than their wire representation so that out-of-range
//! input survives construction and is clamped when the request is encoded.

use crate::foundation::error::{MiiError, MiiResult};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Camera framing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewType {
    /// Head and shoulders.
    #[default]
    Face,
    /// Head only, no body.
    FaceOnly,
    /// Full body.
    AllBody,
}

impl ViewType {
    /// Wire value.
    pub fn to_wire(self) -> u8 {
        match self {
            Self::Face => 0,
            Self::FaceOnly => 1,
            Self::AllBody => 2,
        }
    }

    /// Parse a wire value.
    pub fn from_wire(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Face),
            1 => Some(Self::FaceOnly),
            2 => Some(Self::AllBody),
            _ => None,
        }
    }
}

/// Engine-side resource tier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Middle-quality resource archive.
    Middle,
    /// High-quality resource archive.
    #[default]
    High,
}

impl ResourceType {
    /// Wire value (signed byte).
    pub fn to_wire(self) -> i8 {
        match self {
            Self::Middle => 0,
            Self::High => 1,
        }
    }

    /// Parse a wire value.
    pub fn from_wire(v: i8) -> Option<Self> {
        match v {
            0 => Some(Self::Middle),
            1 => Some(Self::High),
            _ => None,
        }
    }
}

/// Shader program used by the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShaderType {
    /// Full shader; required for expressions to render correctly.
    #[default]
    Default,
    /// Compatibility shader with fewer features.
    Simple,
}

impl ShaderType {
    /// Wire value.
    pub fn to_wire(self) -> u8 {
        match self {
            Self::Default => 0,
            Self::Simple => 1,
        }
    }

    /// Parse a wire value.
    pub fn from_wire(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Default),
            1 => Some(Self::Simple),
            _ => None,
        }
    }
}

/// Facial expression, numbered as the engine numbers them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Expression {
    #[default]
    Normal = 0,
    Smile = 1,
    Anger = 2,
    /// Also the closest match for a puzzled look.
    Sorrow = 3,
    Surprise = 4,
    Blink = 5,
    OpenMouth = 6,
    HappyOpenMouth = 7,
    AngerOpenMouth = 8,
    SorrowOpenMouth = 9,
    SurpriseOpenMouth = 10,
    BlinkOpenMouth = 11,
    WinkLeft = 12,
    WinkRight = 13,
    WinkLeftOpenMouth = 14,
    WinkRightOpenMouth = 15,
    Like = 16,
    LikeWinkRight = 17,
    Frustrated = 18,
}

impl Expression {
    /// Every expression in wire order.
    pub const ALL: [Self; 19] = [
        Self::Normal,
        Self::Smile,
        Self::Anger,
        Self::Sorrow,
        Self::Surprise,
        Self::Blink,
        Self::OpenMouth,
        Self::HappyOpenMouth,
        Self::AngerOpenMouth,
        Self::SorrowOpenMouth,
        Self::SurpriseOpenMouth,
        Self::BlinkOpenMouth,
        Self::WinkLeft,
        Self::WinkRight,
        Self::WinkLeftOpenMouth,
        Self::WinkRightOpenMouth,
        Self::Like,
        Self::LikeWinkRight,
        Self::Frustrated,
    ];

    /// Wire value.
    pub fn to_wire(self) -> u8 {
        self as u8
    }

    /// Parse a wire value.
    pub fn from_wire(v: u8) -> Option<Self> {
        Self::ALL.get(v as usize).copied()
    }
}

/// Which model variant to draw; encoded as one bit of the model flag byte.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Regular head.
    #[default]
    Normal,
    /// Head shaped to wear a hat.
    Hat,
    /// Face mask only.
    FaceOnly,
}

impl ModelType {
    /// Bit index inside the model flag byte.
    pub fn bit(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Hat => 1,
            Self::FaceOnly => 2,
        }
    }

    /// Inverse of [`ModelType::bit`].
    pub fn from_bit(bit: u8) -> Option<Self> {
        match bit {
            0 => Some(Self::Normal),
            1 => Some(Self::Hat),
            2 => Some(Self::FaceOnly),
            _ => None,
        }
    }
}

/// Encoding the engine uses for its reply.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    /// 18-byte header followed by bottom-up BGRA pixels.
    #[default]
    RawFrame,
    /// glTF model container, delimited by end of stream.
    Gltf,
    /// Encoded image container, delimited by end of stream.
    Image,
}

impl ResponseFormat {
    /// Wire value.
    pub fn to_wire(self) -> u8 {
        match self {
            Self::RawFrame => 0,
            Self::Gltf => 1,
            Self::Image => 2,
        }
    }

    /// Parse a wire value.
    pub fn from_wire(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::RawFrame),
            1 => Some(Self::Gltf),
            2 => Some(Self::Image),
            _ => None,
        }
    }

    /// `true` for formats read until the engine closes the connection.
    pub fn is_container(self) -> bool {
        !matches!(self, Self::RawFrame)
    }
}

/// Shirt palette accepted by `clothes_color`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ClothesColor {
    /// The character's favorite color.
    Default = -1,
    Red = 0,
    Orange = 1,
    Yellow = 2,
    Lime = 3,
    Green = 4,
    Blue = 5,
    Cyan = 6,
    Pink = 7,
    Purple = 8,
    Brown = 9,
    White = 10,
    Black = 11,
}

impl From<ClothesColor> for i32 {
    fn from(c: ClothesColor) -> Self {
        c as i32
    }
}

/// Pants palette accepted by `pants_color`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum PantsColor {
    /// Engine default.
    Default = -1,
    Gray = 0,
    Blue = 1,
    Red = 2,
    Gold = 3,
    /// Same color as the body.
    Body = 4,
    /// No pants drawn.
    Hidden = 5,
}

impl From<PantsColor> for i32 {
    fn from(c: PantsColor) -> Self {
        c as i32
    }
}

/// Everything the engine needs besides the identity blob.
///
/// Defaults match the engine's own defaults. When deserialized, every field is optional and
/// unknown keys are rejected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderSettings {
    /// Output raster width/height in pixels (u16 on the wire).
    pub resolution: u32,
    /// Virtual render resolution controlling camera distance and texture detail (i16 on the wire).
    pub texture_resolution: i32,
    /// Camera framing.
    pub view_type: ViewType,
    /// Resource tier.
    pub resource_type: ResourceType,
    /// Shader program.
    pub shader_type: ShaderType,
    /// Facial expression.
    pub expression: Expression,
    /// Reserved per-expression modifiers, passed through unchanged.
    pub expression_flags: [u32; 3],
    /// Camera rotation (i16 each on the wire).
    pub camera_rotation: [i32; 3],
    /// Model rotation (i16 each on the wire).
    pub model_rotation: [i32; 3],
    /// Background RGBA (u8 each on the wire).
    pub background_color: [i32; 4],
    /// Anti-aliasing method (u8).
    pub anti_alias_method: i32,
    /// Draw stage mode (u8).
    pub draw_stage_mode: i32,
    /// Ask the engine to verify the character data.
    pub verify_char_info: bool,
    /// Ask the engine to verify the identity CRC16.
    pub verify_crc16: bool,
    /// Enable lighting.
    pub light_enable: bool,
    /// Shirt color (i8, -1 = default).
    pub clothes_color: i32,
    /// Pants color (i8, -1 = default).
    pub pants_color: i32,
    /// Body model (i8, -1 = default).
    pub body_type: i32,
    /// Headwear model (i8, -1 = none).
    pub headwear_index: i32,
    /// Headwear color (i8, -1 = default).
    pub headwear_color: i32,
    /// Number of instances drawn (u8).
    pub instance_count: i32,
    /// Rotation mode applied across instances (u8).
    pub instance_rotation_mode: i32,
    /// Light direction (i16 each; -1,-1,-1 = engine default).
    pub light_direction: [i32; 3],
    /// Split mode (u8).
    pub split_mode: i32,
    /// Model variant.
    pub model_type: ModelType,
    /// Flatten the nose (bit 3 of the model flag byte).
    pub flatten_nose: bool,
    /// Reply encoding.
    pub response_format: ResponseFormat,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            resolution: 512,
            texture_resolution: 512,
            view_type: ViewType::Face,
            resource_type: ResourceType::High,
            shader_type: ShaderType::Default,
            expression: Expression::Normal,
            expression_flags: [0, 0, 0],
            camera_rotation: [0, 0, 0],
            model_rotation: [0, 0, 0],
            background_color: [0, 0, 0, 0],
            anti_alias_method: 0,
            draw_stage_mode: 0,
            verify_char_info: false,
            verify_crc16: true,
            light_enable: true,
            clothes_color: -1,
            pants_color: -1,
            body_type: -1,
            headwear_index: -1,
            headwear_color: -1,
            instance_count: 1,
            instance_rotation_mode: 0,
            light_direction: [-1, -1, -1],
            split_mode: 0,
            model_type: ModelType::Normal,
            flatten_nose: false,
            response_format: ResponseFormat::RawFrame,
        }
    }
}

impl RenderSettings {
    /// Render at `zoom` pixels; the renderer resamples to the requested output size afterwards.
    pub fn with_zoom(mut self, zoom: u32) -> Self {
        self.resolution = zoom;
        self.texture_resolution = i32::try_from(zoom).unwrap_or(i32::MAX);
        self
    }

    /// Select an image-container reply (`true`) or a raw frame (`false`).
    pub fn export_as_container(mut self, container: bool) -> Self {
        self.response_format = if container {
            ResponseFormat::Image
        } else {
            ResponseFormat::RawFrame
        };
        self
    }

    /// Parse settings from a JSON reader. Unknown keys are an error.
    pub fn from_reader<R: std::io::Read>(r: R) -> MiiResult<Self> {
        serde_json::from_reader(r)
            .map_err(|e| MiiError::serde(format!("parse render settings JSON: {e}")))
    }

    /// Parse settings from a JSON string. Unknown keys are an error.
    pub fn from_json_str(s: &str) -> MiiResult<Self> {
        Self::from_reader(s.as_bytes())
    }

    /// Parse settings from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> MiiResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            MiiError::validation(format!("open render settings '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/protocol/settings.rs"]
mod tests;
