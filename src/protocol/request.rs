use crate::foundation::error::{MiiError, MiiResult};
use crate::protocol::identity::{IDENTITY_LEN, MiiIdentity};
use crate::protocol::settings::{
    Expression, ModelType, RenderSettings, ResourceType, ResponseFormat, ShaderType, ViewType,
};

/// Size of an encoded request packet.
pub const REQUEST_LEN: usize = 155;

const FLATTEN_NOSE_BIT: u8 = 3;

/// One render request: identity plus settings.
///
/// The packet has no magic number or version byte; the engine parses it positionally, all
/// fields little-endian and contiguous.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderRequest {
    /// Character to render.
    pub identity: MiiIdentity,
    /// Render settings.
    pub settings: RenderSettings,
}

impl RenderRequest {
    /// Pair an identity with its settings.
    pub fn new(identity: MiiIdentity, settings: RenderSettings) -> Self {
        Self { identity, settings }
    }

    /// Encode into the fixed 155-byte packet, clamping every numeric field to its wire range.
    pub fn encode(&self) -> [u8; REQUEST_LEN] {
        let s = &self.settings;
        let mut w = PacketWriter::default();

        w.bytes(self.identity.as_bytes());
        w.u16(IDENTITY_LEN as u16);
        w.u8(model_flags(s.model_type, s.flatten_nose));
        w.u8(s.response_format.to_wire());
        w.u16(clamp_u16(s.resolution));
        w.i16(clamp_i16(s.texture_resolution));
        w.u8(s.view_type.to_wire());
        w.i8(s.resource_type.to_wire());
        w.u8(s.shader_type.to_wire());
        w.u8(s.expression.to_wire());
        for flag in s.expression_flags {
            w.u32(flag);
        }
        for v in s.camera_rotation.into_iter().chain(s.model_rotation) {
            w.i16(clamp_i16(v));
        }
        for c in s.background_color {
            w.u8(clamp_u8(c));
        }
        w.u8(clamp_u8(s.anti_alias_method));
        w.u8(clamp_u8(s.draw_stage_mode));
        w.bool(s.verify_char_info);
        w.bool(s.verify_crc16);
        w.bool(s.light_enable);
        for v in [
            s.clothes_color,
            s.pants_color,
            s.body_type,
            s.headwear_index,
            s.headwear_color,
        ] {
            w.i8(clamp_i8(v));
        }
        w.u8(clamp_u8(s.instance_count));
        w.u8(clamp_u8(s.instance_rotation_mode));
        for v in s.light_direction {
            w.i16(clamp_i16(v));
        }
        w.u8(clamp_u8(s.split_mode));

        w.finish()
    }

    /// Parse a packet produced by [`RenderRequest::encode`].
    ///
    /// Decoding an encoded request yields the original settings whenever every field was
    /// already inside its wire range.
    pub fn decode(packet: &[u8]) -> MiiResult<Self> {
        if packet.len() != REQUEST_LEN {
            return Err(MiiError::validation(format!(
                "request packet must be {REQUEST_LEN} bytes, got {}",
                packet.len()
            )));
        }
        let mut r = PacketReader { buf: packet, pos: 0 };

        let identity = MiiIdentity::from_slice(r.take(IDENTITY_LEN))?;
        let declared = r.u16();
        if declared as usize != IDENTITY_LEN {
            return Err(MiiError::validation(format!(
                "declared identity length {declared}, expected {IDENTITY_LEN}"
            )));
        }
        let (model_type, flatten_nose) = parse_model_flags(r.u8())?;
        let response_format = wire_enum(r.u8(), ResponseFormat::from_wire, "response format")?;
        let resolution = r.u16() as u32;
        let texture_resolution = r.i16() as i32;
        let view_type = wire_enum(r.u8(), ViewType::from_wire, "view type")?;
        let resource_type = wire_enum(r.i8(), ResourceType::from_wire, "resource type")?;
        let shader_type = wire_enum(r.u8(), ShaderType::from_wire, "shader type")?;
        let expression = wire_enum(r.u8(), Expression::from_wire, "expression")?;
        let expression_flags = [r.u32(), r.u32(), r.u32()];
        let camera_rotation = [r.i16() as i32, r.i16() as i32, r.i16() as i32];
        let model_rotation = [r.i16() as i32, r.i16() as i32, r.i16() as i32];
        let background_color = [
            r.u8() as i32,
            r.u8() as i32,
            r.u8() as i32,
            r.u8() as i32,
        ];
        let anti_alias_method = r.u8() as i32;
        let draw_stage_mode = r.u8() as i32;
        let verify_char_info = r.bool();
        let verify_crc16 = r.bool();
        let light_enable = r.bool();
        let clothes_color = r.i8() as i32;
        let pants_color = r.i8() as i32;
        let body_type = r.i8() as i32;
        let headwear_index = r.i8() as i32;
        let headwear_color = r.i8() as i32;
        let instance_count = r.u8() as i32;
        let instance_rotation_mode = r.u8() as i32;
        let light_direction = [r.i16() as i32, r.i16() as i32, r.i16() as i32];
        let split_mode = r.u8() as i32;

        Ok(Self {
            identity,
            settings: RenderSettings {
                resolution,
                texture_resolution,
                view_type,
                resource_type,
                shader_type,
                expression,
                expression_flags,
                camera_rotation,
                model_rotation,
                background_color,
                anti_alias_method,
                draw_stage_mode,
                verify_char_info,
                verify_crc16,
                light_enable,
                clothes_color,
                pants_color,
                body_type,
                headwear_index,
                headwear_color,
                instance_count,
                instance_rotation_mode,
                light_direction,
                split_mode,
                model_type,
                flatten_nose,
                response_format,
            },
        })
    }
}

/// Encode `identity` and `settings` into a request packet.
pub fn encode(identity: &MiiIdentity, settings: &RenderSettings) -> [u8; REQUEST_LEN] {
    RenderRequest::new(*identity, settings.clone()).encode()
}

fn model_flags(model_type: ModelType, flatten_nose: bool) -> u8 {
    let mut flags = 1u8 << model_type.bit();
    if flatten_nose {
        flags |= 1 << FLATTEN_NOSE_BIT;
    }
    flags
}

fn parse_model_flags(flags: u8) -> MiiResult<(ModelType, bool)> {
    let model_type = (0..FLATTEN_NOSE_BIT)
        .find(|bit| flags & (1 << bit) != 0)
        .and_then(ModelType::from_bit)
        .ok_or_else(|| MiiError::validation(format!("model flags {flags:#04x} name no model")))?;
    Ok((model_type, flags & (1 << FLATTEN_NOSE_BIT) != 0))
}

fn wire_enum<W: Copy + std::fmt::Display, T>(
    v: W,
    parse: impl FnOnce(W) -> Option<T>,
    what: &str,
) -> MiiResult<T> {
    parse(v).ok_or_else(|| MiiError::validation(format!("invalid {what} byte {v}")))
}

fn clamp_u8(v: i32) -> u8 {
    v.clamp(u8::MIN as i32, u8::MAX as i32) as u8
}

fn clamp_i8(v: i32) -> i8 {
    v.clamp(i8::MIN as i32, i8::MAX as i32) as i8
}

fn clamp_i16(v: i32) -> i16 {
    v.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn clamp_u16(v: u32) -> u16 {
    v.min(u16::MAX as u32) as u16
}

#[derive(Default)]
struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    fn bytes(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn i8(&mut self, v: i8) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn finish(self) -> [u8; REQUEST_LEN] {
        let mut out = [0u8; REQUEST_LEN];
        debug_assert_eq!(self.buf.len(), REQUEST_LEN, "request layout drifted");
        out.copy_from_slice(&self.buf);
        out
    }
}

// Callers check the total length up front, so reads never run past the end.
struct PacketReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    fn take(&mut self, n: usize) -> &'a [u8] {
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        out
    }

    fn array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N));
        out
    }

    fn u8(&mut self) -> u8 {
        self.take(1)[0]
    }

    fn i8(&mut self) -> i8 {
        i8::from_le_bytes(self.array())
    }

    fn bool(&mut self) -> bool {
        self.u8() != 0
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.array())
    }

    fn i16(&mut self) -> i16 {
        i16::from_le_bytes(self.array())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.array())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/protocol/request.rs"]
mod tests;
