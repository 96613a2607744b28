//! Client for the Mii render engine.
//!
//! The engine is an external process that renders a character from a 96-byte identity blob and a
//! block of render settings. This crate owns that process and speaks its wire protocol:
//!
//! - Build a [`RendererConfig`] pointing at an engine executable and its resource directory
//! - Create a [`Renderer`]; the engine is launched on first use
//! - Render a [`MiiIdentity`] with [`RenderSettings`] into an [`RgbaFrame`]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Renderer configuration.
pub mod config;
/// Engine process supervision.
pub mod engine;
/// Request and response wire formats.
pub mod protocol;
/// The rendering facade.
pub mod renderer;
/// TCP transport to the engine.
pub mod transport;

pub use crate::foundation::error::{MiiError, MiiResult};

pub use crate::config::{DEFAULT_PORT, RendererConfig};
pub use crate::engine::supervisor::{
    EngineLaunch, EngineOutput, EngineState, EngineSupervisor, SupervisorOpts,
};
pub use crate::protocol::identity::{IDENTITY_LEN, MiiIdentity};
pub use crate::protocol::request::{REQUEST_LEN, RenderRequest, encode};
pub use crate::protocol::response::{RAW_HEADER_LEN, RawFrameHeader, RgbaFrame, decode_response};
pub use crate::protocol::settings::{
    ClothesColor, Expression, ModelType, PantsColor, RenderSettings, ResourceType,
    ResponseFormat, ShaderType, ViewType,
};
pub use crate::renderer::{Animation, Renderer};
pub use crate::transport::channel::{ChannelTimeouts, Framing, RenderChannel};
