//! Wire protocol spoken with the engine.
//!
//! A request is a fixed 155-byte packet; the reply is either a raw frame or a container file,
//! chosen by the request's [`settings::ResponseFormat`].

/// 96-byte character identity blob.
pub mod identity;
/// Request packet encoding (and decoding, for engine stand-ins).
pub mod request;
/// Reply decoding into RGBA frames.
pub mod response;
/// Typed render settings.
pub mod settings;
