/// One-shot request/response channel.
pub mod channel;
