//! Window-message bridge between the content world and the page world.
//!
//! The content world cannot run OCR itself, and the two worlds share only
//! the page and a string message channel. Element handles never cross; a
//! structural selector is sent instead and resolved on the other side.

mod channel;
mod client;
mod page_world;
mod protocol;

pub use channel::{WindowChannel, WindowId, WindowListener};
pub use client::{BridgeConfig, BridgeError, BridgeResult, OcrBridge, PendingOcrRequest};
pub use page_world::{PageWorld, PageWorldHandle};
pub use protocol::BridgeMessage;
