//! rollcast-obs — obs-websocket v5 client and overlay resource manager.
//!
//! `ObsClient` speaks the obs-websocket v5 protocol over a WebSocket with
//! request/response correlation. `OverlayManager` reconciles one browser
//! source per command against the current OBS state and toggles its
//! visibility; it is the only place scene-item enabled flags are touched.

pub mod api;
pub mod client;
pub mod error;
pub mod overlay;

pub use api::{CanvasSize, ObsApi, SceneItem};
pub use client::ObsClient;
pub use error::ObsError;
pub use overlay::{DisplayColors, OverlayManager};
