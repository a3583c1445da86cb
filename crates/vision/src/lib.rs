//! Cloud vision client
//!
//! Fallback object detection for frames where on-device detection came up
//! thin. The device attaches an encoded frame only in that case, and the
//! cost guard throttles how often the server actually sends one out.

pub mod cloud;

pub use cloud::{build_cloud_vision, CloudVisionSettings, DisabledCloudVision, HttpCloudVision};
