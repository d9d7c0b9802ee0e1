//! attendance-hw — Camera capture for the attendance session.
//!
//! Provides V4L2 camera access and converts captured buffers to RGB frames
//! for the face encoder.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, CameraFeed, PixelFormat};
pub use frame::FrameError;
