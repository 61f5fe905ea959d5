//! Cover thumbnails for the firmware's library views.
//!
//! The firmware shows sideloaded books with the covers it finds in its image
//! cache, at up to three sizes that depend on the device model. This crate
//! knows those sizes ([`Device`]), where each variant lives ([`CoverKind`])
//! and renders them in the background ([`Pipeline`]).

mod cover;
pub mod error;
mod pipeline;
mod profile;

pub use crate::cover::{CoverKind, GenerateLevel, image_dir_hash};
pub use crate::pipeline::{Pipeline, ResizeFilter, Settings};
pub use crate::profile::{Device, VERSION_FILE, Version};
