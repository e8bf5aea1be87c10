pub mod gemini;
pub mod image;

pub use image::*;
