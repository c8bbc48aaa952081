//! Overlay rendering: per-label colors, label fonts and the box/label painter.

pub mod color;
pub mod font;
mod overlay;

pub use color::{ColorAssigner, SharedColorAssigner};
pub use font::{BitmapFont, LabelFont, TrueTypeFont};
pub use overlay::{OverlayRenderer, OverlayStyle};
