//! Real-time compositing renderer
//!
//! Layers the screen, watermark, ripples, annotations and the webcam into a
//! live output surface that doubles as preview and encoder input.

pub mod compositor;
pub mod input;
pub mod raster;
pub mod render_loop;
pub mod state;
pub mod watermark;

pub use compositor::Compositor;
pub use input::{apply_input, map_view_point, InputEvent, InputQueue};
pub use render_loop::{FrameSurface, RenderInputs, RenderLoop};
pub use state::{Color, CompositeState, Point, Ripple, SharedComposite, Stroke, WebcamOverlay};
pub use watermark::{decode_png, load_watermark};
