//! Map overlay rendering for classified and continuous rasters.
//!
//! Two overlay flavours are produced:
//! - Gradient image overlays: normalized values mapped through a [`Palette`]
//!   and encoded as PNG
//! - Vector overlays: one styled shape per polygon record, coloured by a
//!   [`ClassRamp`]
//!
//! Both end up as [`OverlayLayer`]s inside a [`MapDocument`], the declarative
//! description handed to the browser map widget.

pub mod gradient;
pub mod overlay;
pub mod png;
pub mod style;

pub use gradient::{interpolate_color, render_raster_overlay, Color, ImageOverlay, Palette};
pub use overlay::{render_vector_overlay, MapDocument, OverlayLayer, StyledShape};
pub use style::{hex_to_rgb, ClassRamp, ShapeStyle};
