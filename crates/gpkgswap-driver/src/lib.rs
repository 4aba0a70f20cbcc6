mod geometry;
mod gpkg;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use geometry::display_geometry_type;
pub use gpkg::{GpkgDriver, GpkgHandle};
