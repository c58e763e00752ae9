//! Photo-mosaic core: representative colors of source images, a nearest-color index over them,
//! and a deadline-bounded collector that builds the index concurrently.

pub mod collector;
pub mod color;
pub mod config;
pub mod distance;
pub mod error;
pub mod index;
pub mod mosaic;
pub mod region;
pub mod sources;

pub use collector::{CollectOutcome, Collector, Finish, SourceEvent};
pub use color::{ImageHandle, PixelColor, reduce};
pub use distance::{DistanceModel, DistanceWeights};
pub use error::MosaicError;
pub use index::{DistanceCache, NearestColorIndex, WorkingSet, best_image, find_closest};
pub use region::{RegionIndex, reduce_regions};
