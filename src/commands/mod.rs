pub mod detect_sources;
pub mod list_instruments;
pub mod track;

pub use detect_sources::detect_sources;
pub use list_instruments::list_instruments;
pub use track::{track, TrackOptions};
