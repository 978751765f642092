mod alias;
mod select;
mod state;

pub use alias::AliasTable;
pub use select::{select_face, select_object, DistanceBand, FoundTarget};
pub use state::{TrackingState, TrackingTarget};
