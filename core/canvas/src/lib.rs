//! Layer and progress collaborators consumed by the indexed-conversion
//! engine. The container model itself (stacking, blending, undo) stays with
//! the host; the engine only ever sees the traits exported here.

pub mod canvas;
pub mod progress;
pub mod region;

pub use self::canvas::layer::{Layer, MemoryLayer};
pub use self::progress::{NullProgress, ProgressSink};
pub use self::region::Region;
