//! wayfare-core: Face clustering and expense settlement for group trips.
//!
//! Holds the domain types, the first-match face matcher, the merge
//! suggestion state machine, and the equal-split settlement engine.
//! Persistence lives in `wayfare-store`.

pub mod encoding;
pub mod matcher;
pub mod money;
pub mod resolver;
pub mod settlement;
pub mod thumbnail;
pub mod types;

pub use encoding::{load_photo, EncodingError, EncodingSource, LoadedPhoto, SidecarEncodingSource};
pub use matcher::{Classification, FirstMatch, MatchThresholds, Matcher};
pub use money::Money;
pub use resolver::{Resolution, ResolveAction, ResolveStep, Unchanged};
pub use settlement::{settle, Settlement};
pub use thumbnail::ThumbnailSpec;
pub use types::*;
