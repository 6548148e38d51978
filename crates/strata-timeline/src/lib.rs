//! Strata Timeline - Scheduling glue
//!
//! Builds multi-clip, multi-track programs out of core services:
//! - Playlists of clips and blanks
//! - Multitracks reading parallel tracks at one position
//! - Fields applying planted filters and transitions
//! - Tractors combining the above into a single producer

pub mod field;
pub mod multitrack;
pub mod playlist;
pub mod tractor;

pub use field::{Field, Planted};
pub use multitrack::Multitrack;
pub use playlist::{ClipInfo, Playlist, PlaylistEntry};
pub use tractor::Tractor;
