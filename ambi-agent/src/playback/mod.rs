//! Playlist streaming with presence-driven crossfades

pub mod crossfade;
pub mod playlist;
pub mod publish;

pub use crossfade::{CrossfadeState, Crossfader, FadeDirection, FadeStep};
pub use playlist::PlaylistSource;
pub use publish::{PublishConfig, PublishLoop};
