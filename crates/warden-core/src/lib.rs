//! Foundational types shared across Warden crates.
//!
//! Provides the per-event invocation context, user-facing notice shapes, the
//! host-platform collaborator traits, and the clock used to stamp audit rows.

pub mod invocation;
pub mod notice;
pub mod platform;
pub mod time_utils;

pub use invocation::{AuthorRole, InvocationContext};
pub use notice::{ChannelNotice, EmbedNotice};
pub use platform::{GuildChannelDirectory, NoticeSink, PermissionResolver, PlatformError};
pub use time_utils::{
    current_unix_timestamp, CalendarStamp, FixedWallClock, SystemWallClock, WallClock,
};
