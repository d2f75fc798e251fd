//! Slotreel Project Model
//!
//! Defines the value types the assembly core consumes:
//! - **Time:** Tick-based media timestamps and ranges (no float accumulation)
//! - **Template:** Ordered slots forming the template timeline
//! - **Clips:** Recorded clip references with slot assignment and trim offset
//! - **Captions:** Time-boxed text with a normalized screen position
//! - **Manifest:** The JSON document the CLI reads a reel from
//!
//! All of these are plain immutable values. Nothing here touches media files.

pub mod caption;
pub mod clip;
pub mod project;
pub mod template;
pub mod time;

pub use caption::*;
pub use clip::*;
pub use project::*;
pub use template::*;
pub use time::*;
