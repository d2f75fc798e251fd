//! Slotreel Render Engine
//!
//! Assembles recorded clips into a template timeline and exports the
//! result with captions and background music burned in.
//!
//! # Pipeline Architecture
//!
//! ```text
//! clip refs ── AssetResolver ── MediaProbe ──┐
//!                                            ├── TimelineAssembler ── Composition
//! template slots ────────────────────────────┘         │
//!                                                      ├── Caption overlays
//! captions ────────────────────────────────────────────┘         │
//!                                                                ├── Background audio mix
//! background audio ──────────────────────────────────────────────┘         │
//!                                                                          ▼
//!                                                                 ExportPipeline
//!                                                                          │
//!                                                                          ▼
//!                                                              TranscodeBackend (ffmpeg)
//!                                                                          │
//!                                                                          ▼
//!                                                                     reel.mp4
//! ```

pub mod assembler;
pub mod composition;
pub mod error;
pub mod export;
pub mod ffmpeg;
pub mod media;
pub mod mixer;
pub mod overlay;
pub mod resolver;

pub use assembler::{AssembleOptions, TimelineAssembler};
pub use composition::*;
pub use error::{AssemblyError, ExportError};
pub use export::*;
pub use ffmpeg::{FfmpegBackend, TranscodePlan};
pub use media::*;
pub use mixer::{BackgroundAudioMixer, MixError, MixedBackground};
pub use overlay::*;
pub use resolver::{AssetResolver, ResolveError};
