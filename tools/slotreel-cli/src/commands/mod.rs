pub mod assemble;
pub mod check;
pub mod export;
pub mod info;
pub mod init;
pub mod validate;

use std::path::Path;

use slotreel_common::config::AppConfig;
use slotreel_common::error::{SlotreelError, SlotreelResult};
use slotreel_project_model::LoadedReel;
use slotreel_render_engine::AssetResolver;

/// Load a manifest, with a readable error.
pub fn load_reel(path: &Path) -> SlotreelResult<LoadedReel> {
    LoadedReel::load(path)
        .map_err(|e| SlotreelError::project(format!("failed to load {}: {e}", path.display())))
}

/// Resolver that searches the manifest's directory before the configured
/// storage directories.
pub fn resolver_for(reel: &LoadedReel, config: &AppConfig) -> AssetResolver {
    AssetResolver::from_storage(&config.storage).with_leading_dir(&reel.root)
}
