//! Command implementations.

mod decode;
mod info;
mod list;
mod stream;
mod validate;

pub use decode::run_decode;
pub use info::run_info;
pub use list::run_list;
pub use stream::run_stream;
pub use validate::run_validate;

use std::path::Path;

use anyhow::{Context, Result};
use config_loader::ConfigLoader;
use contracts::ZenConfig;

use crate::error::CliError;

/// Load `path`, or the defaults when no file is given.
fn load_config(path: Option<&Path>) -> Result<ZenConfig> {
    let Some(path) = path else {
        return Ok(ZenConfig::default());
    };
    if !path.exists() {
        return Err(CliError::config_not_found(path.display().to_string()).into());
    }
    ConfigLoader::load_from_path(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}
