//! Configuration management: link channels and eras, set keys.

use std::path::Path;

use pico_core::{Error, Result, console};
use pico_producer::ModuleRegistry;

use crate::config::Config;

/// Link a channel to an analysis module. The module must exist in the
/// registry so that typos surface here rather than on the worker.
pub fn link_channel(config: &mut Config, basedir: &Path, name: &str, module: &str) -> Result<()> {
    let registry = ModuleRegistry::builtin();
    if !registry.contains(module) {
        return Err(Error::Config(format!(
            "unknown analysis module '{module}' (available: {})",
            registry.names().join(", ")
        )));
    }
    config.channels.insert(name.to_string(), module.to_string());
    config.save(basedir)?;
    console::say(format!("linked channel '{name}' to module '{module}'"));
    Ok(())
}

/// Link an era to a sample-list file.
pub fn link_era(config: &mut Config, basedir: &Path, name: &str, samplelist: &str) -> Result<()> {
    if !samplelist.contains('$') && !Path::new(samplelist).is_file() {
        console::warn(format!("sample list '{samplelist}' does not exist (yet)"));
    }
    config.eras.insert(name.to_string(), samplelist.to_string());
    config.save(basedir)?;
    console::say(format!("linked era '{name}' to sample list '{samplelist}'"));
    Ok(())
}

/// Set a configuration key.
pub fn set(config: &mut Config, basedir: &Path, key: &str, value: &str) -> Result<()> {
    config.set_key(key, value)?;
    config.save(basedir)?;
    console::say(format!("set {key} = {value}"));
    Ok(())
}
