use std::path::Path;

use crate::config::Config;
use crate::error::Result;
use crate::output::{self, Format};

pub fn show(root: &Path, format: Format) -> Result<()> {
    let config = Config::load(root)?;
    output::print_policy(&config.policy, format)
}

/// Validate the config; `Config::load` already rejects bad values.
pub fn check(root: &Path, format: Format) -> Result<()> {
    let config = Config::load(root)?;
    match format {
        Format::Json => println!(
            "{}",
            serde_json::json!({ "ok": true, "version": config.version })
        ),
        Format::Pretty => println!("policy ok (config version {})", config.version),
    }
    Ok(())
}
