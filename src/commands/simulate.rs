use std::path::Path;

use crate::config::Config;
use crate::error::Result;
use crate::output::{self, Format};
use crate::scenario::{self, Scenario};
use crate::store::claims::ClaimStore;
use crate::store::registry::ClaimRegistry;

/// Replay a scenario file. Dry run by default; `persist` records claims in
/// the data-dir store like a live coordinator would.
pub fn run(root: &Path, scenario_path: &Path, persist: bool, format: Format) -> Result<()> {
    let scenario = Scenario::load(scenario_path)?;
    let (policy, registry) = if persist {
        let config = Config::load(root)?;
        (config.policy, ClaimRegistry::open(ClaimStore::from_root(root)?)?)
    } else {
        let config = Config::load_or_default(root)?;
        (config.policy, ClaimRegistry::in_memory()?)
    };

    let report = scenario::run(&scenario, policy, registry)?;
    output::print_report(&report, format)
}
