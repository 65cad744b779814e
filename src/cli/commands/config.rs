use anyhow::Result;

use crate::config::IssueOpsConfig;

/// Prints the effective configuration. Needs no GitHub access.
pub fn show_config(config: &IssueOpsConfig) -> Result<()> {
    println!("⚙️  Effective configuration");
    println!();
    print!("{}", config.to_toml()?);
    Ok(())
}
