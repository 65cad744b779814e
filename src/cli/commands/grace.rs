use anyhow::Result;
use tracing::warn;

use super::{describe_state, AppContext, Command};

/// Cron entry point: advances paused workflows whose grace period has ended.
pub struct CheckGraceCommand {
    pub issues: Vec<u64>,
}

impl Command for CheckGraceCommand {
    async fn execute(&self, ctx: &AppContext) -> Result<()> {
        println!("⏰ Checking {} issue(s) for expired grace periods", self.issues.len());

        let mut advanced = 0;
        let mut failed = 0;
        for &issue in &self.issues {
            let result = async {
                ctx.prepare_issue(issue).await?;
                let (_, definition) = ctx.require_workflow(issue).await?;
                Ok::<_, anyhow::Error>(
                    ctx.orchestrator.expire_grace_period(issue, definition).await?,
                )
            }
            .await;

            match result {
                Ok(Some(state)) => {
                    advanced += 1;
                    println!("   ✅ {}", describe_state(&state));
                }
                Ok(None) => println!("   ⏸️  #{issue}: nothing to do"),
                Err(e) => {
                    failed += 1;
                    warn!(issue, error = %e, "Grace period check failed");
                    println!("   ❌ #{issue}: {e}");
                }
            }
        }

        println!();
        println!("{advanced} advanced, {failed} failed");
        if failed > 0 {
            anyhow::bail!("{failed} issue(s) could not be checked");
        }
        Ok(())
    }
}
