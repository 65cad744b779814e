use anyhow::Result;
use clap::Parser;

use issue_ops::cli::commands::config::show_config;
use issue_ops::cli::commands::detect::DetectCommand;
use issue_ops::cli::commands::grace::CheckGraceCommand;
use issue_ops::cli::commands::init::InitCommand;
use issue_ops::cli::commands::tasks::{SummaryCommand, TaskClosedCommand};
use issue_ops::cli::commands::trigger::DispatchCommand;
use issue_ops::cli::commands::{AppContext, Command};
use issue_ops::cli::{Cli, Commands};
use issue_ops::config::IssueOpsConfig;
use issue_ops::telemetry::init_telemetry;
use issue_ops::workflow::TriggerCommand;

fn main() -> Result<()> {
    let cli = Cli::parse();

    IssueOpsConfig::load_env_file()?;
    let config = match &cli.config {
        Some(path) => IssueOpsConfig::load_from(Some(path.as_path()), None)?,
        None => IssueOpsConfig::load()?,
    };
    init_telemetry(&config.observability)?;

    if let Commands::ShowConfig = cli.command {
        return show_config(&config);
    }

    tokio::runtime::Runtime::new()?.block_on(async {
        let ctx = AppContext::build(config, cli.dry_run)?;
        run(&ctx, cli.command).await?;
        ctx.report_dry_run();
        Ok::<_, anyhow::Error>(())
    })
}

async fn run(ctx: &AppContext, command: Commands) -> Result<()> {
    match command {
        Commands::Init { issue, workflow } => {
            InitCommand::new(issue)
                .with_workflow(workflow)
                .execute(ctx)
                .await
        }
        Commands::Trigger { issue, input } => {
            DispatchCommand::parse(issue, &input)?.execute(ctx).await
        }
        Commands::Transition { issue, event } => {
            DispatchCommand::new(issue, TriggerCommand::Event(event.parse()?))
                .execute(ctx)
                .await
        }
        Commands::Skip { issue, reason } => {
            DispatchCommand::new(issue, TriggerCommand::Skip { reason })
                .execute(ctx)
                .await
        }
        Commands::Cancel { issue, reason } => {
            DispatchCommand::new(issue, TriggerCommand::Cancel { reason })
                .execute(ctx)
                .await
        }
        Commands::TaskClosed { task } => TaskClosedCommand { task }.execute(ctx).await,
        Commands::CheckGrace { issues } => CheckGraceCommand { issues }.execute(ctx).await,
        Commands::Summary { issue, stage, json } => {
            SummaryCommand { issue, stage, json }.execute(ctx).await
        }
        Commands::Detect { issue } => DetectCommand { issue }.execute(ctx).await,
        Commands::ShowConfig => show_config(&ctx.config),
    }
}
