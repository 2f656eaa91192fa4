//! The `jobs` subcommand: print recent generation jobs for a store.

use clap::Args;
use uuid::Uuid;

use flowz_core::AppConfig;

#[derive(Debug, Args)]
pub(crate) struct JobsArgs {
    /// Target store id.
    #[arg(long)]
    store_id: Uuid,
    /// Maximum number of jobs to print.
    #[arg(long, default_value_t = 20)]
    limit: i64,
}

pub(crate) async fn run(config: &AppConfig, args: JobsArgs) -> anyhow::Result<()> {
    let pool_config = flowz_db::PoolConfig::from_app_config(config);
    let pool = flowz_db::connect_pool(&config.database_url, pool_config).await?;

    let rows =
        flowz_db::list_generation_jobs(&pool, args.store_id, args.limit.clamp(1, 200)).await?;

    if rows.is_empty() {
        println!("no generation jobs for store {}", args.store_id);
        return Ok(());
    }

    for row in rows {
        let completed = row
            .completed_at
            .map_or_else(|| "-".to_owned(), |t| t.to_rfc3339());
        println!(
            "{}  {:<9}  {}/{} ok, {} failed  created {}  completed {}",
            row.id,
            row.status,
            row.successful_items,
            row.total_items,
            row.failed_items,
            row.created_at.to_rfc3339(),
            completed
        );
    }
    Ok(())
}
