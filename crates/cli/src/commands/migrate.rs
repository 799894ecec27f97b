use crate::commands::{
    current_thread_runtime, load_config, CommandFailure, CommandResult, FailWith,
};
use dealdesk_core::config::LoadOptions;
use dealdesk_db::{connect_from_config, migrations};

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config("migrate", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match current_thread_runtime("migrate") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_from_config(&config.database).await.fail_with("db_connectivity", 4)?;
        let before = migrations::applied_versions(&pool).await.fail_with("migration", 5)?;
        migrations::run_pending(&pool).await.fail_with("migration", 5)?;
        let after = migrations::applied_versions(&pool).await.fail_with("migration", 5)?;
        pool.close().await;
        Ok::<usize, CommandFailure>(after.len().saturating_sub(before.len()))
    });

    match result {
        Ok(0) => CommandResult::success("migrate", "schema already up to date"),
        Ok(applied) => {
            tracing::info!(event_name = "db.migrated", applied, "applied pending migrations");
            CommandResult::success("migrate", format!("applied {applied} pending migration(s)"))
        }
        Err(failure) => failure.into_result("migrate"),
    }
}
