use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use dealdesk_core::config::{AppConfig, LoadOptions};
use dealdesk_core::drafts::{assess_snapshot, DraftPolicy, SnapshotAssessment};
use dealdesk_db::{connect_from_config, migrations, DraftRecord, SqlDraftStore};
use serde_json::{json, Value};

use crate::commands::{
    current_thread_runtime, load_config, CommandFailure, CommandResult, FailWith,
};

pub fn list(options: &LoadOptions) -> CommandResult {
    const COMMAND: &str = "drafts list";
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match current_thread_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };
    let window = DraftPolicy::from(&config.drafts).staleness_window;

    let result = runtime.block_on(async {
        let store = open_store(&config).await?;
        let records = store.list().await.context("listing drafts").fail_with("draft_store", 6)?;
        Ok::<Vec<DraftRecord>, CommandFailure>(records)
    });

    match result {
        Ok(records) => {
            let now = Utc::now();
            let stale = records
                .iter()
                .filter(|record| {
                    assess_snapshot(&record.snapshot, now, window) == SnapshotAssessment::Stale
                })
                .count();
            let rows: Vec<Value> =
                records.iter().map(|record| record_json(record, now, window)).collect();
            CommandResult::success_with_data(
                COMMAND,
                format!("{} draft(s), {stale} stale", records.len()),
                Some(Value::Array(rows)),
            )
        }
        Err(failure) => failure.into_result(COMMAND),
    }
}

pub fn purge(options: &LoadOptions, older_than_days: Option<u32>) -> CommandResult {
    const COMMAND: &str = "drafts purge";
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match current_thread_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };
    let days = older_than_days.unwrap_or(config.drafts.staleness_days);
    let cutoff = Utc::now() - Duration::days(i64::from(days));

    let result = runtime.block_on(async {
        let store = open_store(&config).await?;
        let purged = store
            .purge_captured_before(cutoff)
            .await
            .context("purging drafts")
            .fail_with("draft_store", 6)?;
        Ok::<u64, CommandFailure>(purged)
    });

    match result {
        Ok(purged) => CommandResult::success_with_data(
            COMMAND,
            format!("purged {purged} draft(s) captured more than {days} day(s) ago"),
            Some(json!({ "purged": purged, "cutoff": cutoff.to_rfc3339() })),
        ),
        Err(failure) => failure.into_result(COMMAND),
    }
}

// Draft commands bring the schema up to date first so a fresh database lists
// as empty instead of failing.
async fn open_store(config: &AppConfig) -> Result<SqlDraftStore, CommandFailure> {
    let pool = connect_from_config(&config.database).await.fail_with("db_connectivity", 4)?;
    migrations::run_pending(&pool).await.fail_with("migration", 5)?;
    Ok(SqlDraftStore::new(pool))
}

fn record_json(record: &DraftRecord, now: DateTime<Utc>, window: Duration) -> Value {
    let assessment = match assess_snapshot(&record.snapshot, now, window) {
        SnapshotAssessment::Stale => "stale",
        SnapshotAssessment::Empty => "empty",
        SnapshotAssessment::Restorable => "restorable",
    };
    json!({
        "key": record.key.storage_key(),
        "wizard": record.key.wizard.as_str(),
        "entity": record.key.entity_key(),
        "current_step": record.snapshot.current_step.0,
        "furthest_reached_step": record.snapshot.furthest_reached_step.0,
        "captured_at": record.snapshot.captured_at.to_rfc3339(),
        "assessment": assessment,
    })
}
