use super::LoadedConfig;
use crate::output::UserOutput;
use bringup::{RunMode, StateManager, StatusSnapshot};
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// Initialize the selected units (all by default) with their dependencies,
/// then print the status of every unit.
pub async fn run_up(
    loaded: LoadedConfig,
    units: &[String],
    sequential: bool,
    json: bool,
    cancellation_token: CancellationToken,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let manager = StateManager::builder()
        .config(loaded.config)
        .work_dir(loaded.base_dir)
        .cancellation_token(cancellation_token)
        .build()
        .await?;

    let mode = if sequential {
        RunMode::Sequential
    } else {
        RunMode::Parallel
    };

    if !json {
        let what = if units.is_empty() {
            "all units".to_string()
        } else {
            units.join(", ")
        };
        out.status(&format!("Initializing {}...", what));
    }

    let result = manager.initialize_targets(units, mode).await;
    let snapshots = manager.snapshots().await?;

    if json {
        let doc = json!({
            "success": result.is_ok(),
            "error": result.as_ref().err().map(|e| e.to_string()),
            "units": snapshots,
            "performance": manager.monitor().snapshot(),
        });
        out.status(&serde_json::to_string_pretty(&doc)?);
    } else {
        print_summary(&snapshots, out);
        let pending = snapshots.iter().filter(|s| s.label() == "pending").count();
        if result.is_err() && pending > 0 {
            out.warning(&format!("{} unit(s) left pending", pending));
        }
    }

    result?;
    if !json {
        out.success("Initialization complete");
    }
    Ok(())
}

fn print_summary(snapshots: &[StatusSnapshot], out: &dyn UserOutput) {
    out.blank();
    out.status("Unit Status:");
    out.status(&format!("{:-<50}", ""));

    if snapshots.is_empty() {
        out.status("  No units configured");
        return;
    }

    for snapshot in snapshots {
        let icon = match snapshot.label() {
            "initialized" => "+",
            "failed" => "x",
            _ => "o",
        };
        out.status(&format!("  {} {:<30} {}", icon, snapshot.unit, snapshot.label()));
        for error in &snapshot.errors {
            out.error(&format!("      {}", error));
        }
    }
    out.blank();
}
