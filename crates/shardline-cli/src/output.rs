//! Rendering of routes and run reports

use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use serde::Serialize;
use shardline_core::{RunReport, RunSummary, ShardTarget};

use crate::error::Result;
use crate::OutputFormat;

/// Placement of one key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteRow {
    pub key: String,
    pub hash: u32,
    pub target: ShardTarget,
}

pub fn render_routes(rows: &[RouteRow], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(rows)?),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec!["Key", "Hash", "Shard"]);

            for row in rows {
                table.add_row(vec![row.key.clone(), row.hash.to_string(), row.target.name()]);
            }
            Ok(table.to_string())
        }
    }
}

pub fn render_report(report: &RunReport, format: OutputFormat) -> Result<String> {
    let summary = report.summary();
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&summary)?),
        OutputFormat::Table => Ok(format!(
            "{}\n\n{}",
            summary_table(&summary),
            summary_line(&summary)
        )),
    }
}

fn summary_table(summary: &RunSummary) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec!["Shard", "Status", "Committed", "Chunks", "Elapsed (ms)", "Error"]);

    for shard in &summary.shards {
        table.add_row(vec![
            shard.target.name(),
            shard.status.to_string(),
            shard.committed.to_string(),
            shard.chunks.to_string(),
            shard.elapsed_ms.to_string(),
            shard.error.clone().unwrap_or_else(|| "-".to_string()),
        ]);
    }
    table
}

fn summary_line(summary: &RunSummary) -> String {
    format!(
        "Committed {} records across {} shards in {} ms ({} succeeded, {} failed, {} timed out; run {})",
        summary.total_committed,
        summary.shards.len(),
        summary.elapsed_ms,
        summary.succeeded,
        summary.failed,
        summary.timed_out,
        summary.run_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shardline_core::ExecutionResult;
    use std::time::Duration;
    use uuid::Uuid;

    fn report() -> RunReport {
        RunReport::new(
            Uuid::new_v4(),
            Utc::now(),
            vec![
                ExecutionResult::success(ShardTarget::new(0), 10, 1, Duration::from_millis(3)),
                ExecutionResult::timed_out(ShardTarget::new(1), Duration::from_millis(9)),
            ],
            Duration::from_millis(9),
        )
    }

    #[test]
    fn test_route_table() {
        let rows = vec![RouteRow {
            key: "3".to_string(),
            hash: 51,
            target: ShardTarget::new(1),
        }];
        let text = render_routes(&rows, OutputFormat::Table).unwrap();
        assert!(text.contains("ds_1"));
        assert!(text.contains("51"));
    }

    #[test]
    fn test_route_json() {
        let rows = vec![RouteRow {
            key: "7728".to_string(),
            hash: 1_692_966,
            target: ShardTarget::new(0),
        }];
        let json: serde_json::Value =
            serde_json::from_str(&render_routes(&rows, OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(json[0]["target"], "ds_0");
        assert_eq!(json[0]["hash"], 1_692_966);
    }

    #[test]
    fn test_report_table() {
        let text = render_report(&report(), OutputFormat::Table).unwrap();
        assert!(text.contains("timeout"));
        assert!(text.contains("Committed 10 records across 2 shards"));
    }

    #[test]
    fn test_report_json() {
        let json: serde_json::Value =
            serde_json::from_str(&render_report(&report(), OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(json["complete"], false);
        assert_eq!(json["shards"][1]["status"], "timeout");
    }
}
