//! CLI presentation: text and json formatters per command.

use crate::record::RecordStats;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use serde::Serialize;

pub fn format_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}

pub fn format_stats_text(stats: &RecordStats) -> String {
    let mut out = format!(
        "Records: {}\nPlayers: {}\n\n",
        stats.total, stats.players
    );
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Type", "Records"]);
    for (cape_type, count) in &stats.types {
        table.add_row(vec![cape_type.clone(), count.to_string()]);
    }
    out.push_str(&table.to_string());
    out
}

pub fn format_types_text(types: &[String]) -> String {
    types.join("\n")
}
