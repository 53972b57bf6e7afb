//! Plain text report generator.

use crate::config::Config;
use crate::error::Result;
use crate::reporter::json::state_name;
use crate::reporter::ReportGenerator;
use crate::types::{GraphResult, ResolutionState};
use colored::Colorize;
use comfy_table::{Cell, CellAlignment, Color, ContentArrangement, Table};

/// Identifiers longer than this are shortened to their tail.
const MAX_ID_WIDTH: usize = 72;

/// Text report generator for CLI output.
pub struct TextReporter {
    /// Whether to use colors
    use_colors: bool,
}

impl TextReporter {
    /// Create a new text reporter.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            use_colors: config.output.colored,
        }
    }
}

impl ReportGenerator for TextReporter {
    fn generate(&self, result: &GraphResult) -> Result<String> {
        let mut output = String::new();

        output.push_str(&self.format_header());
        output.push('\n');

        output.push_str(&self.format_summary(result));
        output.push('\n');

        if !result.node_counts.is_empty() {
            output.push_str(&self.format_types(result));
            output.push('\n');
        }

        if !result.relationships.is_empty() {
            output.push_str(&self.format_relationships(result));
            output.push('\n');
        }

        if !result.records.is_empty() {
            output.push_str(&self.format_dependencies(result));
            output.push('\n');
        }

        output.push_str(&self.format_footer(result));

        Ok(output)
    }
}

impl TextReporter {
    fn section(&self, title: &str) -> String {
        let title = if self.use_colors {
            title.bright_cyan().bold().to_string()
        } else {
            title.to_string()
        };
        format!("\n{title}\n{}\n", "-".repeat(80))
    }

    fn format_header(&self) -> String {
        let title = "TenantGraph Report";
        let version = format!("v{}", env!("CARGO_PKG_VERSION"));
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");

        if self.use_colors {
            format!(
                "\n{} {} {}\n{}\n",
                title.bright_white().bold(),
                version.dimmed(),
                format!("({timestamp})").dimmed(),
                "=".repeat(80).bright_blue(),
            )
        } else {
            format!("\n{title} {version} ({timestamp})\n{}\n", "=".repeat(80))
        }
    }

    fn format_summary(&self, result: &GraphResult) -> String {
        let mut output = self.section("Summary");
        let unresolved = result.unresolved_ids().len();

        let lines = [
            ("Resource types", result.node_counts.len().to_string()),
            ("Relationship kinds", result.relationships.len().to_string()),
            ("Graph edges", result.graph.edge_count().to_string()),
            ("Discovered resources", result.discovered.len().to_string()),
            ("Unresolved dependencies", unresolved.to_string()),
            ("Dropped relationships", result.dropped_relationships.to_string()),
        ];
        for (label, value) in lines {
            output.push_str(&format!("  {label:<26} {value}\n"));
        }
        output
    }

    fn format_types(&self, result: &GraphResult) -> String {
        let mut output = self.section("Resource Types");

        let mut table = Table::new();
        table
            .load_preset(comfy_table::presets::UTF8_BORDERS_ONLY)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["Type", "Occurrences"]);

        let mut counts: Vec<(&String, &u64)> = result.node_counts.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (name, count) in counts {
            table.add_row(vec![
                Cell::new(name),
                Cell::new(count).set_alignment(CellAlignment::Right),
            ]);
        }

        output.push_str(&table.to_string());
        output.push('\n');
        output
    }

    fn format_relationships(&self, result: &GraphResult) -> String {
        let mut output = self.section("Relationships");

        let mut table = Table::new();
        table
            .load_preset(comfy_table::presets::UTF8_BORDERS_ONLY)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["Source", "Relation", "Target", "Frequency"]);

        for relationship in &result.relationships {
            table.add_row(vec![
                Cell::new(&relationship.source_type),
                Cell::new(&relationship.relation),
                Cell::new(&relationship.target_type),
                Cell::new(relationship.frequency).set_alignment(CellAlignment::Right),
            ]);
        }

        output.push_str(&table.to_string());
        output.push('\n');
        output
    }

    fn format_dependencies(&self, result: &GraphResult) -> String {
        let mut output = self.section("Missing Dependencies");

        let mut table = Table::new();
        table
            .load_preset(comfy_table::presets::UTF8_BORDERS_ONLY)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["Resource", "State", "Referenced by"]);

        for record in &result.records {
            let state = match &record.state {
                ResolutionState::Unresolved { reason } => format!("unresolved: {reason}"),
                other => state_name(other).replace('_', " "),
            };
            let state_cell = if self.use_colors {
                let color = match record.state {
                    ResolutionState::FoundInStore | ResolutionState::FetchedFromSource => Color::Green,
                    ResolutionState::Pending => Color::Yellow,
                    ResolutionState::Unresolved { .. } => Color::Red,
                };
                Cell::new(state).fg(color)
            } else {
                Cell::new(state)
            };
            table.add_row(vec![
                Cell::new(shorten_id(&record.target_id)),
                state_cell,
                Cell::new(record.referenced_by.len()).set_alignment(CellAlignment::Right),
            ]);
        }

        output.push_str(&table.to_string());
        output.push('\n');
        output
    }

    fn format_footer(&self, result: &GraphResult) -> String {
        let status = if result.partial {
            if self.use_colors {
                "INCOMPLETE - dependency collection was interrupted".yellow().bold().to_string()
            } else {
                "INCOMPLETE - dependency collection was interrupted".to_string()
            }
        } else if result.unresolved_ids().is_empty() {
            if self.use_colors {
                "COMPLETE - all dependencies resolved".green().to_string()
            } else {
                "COMPLETE - all dependencies resolved".to_string()
            }
        } else if self.use_colors {
            "COMPLETE with unresolved dependencies".yellow().to_string()
        } else {
            "COMPLETE with unresolved dependencies".to_string()
        };

        format!("\n{status}\n\n")
    }
}

/// Keep the tail of long identifiers, where the resource name lives.
fn shorten_id(id: &str) -> String {
    let chars: Vec<char> = id.chars().collect();
    if chars.len() <= MAX_ID_WIDTH {
        id.to_string()
    } else {
        let tail: String = chars[chars.len() - (MAX_ID_WIDTH - 3)..].iter().collect();
        format!("...{tail}")
    }
}
