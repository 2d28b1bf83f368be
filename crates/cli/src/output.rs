//! Output formatting for the CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use serde::Serialize;

use fleetqa_common::Module;
use fleetqa_e2e::index::{ModuleIndexEntry, RunIndex};
use fleetqa_e2e::report::ModuleStatus;

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// Plain text format
    Plain,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

impl TableDisplay for Module {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "Label", "Areas", "Roles", "Test files"]
    }

    fn row(&self) -> Vec<String> {
        let areas: Vec<&str> = self.areas.iter().map(|a| a.as_str()).collect();
        let roles = match self.roles {
            Some(roles) => roles.iter().map(|r| r.as_str()).collect::<Vec<_>>().join(", "),
            None => "(run roles)".to_string(),
        };
        vec![
            self.id.to_string(),
            self.label.to_string(),
            areas.join(", "),
            roles,
            self.test_files.join("\n"),
        ]
    }
}

/// Render a list of items in the requested format
pub fn render_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) -> String {
    if items.is_empty() {
        return "No items found.".to_string();
    }

    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);

            table.set_header(T::headers());
            for item in items {
                table.add_row(item.row());
            }
            table.to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(items).unwrap_or_default(),
        OutputFormat::Plain => {
            let mut blocks = Vec::with_capacity(items.len());
            for item in items {
                let lines: Vec<String> = T::headers()
                    .iter()
                    .zip(item.row())
                    .map(|(header, value)| format!("{}: {}", header, value.replace('\n', ", ")))
                    .collect();
                blocks.push(lines.join("\n"));
            }
            blocks.join("\n---\n")
        }
    }
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    println!("{}", render_list(items, format));
}

fn status_cell(status: ModuleStatus) -> Cell {
    let color = if status.is_red() { Color::Red } else { Color::Green };
    Cell::new(status).fg(color)
}

fn module_row(entry: &ModuleIndexEntry) -> Vec<Cell> {
    let playwright = match &entry.playwright {
        Some(pw) => format!("{} ({}/{})", pw.status, pw.failed, pw.total),
        None => "skipped".to_string(),
    };
    let f = &entry.findings_by_severity;
    let reasons: Vec<&str> = entry.status_reasons.iter().map(|r| r.as_str()).collect();
    vec![
        Cell::new(&entry.id),
        status_cell(entry.status),
        Cell::new(playwright),
        Cell::new(format!("{}/{}/{}/{}", f.p0, f.p1, f.p2, f.p3)),
        Cell::new(reasons.join(", ")),
    ]
}

/// Print the per-module outcome of a run
pub fn print_run_summary(index: &RunIndex) {
    if index.setup.failed() {
        print_warning(&format!("Setup failed: {}", index.setup.setup_failed.join("; ")));
    }
    if index.modules.is_empty() {
        print_info("No modules were audited.");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Module", "Status", "Playwright", "P0/P1/P2/P3", "Reasons"]);
    for entry in &index.modules {
        table.add_row(module_row(entry));
    }
    println!("{table}");

    let red = index.modules.iter().filter(|m| m.status.is_red()).count();
    let summary = format!("{} module(s): {} green, {} red", index.modules.len(), index.modules.len() - red, red);
    if red > 0 {
        println!("{}", summary.red().bold());
    } else {
        println!("{}", summary.green().bold());
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    println!("⚠️  {}", message);
}

/// Print info message
pub fn print_info(message: &str) {
    println!("ℹ️  {}", message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetqa_common::get_module_by_id;

    #[test]
    fn test_module_row() {
        let auth = get_module_by_id("auth").unwrap();
        let row = auth.row();
        assert_eq!(row[0], "auth");
        assert_eq!(row.len(), Module::headers().len());
    }

    #[test]
    fn test_render_plain_and_json() {
        let auth = get_module_by_id("auth").unwrap().clone();
        let plain = render_list(&[auth.clone()], OutputFormat::Plain);
        assert!(plain.starts_with("ID: auth\n"));

        let json: serde_json::Value =
            serde_json::from_str(&render_list(&[auth], OutputFormat::Json)).unwrap();
        assert_eq!(json[0]["id"], "auth");
        assert!(json[0]["testFiles"].is_array());
    }

    #[test]
    fn test_render_empty() {
        let none: Vec<Module> = Vec::new();
        assert_eq!(render_list(&none, OutputFormat::Table), "No items found.");
    }
}
