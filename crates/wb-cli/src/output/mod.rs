//! Output formatting utilities for the CLI
//!
//! Tables for bridge details and diagnostics, plus colored status messages.

use tabled::{settings::Style, Table, Tabled};

use wb_bridge::{CheckResult, CheckStatus, Connection};

/// Format an established connection as a key/value table
pub fn format_connection(connection: &Connection) -> String {
    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "FIELD")]
        field: &'static str,
        #[tabled(rename = "VALUE")]
        value: String,
    }

    let mut rows = vec![
        Row {
            field: "Endpoint",
            value: connection.endpoint.clone(),
        },
        Row {
            field: "Method",
            value: connection.method.to_string(),
        },
    ];

    if let Some(session) = &connection.session {
        rows.push(Row {
            field: "Remote host",
            value: session.remote_host().to_string(),
        });
        rows.push(Row {
            field: "Remote port",
            value: session
                .remote_port()
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string()),
        });
        rows.push(Row {
            field: "Remote pid",
            value: session
                .remote_pid()
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string()),
        });
    }

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format diagnostic results, one row per stage
pub fn format_checks(results: &[CheckResult]) -> String {
    if results.is_empty() {
        return "No checks run".to_string();
    }

    #[derive(Tabled)]
    struct CheckRow {
        #[tabled(rename = "CHECK")]
        name: &'static str,
        #[tabled(rename = "STATUS")]
        status: String,
        #[tabled(rename = "DETAIL")]
        detail: String,
    }

    let rows: Vec<CheckRow> = results
        .iter()
        .map(|r| CheckRow {
            name: r.name,
            status: r.status.to_string(),
            detail: r.detail.clone(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Failed stages rendered the way a single error message lists them
pub fn failed_checks(results: &[CheckResult]) -> Vec<String> {
    results
        .iter()
        .filter(|r| r.status == CheckStatus::Fail)
        .map(|r| format!("{}: {}", r.name, r.detail))
        .collect()
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix to stderr
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
