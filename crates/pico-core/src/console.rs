//! User-facing console reporting.
//!
//! All interactive output of the framework carries a `>>> ` prefix; warnings
//! are yellow and errors red. Diagnostic logging goes through `tracing`
//! instead; this module is only for the lines an operator is meant to read.

use std::io::IsTerminal;

const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn color_enabled() -> bool {
    std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// Print a plain `>>> `-prefixed line.
pub fn say(msg: impl AsRef<str>) {
    println!(">>> {}", msg.as_ref());
}

/// Print a bold header line.
pub fn header(msg: impl AsRef<str>) {
    if color_enabled() {
        println!(">>> {BOLD}{}{RESET}", msg.as_ref());
    } else {
        println!(">>> {}", msg.as_ref());
    }
}

/// Print a yellow warning line.
pub fn warn(msg: impl AsRef<str>) {
    if color_enabled() {
        println!(">>> {YELLOW}Warning!{RESET} {}", msg.as_ref());
    } else {
        println!(">>> Warning! {}", msg.as_ref());
    }
}

/// Print a red error line.
pub fn error(msg: impl AsRef<str>) {
    if color_enabled() {
        eprintln!(">>> {RED}ERROR!{RESET} {}", msg.as_ref());
    } else {
        eprintln!(">>> ERROR! {}", msg.as_ref());
    }
}

/// Fixed-width table printed with the `>>> ` prefix, used for the per-sample
/// job status summary.
pub struct Table {
    widths: Vec<usize>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Start a table from its header row.
    pub fn new(header: &[&str]) -> Self {
        let widths = header.iter().map(|h| h.len()).collect();
        Table { widths, rows: vec![header.iter().map(|s| s.to_string()).collect()] }
    }

    /// Append a row; column widths grow as needed.
    pub fn row(&mut self, cells: &[String]) {
        for (i, cell) in cells.iter().enumerate() {
            if i < self.widths.len() && cell.len() > self.widths[i] {
                self.widths[i] = cell.len();
            }
        }
        self.rows.push(cells.to_vec());
    }

    /// Render all rows, right-padding each column.
    pub fn print(&self) {
        for row in &self.rows {
            let mut line = String::from(">>> ");
            for (i, cell) in row.iter().enumerate() {
                let width = self.widths.get(i).copied().unwrap_or(cell.len());
                line.push_str(&format!("{cell:width$}  "));
            }
            println!("{}", line.trim_end());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_widths_grow() {
        let mut table = Table::new(&["sample", "done"]);
        table.row(&["DYJetsToLL_M-50".to_string(), "12".to_string()]);
        assert_eq!(table.widths[0], "DYJetsToLL_M-50".len());
        assert_eq!(table.widths[1], "done".len());
    }
}
