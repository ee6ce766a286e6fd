//! Output formatting for canlink (table, json, csv)

use canlink_session::{Frame, InterfaceDescriptor, LoggedMessage};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Print a success message (unless in quiet mode)
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg.green());
        }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    /// Print a warning message
    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    /// Print an error message
    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }

    /// Print the session status line; goes to stderr for json/csv so
    /// stdout stays machine readable
    pub fn status(&self, line: &str) {
        if self.quiet {
            return;
        }
        match self.format {
            OutputFormat::Table => println!("{}", line.bold()),
            OutputFormat::Json | OutputFormat::Csv => eprintln!("{}", line),
        }
    }

    /// Print data in the configured format
    pub fn print<T: Tabled + Serialize>(&self, data: &[T]) {
        match self.format {
            OutputFormat::Table => {
                if data.is_empty() {
                    if !self.quiet {
                        println!("No data");
                    }
                } else {
                    let table = Table::new(data).to_string();
                    println!("{}", table);
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(data).unwrap_or_else(|_| "[]".to_string())
                );
            }
            OutputFormat::Csv => {
                print_csv(data, true);
            }
        }
    }

    /// Print one frame as a streaming line
    ///
    /// CSV prints its header only when `first` is set.
    pub fn print_frame_line(&self, frame: &Frame, first: bool) {
        match self.format {
            OutputFormat::Table => {
                let time = frame
                    .timestamp()
                    .with_timezone(&chrono::Local)
                    .format("%H:%M:%S%.3f")
                    .to_string();
                println!("[{}] {}", time.dimmed(), frame);
            }
            OutputFormat::Json => {
                if let Ok(json) = serde_json::to_string(&FrameRow::from(frame)) {
                    println!("{}", json);
                }
            }
            OutputFormat::Csv => print_csv(&[FrameRow::from(frame)], first),
        }
    }
}

/// Print data as CSV
fn print_csv<T: Serialize>(data: &[T], header: bool) {
    if data.is_empty() {
        return;
    }

    // Field names come from the first item
    let first = serde_json::to_value(&data[0]).unwrap_or_default();
    if let serde_json::Value::Object(map) = &first {
        let headers: Vec<&str> = map.keys().map(|s| s.as_str()).collect();
        if header {
            println!("{}", headers.join(","));
        }

        for item in data {
            if let Ok(serde_json::Value::Object(row)) = serde_json::to_value(item) {
                let values: Vec<String> = headers
                    .iter()
                    .map(|h| {
                        row.get(*h)
                            .map(|v| match v {
                                serde_json::Value::String(s) => escape_csv(s),
                                other => escape_csv(&other.to_string()),
                            })
                            .unwrap_or_default()
                    })
                    .collect();
                println!("{}", values.join(","));
            }
        }
    }
}

/// Escape a value for CSV output
fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

// =============================================================================
// Display types for various commands
// =============================================================================

/// Interface display for interfaces command
#[derive(Debug, Tabled, Serialize)]
pub struct InterfaceRow {
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Kind")]
    pub kind: String,
    #[tabled(rename = "Channel")]
    pub channel: String,
    #[tabled(rename = "Driver")]
    pub driver: String,
}

impl InterfaceRow {
    pub fn new(descriptor: &InterfaceDescriptor, driver: bool) -> Self {
        Self {
            name: descriptor.name().to_string(),
            kind: descriptor.kind().to_string(),
            channel: descriptor.channel().to_string(),
            driver: if driver { "yes" } else { "no" }.to_string(),
        }
    }
}

/// Frame display for send, receive and monitor commands
#[derive(Debug, Tabled, Serialize)]
pub struct FrameRow {
    #[tabled(rename = "Time")]
    pub timestamp: String,
    #[tabled(rename = "Dir")]
    pub direction: String,
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "DLC")]
    pub dlc: usize,
    #[tabled(rename = "Data")]
    pub data: String,
}

impl From<&Frame> for FrameRow {
    fn from(frame: &Frame) -> Self {
        let id = if frame.is_extended_id() {
            format!("{:08X}", frame.arbitration_id())
        } else {
            format!("{:03X}", frame.arbitration_id())
        };
        Self {
            timestamp: frame.timestamp().to_rfc3339(),
            direction: frame.direction().to_string(),
            id,
            dlc: frame.payload().len(),
            data: hex::encode_upper(frame.payload()),
        }
    }
}

/// Stored message display for log command
#[derive(Debug, Tabled, Serialize)]
pub struct MessageRow {
    #[tabled(rename = "ID")]
    pub id: u64,
    #[tabled(rename = "Time")]
    pub timestamp: String,
    #[tabled(rename = "Type")]
    pub message_type: String,
    #[tabled(rename = "Message")]
    pub message: String,
}

impl From<LoggedMessage> for MessageRow {
    fn from(message: LoggedMessage) -> Self {
        Self {
            id: message.id,
            timestamp: message.timestamp.to_rfc3339(),
            message_type: message.message_type,
            message: message.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canlink_session::{Direction, FrameData};

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_frame_row() {
        let data = FrameData::new(0x18DA_F110, vec![0x02, 0x3E, 0x00], true).unwrap();
        let row = FrameRow::from(&Frame::new(data, Direction::Received));
        assert_eq!(row.id, "18DAF110");
        assert_eq!(row.dlc, 3);
        assert_eq!(row.data, "023E00");
        assert_eq!(row.direction, "received");
    }
}
