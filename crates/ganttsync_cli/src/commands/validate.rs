//! Validate command implementation.

use ganttsync_protocol::validate_bytes;
use serde::Serialize;
use std::io::Read;
use std::path::Path;

/// Outcome of validating one operation.
#[derive(Debug, Serialize)]
pub struct ValidationReport {
    /// Whether every check passed.
    pub valid: bool,
    /// Operation type, when valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_type: Option<String>,
    /// Effective schema version, when valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u64>,
    /// Canonical timestamp, when valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// First failing check, when invalid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Validates raw bytes into a report.
pub fn check(bytes: &[u8]) -> ValidationReport {
    match validate_bytes(bytes) {
        Ok(operation) => ValidationReport {
            valid: true,
            op_type: Some(operation.op_type.to_string()),
            schema_version: Some(operation.schema_version),
            timestamp: Some(operation.timestamp.to_string()),
            reason: None,
        },
        Err(err) => ValidationReport {
            valid: false,
            op_type: None,
            schema_version: None,
            timestamp: None,
            reason: Some(err.to_string()),
        },
    }
}

/// Runs the validate command.
pub fn run(input: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = read_input(input)?;
    let report = check(&bytes);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_report(&report),
    }

    if report.valid {
        Ok(())
    } else {
        Err("Validation failed".into())
    }
}

fn read_input(input: &Path) -> std::io::Result<Vec<u8>> {
    if input == Path::new("-") {
        let mut bytes = Vec::new();
        std::io::stdin().read_to_end(&mut bytes)?;
        Ok(bytes)
    } else {
        std::fs::read(input)
    }
}

fn print_report(report: &ValidationReport) {
    if report.valid {
        println!("✓ Operation Valid");
        if let (Some(op_type), Some(version), Some(timestamp)) =
            (&report.op_type, report.schema_version, &report.timestamp)
        {
            println!("  Type:      {} (v{})", op_type, version);
            println!("  Timestamp: {}", timestamp);
        }
    } else if let Some(reason) = &report.reason {
        println!("✗ {}", reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const VALID: &[u8] = br#"{"type":"INSERT_TASK","timestamp":"2023-10-27T10:00:00.000Z-0000-deviceA","data":{"id":"t1"}}"#;

    #[test]
    fn check_valid_operation() {
        let report = check(VALID);
        assert!(report.valid);
        assert_eq!(report.op_type.as_deref(), Some("INSERT_TASK"));
        assert_eq!(report.schema_version, Some(1));
        assert_eq!(
            report.timestamp.as_deref(),
            Some("2023-10-27T10:00:00.000Z-0000-deviceA")
        );
    }

    #[test]
    fn check_reports_first_failure() {
        let report = check(br#"{"type":"INSERT_TASK","timestamp":"garbage","data":{}}"#);
        assert!(!report.valid);
        assert!(report
            .reason
            .unwrap()
            .starts_with("Invalid HLC Timestamp: garbage"));
    }

    #[test]
    fn run_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(VALID).unwrap();
        assert!(run(file.path(), "json").is_ok());

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        bad.write_all(br#"{"type":"CREATE_TAG","timestamp":"2023-10-27T10:00:00.000Z-0000-n","data":{}}"#)
            .unwrap();
        assert!(run(bad.path(), "text").is_err());
    }

    #[test]
    fn run_missing_file() {
        assert!(run(Path::new("/nonexistent/op.json"), "text").is_err());
    }
}
