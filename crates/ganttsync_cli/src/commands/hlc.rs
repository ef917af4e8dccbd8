//! HLC inspection commands.

use ganttsync_protocol::Hlc;
use serde::Serialize;
use std::cmp::Ordering;

/// Components of a parsed timestamp.
#[derive(Debug, Serialize)]
pub struct HlcReport {
    /// Milliseconds since the Unix epoch.
    pub millis: u64,
    /// Counter.
    pub counter: u16,
    /// Node id.
    pub node_id: String,
    /// Canonical wire form.
    pub canonical: String,
}

impl From<&Hlc> for HlcReport {
    fn from(hlc: &Hlc) -> Self {
        Self {
            millis: hlc.millis(),
            counter: hlc.counter(),
            node_id: hlc.node_id().to_string(),
            canonical: hlc.to_string(),
        }
    }
}

/// Runs `hlc parse`.
pub fn parse(text: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let hlc = Hlc::parse(text)?;
    let report = HlcReport::from(&hlc);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => {
            println!("Millis:    {}", report.millis);
            println!("Counter:   {} (0x{:04X})", report.counter, report.counter);
            println!("Node:      {}", report.node_id);
            println!("Canonical: {}", report.canonical);
        }
    }
    Ok(())
}

/// Runs `hlc compare`.
pub fn compare(left: &str, right: &str) -> Result<(), Box<dyn std::error::Error>> {
    let left = Hlc::parse(left)?;
    let right = Hlc::parse(right)?;
    println!("{}", ordering_name(left.compare(&right)));
    Ok(())
}

/// Name printed for an ordering.
pub fn ordering_name(ordering: Ordering) -> &'static str {
    match ordering {
        Ordering::Less => "less",
        Ordering::Equal => "equal",
        Ordering::Greater => "greater",
    }
}
