//! Flat CSV export/import of the agent collection.
//!
//! Every field is hex or a decimal number, so rows are split on bare commas
//! without quoting.

use crate::agent::Agent;

pub const HEADER: &str = "index,address,privateKey,nativeBalance,tokenBalance";

/// Render agents as CSV with a header and 1-based positional index.
pub fn encode(agents: &[Agent]) -> String {
    let mut out = String::from(HEADER);
    for (i, a) in agents.iter().enumerate() {
        out.push('\n');
        out.push_str(&format!(
            "{},{},{},{},{}",
            i + 1,
            a.address,
            a.private_key,
            a.native_balance,
            a.token_balance
        ));
    }
    out
}

/// Parse agents from CSV text, dropping rows that are too short.
pub fn decode(text: &str) -> Vec<Agent> {
    let mut lines = text.trim().lines().peekable();
    if lines.peek().is_some_and(|l| l.trim_start().starts_with("index")) {
        lines.next();
    }

    lines.filter_map(decode_row).collect()
}

fn decode_row(line: &str) -> Option<Agent> {
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    if parts.len() < 3 {
        return None;
    }

    let balance = |i: usize| {
        parts
            .get(i)
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
            .unwrap_or_else(|| "0".to_string())
    };

    Some(Agent {
        address: parts[1].to_string(),
        private_key: parts[2].to_string(),
        native_balance: balance(3),
        token_balance: balance(4),
    })
}
