use crate::bridge::{FieldRead, FieldValue};
use crate::reconciler::{BridgeState, ProfileReport};
use colored::Colorize;

pub fn print_status(states: &[BridgeState]) {
    println!("{}", "Tool Status".bold().underline());
    println!();

    for entry in states {
        let marker = if entry.available {
            "ok".green()
        } else {
            "not found".red()
        };
        println!("  {} [{}]", entry.bridge.bold(), marker);

        if !entry.available {
            println!();
            continue;
        }

        if entry.state.has_no_values() {
            println!("     {}", "no readable state".dimmed());
        }
        for (name, field) in entry.state.iter() {
            match field {
                FieldRead::Value(FieldValue::Int(v)) => println!("     {}: {}", name.dimmed(), v),
                FieldRead::Value(FieldValue::Float(v)) => {
                    println!("     {}: {:.1}", name.dimmed(), v)
                }
                FieldRead::Value(FieldValue::Text(v)) => println!("     {}: {}", name.dimmed(), v),
                FieldRead::Unparsed => {
                    println!("     {}: {}", name.dimmed(), "unreadable".yellow())
                }
            }
        }
        println!();
    }
}

pub fn print_status_json(states: &[BridgeState]) {
    let mut root = serde_json::Map::new();
    for entry in states {
        let mut obj = serde_json::Map::new();
        obj.insert("available".to_string(), entry.available.into());
        obj.insert(
            "state".to_string(),
            serde_json::to_value(&entry.state).unwrap_or_default(),
        );
        root.insert(entry.bridge.to_string(), obj.into());
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::Value::Object(root)).unwrap_or_default()
    );
}

pub fn print_apply_report(report: &ProfileReport) {
    for bridge in &report.bridges {
        if !bridge.available {
            println!("  {} {}", bridge.bridge.dimmed(), "skipped (not found)".dimmed());
            continue;
        }
        if bridge.outcomes.is_empty() {
            println!("  {} {}", bridge.bridge, "nothing to apply".dimmed());
            continue;
        }
        for outcome in &bridge.outcomes {
            match &outcome.result {
                Ok(()) => println!("  {} {} {}", bridge.bridge, outcome.key, "ok".green()),
                Err(e) if e.is_elevation_declined() => println!(
                    "  {} {} {}",
                    bridge.bridge,
                    outcome.key,
                    "cancelled (authentication declined)".yellow()
                ),
                Err(e) => println!(
                    "  {} {} {}: {}",
                    bridge.bridge,
                    outcome.key,
                    "failed".red(),
                    e
                ),
            }
        }
    }

    println!();
    if report.all_ok() {
        println!("{}", "Profile applied.".green().bold());
    } else {
        println!(
            "{}",
            format!("Profile applied with {} failure(s).", report.failure_count())
                .yellow()
                .bold()
        );
    }
}
