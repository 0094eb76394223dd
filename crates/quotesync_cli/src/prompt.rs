//! Terminal conflict prompt.

use quotesync_engine::{ConflictPrompt, PromptDecision};
use quotesync_protocol::{Conflict, Strategy};
use std::io::{self, BufRead, Write};

/// Prints deferred conflicts to stdout.
pub struct TerminalPrompt;

impl ConflictPrompt for TerminalPrompt {
    fn present(&self, conflict: &Conflict) {
        println!(
            "Conflict with the server ({} difference(s)):",
            conflict.delta_count()
        );
        for line in describe(conflict) {
            println!("  {line}");
        }
    }
}

/// One line per difference between the local and remote snapshots.
pub fn describe(conflict: &Conflict) -> Vec<String> {
    let mut lines = Vec::with_capacity(conflict.delta_count());
    for modified in &conflict.modified {
        let fields: Vec<&str> = modified.fields.iter().map(|f| f.as_str()).collect();
        lines.push(format!(
            "~ {}: {} differ (local \"{}\", server \"{}\")",
            modified.id(),
            fields.join(", "),
            modified.local.payload.text,
            modified.remote.payload.text
        ));
    }
    for item in &conflict.added_remote {
        lines.push(format!("+ {}: new on the server \"{}\"", item.id, item.payload.text));
    }
    for item in conflict.unconfirmed_local() {
        lines.push(format!(
            "- {}: missing on the server \"{}\"",
            item.id, item.payload.text
        ));
    }
    lines
}

/// Parses an answer typed at the prompt.
pub fn parse_decision(input: &str) -> Option<PromptDecision> {
    match input.trim().to_ascii_lowercase().as_str() {
        "s" => Some(PromptDecision::Resolve(Strategy::ServerWins)),
        "l" => Some(PromptDecision::Resolve(Strategy::LocalWins)),
        "m" => Some(PromptDecision::Resolve(Strategy::Merge)),
        "d" | "discard" => Some(PromptDecision::Discard),
        "k" | "keep" | "" => Some(PromptDecision::KeepBlocked),
        other => match other.parse::<Strategy>() {
            Ok(strategy) if strategy.auto_resolves() => Some(PromptDecision::Resolve(strategy)),
            _ => None,
        },
    }
}

/// Asks on stdin until a valid answer is given. End of input keeps the conflict.
pub fn ask_decision() -> io::Result<PromptDecision> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    loop {
        print!("Resolve with [s]erver-wins, [l]ocal-wins, [m]erge, [d]iscard or [k]eep: ");
        io::stdout().flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(PromptDecision::KeepBlocked);
        }
        match parse_decision(&line) {
            Some(decision) => return Ok(decision),
            None => println!("Unrecognized answer: {}", line.trim()),
        }
    }
}
