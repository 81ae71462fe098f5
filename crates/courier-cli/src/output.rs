//! Terminal rendering of command results.
#![allow(clippy::print_stdout, reason = "Command output goes to stdout")]

use anyhow::Result;
use courier_core::{Message, Role};
use courier_routing::{ClassificationResult, DispatchReply, HealthState};
use serde::Serialize;
use serde_json::to_string_pretty;
use std::collections::BTreeMap;
use std::path::Path;

/// Prints `value` as pretty JSON.
///
/// # Errors
/// Returns an error if serialization fails
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", to_string_pretty(value)?);
    Ok(())
}

pub fn print_reply(session_id: &str, reply: &DispatchReply) {
    println!("{}", reply.response_text);
    println!();
    println!(
        "[session {session_id} | backend {} | tier {} | {} attempt(s) | {}ms | {} bytes]",
        reply.backend_used,
        reply.classification.tier,
        reply.attempts.len(),
        reply.latency_ms,
        reply.response_bytes
    );
    if !reply.skipped.is_empty() {
        println!("[skipped unhealthy: {}]", reply.skipped.join(", "));
    }
}

pub fn print_classification(result: &ClassificationResult) {
    println!("tier:        {}", result.tier);
    println!("complexity:  {}", result.complexity);
    println!("efficiency:  {:.2}", result.efficiency);
    println!("confidence:  {:.2}", result.confidence);
    println!("reasoning:   {}", result.reasoning);
}

pub fn print_health(states: &BTreeMap<String, HealthState>) {
    if states.is_empty() {
        println!("no backend has been called yet");
        return;
    }
    println!(
        "{:<16} {:<10} {:>9} {:>9} {:>12} {:>8}",
        "backend", "status", "successes", "failures", "consecutive", "rate"
    );
    for (backend, state) in states {
        println!(
            "{:<16} {:<10} {:>9} {:>9} {:>12} {:>7.0}%",
            backend,
            state.status.to_string(),
            state.successes,
            state.failures,
            state.consecutive_failures,
            state.success_rate() * 100.0
        );
    }
}

pub fn print_history(session_id: &str, messages: &[Message]) {
    if messages.is_empty() {
        println!("session {session_id} has no history");
        return;
    }
    for message in messages {
        let speaker = match (message.role, message.backend.as_deref()) {
            (Role::User, _) => "user".to_owned(),
            (Role::Assistant, Some(backend)) => format!("assistant ({backend})"),
            (Role::Assistant, None) => "assistant".to_owned(),
        };
        println!(
            "{} {speaker}: {}",
            message.timestamp.format("%Y-%m-%d %H:%M:%S"),
            message.text
        );
    }
}

pub fn print_removed(removed: &[String]) {
    if removed.is_empty() {
        println!("no idle sessions");
    } else {
        println!("removed {} session(s): {}", removed.len(), removed.join(", "));
    }
}

pub fn print_written(path: &Path) {
    println!("wrote default configuration to {}", path.display());
}
