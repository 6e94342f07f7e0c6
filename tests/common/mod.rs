//! Shared fixtures for integration tests

use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Build a fake usage log tree: one project directory per `(project, lines)`
/// pair, each holding a single JSONL file.
pub fn usage_tree(projects: &[(&str, &[&str])]) -> TempDir {
    let root = TempDir::new().expect("create temp dir");
    for (project, lines) in projects {
        let dir = root.path().join(project);
        fs::create_dir_all(&dir).expect("create project dir");
        write_jsonl(&dir.join("usage.jsonl"), lines);
    }
    root
}

pub fn write_jsonl(path: &Path, lines: &[&str]) {
    let mut content = String::new();
    for line in lines {
        content.push_str(line);
        content.push('\n');
    }
    fs::write(path, content).expect("write jsonl file");
}

/// A well-formed usage line
pub fn usage_line(
    session: &str,
    timestamp: &str,
    model: &str,
    input: u64,
    output: u64,
    cost: Option<f64>,
) -> String {
    let cost_field = match cost {
        Some(c) => format!(",\"costUSD\":{c}"),
        None => String::new(),
    };
    format!(
        "{{\"sessionId\":\"{session}\",\"timestamp\":\"{timestamp}\",\"model\":\"{model}\",\
         \"usage\":{{\"input_tokens\":{input},\"output_tokens\":{output},\
         \"cache_creation_input_tokens\":0,\"cache_read_input_tokens\":0}}{cost_field}}}"
    )
}
