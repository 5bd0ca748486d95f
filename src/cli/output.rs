//! JSON output for CLI commands
//!
//! Every command prints exactly one JSON object with a `success` flag.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Value, json};

#[derive(Debug, Clone)]
pub struct OutputContext {
    /// Paths under this root are printed relative to it
    root: PathBuf,
}

impl OutputContext {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn relative_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| path.display().to_string())
    }

    /// Print `data`'s fields next to `"success": true`
    pub fn print_success<T: Serialize>(&self, data: T) {
        print_json(&success_value(data));
    }

    pub fn print_error(&self, message: &str) {
        print_json(&error_value(message));
    }
}

fn success_value<T: Serialize>(data: T) -> Value {
    let mut response = serde_json::to_value(data).unwrap_or_else(|_| json!({}));
    match response.as_object_mut() {
        Some(obj) => {
            obj.insert("success".to_string(), json!(true));
            response
        }
        None => json!({ "success": true, "data": response }),
    }
}

pub fn error_value(message: &str) -> Value {
    json!({ "success": false, "error": message })
}

pub fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Failed to serialize output: {e}"),
    }
}
