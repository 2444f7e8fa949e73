use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use casesmith::config::ServiceConfig;
use casesmith::data::Report;
use casesmith::render::{render_openapi_scaffold, render_report};
use casesmith::server;
use casesmith::spec_parser::parse_spec;

/// Runs the HTTP service
pub async fn serve(config: ServiceConfig) -> Result<()> {
    let config = config.validate().context("Invalid service configuration")?;
    server::serve(config).await
}

/// Renders a report JSON file into a pytest module
pub fn render(report_path: &Path, output: Option<PathBuf>) -> Result<()> {
    let text = read_input(report_path)?;
    let report = Report::from_json(&text)
        .with_context(|| format!("{} is not a valid report", report_path.display()))?;
    info!(cases = report.test_cases.len(), "rendering report");
    let code = render_report(&report)?;
    write_output(&code, output)
}

/// Builds a deterministic test skeleton from an OpenAPI document
pub fn scaffold(spec_path: &Path, output: Option<PathBuf>) -> Result<()> {
    let text = read_input(spec_path)?;
    let document = parse_spec(&text)
        .with_context(|| format!("Failed to parse {}", spec_path.display()))?;
    let code = render_openapi_scaffold(&document)?;
    write_output(&code, output)
}

fn read_input(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn write_output(code: &str, output: Option<PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            fs::write(&path, code).with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), bytes = code.len(), "wrote generated tests");
        }
        None => print!("{}", code),
    }
    Ok(())
}
