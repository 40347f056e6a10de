use std::path::{Path, PathBuf};

use anyhow::Context;
use regex_lite::Regex;
use serde::Deserialize;

/// Crates that perform I/O and must stay out of the domain crate.
const FORBIDDEN_DOMAIN_DEPS: &[&str] = &[
    "axum",
    "dotenvy",
    "hyper",
    "reqwest",
    "sqlx",
    "tokio",
    "tower",
    "tower-http",
    "tracing-subscriber",
];

const DOMAIN_PACKAGE: &str = "worldarchitect-domain";

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("arch-check") => arch_check(),
        Some(cmd) => anyhow::bail!("Unknown xtask command: {cmd}"),
        None => anyhow::bail!("Usage: cargo xtask <command>\n\nCommands:\n  arch-check"),
    }
}

#[derive(Debug, Deserialize)]
struct Metadata {
    packages: Vec<Package>,
}

#[derive(Debug, Deserialize)]
struct Package {
    name: String,
    manifest_path: PathBuf,
    dependencies: Vec<Dependency>,
}

#[derive(Debug, Deserialize)]
struct Dependency {
    name: String,
    #[serde(default)]
    kind: Option<String>,
}

/// The domain crate stays pure: no I/O dependencies and no I/O calls.
fn arch_check() -> anyhow::Result<()> {
    let output = std::process::Command::new("cargo")
        .args(["metadata", "--format-version", "1", "--no-deps"])
        .output()
        .context("running cargo metadata")?;

    if !output.status.success() {
        anyhow::bail!("cargo metadata failed")
    }

    let metadata: Metadata =
        serde_json::from_slice(&output.stdout).context("parsing cargo metadata")?;
    let domain = metadata
        .packages
        .iter()
        .find(|package| package.name == DOMAIN_PACKAGE)
        .with_context(|| format!("package {DOMAIN_PACKAGE} not found in workspace"))?;

    let mut violations = forbidden_dependencies(domain);

    let src = domain
        .manifest_path
        .parent()
        .map(|dir| dir.join("src"))
        .context("domain manifest has no parent directory")?;
    violations.extend(scan_sources(&src)?);

    if violations.is_empty() {
        println!("arch-check: {DOMAIN_PACKAGE} is free of I/O");
        Ok(())
    } else {
        for violation in &violations {
            eprintln!("arch-check: {violation}");
        }
        anyhow::bail!("{} architecture violation(s)", violations.len())
    }
}

fn forbidden_dependencies(package: &Package) -> Vec<String> {
    package
        .dependencies
        .iter()
        // dev-dependencies may pull in test runtimes
        .filter(|dep| dep.kind.as_deref() != Some("dev"))
        .filter(|dep| FORBIDDEN_DOMAIN_DEPS.contains(&dep.name.as_str()))
        .map(|dep| format!("{} depends on I/O crate `{}`", package.name, dep.name))
        .collect()
}

fn scan_sources(dir: &Path) -> anyhow::Result<Vec<String>> {
    let io_call = Regex::new(r"\b(std::fs|std::net|std::process|tokio::)").context("io regex")?;
    let mut violations = Vec::new();

    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            violations.extend(scan_sources(&path)?);
            continue;
        }
        if path.extension().and_then(|ext| ext.to_str()) != Some("rs") {
            continue;
        }

        let source = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        for (index, line) in source.lines().enumerate() {
            let code = line.split("//").next().unwrap_or_default();
            if let Some(found) = io_call.find(code) {
                violations.push(format!(
                    "{}:{} uses `{}`",
                    path.display(),
                    index + 1,
                    found.as_str()
                ));
            }
        }
    }

    Ok(violations)
}
