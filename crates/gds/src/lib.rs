//! gds command line
//!
//! Argument parsing, logging setup and report printing around
//! [`covariate_engine::Engine`].

mod cli;
mod sample;

pub use cli::Cli;
pub use sample::SAMPLE_SCRIPT;

use anyhow::Context;
use covariate_engine::{Engine, EngineConfig, RunReport};
use std::fs;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Initialize logging. Log lines go to stderr so stdout carries the report.
pub fn init_logging(level: Level, json: bool) -> anyhow::Result<()> {
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())
            .context("failed to set tracing subscriber")?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())
            .context("failed to set tracing subscriber")?;
    }
    Ok(())
}

/// Classic text rendering of a run report
pub fn render_report(report: &RunReport) -> String {
    let mut out = String::new();
    for diagnostic in &report.diagnostics {
        out.push_str(&diagnostic.to_string());
        out.push('\n');
    }
    for session in &report.sessions {
        out.push_str(&session.status_line(report.validate_only));
        out.push('\n');
    }
    let status = if report.passed { "pass" } else { "fail" };
    out.push_str(&format!("Script {}: {}\n", report.script.display(), status));
    out
}

/// Run the command line; `Ok(true)` when every session passed
pub fn run(cli: &Cli) -> anyhow::Result<bool> {
    if cli.sample {
        print!("{}", SAMPLE_SCRIPT);
        return Ok(true);
    }
    if let Some(path) = &cli.write_sample {
        fs::write(path, SAMPLE_SCRIPT).with_context(|| format!("cannot write {}", path.display()))?;
        println!("sample script written to {}", path.display());
        return Ok(true);
    }

    let script = cli
        .script
        .as_deref()
        .context("no script given; run gds --help for usage")?;
    let config = EngineConfig::load(cli.config.as_deref()).context("invalid configuration")?;
    info!(script = %script.display(), validate_only = cli.validate, "gds starting");

    let report = Engine::new(config, cli.validate).run_file(script)?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }
    Ok(report.passed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::Path;

    #[test]
    fn test_sample_script_validates() {
        let report = Engine::new(EngineConfig::default(), true)
            .run_source(Path::new("sample.gds"), SAMPLE_SCRIPT)
            .unwrap();
        let errors: Vec<_> = report.diagnostics.iter().filter(|d| d.is_error()).collect();
        assert!(errors.is_empty(), "{:?}", errors);
        assert!(report.passed);
        assert_eq!(report.sessions.len(), 1);

        let names: Vec<_> = report.sessions[0]
            .covariates
            .iter()
            .map(|c| c.full_name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "Intercept",
                "blocks->trialfx-1",
                "blocks->slope1",
                "blocks->slope2",
                "blocks->trialfx-2 [FIR0]",
                "blocks->trialfx-2 [FIR1]",
                "blocks->trialfx-2 [FIR2]",
                "blocks->trialfx-3",
                "blocks->trialfx-4",
                "blocks->trialfx-5",
                "spike-10",
                "spike-20",
                "spike-68",
                "spike-69",
                "spike-70",
            ]
        );
    }

    #[test]
    fn test_render_report() {
        let report = Engine::new(EngineConfig::default(), true)
            .run_source(Path::new("x.gds"), "gsession out.G\nTR 2000\nlength 5\nbogus\n")
            .unwrap();
        let text = render_report(&report);
        assert!(text.contains("GDS SYNTAX ERROR in x.gds [line 4]:\n--- unknown tag: bogus"));
        assert!(text.contains("Syntax check status of out.G: fail"));
        assert!(text.ends_with("Script x.gds: fail\n"));
    }

    #[test]
    fn test_write_sample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.gds");
        let cli = Cli::try_parse_from(["gds", "-x", path.to_str().unwrap()]).unwrap();
        assert!(run(&cli).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), SAMPLE_SCRIPT);
    }

    #[test]
    fn test_missing_script_is_hard_error() {
        let cli = Cli::try_parse_from(["gds", "/nonexistent/run.gds"]).unwrap();
        assert!(run(&cli).is_err());
        let cli = Cli::try_parse_from(["gds"]).unwrap();
        assert!(run(&cli).is_err());
    }

    #[test]
    fn test_run_writes_matrices() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("run.gds");
        let out = dir.path().join("out");
        fs::write(
            &script,
            format!("gsession {}\nTR 2000\nlength 6\nnewcov intercept\nend\n", out.display()),
        )
        .unwrap();
        let cli = Cli::try_parse_from(["gds", "--json", script.to_str().unwrap()]).unwrap();
        assert!(run(&cli).unwrap());
        assert!(out.join("out.G").exists());
        assert!(out.join("out.preG").exists());
    }
}
