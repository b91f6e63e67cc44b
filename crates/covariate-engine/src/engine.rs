//! Script runner
//!
//! Processes directives strictly in order. Every failing directive becomes a
//! [`Diagnostic`] and latches the current session invalid; processing goes on
//! so one pass reports every problem. Only an unreadable top-level script or
//! an output path that cannot be written stops the run.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use vector_ops::SpectralOps;

use crate::config::EngineConfig;
use crate::covariate::CovType;
use crate::directives::{lookup, Scope};
use crate::error::{Diagnostic, ErrorKind, GdsError, Severity};
use crate::output::write_matrices;
use crate::section::{Section, SectionKind};
use crate::session::Session;
use crate::tokenizer::tokenize;

/// Script position of the directive being processed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub file: PathBuf,
    pub line: usize,
}

/// One output column as reported
#[derive(Debug, Clone, Serialize)]
pub struct CovariateSummary {
    pub full_name: String,
    pub cov_type: CovType,
}

/// Outcome of one session
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    /// Path given on the `gsession` line
    pub path: PathBuf,
    pub passed: bool,
    /// `.G` file written, if any
    pub written: Option<PathBuf>,
    pub covariates: Vec<CovariateSummary>,
}

impl SessionReport {
    /// Classic one-line status
    pub fn status_line(&self, validate_only: bool) -> String {
        match (validate_only, self.passed) {
            (true, true) => format!("Syntax check status of {}: pass", self.path.display()),
            (true, false) => format!("Syntax check status of {}: fail", self.path.display()),
            (false, true) => format!("Final status of {}: pass", self.path.display()),
            (false, false) => format!(
                "Final status of {}: fail\nG matrix file generation aborted",
                self.path.display()
            ),
        }
    }
}

/// Outcome of a whole script
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub script: PathBuf,
    pub validate_only: bool,
    pub passed: bool,
    pub sessions: Vec<SessionReport>,
    pub diagnostics: Vec<Diagnostic>,
}

/// The covariate engine
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) validate_only: bool,
    pub(crate) ops: SpectralOps,
    pub(crate) session: Option<Session>,
    pub(crate) include_stack: Vec<PathBuf>,
    pub(crate) location: Location,
    diagnostics: Vec<Diagnostic>,
    reports: Vec<SessionReport>,
    /// Errors raised outside any session
    orphan_errors: bool,
    /// Set when an output could not be written
    halted: Option<String>,
}

impl Engine {
    pub fn new(config: EngineConfig, validate_only: bool) -> Self {
        Self {
            config,
            validate_only,
            ops: SpectralOps::new(),
            session: None,
            include_stack: Vec::new(),
            location: Location::default(),
            diagnostics: Vec::new(),
            reports: Vec::new(),
            orphan_errors: false,
            halted: None,
        }
    }

    pub fn validate_only(&self) -> bool {
        self.validate_only
    }

    /// Current session, if one is open
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Run a script file and finalize the last session
    pub fn run_file(mut self, path: &Path) -> Result<RunReport, GdsError> {
        let source = fs::read_to_string(path)
            .map_err(|e| GdsError::File(format!("cannot open script {}: {}", path.display(), e)))?;
        info!(script = %path.display(), validate_only = self.validate_only, "running script");
        self.include_stack.push(canonical(path));
        self.process(path, &source);
        self.include_stack.pop();
        self.finish(path)
    }

    /// Run script text held in memory
    pub fn run_source(mut self, name: &Path, source: &str) -> Result<RunReport, GdsError> {
        self.include_stack.push(canonical(name));
        self.process(name, source);
        self.include_stack.pop();
        self.finish(name)
    }

    fn finish(mut self, script: &Path) -> Result<RunReport, GdsError> {
        if self.halted.is_none() {
            self.close_session();
        }
        if let Some(reason) = self.halted {
            return Err(GdsError::File(reason));
        }
        let passed = !self.orphan_errors && self.reports.iter().all(|r| r.passed);
        Ok(RunReport {
            script: script.to_path_buf(),
            validate_only: self.validate_only,
            passed,
            sessions: self.reports,
            diagnostics: self.diagnostics,
        })
    }

    /// Process every line of `source`
    pub(crate) fn process(&mut self, file: &Path, source: &str) {
        for (i, line) in source.lines().enumerate() {
            if self.halted.is_some() {
                break;
            }
            self.location = Location {
                file: file.to_path_buf(),
                line: i + 1,
            };
            let result = tokenize(line).and_then(|tokens| self.dispatch(&tokens));
            if let Err(e) = result {
                self.fail(e);
            }
        }
    }

    /// Look up and run one tokenized directive
    pub fn dispatch(&mut self, tokens: &[String]) -> Result<(), GdsError> {
        let Some((keyword, args)) = tokens.split_first() else {
            return Ok(());
        };
        let (scope, handler) = lookup(keyword).ok_or_else(|| GdsError::Syntax(format!("unknown tag: {}", keyword)))?;
        let pending = self.session.as_ref().and_then(|s| s.pending.as_ref());
        match (scope, pending) {
            (Scope::TopLevel, Some(section)) => {
                return Err(GdsError::Context(format!(
                    "{} is not allowed in the middle of a {} section",
                    keyword,
                    section.kind.label()
                )))
            }
            (Scope::Body, None) => {
                return Err(GdsError::Context(format!(
                    "{} must be inside a newcov/modcov/modcov+/chkeff section",
                    keyword
                )))
            }
            (Scope::Body, Some(section)) if matches!(section.kind, SectionKind::Rejected) => return Ok(()),
            _ => {}
        }
        debug!(directive = %keyword, line = self.location.line, "dispatch");
        handler(self, args)
    }

    fn push(&mut self, severity: Severity, message: String) {
        let diagnostic = Diagnostic {
            file: self.location.file.clone(),
            line: self.location.line,
            severity,
            message,
        };
        match severity {
            Severity::Error(_) => error!(file = %diagnostic.file.display(), line = diagnostic.line, "{}", diagnostic.message),
            Severity::Warning => warn!(file = %diagnostic.file.display(), line = diagnostic.line, "{}", diagnostic.message),
            Severity::Info => info!(file = %diagnostic.file.display(), line = diagnostic.line, "{}", diagnostic.message),
        }
        self.diagnostics.push(diagnostic);
    }

    /// Record an error and latch the current session invalid
    pub(crate) fn fail(&mut self, error: GdsError) {
        self.push(Severity::Error(error.kind()), error.to_string());
        match self.session.as_mut() {
            Some(session) => {
                session.valid = false;
                if let Some(section) = session.pending.as_mut() {
                    section.failed = true;
                }
            }
            None => self.orphan_errors = true,
        }
    }

    pub(crate) fn warn(&mut self, message: impl Into<String>) {
        self.push(Severity::Warning, message.into());
    }

    pub(crate) fn note(&mut self, message: impl Into<String>) {
        self.push(Severity::Info, message.into());
    }

    pub(crate) fn session_mut(&mut self) -> Result<&mut Session, GdsError> {
        self.session
            .as_mut()
            .ok_or_else(|| GdsError::Context("gsession not defined".to_string()))
    }

    pub(crate) fn section_mut(&mut self) -> Result<&mut Section, GdsError> {
        self.session_mut()?
            .pending
            .as_mut()
            .ok_or_else(|| GdsError::Context("no open section".to_string()))
    }

    /// Open a section, or swallow its body when opening failed
    pub(crate) fn open_section(&mut self, kind: Result<SectionKind, GdsError>) -> Result<(), GdsError> {
        let line = self.location.line;
        let session = self.session_mut()?;
        match kind {
            Ok(kind) => {
                debug!(section = kind.label(), line, "section opened");
                session.pending = Some(Section::new(kind, line));
                Ok(())
            }
            Err(e) => {
                session.pending = Some(Section::new(SectionKind::Rejected, line));
                Err(e)
            }
        }
    }

    /// `end`: close the pending section
    pub(crate) fn end_section(&mut self) -> Result<(), GdsError> {
        let session = self.session_mut()?;
        let section = session
            .pending
            .take()
            .ok_or_else(|| GdsError::Context("end without a newcov/modcov/modcov+/chkeff line".to_string()))?;
        if section.failed {
            debug!(section = section.kind.label(), line = section.line, "failed section discarded");
            return Ok(());
        }
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let outcome = crate::materialize::close_section(session, section, &self.config, &mut self.ops)?;
        for w in outcome.warnings {
            self.warn(w);
        }
        for n in outcome.notes {
            self.note(n);
        }
        Ok(())
    }

    /// Finalize the open session: check, write, report
    pub(crate) fn close_session(&mut self) {
        if self.session.is_none() {
            return;
        }
        if let Err(e) = self.check_session() {
            self.fail(e);
        }
        let Some(session) = self.session.take() else {
            return;
        };

        let mut written = None;
        if session.valid && !self.validate_only {
            let result = session
                .params
                .timing()
                .ok_or_else(|| GdsError::Semantic("session timing unresolved".to_string()))
                .and_then(|timing| {
                    let condition = session.labelled_condition()?;
                    write_matrices(
                        &session.g_path(),
                        &session.preg_path(),
                        &session.covariates,
                        timing,
                        condition.as_ref(),
                        session.mean_center_all,
                    )
                });
            match result {
                Ok(()) => written = Some(session.g_path()),
                Err(e) => {
                    let reason = format!("cannot write {}: {}", session.g_path().display(), e);
                    self.push(Severity::Error(ErrorKind::File), reason.clone());
                    self.halted = Some(reason);
                }
            }
        }

        let report = SessionReport {
            path: session.path.clone(),
            passed: session.valid && self.halted.is_none(),
            written,
            covariates: session
                .covariates
                .iter()
                .map(|c| CovariateSummary {
                    full_name: c.full_name(),
                    cov_type: c.cov_type,
                })
                .collect(),
        };
        info!("{}", report.status_line(self.validate_only));
        self.reports.push(report);
    }

    fn check_session(&mut self) -> Result<(), GdsError> {
        let session = self.session_mut()?;
        if let Some(section) = session.pending.take() {
            return Err(GdsError::Context(format!(
                "{} section opened at line {} is not closed",
                section.kind.label(),
                section.line
            )));
        }
        if session.covariates.is_empty() {
            return Err(GdsError::Semantic(format!(
                "no covariates defined in session {}",
                session.path.display()
            )));
        }
        let timing = session.timing()?;
        if let Some(condition) = session.labelled_condition()? {
            condition.fine_codes(&timing)?;
        }
        Ok(())
    }

    /// `include`: run another script inside the current session
    pub(crate) fn include(&mut self, path: &Path) -> Result<(), GdsError> {
        if self.include_stack.len() >= self.config.max_include_depth {
            return Err(GdsError::Context(format!(
                "include nesting deeper than {} levels",
                self.config.max_include_depth
            )));
        }
        let key = canonical(path);
        if self.include_stack.contains(&key) {
            return Err(GdsError::Context(format!("recursive include of {}", path.display())));
        }
        let source = fs::read_to_string(path)
            .map_err(|e| GdsError::File(format!("cannot open include file {}: {}", path.display(), e)))?;
        debug!(include = %path.display(), depth = self.include_stack.len(), "include");
        let saved = self.location.clone();
        self.include_stack.push(key);
        self.process(path, &source);
        self.include_stack.pop();
        self.location = saved;
        Ok(())
    }
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
