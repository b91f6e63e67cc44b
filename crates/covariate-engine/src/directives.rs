//! Directive table
//!
//! Maps every script keyword to its handler and the scope it may appear in.
//! Scope is checked centrally by [`Engine::dispatch`]; handlers only validate
//! their own arguments.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::condition::ConditionFunction;
use crate::covariate::{CovType, GROUP_SEPARATOR};
use crate::efficiency::{Downsample, EffType, EfficiencyQuery};
use crate::engine::Engine;
use crate::error::GdsError;
use crate::modifier::{Modifier, OrthSet};
use crate::numlist::parse_ranges;
use crate::output::{open_g, save_covariate, save_labels};
use crate::params::SessionParams;
use crate::section::{GeneratorKind, Section, SectionKind, SpikeSpec};
use crate::session::{LabelSource, Session};

/// Where a directive may appear
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Only between sections
    TopLevel,
    /// Only inside an open section
    Body,
    Any,
}

pub type Handler = fn(&mut Engine, &[String]) -> Result<(), GdsError>;

const DIRECTIVES: &[(&str, Scope, Handler)] = &[
    ("gsession", Scope::Any, gsession),
    ("include", Scope::Any, include),
    ("end", Scope::Any, end),
    // common parameters
    ("scan", Scope::TopLevel, scan),
    ("TR", Scope::TopLevel, tr),
    ("tr", Scope::TopLevel, tr),
    ("sampling", Scope::TopLevel, sampling),
    ("length", Scope::TopLevel, length),
    ("condition", Scope::TopLevel, condition),
    ("condition-label-file", Scope::TopLevel, condition_label_file),
    ("condition-label-name", Scope::TopLevel, condition_label_name),
    ("mod-condition-label", Scope::TopLevel, mod_condition_label),
    ("save-condition-label", Scope::TopLevel, save_condition_label),
    ("mean-center-all", Scope::TopLevel, mean_center_all),
    // covariate list
    ("newcov", Scope::TopLevel, newcov),
    ("modcov", Scope::TopLevel, modcov),
    ("modcov+", Scope::TopLevel, modcov_plus),
    ("chkeff", Scope::TopLevel, chkeff),
    ("del-cov", Scope::TopLevel, del_cov),
    ("del-all-cov", Scope::TopLevel, del_all_cov),
    ("save-cov", Scope::TopLevel, save_cov),
    ("openG", Scope::TopLevel, open_g_file),
    // section body
    ("type", Scope::Body, cov_type),
    ("cov-name", Scope::Body, cov_name),
    ("group", Scope::Body, group),
    ("option", Scope::Body, option),
    ("orth-type", Scope::Body, orth_type),
    ("orth-name", Scope::Body, orth_name),
    ("fs-period", Scope::Body, fs_period),
    ("fs-harmonics", Scope::Body, fs_harmonics),
    ("fs-zero-freq", Scope::Body, fs_zero_freq),
    ("fs-delta-cov", Scope::Body, fs_delta_cov),
    ("matrix-row", Scope::Body, matrix_row),
    ("scale", Scope::Body, scale),
    ("center-norm", Scope::Body, center_norm),
    ("scan-length", Scope::Body, scan_length),
    ("absolute", Scope::Body, absolute),
    ("relative", Scope::Body, relative),
    ("downsample", Scope::Body, downsample),
    ("filter", Scope::Body, filter),
    ("eff-type", Scope::Body, eff_type),
    ("eff-cutoff", Scope::Body, eff_cutoff),
];

/// Handler and scope for `keyword`
pub fn lookup(keyword: &str) -> Option<(Scope, Handler)> {
    DIRECTIVES
        .iter()
        .find(|(k, _, _)| *k == keyword)
        .map(|&(_, scope, handler)| (scope, handler))
}

// ---------------------------------------------------------------------------
// argument helpers
// ---------------------------------------------------------------------------

fn none(args: &[String], directive: &str) -> Result<(), GdsError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(GdsError::Syntax(format!("{} takes no arguments", directive)))
    }
}

fn one<'a>(args: &'a [String], usage: &str) -> Result<&'a str, GdsError> {
    match args {
        [arg] => Ok(arg.as_str()),
        _ => Err(GdsError::Syntax(format!("usage: {}", usage))),
    }
}

fn some<'a>(args: &'a [String], usage: &str) -> Result<&'a [String], GdsError> {
    if args.is_empty() {
        Err(GdsError::Syntax(format!("usage: {}", usage)))
    } else {
        Ok(args)
    }
}

fn positive_int<T>(token: &str, what: &str) -> Result<T, GdsError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let value: T = token
        .parse()
        .map_err(|_| GdsError::Syntax(format!("{} must be an integer: {}", what, token)))?;
    if value <= T::default() {
        return Err(GdsError::Semantic(format!("{} must be positive: {}", what, token)));
    }
    Ok(value)
}

fn number(token: &str, what: &str) -> Result<f64, GdsError> {
    token
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| GdsError::Syntax(format!("{} must be a number: {}", what, token)))
}

fn positive_number(token: &str, what: &str) -> Result<f64, GdsError> {
    let value = number(token, what)?;
    if value <= 0.0 {
        return Err(GdsError::Semantic(format!("{} must be positive: {}", what, token)));
    }
    Ok(value)
}

/// yes/no token
pub fn yes_no(token: &str) -> Option<bool> {
    match token {
        "yes" | "Yes" | "YES" | "y" | "Y" | "1" => Some(true),
        "no" | "No" | "NO" | "n" | "N" | "0" => Some(false),
        _ => None,
    }
}

fn flag(args: &[String], directive: &str) -> Result<bool, GdsError> {
    let token = one(args, &format!("{} <y|n>", directive))?;
    yes_no(token).ok_or_else(|| GdsError::Syntax(format!("{} expects y or n: {}", directive, token)))
}

fn plain_name(name: &str) -> Result<(), GdsError> {
    if name.contains(GROUP_SEPARATOR) {
        return Err(GdsError::Semantic(format!(
            "name may not contain \"{}\": {}",
            GROUP_SEPARATOR, name
        )));
    }
    Ok(())
}

fn section(engine: &mut Engine) -> Result<&mut Section, GdsError> {
    engine.section_mut()
}

// ---------------------------------------------------------------------------
// session and common parameters
// ---------------------------------------------------------------------------

fn gsession(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let path = PathBuf::from(one(args, "gsession <path>")?);
    let unclosed = engine
        .session
        .as_mut()
        .and_then(|s| s.pending.take())
        .map(|section| {
            GdsError::Context(format!(
                "{} section opened at line {} is not closed before gsession",
                section.kind.label(),
                section.line
            ))
        });
    if let Some(e) = unclosed {
        engine.fail(e);
    }
    engine.close_session();
    let location = engine.location.clone();
    engine.session = Some(Session::new(
        &path,
        &location.file,
        location.line,
        engine.config.default_sampling_ms,
    ));
    Ok(())
}

fn include(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let path = PathBuf::from(one(args, "include <file>")?);
    engine.include(&path)
}

fn end(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    none(args, "end")?;
    engine.end_section()
}

fn scan(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let session = engine.session_mut()?;
    if session.params.timing().is_some() {
        return Err(GdsError::Context(
            "scan is not allowed after TR and length are resolved".to_string(),
        ));
    }
    match args {
        [file] => session.params.add_scan(Path::new(file))?,
        [name, len] => {
            let len = positive_int::<usize>(len, "scan length")?;
            session.params.add_fake_scan(name, len);
        }
        _ => return Err(GdsError::Syntax("usage: scan <file> [<length>]".to_string())),
    }
    debug!(scans = session.params.scans.len(), "scan declared");
    Ok(())
}

/// Apply a common-parameter change, clearing what it invalidates
fn redefine(engine: &mut Engine, what: &str, clear_scans: bool, clear_condition: bool, set: impl FnOnce(&mut SessionParams)) -> Result<(), GdsError> {
    let session = engine.session_mut()?;
    let had_covariates = !session.covariates.is_empty();
    if had_covariates {
        session.clear_covariates();
        if clear_scans {
            session.params.scans.clear();
        }
        if clear_condition {
            session.condition = None;
        }
    }
    set(&mut session.params);
    session.params.invalidate();
    if had_covariates {
        engine.warn(format!("{} redefined: previous covariates were deleted", what));
    }
    Ok(())
}

fn tr(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let ms = positive_int::<u32>(one(args, "TR <ms>")?, "TR")?;
    redefine(engine, "TR", true, false, |p| p.tr_ms = Some(ms))
}

fn sampling(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let ms = positive_int::<u32>(one(args, "sampling <ms>")?, "sampling")?;
    redefine(engine, "sampling", false, false, |p| p.sampling_ms = ms)
}

fn length(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let n = positive_int::<usize>(one(args, "length <time points>")?, "length")?;
    redefine(engine, "length", true, true, |p| p.length = Some(n))
}

fn condition(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let path = PathBuf::from(one(args, "condition <file>")?);
    let function = ConditionFunction::load(&path)?;
    let session = engine.session_mut()?;
    info!(condition = %path.display(), keys = function.key_count(), "condition function loaded");
    session.condition = Some(function);
    session.label_renames.clear();
    Ok(())
}

/// Set a label source, keeping the old one when the new labels do not fit
fn with_labels(engine: &mut Engine, update: impl FnOnce(&mut Session)) -> Result<(), GdsError> {
    let session = engine.session_mut()?;
    let saved = (session.label_source.clone(), session.label_renames.clone());
    update(session);
    if let Err(e) = session.labelled_condition() {
        session.label_source = saved.0;
        session.label_renames = saved.1;
        return Err(e);
    }
    Ok(())
}

fn condition_label_file(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let path = PathBuf::from(one(args, "condition-label-file <file>")?);
    if matches!(engine.session_mut()?.label_source, Some(LabelSource::Names(_))) {
        return Err(GdsError::Context(
            "condition-label-file and condition-label-name are mutually exclusive".to_string(),
        ));
    }
    with_labels(engine, |s| s.label_source = Some(LabelSource::File(path)))
}

fn condition_label_name(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let names = some(args, "condition-label-name <label...>")?;
    let session = engine.session_mut()?;
    if session.condition.is_none() {
        return Err(GdsError::Context(
            "condition-label-name requires a condition line first".to_string(),
        ));
    }
    match &mut session.label_source {
        Some(LabelSource::File(_)) => Err(GdsError::Context(
            "condition-label-file and condition-label-name are mutually exclusive".to_string(),
        )),
        Some(LabelSource::Names(existing)) => {
            existing.extend(names.iter().cloned());
            Ok(())
        }
        None => {
            session.label_source = Some(LabelSource::Names(names.to_vec()));
            Ok(())
        }
    }
}

fn mod_condition_label(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let [old, new] = args else {
        return Err(GdsError::Syntax("usage: mod-condition-label <old> <new>".to_string()));
    };
    if engine.session_mut()?.condition.is_none() {
        return Err(GdsError::Context("mod-condition-label requires a condition line first".to_string()));
    }
    with_labels(engine, |s| s.label_renames.push((old.clone(), new.clone())))
}

fn save_condition_label(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let path = PathBuf::from(one(args, "save-condition-label <file>")?);
    let validate_only = engine.validate_only;
    let condition = engine
        .session_mut()?
        .labelled_condition()?
        .ok_or_else(|| GdsError::Context("save-condition-label requires a condition line first".to_string()))?;
    if validate_only {
        debug!(path = %path.display(), "validate only: labels not saved");
        return Ok(());
    }
    save_labels(&path, &condition)
}

fn mean_center_all(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    none(args, "mean-center-all")?;
    engine.session_mut()?.mean_center_all = true;
    Ok(())
}

// ---------------------------------------------------------------------------
// covariate list
// ---------------------------------------------------------------------------

/// Parse a `newcov` line; returns the kind and any inline spike positions
fn generator(session: &Session, args: &[String]) -> Result<(GeneratorKind, Option<Vec<usize>>), GdsError> {
    let Some((action, rest)) = args.split_first() else {
        return Err(GdsError::Syntax("newcov needs an action".to_string()));
    };
    let no_args = |kind: GeneratorKind| -> Result<(GeneratorKind, Option<Vec<usize>>), GdsError> {
        none(rest, &format!("newcov {}", action))?;
        Ok((kind, None))
    };
    match action.as_str() {
        "single" => Ok((GeneratorKind::Single(PathBuf::from(one(rest, "newcov single <file>")?)), None)),
        "intercept" => match rest {
            [] => Ok((GeneratorKind::Intercept(None), None)),
            [name] => {
                plain_name(name)?;
                Ok((GeneratorKind::Intercept(Some(name.clone())), None))
            }
            _ => Err(GdsError::Syntax("usage: newcov intercept [name]".to_string())),
        },
        "trial-effect" => {
            let seconds = positive_number(one(rest, "newcov trial-effect <seconds>")?, "trial length")?;
            Ok((GeneratorKind::TrialEffect { seconds }, None))
        }
        "var-trialfx" => Ok((
            GeneratorKind::VarTrial(PathBuf::from(one(rest, "newcov var-trialfx <file>")?)),
            None,
        )),
        "txt-file" => Ok((GeneratorKind::TxtFile(PathBuf::from(one(rest, "newcov txt-file <file>")?)), None)),
        "diagonal" => no_args(GeneratorKind::Diagonal),
        "contrast" => no_args(GeneratorKind::Contrast),
        "scan-effect" => no_args(GeneratorKind::ScanEffect),
        "global-signal" => no_args(GeneratorKind::GlobalSignal),
        "move-params" => no_args(GeneratorKind::MoveParams),
        "spike" if rest.is_empty() => Ok((GeneratorKind::Spike, None)),
        "spike" => Ok((GeneratorKind::Spike, Some(parse_ranges(&rest.join(","))?))),
        "cp" => {
            let source = session.find(one(rest, "newcov cp <covariate name>")?)?;
            Ok((GeneratorKind::Copy { source }, None))
        }
        other => Err(GdsError::Syntax(format!("unknown newcov action: {}", other))),
    }
}

fn newcov(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let mut spikes = None;
    let kind = engine.session_mut().and_then(|session| {
        let (kind, inline) = generator(session, args)?;
        session.timing()?;
        spikes = inline;
        Ok(SectionKind::NewCov(kind))
    });
    engine.open_section(kind)?;
    if let Some(positions) = spikes {
        section(engine)?.body.spikes.push(SpikeSpec::Absolute(positions));
    }
    Ok(())
}

/// Open a section addressed at one existing covariate
fn open_on_target(engine: &mut Engine, args: &[String], usage: &str, make: fn(usize) -> SectionKind) -> Result<(), GdsError> {
    let kind = engine.session_mut().and_then(|session| {
        let target = session.find(one(args, usage)?)?;
        session.timing()?;
        Ok(make(target))
    });
    engine.open_section(kind)
}

fn modcov(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    open_on_target(engine, args, "modcov <covariate name>", |target| SectionKind::ModCov { target })
}

fn modcov_plus(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    open_on_target(engine, args, "modcov+ <covariate name>", |target| SectionKind::ModCovPlus { target })
}

fn chkeff(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    open_on_target(engine, args, "chkeff <base covariate name>", |base| {
        SectionKind::ChkEff(EfficiencyQuery::new(base))
    })
}

fn del_cov(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let names = some(args, "del-cov <covariate name...>")?;
    let session = engine.session_mut()?;
    let indices = names
        .iter()
        .map(|name| session.find(name))
        .collect::<Result<Vec<_>, _>>()?;
    for cov in session.remove_indices(&indices) {
        info!(covariate = %cov.full_name(), "covariate deleted");
    }
    Ok(())
}

fn del_all_cov(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    none(args, "del-all-cov")?;
    engine.session_mut()?.clear_covariates();
    Ok(())
}

fn save_cov(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let [name, file] = args else {
        return Err(GdsError::Syntax("usage: save-cov <covariate name> <file>".to_string()));
    };
    let validate_only = engine.validate_only;
    let session = engine.session_mut()?;
    let index = session.find(name)?;
    let timing = session.timing()?;
    if validate_only {
        debug!(covariate = %name, "validate only: covariate not saved");
        return Ok(());
    }
    save_covariate(Path::new(file), &session.covariates[index], timing)
}

fn open_g_file(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let path = PathBuf::from(one(args, "openG <G matrix file>")?);
    engine.session_mut()?;
    let loaded = open_g(&path)?;

    let mut warnings = Vec::new();
    let condition = match &loaded.condition_file {
        Some(file) => match ConditionFunction::load(file) {
            Ok(mut function) => {
                if !loaded.condition_keys.is_empty() {
                    function.set_labels(loaded.condition_keys.clone())?;
                }
                Some(function)
            }
            Err(e) => {
                warnings.push(format!("condition file named in {} is not usable: {}", path.display(), e));
                None
            }
        },
        None => None,
    };

    let session = engine.session_mut()?;
    if !session.covariates.is_empty() || !session.params.scans.is_empty() {
        warnings.push("openG replaces the previous covariates, scans and TR/length/sampling".to_string());
    }
    let mut params = SessionParams::new(loaded.sampling_ms);
    params.tr_ms = Some(loaded.tr_ms);
    params.length = Some(loaded.total_points);
    params.resolve()?;
    session.params = params;
    session.condition = condition;
    session.label_source = None;
    session.label_renames.clear();
    session.covariates = loaded.covariates;
    info!(
        path = %path.display(),
        covariates = session.covariates.len(),
        from_preg = loaded.from_preg,
        "G matrix opened"
    );

    for w in warnings {
        engine.warn(w);
    }
    if let Some(reason) = loaded.preg_note {
        engine.note(format!("preG file not used: {}", reason));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// section body
// ---------------------------------------------------------------------------

fn cov_type(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let token = one(args, "type <I|N|K>")?;
    let section = section(engine)?;
    section.require_covariate_section("type")?;
    let parsed = CovType::parse(token).ok_or_else(|| GdsError::Syntax(format!("unknown covariate type: {}", token)))?;
    section.body.cov_type = Some(parsed);
    Ok(())
}

fn cov_name(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let names = some(args, "cov-name <name...>")?;
    let section = section(engine)?;
    section.require_covariate_section("cov-name")?;
    for (i, name) in names.iter().enumerate() {
        plain_name(name)?;
        if section.body.names.contains(name) || names[..i].contains(name) {
            return Err(GdsError::Semantic(format!("duplicate covariate name: {}", name)));
        }
    }
    section.body.names.extend(names.iter().cloned());
    Ok(())
}

fn group(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let name = one(args, "group <name>")?;
    plain_name(name)?;
    let section = section(engine)?;
    section.require_covariate_section("group")?;
    let previous = section.body.group.replace(name.to_string());
    if let Some(previous) = previous {
        engine.warn(format!("group {} replaces group {} in this section", name, previous));
    }
    Ok(())
}

fn modifier(args: &[String]) -> Result<Modifier, GdsError> {
    let Some((name, rest)) = args.split_first() else {
        return Err(GdsError::Syntax("option needs a name".to_string()));
    };
    let simple = |m: Modifier| -> Result<Modifier, GdsError> {
        none(rest, &format!("option {}", name))?;
        Ok(m)
    };
    match name.as_str() {
        "mean-center" => simple(Modifier::MeanCenter),
        "mean-center-non-zero" => simple(Modifier::MeanCenterNonZero),
        "unit-variance" => simple(Modifier::UnitVariance),
        "unit-excursion" => simple(Modifier::UnitExcursion),
        "convert-delta" => simple(Modifier::ConvertDelta),
        "orthog" => simple(Modifier::Orthogonalize),
        "eigen-vector" => simple(Modifier::EigenSet),
        "fourier-set" => simple(Modifier::FourierSet),
        "convolve" => match rest {
            [kernel, tr] | [kernel, tr, _] => Ok(Modifier::Convolve {
                kernel: PathBuf::from(kernel),
                kernel_tr_ms: positive_int(tr, "kernel TR")?,
                tag: rest.get(2).cloned(),
            }),
            _ => Err(GdsError::Syntax("usage: option convolve <kernel file> <kernel TR> [tag]".to_string())),
        },
        "time-shift" => {
            let token = one(rest, "option time-shift <ms>")?;
            let ms: i64 = token
                .parse()
                .map_err(|_| GdsError::Syntax(format!("time shift must be an integer: {}", token)))?;
            if ms == 0 {
                return Err(GdsError::Semantic("time shift must not be 0".to_string()));
            }
            Ok(Modifier::TimeShift { ms })
        }
        "multiply" => Ok(Modifier::Multiply {
            full_name: one(rest, "option multiply <covariate name>")?.to_string(),
        }),
        "derivative" => Ok(Modifier::Derivative {
            count: positive_int(one(rest, "option derivative <count>")?, "number of derivatives")?,
        }),
        "exponential" => {
            let power = number(one(rest, "option exponential <power>")?, "exponent")?;
            if power == 0.0 {
                return Err(GdsError::Semantic("exponent must not be 0".to_string()));
            }
            Ok(Modifier::Exponential { power })
        }
        "fir" => {
            let token = one(rest, "option fir <order>")?;
            let order = token
                .parse()
                .map_err(|_| GdsError::Syntax(format!("FIR order must be a non-negative integer: {}", token)))?;
            Ok(Modifier::Fir { order })
        }
        other => Err(GdsError::Syntax(format!("unknown option: {}", other))),
    }
}

fn option(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let parsed = modifier(args)?;
    section(engine)?.push_modifier(parsed)
}

fn orth_type(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let token = one(args, "orth-type <A|I|N|K>")?;
    let set = match token {
        "A" | "a" | "all" | "All" | "ALL" => OrthSet::All,
        other => OrthSet::OfType(
            CovType::parse(other).ok_or_else(|| GdsError::Syntax(format!("unknown orth-type: {}", other)))?,
        ),
    };
    section(engine)?.set_orth(set)
}

fn orth_name(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let names = some(args, "orth-name <covariate name...>")?;
    section(engine)?.set_orth(OrthSet::Names(names.to_vec()))
}

fn fs_period(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let period = positive_number(one(args, "fs-period <seconds>")?, "Fourier period")?;
    section(engine)?.fourier_mut("fs-period")?.period_s = Some(period);
    Ok(())
}

fn fs_harmonics(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let n = positive_int(one(args, "fs-harmonics <count>")?, "number of harmonics")?;
    section(engine)?.fourier_mut("fs-harmonics")?.harmonics = Some(n);
    Ok(())
}

fn fs_zero_freq(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let value = flag(args, "fs-zero-freq")?;
    section(engine)?.fourier_mut("fs-zero-freq")?.zero_freq = value;
    Ok(())
}

fn fs_delta_cov(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let value = flag(args, "fs-delta-cov")?;
    section(engine)?.fourier_mut("fs-delta-cov")?.delta = value;
    Ok(())
}

fn matrix_row(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let weights = some(args, "matrix-row <weight...>")?
        .iter()
        .map(|t| number(t, "contrast weight"))
        .collect::<Result<Vec<_>, _>>()?;
    let section = section(engine)?;
    section.require_generator("matrix-row", |g| matches!(g, GeneratorKind::Contrast), "contrast")?;
    section.body.matrix_rows.push(weights);
    Ok(())
}

fn is_condition_set(g: &GeneratorKind) -> bool {
    matches!(g, GeneratorKind::Diagonal | GeneratorKind::Contrast)
}

fn scale(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let value = flag(args, "scale")?;
    let section = section(engine)?;
    section.require_generator("scale", is_condition_set, "diagonal/contrast")?;
    section.body.scale = Some(value);
    Ok(())
}

fn center_norm(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let value = flag(args, "center-norm")?;
    let section = section(engine)?;
    section.require_generator("center-norm", is_condition_set, "diagonal/contrast")?;
    section.body.center = Some(value);
    Ok(())
}

fn scan_length(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let lengths = some(args, "scan-length <time points...>")?
        .iter()
        .map(|t| positive_int::<usize>(t, "scan length"))
        .collect::<Result<Vec<_>, _>>()?;
    if lengths.len() < 2 {
        return Err(GdsError::Semantic("scan-length needs at least 2 scans".to_string()));
    }
    let session = engine.session_mut()?;
    if !session.params.scans.is_empty() {
        return Err(GdsError::Context("scan-length is not allowed when scans are declared".to_string()));
    }
    let section = section(engine)?;
    section.require_generator("scan-length", |g| matches!(g, GeneratorKind::ScanEffect), "scan-effect")?;
    section.body.scan_lengths = Some(lengths);
    Ok(())
}

fn spike_section<'a>(engine: &'a mut Engine, directive: &str) -> Result<&'a mut Section, GdsError> {
    let section = section(engine)?;
    section.require_generator(directive, |g| matches!(g, GeneratorKind::Spike), "spike")?;
    Ok(section)
}

fn absolute(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let positions = parse_ranges(&some(args, "absolute <positions>")?.join(","))?;
    spike_section(engine, "absolute")?
        .body
        .spikes
        .push(SpikeSpec::Absolute(positions));
    Ok(())
}

fn relative(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let [scan, ranges @ ..] = args else {
        return Err(GdsError::Syntax("usage: relative <scan> <positions>".to_string()));
    };
    if ranges.is_empty() {
        return Err(GdsError::Syntax("usage: relative <scan> <positions>".to_string()));
    }
    let positions = parse_ranges(&ranges.join(","))?;
    spike_section(engine, "relative")?.body.spikes.push(SpikeSpec::Relative {
        scan: scan.clone(),
        positions,
    });
    Ok(())
}

fn downsample(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let token = one(args, "downsample <no|before|after>")?;
    let policy = Downsample::parse(token).ok_or_else(|| GdsError::Syntax(format!("unknown downsample option: {}", token)))?;
    section(engine)?.efficiency_mut("downsample")?.downsample = Some(policy);
    Ok(())
}

fn filter(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let path = PathBuf::from(one(args, "filter <file>")?);
    section(engine)?.efficiency_mut("filter")?.filter = Some(path);
    Ok(())
}

fn eff_type(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let token = one(args, "eff-type <A|I|N>")?;
    let kind = EffType::parse(token).ok_or_else(|| GdsError::Syntax(format!("unknown eff-type: {}", token)))?;
    section(engine)?.efficiency_mut("eff-type")?.eff_type = Some(kind);
    Ok(())
}

fn eff_cutoff(engine: &mut Engine, args: &[String]) -> Result<(), GdsError> {
    let cutoff = positive_number(one(args, "eff-cutoff <value>")?, "efficiency cutoff")?;
    section(engine)?.efficiency_mut("eff-cutoff")?.cutoff = Some(cutoff);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::covariate::Covariate;
    use crate::engine::RunReport;
    use crate::error::{ErrorKind, Severity};
    use proptest::prelude::*;
    use std::fs;

    fn engine_with_session() -> Engine {
        let mut engine = Engine::new(EngineConfig::default(), true);
        let tokens = |s: &str| s.split_whitespace().map(String::from).collect::<Vec<_>>();
        for line in ["gsession out.G", "TR 2000", "sampling 100", "length 10"] {
            engine.dispatch(&tokens(line)).unwrap();
        }
        engine
    }

    fn run(source: &str) -> RunReport {
        Engine::new(EngineConfig::default(), true)
            .run_source(Path::new("test.gds"), source)
            .unwrap()
    }

    fn error_kinds(report: &RunReport) -> Vec<ErrorKind> {
        report
            .diagnostics
            .iter()
            .filter_map(|d| match d.severity {
                Severity::Error(kind) => Some(kind),
                _ => None,
            })
            .collect()
    }

    fn names(report: &RunReport) -> Vec<String> {
        report.sessions[0]
            .covariates
            .iter()
            .map(|c| c.full_name.clone())
            .collect()
    }

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_every_directive_has_one_entry() {
        for (i, (keyword, _, _)) in DIRECTIVES.iter().enumerate() {
            assert!(DIRECTIVES[..i].iter().all(|(k, _, _)| k != keyword), "{}", keyword);
        }
        assert!(lookup("gsession").is_some());
        assert!(lookup("GSESSION").is_none());
    }

    #[test]
    fn test_yes_no_tokens() {
        assert_eq!(yes_no("Y"), Some(true));
        assert_eq!(yes_no("0"), Some(false));
        assert_eq!(yes_no("maybe"), None);
    }

    #[test]
    fn test_dispatch_scope_errors() {
        let mut engine = engine_with_session();
        let err = engine.dispatch(&toks("cov-name x")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Context);
        let err = engine.dispatch(&toks("frobnicate")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);

        engine.dispatch(&toks("newcov intercept")).unwrap();
        let err = engine.dispatch(&toks("newcov intercept")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Context);
        let err = engine.dispatch(&toks("matrix-row 1 2")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Context);
        let err = engine.dispatch(&toks("fs-period 20")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Context);
        engine.dispatch(&toks("end")).unwrap();
        assert_eq!(engine.session().unwrap().covariates.len(), 1);
    }

    #[test]
    fn test_directive_before_gsession() {
        let mut engine = Engine::new(EngineConfig::default(), true);
        let err = engine.dispatch(&toks("TR 2000")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Context);
    }

    #[test]
    fn test_rejected_section_swallows_body() {
        let report = run("gsession a.G\nTR 2000\nlength 10\nnewcov cp nothing\ncov-name x\noption derivative 2\nend\nnewcov intercept\nend\n");
        assert_eq!(error_kinds(&report), vec![ErrorKind::Semantic]);
        assert_eq!(names(&report), vec!["Intercept"]);
    }

    #[test]
    fn test_scenario_trial_effect_blocks() {
        let mut engine = Engine::new(EngineConfig::default(), true);
        for line in ["gsession a.G", "TR 2000", "sampling 100", "length 300", "newcov trial-effect 40", "end"] {
            engine.dispatch(&toks(line)).unwrap();
        }
        let covs = &engine.session().unwrap().covariates;
        assert_eq!(covs.len(), 14);
        for (k, cov) in covs.iter().enumerate() {
            assert_eq!(cov.name, format!("trialfx-{}", k + 1));
            assert_eq!(cov.cov_type, CovType::Interest);
            let mean: f64 = cov.values.iter().sum::<f64>() / cov.values.len() as f64;
            assert!(mean.abs() < 1e-9);
            let high = cov.values.iter().cloned().fold(f64::MIN, f64::max);
            let in_block = cov.values.iter().filter(|&&v| (v - high).abs() < 1e-12).count();
            assert_eq!(in_block, 400);
            assert!((cov.values[k * 400] - high).abs() < 1e-12);
        }
    }

    #[test]
    fn test_scenario_derivatives_follow_source() {
        let mut engine = engine_with_session();
        let session = engine.session.as_mut().unwrap();
        session.timing().unwrap();
        let wave: Vec<f64> = (0..200).map(|i| (i as f64 * std::f64::consts::PI / 50.0).sin()).collect();
        session.covariates.push(Covariate::new("X", CovType::Interest, wave.clone()));
        session.covariates.push(Covariate::new("Y", CovType::NoInterest, vec![0.5; 200]));

        for line in ["newcov cp X", "option derivative 3", "end"] {
            engine.dispatch(&toks(line)).unwrap();
        }
        let covs = &engine.session().unwrap().covariates;
        let names: Vec<_> = covs.iter().map(|c| c.full_name()).collect();
        assert_eq!(names, vec!["X", "X [deriv #0]", "X [deriv #1]", "X [deriv #2]", "Y"]);
        assert_eq!(covs[0].values, wave);
        assert_ne!(covs[1].values, covs[2].values);
    }

    #[test]
    fn test_scenario_constant_efficiency_base() {
        let report = run(
            "gsession a.G\nTR 2000\nlength 10\nnewcov intercept\nend\nnewcov trial-effect 4\nend\n\
             chkeff Intercept\ndownsample no\neff-type A\neff-cutoff 0.5\nend\n",
        );
        assert!(!report.passed);
        assert_eq!(error_kinds(&report), vec![ErrorKind::Numeric]);
        assert_eq!(report.sessions[0].covariates.len(), 5);
    }

    #[test]
    fn test_scenario_collinear_orthogonalization() {
        let mut engine = engine_with_session();
        let session = engine.session.as_mut().unwrap();
        session.timing().unwrap();
        let base: Vec<f64> = (0..200).map(|i| (i % 7) as f64).collect();
        let scaled: Vec<f64> = base.iter().map(|v| v * 2.0).collect();
        let target: Vec<f64> = base.iter().map(|v| v * 3.0).collect();
        session.covariates.push(Covariate::new("A", CovType::Interest, base));
        session.covariates.push(Covariate::new("B", CovType::Interest, scaled));
        session.covariates.push(Covariate::new("T", CovType::Interest, target.clone()));

        for line in ["modcov T", "option orthog", "orth-name A B"] {
            engine.dispatch(&toks(line)).unwrap();
        }
        let err = engine.dispatch(&toks("end")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Numeric);
        let session = engine.session().unwrap();
        assert_eq!(session.covariates[2].values, target);
        assert!(session.pending.is_none());
    }

    #[test]
    fn test_redefining_tr_clears_covariates() {
        let report = run("gsession a.G\nTR 2000\nlength 10\nnewcov intercept\nend\nTR 1000\nnewcov intercept one\nend\n");
        assert!(report.passed);
        assert_eq!(names(&report), vec!["one"]);
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Warning && d.message.contains("TR redefined")));
    }

    #[test]
    fn test_scan_rejected_after_resolution() {
        let report = run("gsession a.G\nTR 2000\nlength 10\nnewcov intercept\nend\nscan fake 10\n");
        assert_eq!(error_kinds(&report), vec![ErrorKind::Context]);
    }

    #[test]
    fn test_contrast_and_labels() {
        let dir = tempfile::tempdir().unwrap();
        let cond = dir.path().join("cond.ref");
        fs::write(&cond, "0\n0\n1\n1\n2\n2\n0\n0\n1\n2\n").unwrap();
        let labels = dir.path().join("labels.txt");
        let script = format!(
            "gsession a.G\nTR 2000\nlength 10\ncondition {}\ncondition-label-name rest tap look\n\
             mod-condition-label look watch\nnewcov contrast\nmatrix-row 0 1 -1\nend\n\
             newcov diagonal\ngroup cond\nend\nsave-condition-label {}\n",
            cond.display(),
            labels.display()
        );
        let report = run(&script);
        assert!(report.passed, "{:?}", report.diagnostics);
        assert_eq!(
            names(&report),
            vec!["contrast/1.00*tap+-1.00*watch", "cond->tap", "cond->watch"]
        );
        assert!(!labels.exists());
    }

    #[test]
    fn test_label_sources_are_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let cond = dir.path().join("cond.ref");
        fs::write(&cond, "0\n1\n").unwrap();
        let labels = dir.path().join("labels.txt");
        fs::write(&labels, "rest\ntap\n").unwrap();
        let script = format!(
            "gsession a.G\nTR 2000\nlength 2\ncondition {}\ncondition-label-name rest tap\ncondition-label-file {}\n",
            cond.display(),
            labels.display()
        );
        let report = run(&script);
        assert_eq!(error_kinds(&report)[0], ErrorKind::Context);
    }

    #[test]
    fn test_spike_inline_and_relative() {
        let report = run(
            "gsession a.G\nTR 2000\nscan first 5\nscan second 5\nnewcov spike \"1, 3\"\nrelative second 0-1\nrelative 0 4\nend\n",
        );
        assert!(report.passed, "{:?}", report.diagnostics);
        assert_eq!(names(&report), vec!["spike-1", "spike-3", "spike-5", "spike-6", "spike-4"]);
    }

    #[test]
    fn test_open_g_replaces_session() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("first.G");
        let script = format!(
            "gsession {}\nTR 2000\nsampling 500\nlength 8\nnewcov intercept\nend\nnewcov trial-effect 4\ngroup blocks\nend\n",
            out.display()
        );
        Engine::new(EngineConfig::default(), false)
            .run_source(Path::new("a.gds"), &script)
            .unwrap();

        let reopen = format!(
            "gsession second.G\nTR 3000\nlength 4\nnewcov intercept other\nend\nopenG {}\nmodcov blocks->trialfx-1\ncov-name first-block\nend\n",
            out.display()
        );
        let report = run(&reopen);
        assert!(report.passed, "{:?}", report.diagnostics);
        assert_eq!(
            names(&report),
            vec!["Intercept", "blocks->first-block", "blocks->trialfx-2", "blocks->trialfx-3"]
        );
        assert!(report.diagnostics.iter().any(|d| d.severity == Severity::Warning));
    }

    #[test]
    fn test_del_cov_and_group_warning() {
        let report = run(
            "gsession a.G\nTR 2000\nlength 10\nnewcov trial-effect 4\ngroup a\ngroup b\nend\ndel-cov b->trialfx-2 b->trialfx-4\n",
        );
        assert!(report.passed);
        assert_eq!(names(&report), vec!["b->trialfx-1", "b->trialfx-3"]);
        assert_eq!(
            report.diagnostics.iter().filter(|d| d.severity == Severity::Warning).count(),
            1
        );
    }

    #[test]
    fn test_cov_name_rules() {
        let mut engine = engine_with_session();
        engine.dispatch(&toks("newcov intercept")).unwrap();
        assert_eq!(engine.dispatch(&toks("cov-name g->x")).unwrap_err().kind(), ErrorKind::Semantic);
        assert_eq!(engine.dispatch(&toks("cov-name a a")).unwrap_err().kind(), ErrorKind::Semantic);
        engine.dispatch(&toks("cov-name base")).unwrap();
        engine.dispatch(&toks("end")).unwrap();
        assert_eq!(engine.session().unwrap().covariates[0].name, "base");
    }

    proptest! {
        #[test]
        fn test_full_names_stay_unique(picks in proptest::collection::vec(0usize..4, 1..8)) {
            let pool = ["a", "b", "c", "d"];
            let mut engine = engine_with_session();
            for p in picks {
                let _ = engine.dispatch(&toks(&format!("newcov intercept {}", pool[p])));
                let _ = engine.dispatch(&toks("end"));
            }
            let covs = &engine.session().unwrap().covariates;
            for (i, c) in covs.iter().enumerate() {
                prop_assert!(covs[..i].iter().all(|o| o.full_name() != c.full_name()));
            }
        }
    }
}
