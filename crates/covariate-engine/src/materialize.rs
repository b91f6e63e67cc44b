//! Section close: validate, materialize, splice
//!
//! Every routine computes its complete list of new covariates before the
//! session's covariate list is touched, then applies one splice.

use tracing::{debug, info};
use vector_ops::SpectralOps;

use crate::compound::expand;
use crate::config::EngineConfig;
use crate::covariate::{CovType, Covariate};
use crate::efficiency::evaluate;
use crate::error::GdsError;
use crate::generators::{default_type, generate, GeneratorInput};
use crate::modifier::{apply_all, Modifier, ModifierContext, Working};
use crate::params::Timing;
use crate::section::{GeneratorKind, Section, SectionBody, SectionKind};
use crate::session::Session;

/// What closing a section produced besides covariates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionOutcome {
    /// Covariates added (net)
    pub added: usize,
    pub warnings: Vec<String>,
    pub notes: Vec<String>,
}

/// Range of the list replaced by a splice: `(start, count)`
type Replaced = Option<(usize, usize)>;

fn in_range(i: usize, replaced: Replaced) -> bool {
    matches!(replaced, Some((start, count)) if i >= start && i < start + count)
}

/// Full names must stay unique across the session
fn check_names(existing: &[Covariate], new: &[Covariate], replaced: Replaced) -> Result<(), GdsError> {
    for (k, cov) in new.iter().enumerate() {
        let full = cov.full_name();
        let clash = existing
            .iter()
            .enumerate()
            .any(|(i, c)| !in_range(i, replaced) && c.full_name() == full)
            || new[..k].iter().any(|c| c.full_name() == full);
        if clash {
            return Err(GdsError::Semantic(format!(
                "covariate name already used in this session: {}",
                full
            )));
        }
    }
    Ok(())
}

/// At most one Dependent covariate may remain
fn check_dependent(existing: &[Covariate], new: &[Covariate], replaced: Replaced) -> Result<(), GdsError> {
    let kept = existing
        .iter()
        .enumerate()
        .filter(|(i, c)| !in_range(*i, replaced) && c.cov_type == CovType::Dependent)
        .count();
    let added = new.iter().filter(|c| c.cov_type == CovType::Dependent).count();
    if kept + added > 1 {
        return Err(GdsError::Semantic(
            "operation would leave more than one dependent covariate".to_string(),
        ));
    }
    Ok(())
}

fn run_steps(
    steps: &[Modifier],
    working: &mut Working,
    covariates: &[Covariate],
    exclude: Option<usize>,
    body: &SectionBody,
    timing: Timing,
    ops: &mut SpectralOps,
) -> Result<(), GdsError> {
    let ctx = ModifierContext {
        covariates,
        exclude,
        orth: body.orth.as_ref(),
        timing,
    };
    apply_all(steps, working, &ctx, ops)
}

/// Turn working outputs into covariates, naming them by position
fn finish(outputs: Vec<Working>, body: &SectionBody, cov_type: CovType, group: Option<String>) -> Vec<Covariate> {
    outputs
        .into_iter()
        .enumerate()
        .map(|(i, w)| {
            let name = body.names.get(i).cloned().unwrap_or(w.name);
            let mut cov = Covariate::new(name, cov_type, w.values);
            cov.group = group.clone();
            cov
        })
        .collect()
}

/// Outputs holding NaN or infinite samples are kept but reported
fn non_finite_warnings(new: &[Covariate]) -> Vec<String> {
    new.iter()
        .filter(|c| c.values.iter().any(|v| !v.is_finite()))
        .map(|c| format!("covariate has non-finite values: {}", c.full_name()))
        .collect()
}

/// Close the pending section of `session`
pub fn close_section(
    session: &mut Session,
    section: Section,
    config: &EngineConfig,
    ops: &mut SpectralOps,
) -> Result<SectionOutcome, GdsError> {
    if section.body.pipeline.contains(&Modifier::Orthogonalize) && section.body.orth.is_none() {
        return Err(GdsError::Syntax(
            "option orthog needs an orth-type or orth-name line".to_string(),
        ));
    }
    let timing = session.timing()?;
    let body = &section.body;
    let outcome = match &section.kind {
        SectionKind::NewCov(GeneratorKind::Copy { source }) => copy(session, *source, body, timing, config, ops)?,
        SectionKind::NewCov(kind) => generated(session, kind, body, timing, ops)?,
        SectionKind::ModCov { target } => modify(session, *target, body, timing, ops)?,
        SectionKind::ModCovPlus { target } => match body.split_pipeline() {
            (_, None, _) => modify(session, *target, body, timing, ops)?,
            (before, Some(compound), after) => {
                modify_expand(session, *target, body, (before, compound, after), timing, config, ops)?
            }
        },
        SectionKind::ChkEff(query) => {
            let result = evaluate(query, &session.covariates, timing, config, ops)?;
            let removed = session.remove_indices(&result.deleted);
            let notes = removed
                .iter()
                .map(|c| format!("covariate deleted because of efficiency check: {}", c.full_name()))
                .collect();
            SectionOutcome {
                added: 0,
                warnings: result.warnings,
                notes,
            }
        }
        SectionKind::Rejected => SectionOutcome::default(),
    };
    debug!(section = section.kind.label(), line = section.line, added = outcome.added, "section closed");
    Ok(outcome)
}

fn generated(
    session: &mut Session,
    kind: &GeneratorKind,
    body: &SectionBody,
    timing: Timing,
    ops: &mut SpectralOps,
) -> Result<SectionOutcome, GdsError> {
    let condition = match kind {
        GeneratorKind::Diagonal | GeneratorKind::Contrast => session.labelled_condition()?,
        _ => None,
    };
    let input = GeneratorInput {
        timing,
        scans: &session.params.scans,
        condition: condition.as_ref(),
    };
    let mut outputs = generate(kind, body, &input)?;
    for w in outputs.iter_mut() {
        run_steps(&body.pipeline, w, &session.covariates, None, body, timing, ops)?;
    }

    let cov_type = body.cov_type.unwrap_or_else(|| default_type(kind));
    let mut new = finish(outputs, body, cov_type, body.group.clone());
    if matches!(kind, GeneratorKind::Intercept(_)) {
        for cov in new.iter_mut() {
            cov.intercept = true;
        }
    }
    check_names(&session.covariates, &new, None)?;

    let added = new.len();
    for cov in &new {
        info!(covariate = %cov.full_name(), kind = cov.cov_type.label(), "covariate added");
    }
    session.covariates.append(&mut new);
    Ok(SectionOutcome {
        added,
        ..SectionOutcome::default()
    })
}

fn copy(
    session: &mut Session,
    source: usize,
    body: &SectionBody,
    timing: Timing,
    config: &EngineConfig,
    ops: &mut SpectralOps,
) -> Result<SectionOutcome, GdsError> {
    let src = session
        .covariates
        .get(source)
        .cloned()
        .ok_or_else(|| GdsError::Semantic("copy source no longer exists".to_string()))?;
    let copy_number = src.copies + 1;
    let cov_type = body.cov_type.unwrap_or(src.cov_type);
    let group = body.group.clone().or_else(|| src.group.clone());

    let (before, compound, after) = body.split_pipeline();
    let (new, insert_at) = match compound {
        None => {
            let mut w = Working {
                name: format!("{}_cp{}", src.name, copy_number),
                values: src.values.clone(),
            };
            run_steps(&body.pipeline, &mut w, &session.covariates, None, body, timing, ops)?;
            (finish(vec![w], body, cov_type, group), session.covariates.len())
        }
        Some(compound) => {
            if src.intercept {
                return Err(GdsError::Semantic(format!(
                    "{} cannot be applied to the intercept covariate",
                    compound.keyword()
                )));
            }
            let mut w = Working {
                name: src.name.clone(),
                values: src.values.clone(),
            };
            run_steps(before, &mut w, &session.covariates, None, body, timing, ops)?;
            let mut outputs = expand(compound, &w, &body.fourier, timing, config, ops)?;
            for out in outputs.iter_mut() {
                run_steps(after, out, &session.covariates, None, body, timing, ops)?;
            }
            (finish(outputs, body, cov_type, group), source + 1)
        }
    };

    check_names(&session.covariates, &new, None)?;
    check_dependent(&session.covariates, &new, None)?;
    session.covariates[source].copies = copy_number;
    let added = new.len();
    let warnings = non_finite_warnings(&new);
    session.splice(insert_at, 0, new);
    info!(source = %src.full_name(), added, "covariate copied");
    Ok(SectionOutcome {
        added,
        warnings,
        ..SectionOutcome::default()
    })
}

fn target_covariate(session: &Session, target: usize) -> Result<Covariate, GdsError> {
    session
        .covariates
        .get(target)
        .cloned()
        .ok_or_else(|| GdsError::Semantic("covariate to modify no longer exists".to_string()))
}

fn modify(
    session: &mut Session,
    target: usize,
    body: &SectionBody,
    timing: Timing,
    ops: &mut SpectralOps,
) -> Result<SectionOutcome, GdsError> {
    let orig = target_covariate(session, target)?;
    let mut w = Working {
        name: orig.name.clone(),
        values: orig.values.clone(),
    };
    run_steps(&body.pipeline, &mut w, &session.covariates, Some(target), body, timing, ops)?;

    let mut updated = orig;
    updated.name = body.names.first().cloned().unwrap_or(w.name);
    updated.values = w.values;
    if let Some(group) = &body.group {
        updated.group = Some(group.clone());
    }
    if let Some(cov_type) = body.cov_type {
        updated.cov_type = cov_type;
    }
    let new = [updated];
    check_names(&session.covariates, &new, Some((target, 1)))?;
    let [updated] = new;
    info!(covariate = %updated.full_name(), "covariate modified");
    session.covariates[target] = updated;
    Ok(SectionOutcome::default())
}

fn modify_expand(
    session: &mut Session,
    target: usize,
    body: &SectionBody,
    (before, compound, after): (&[Modifier], &Modifier, &[Modifier]),
    timing: Timing,
    config: &EngineConfig,
    ops: &mut SpectralOps,
) -> Result<SectionOutcome, GdsError> {
    let orig = target_covariate(session, target)?;
    if orig.intercept {
        return Err(GdsError::Semantic(format!(
            "{} cannot be applied to the intercept covariate",
            compound.keyword()
        )));
    }
    let mut w = Working {
        name: orig.name.clone(),
        values: orig.values.clone(),
    };
    run_steps(before, &mut w, &session.covariates, Some(target), body, timing, ops)?;
    let mut outputs = expand(compound, &w, &body.fourier, timing, config, ops)?;
    for out in outputs.iter_mut() {
        run_steps(after, out, &session.covariates, Some(target), body, timing, ops)?;
    }

    let cov_type = body.cov_type.unwrap_or(orig.cov_type);
    let group = body.group.clone().or(orig.group.clone());
    let new = finish(outputs, body, cov_type, group);
    check_names(&session.covariates, &new, Some((target, 1)))?;
    check_dependent(&session.covariates, &new, Some((target, 1)))?;

    let added = new.len();
    let warnings = non_finite_warnings(&new);
    session.splice(target, 1, new);
    info!(source = %orig.full_name(), outputs = added, "covariate expanded");
    Ok(SectionOutcome {
        added: added.saturating_sub(1),
        warnings,
        ..SectionOutcome::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn session() -> Session {
        let mut s = Session::new(Path::new("out.G"), Path::new("t.gds"), 1, 100);
        s.params.tr_ms = Some(2000);
        s.params.length = Some(10);
        s
    }

    fn blocks(period: usize) -> Vec<f64> {
        (0..200).map(|i| if (i / period) % 2 == 0 { 0.0 } else { 1.0 }).collect()
    }

    #[test]
    fn test_name_clash_rejected() {
        let mut s = session();
        s.covariates.push(Covariate::new("trialfx-1", CovType::Interest, vec![0.0; 200]));
        let section = Section::new(SectionKind::NewCov(GeneratorKind::TrialEffect { seconds: 4.0 }), 2);
        let err = close_section(&mut s, section, &EngineConfig::default(), &mut SpectralOps::new()).unwrap_err();
        assert!(matches!(err, GdsError::Semantic(_)));
        assert_eq!(s.covariates.len(), 1);
    }

    #[test]
    fn test_plain_copy_is_appended() {
        let mut s = session();
        s.covariates.push(Covariate::new("X", CovType::Interest, blocks(20)));
        s.covariates.push(Covariate::new("Y", CovType::NoInterest, blocks(30)));
        let section = Section::new(SectionKind::NewCov(GeneratorKind::Copy { source: 0 }), 2);
        close_section(&mut s, section, &EngineConfig::default(), &mut SpectralOps::new()).unwrap();
        assert_eq!(s.covariates[2].name, "X_cp1");
        assert_eq!(s.covariates[2].values, s.covariates[0].values);
        assert_eq!(s.covariates[0].copies, 1);
    }

    #[test]
    fn test_fractional_power_of_negative_values_warns() {
        let mut s = session();
        s.covariates.push(Covariate::new("X", CovType::Interest, blocks(20)));
        let mut section = Section::new(SectionKind::NewCov(GeneratorKind::Copy { source: 0 }), 2);
        section.push_modifier(Modifier::MeanCenter).unwrap();
        section.push_modifier(Modifier::Exponential { power: 0.5 }).unwrap();
        let outcome = close_section(&mut s, section, &EngineConfig::default(), &mut SpectralOps::new()).unwrap();
        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.warnings, vec!["covariate has non-finite values: X [^0.5]".to_string()]);
        assert_eq!(s.covariates[1].name, "X [^0.5]");

        let mut section = Section::new(SectionKind::NewCov(GeneratorKind::Copy { source: 0 }), 3);
        section.push_modifier(Modifier::Exponential { power: 2.0 }).unwrap();
        let outcome = close_section(&mut s, section, &EngineConfig::default(), &mut SpectralOps::new()).unwrap();
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_modcov_renames_in_place() {
        let mut s = session();
        s.covariates.push(Covariate::new("X", CovType::Interest, blocks(20)));
        let mut section = Section::new(SectionKind::ModCov { target: 0 }, 2);
        section.body.names.push("Xc".to_string());
        section.body.cov_type = Some(CovType::NoInterest);
        section.push_modifier(Modifier::MeanCenter).unwrap();
        close_section(&mut s, section, &EngineConfig::default(), &mut SpectralOps::new()).unwrap();
        assert_eq!(s.covariates[0].name, "Xc");
        assert_eq!(s.covariates[0].cov_type, CovType::NoInterest);
        let mean: f64 = s.covariates[0].values.iter().sum::<f64>() / 200.0;
        assert!(mean.abs() < 1e-12);
    }

    #[test]
    fn test_fir_replaces_target() {
        let mut s = session();
        s.covariates.push(Covariate::new("A", CovType::NoInterest, blocks(10)));
        s.covariates.push(Covariate::new("X", CovType::Interest, blocks(25)));
        s.covariates.push(Covariate::new("B", CovType::NoInterest, blocks(40)));
        let mut section = Section::new(SectionKind::ModCovPlus { target: 1 }, 2);
        section.push_modifier(Modifier::Fir { order: 2 }).unwrap();
        section.body.names.push("first".to_string());
        let outcome = close_section(&mut s, section, &EngineConfig::default(), &mut SpectralOps::new()).unwrap();
        assert_eq!(outcome.added, 2);
        let names: Vec<_> = s.covariates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["A", "first", "X [FIR1]", "X [FIR2]", "B"]);
    }

    #[test]
    fn test_compound_rejects_intercept() {
        let mut s = session();
        let mut intercept = Covariate::new("Intercept", CovType::KeepNoInterest, vec![1.0; 200]);
        intercept.intercept = true;
        s.covariates.push(intercept);
        let mut section = Section::new(SectionKind::ModCovPlus { target: 0 }, 2);
        section.push_modifier(Modifier::Fir { order: 1 }).unwrap();
        let err = close_section(&mut s, section, &EngineConfig::default(), &mut SpectralOps::new()).unwrap_err();
        assert!(matches!(err, GdsError::Semantic(_)));
        assert_eq!(s.covariates.len(), 1);
    }

    #[test]
    fn test_dependent_limit() {
        let mut s = session();
        s.covariates.push(Covariate::new("D", CovType::Dependent, blocks(20)));
        let mut section = Section::new(SectionKind::NewCov(GeneratorKind::Copy { source: 0 }), 2);
        section.push_modifier(Modifier::Derivative { count: 2 }).unwrap();
        let err = close_section(&mut s, section, &EngineConfig::default(), &mut SpectralOps::new()).unwrap_err();
        assert!(matches!(err, GdsError::Semantic(_)));
    }

    #[test]
    fn test_orthog_without_set() {
        let mut s = session();
        let mut section = Section::new(SectionKind::NewCov(GeneratorKind::Intercept(None)), 2);
        section.push_modifier(Modifier::Orthogonalize).unwrap();
        let err = close_section(&mut s, section, &EngineConfig::default(), &mut SpectralOps::new()).unwrap_err();
        assert!(matches!(err, GdsError::Syntax(_)));
    }
}
