//! Pending section state

use std::path::PathBuf;

use crate::covariate::CovType;
use crate::efficiency::EfficiencyQuery;
use crate::error::GdsError;
use crate::modifier::{Modifier, OrthSet};

/// Producer named on a `newcov` line
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratorKind {
    Single(PathBuf),
    Intercept(Option<String>),
    TrialEffect { seconds: f64 },
    VarTrial(PathBuf),
    Diagonal,
    Contrast,
    ScanEffect,
    GlobalSignal,
    MoveParams,
    Spike,
    TxtFile(PathBuf),
    /// Copy of the covariate at `source`
    Copy { source: usize },
}

impl GeneratorKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            GeneratorKind::Single(_) => "single",
            GeneratorKind::Intercept(_) => "intercept",
            GeneratorKind::TrialEffect { .. } => "trial-effect",
            GeneratorKind::VarTrial(_) => "var-trialfx",
            GeneratorKind::Diagonal => "diagonal",
            GeneratorKind::Contrast => "contrast",
            GeneratorKind::ScanEffect => "scan-effect",
            GeneratorKind::GlobalSignal => "global-signal",
            GeneratorKind::MoveParams => "move-params",
            GeneratorKind::Spike => "spike",
            GeneratorKind::TxtFile(_) => "txt-file",
            GeneratorKind::Copy { .. } => "cp",
        }
    }
}

/// Kind of the open section with its typed payload
#[derive(Debug, Clone, PartialEq)]
pub enum SectionKind {
    NewCov(GeneratorKind),
    /// Modify the covariate at `target` in place
    ModCov { target: usize },
    /// Modify, possibly expanding into several covariates
    ModCovPlus { target: usize },
    ChkEff(EfficiencyQuery),
    /// Opening line was rejected; the body is consumed silently
    Rejected,
}

impl SectionKind {
    pub fn label(&self) -> &'static str {
        match self {
            SectionKind::NewCov(_) => "newcov",
            SectionKind::ModCov { .. } => "modcov",
            SectionKind::ModCovPlus { .. } => "modcov+",
            SectionKind::ChkEff(_) => "chkeff",
            SectionKind::Rejected => "rejected",
        }
    }
}

/// Spike positions
#[derive(Debug, Clone, PartialEq)]
pub enum SpikeSpec {
    /// Time points counted from the session start
    Absolute(Vec<usize>),
    /// Time points inside one scan, named or indexed
    Relative { scan: String, positions: Vec<usize> },
}

/// Fourier-set parameters
#[derive(Debug, Clone, PartialEq)]
pub struct FourierParams {
    /// Window period (seconds)
    pub period_s: Option<f64>,
    pub harmonics: Option<usize>,
    /// Add a DC window covariate
    pub zero_freq: bool,
    /// Delta-convert the source before convolving
    pub delta: bool,
}

impl Default for FourierParams {
    fn default() -> Self {
        Self {
            period_s: None,
            harmonics: None,
            zero_freq: false,
            delta: true,
        }
    }
}

/// Everything collected between the opening line and `end`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionBody {
    /// Output names by position
    pub names: Vec<String>,
    pub group: Option<String>,
    pub cov_type: Option<CovType>,
    pub pipeline: Vec<Modifier>,
    pub orth: Option<OrthSet>,
    pub fourier: FourierParams,
    pub scale: Option<bool>,
    pub center: Option<bool>,
    pub matrix_rows: Vec<Vec<f64>>,
    pub scan_lengths: Option<Vec<usize>>,
    pub spikes: Vec<SpikeSpec>,
}

impl SectionBody {
    /// Position of the compound modifier, if any
    pub fn compound_index(&self) -> Option<usize> {
        self.pipeline.iter().position(Modifier::is_compound)
    }

    /// Pipeline steps before and after the compound modifier
    pub fn split_pipeline(&self) -> (&[Modifier], Option<&Modifier>, &[Modifier]) {
        match self.compound_index() {
            Some(i) => (&self.pipeline[..i], Some(&self.pipeline[i]), &self.pipeline[i + 1..]),
            None => (&self.pipeline, None, &[]),
        }
    }

    pub fn has_fourier(&self) -> bool {
        self.pipeline.contains(&Modifier::FourierSet)
    }
}

/// The single in-progress section of a session
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub kind: SectionKind,
    /// Script line that opened the section
    pub line: usize,
    pub body: SectionBody,
    /// Set once any directive of this section failed
    pub failed: bool,
}

impl Section {
    pub fn new(kind: SectionKind, line: usize) -> Self {
        Self {
            failed: matches!(kind, SectionKind::Rejected),
            kind,
            line,
            body: SectionBody::default(),
        }
    }

    fn is_newcov(&self, want: impl Fn(&GeneratorKind) -> bool) -> bool {
        matches!(&self.kind, SectionKind::NewCov(g) if want(g))
    }

    /// Reject body directives that only belong to covariate sections
    pub fn require_covariate_section(&self, directive: &str) -> Result<(), GdsError> {
        match self.kind {
            SectionKind::ChkEff(_) => Err(GdsError::Context(format!(
                "{} is not allowed in a chkeff section",
                directive
            ))),
            _ => Ok(()),
        }
    }

    pub fn require_generator(&self, directive: &str, want: impl Fn(&GeneratorKind) -> bool, label: &str) -> Result<(), GdsError> {
        if self.is_newcov(want) {
            Ok(())
        } else {
            Err(GdsError::Context(format!(
                "{} is only allowed in a newcov {} section",
                directive, label
            )))
        }
    }

    /// Efficiency query of an open chkeff section
    pub fn efficiency_mut(&mut self, directive: &str) -> Result<&mut EfficiencyQuery, GdsError> {
        match &mut self.kind {
            SectionKind::ChkEff(query) => Ok(query),
            _ => Err(GdsError::Context(format!(
                "{} is only allowed in a chkeff section",
                directive
            ))),
        }
    }

    /// Append a modifier, enforcing section restrictions
    pub fn push_modifier(&mut self, modifier: Modifier) -> Result<(), GdsError> {
        self.require_covariate_section("option")?;
        let keyword = modifier.keyword();
        if modifier.is_copy_only() && !self.is_newcov(|g| matches!(g, GeneratorKind::Copy { .. })) {
            return Err(GdsError::Context(format!(
                "option {} is only allowed in a newcov cp section",
                keyword
            )));
        }
        if modifier.is_expand_only() && !matches!(self.kind, SectionKind::ModCovPlus { .. }) {
            return Err(GdsError::Context(format!(
                "option {} is only allowed in a modcov+ section",
                keyword
            )));
        }
        if modifier.is_compound() {
            if let Some(i) = self.body.compound_index() {
                return Err(GdsError::Context(format!(
                    "option {} cannot be combined with option {}",
                    keyword,
                    self.body.pipeline[i].keyword()
                )));
            }
        }
        if modifier == Modifier::Orthogonalize && self.body.pipeline.contains(&Modifier::Orthogonalize) {
            return Err(GdsError::Syntax("option orthog given twice".to_string()));
        }
        self.body.pipeline.push(modifier);
        Ok(())
    }

    /// Record the orthogonalization set; orth-type and orth-name are exclusive
    pub fn set_orth(&mut self, set: OrthSet) -> Result<(), GdsError> {
        self.require_covariate_section("orth-type/orth-name")?;
        if !self.body.pipeline.contains(&Modifier::Orthogonalize) {
            return Err(GdsError::Context(
                "orth-type/orth-name must follow option orthog".to_string(),
            ));
        }
        if self.body.orth.is_some() {
            return Err(GdsError::Context(
                "orth-type and orth-name are mutually exclusive".to_string(),
            ));
        }
        self.body.orth = Some(set);
        Ok(())
    }

    /// Fourier-set parameters of a pending fourier-set option
    pub fn fourier_mut(&mut self, directive: &str) -> Result<&mut FourierParams, GdsError> {
        if !self.body.has_fourier() {
            return Err(GdsError::Context(format!(
                "{} is only allowed after option fourier-set",
                directive
            )));
        }
        Ok(&mut self.body.fourier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn copy_section() -> Section {
        Section::new(SectionKind::NewCov(GeneratorKind::Copy { source: 0 }), 1)
    }

    #[test]
    fn test_compound_placement() {
        let mut section = copy_section();
        assert!(section.push_modifier(Modifier::Fir { order: 2 }).is_err());
        section.push_modifier(Modifier::MeanCenter).unwrap();
        section.push_modifier(Modifier::Derivative { count: 2 }).unwrap();
        let err = section.push_modifier(Modifier::Exponential { power: 2.0 }).unwrap_err();
        assert!(matches!(err, GdsError::Context(_)));
        section.push_modifier(Modifier::UnitVariance).unwrap();

        let (before, compound, after) = section.body.split_pipeline();
        assert_eq!(before, &[Modifier::MeanCenter]);
        assert_eq!(compound, Some(&Modifier::Derivative { count: 2 }));
        assert_eq!(after, &[Modifier::UnitVariance]);
    }

    #[test]
    fn test_expand_only_in_modcov_plus() {
        let mut plain = Section::new(SectionKind::ModCov { target: 0 }, 1);
        assert!(plain.push_modifier(Modifier::EigenSet).is_err());
        let mut plus = Section::new(SectionKind::ModCovPlus { target: 0 }, 1);
        plus.push_modifier(Modifier::EigenSet).unwrap();
        assert!(plus.push_modifier(Modifier::FourierSet).is_err());
    }

    #[test]
    fn test_orth_rules() {
        let mut section = copy_section();
        assert!(section.set_orth(OrthSet::All).is_err());
        section.push_modifier(Modifier::Orthogonalize).unwrap();
        section.set_orth(OrthSet::All).unwrap();
        let err = section.set_orth(OrthSet::Names(vec!["a".into()])).unwrap_err();
        assert!(matches!(err, GdsError::Context(_)));
    }

    #[test]
    fn test_fourier_params_need_fourier_option() {
        let mut section = Section::new(SectionKind::ModCovPlus { target: 0 }, 3);
        assert!(section.fourier_mut("fs-period").is_err());
        section.push_modifier(Modifier::FourierSet).unwrap();
        section.fourier_mut("fs-period").unwrap().period_s = Some(30.0);
        assert_eq!(section.body.fourier.period_s, Some(30.0));
        assert!(section.body.fourier.delta);
    }

    #[test]
    fn test_rejected_section_is_failed() {
        let section = Section::new(SectionKind::Rejected, 9);
        assert!(section.failed);
    }
}
