//! Covariate model

use serde::Serialize;
use vector_ops::VectorSummary;

use crate::error::GdsError;

/// Separator between group and name in a full covariate name
pub const GROUP_SEPARATOR: &str = "->";

/// Role of a covariate in the GLM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CovType {
    Interest,
    NoInterest,
    KeepNoInterest,
    Dependent,
    Undefined,
}

impl CovType {
    /// Parse a `type` directive argument
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "I" | "i" | "Interest" | "interest" => Some(Self::Interest),
            "N" | "n" | "NoInterest" | "Nointerest" | "noInterest" | "nointerest" => Some(Self::NoInterest),
            "K" | "k" | "KeepNoInterest" | "keepNoInterest" | "keepNointerest" | "keepnointerest" => {
                Some(Self::KeepNoInterest)
            }
            _ => None,
        }
    }

    /// Type for a `Parameter:` header label
    pub fn from_label(label: &str) -> Self {
        match label {
            "Interest" => Self::Interest,
            "NoInterest" => Self::NoInterest,
            "KeepNoInterest" => Self::KeepNoInterest,
            "Dependent" => Self::Dependent,
            _ => Self::Undefined,
        }
    }

    /// Label written to `Parameter:` header lines
    pub fn label(&self) -> &'static str {
        match self {
            Self::Interest => "Interest",
            Self::NoInterest => "NoInterest",
            Self::KeepNoInterest => "KeepNoInterest",
            Self::Dependent => "Dependent",
            Self::Undefined => "Undefined",
        }
    }
}

/// One design-matrix column
#[derive(Debug, Clone, PartialEq)]
pub struct Covariate {
    pub name: String,
    /// Optional group; the full name becomes `group->name`
    pub group: Option<String>,
    pub cov_type: CovType,
    /// Samples at the session's fine resolution
    pub values: Vec<f64>,
    /// Number of copies made with `newcov cp`
    pub copies: u32,
    /// Reserved intercept column
    pub intercept: bool,
}

impl Covariate {
    pub fn new(name: impl Into<String>, cov_type: CovType, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            group: None,
            cov_type,
            values,
            copies: 0,
            intercept: false,
        }
    }

    /// `group->name`, or just `name` when ungrouped
    pub fn full_name(&self) -> String {
        match &self.group {
            Some(group) => format!("{}{}{}", group, GROUP_SEPARATOR, self.name),
            None => self.name.clone(),
        }
    }

    /// Constant nonzero columns are treated as intercepts when read back
    pub fn looks_like_intercept(&self) -> bool {
        let summary = VectorSummary::compute(&self.values);
        summary.is_constant() && summary.mean != 0.0
    }
}

/// Index of the one covariate whose full name is `full_name`
pub fn find_unique(covariates: &[Covariate], full_name: &str) -> Result<usize, GdsError> {
    let mut matches = covariates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.full_name() == full_name)
        .map(|(i, _)| i);
    match (matches.next(), matches.next()) {
        (Some(i), None) => Ok(i),
        (None, _) => Err(GdsError::Semantic(format!("covariate not found: {}", full_name))),
        (Some(_), Some(_)) => Err(GdsError::Semantic(format!(
            "more than one covariate named {}",
            full_name
        ))),
    }
}

/// Split a full name into group and name at the first `->`
pub fn split_full_name(full: &str) -> (Option<String>, String) {
    match full.split_once(GROUP_SEPARATOR) {
        Some((group, name)) => (Some(group.to_string()), name.to_string()),
        None => (None, full.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_aliases() {
        assert_eq!(CovType::parse("K"), Some(CovType::KeepNoInterest));
        assert_eq!(CovType::parse("nointerest"), Some(CovType::NoInterest));
        assert_eq!(CovType::parse("D"), None);
        assert_eq!(CovType::from_label("Dependent"), CovType::Dependent);
        assert_eq!(CovType::from_label("???"), CovType::Undefined);
    }

    #[test]
    fn test_full_name() {
        let mut cov = Covariate::new("tap", CovType::Interest, vec![0.0, 1.0]);
        assert_eq!(cov.full_name(), "tap");
        cov.group = Some("motor".to_string());
        assert_eq!(cov.full_name(), "motor->tap");
        assert_eq!(split_full_name("motor->tap"), (Some("motor".to_string()), "tap".to_string()));
        assert_eq!(split_full_name("tap"), (None, "tap".to_string()));
    }

    #[test]
    fn test_find_unique() {
        let covs = vec![
            Covariate::new("a", CovType::Interest, vec![]),
            Covariate::new("b", CovType::Interest, vec![]),
            Covariate::new("b", CovType::NoInterest, vec![]),
        ];
        assert_eq!(find_unique(&covs, "a").unwrap(), 0);
        assert!(find_unique(&covs, "b").is_err());
        assert!(find_unique(&covs, "c").is_err());
    }
}
