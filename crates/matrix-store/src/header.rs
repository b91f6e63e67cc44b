//! G Matrix Header Model

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// One `Parameter:` line, describing a matrix column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterInfo {
    /// Column index
    pub index: usize,
    /// Type label (Interest, NoInterest, KeepNoInterest, Dependent, Undefined)
    pub kind: String,
    /// Full covariate name, `group->name` when grouped
    pub full_name: String,
}

/// Header shared by the `.G` and `.preG` files of a session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GHeader {
    /// Creation stamp, `HH:MM:SS_YYYY-MM-DD`
    pub created: Option<String>,
    /// Repetition time (ms)
    pub tr_ms: Option<u32>,
    /// Fine sampling resolution (ms)
    pub sampling_ms: Option<u32>,
    /// Condition function file, if one was used
    pub condition_file: Option<String>,
    /// Condition key labels in key order
    pub condition_keys: Vec<String>,
    /// One entry per column
    pub parameters: Vec<ParameterInfo>,
}

impl GHeader {
    /// Format a creation stamp
    pub fn timestamp(now: DateTime<Local>) -> String {
        format!("{}_{}", now.format("%H:%M:%S"), now.format("%Y-%m-%d"))
    }

    /// Render the header lines (without matrix framing)
    pub fn to_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(created) = &self.created {
            lines.push(format!("DateCreated:\t{}", created));
        }
        if let Some(tr) = self.tr_ms {
            lines.push(format!("TR(ms):\t\t{}", tr));
        }
        if let Some(sampling) = self.sampling_ms {
            lines.push(format!("Sampling(ms):\t{}", sampling));
        }
        if let Some(file) = &self.condition_file {
            if !self.condition_keys.is_empty() {
                lines.push(format!("ConditionFile:\t{}", file));
                for (i, key) in self.condition_keys.iter().enumerate() {
                    lines.push(format!("Condition:\t{}\t{}", i, key));
                }
            }
        }
        lines.push(String::new());
        for p in &self.parameters {
            lines.push(format!("Parameter:\t{}\t{}\t{}", p.index, p.kind, p.full_name));
        }
        lines
    }

    /// Parse header lines; unknown lines are ignored
    pub fn parse(lines: &[String]) -> Self {
        let mut header = Self::default();
        for line in lines {
            let fields: Vec<&str> = line.split('\t').filter(|f| !f.is_empty()).collect();
            let Some((&tag, rest)) = fields.split_first() else {
                continue;
            };
            match tag {
                "DateCreated:" => header.created = rest.first().map(|s| s.to_string()),
                "TR(ms):" => header.tr_ms = rest.first().and_then(|s| s.trim().parse().ok()),
                "Sampling(ms):" => {
                    header.sampling_ms = rest.first().and_then(|s| s.trim().parse().ok())
                }
                "ConditionFile:" => header.condition_file = Some(rest.join("\t")),
                "Condition:" | "ConditionKey:" if rest.len() >= 2 => {
                    header.condition_keys.push(rest[1..].join("\t"));
                }
                "Parameter:" if rest.len() >= 3 => {
                    if let Ok(index) = rest[0].trim().parse() {
                        header.parameters.push(ParameterInfo {
                            index,
                            kind: rest[1].to_string(),
                            full_name: rest[2..].join("\t"),
                        });
                    }
                }
                _ => {}
            }
        }
        header
    }
}
