//! Simulator result report (`results.xml`)
//!
//! ```text
//! <report>
//!     <detail>
//!         <bot_3-1><fitness_score>0.42</fitness_score>...</bot_3-1>
//!     </detail>
//! </report>
//! ```
//!
//! The element name is `<label>_<id>`. Only the configured label is
//! stripped, so labels and ids may both contain `_`.

use std::collections::BTreeMap;

use crate::error::ReportError;
use crate::xml::{walk, XmlNode};

/// Fitness per organism id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationReport {
    entries: BTreeMap<String, f64>,
}

/// Organism id of a result tag written for files labelled `label`
pub fn split_result_tag<'a>(tag: &'a str, label: &str) -> Result<&'a str, ReportError> {
    match tag
        .strip_prefix(label)
        .and_then(|rest| rest.strip_prefix('_'))
    {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(ReportError::MalformedTag(tag.to_string())),
    }
}

impl SimulationReport {
    /// Parse a report whose result tags carry `label`. Non-finite scores are
    /// kept as reported; deciding what they mean is up to the caller.
    pub fn parse(xml: &str, label: &str) -> Result<Self, ReportError> {
        let mut scores: Vec<(String, String)> = Vec::new();
        walk(xml, |node| {
            if let XmlNode::Text { path, text } = node {
                let n = path.len();
                if n >= 3 && path[n - 1] == "fitness_score" && path[n - 3] == "detail" {
                    scores.push((path[n - 2].clone(), text.to_string()));
                }
            }
        })?;

        let mut entries = BTreeMap::new();
        for (tag, value) in scores {
            let id = split_result_tag(&tag, label)?;
            let fitness = value
                .trim()
                .parse::<f64>()
                .map_err(|_| ReportError::InvalidFitness {
                    tag: tag.clone(),
                    value: value.clone(),
                })?;
            entries.insert(id.to_string(), fitness);
        }
        Ok(Self { entries })
    }

    pub fn fitness(&self, id: &str) -> Option<f64> {
        self.entries.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(id, f)| (id.as_str(), *f))
    }
}
