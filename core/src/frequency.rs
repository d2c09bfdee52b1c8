//! Per-record attribute frequencies feeding the weight fitting engine.
//!
//! Stored column-major: one column per attribute, one cell per record.
//! Zero cells read back as `epsilon` so weighted sums never hit an
//! exact zero; `exhibitors` still reflects the raw counts.

use crate::microdata::{AttributeCode, MicrodataRecord};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct FrequencyMatrix {
    index: HashMap<AttributeCode, usize>,
    record_count: usize,
    counts: Vec<Vec<u32>>,
    values: Vec<Vec<f64>>,
    exhibitors: Vec<Vec<usize>>,
}

impl FrequencyMatrix {
    pub fn build(records: &[MicrodataRecord], attributes: Vec<AttributeCode>, epsilon: f64) -> Self {
        let mut index = HashMap::with_capacity(attributes.len());
        let mut counts = Vec::with_capacity(attributes.len());
        let mut values = Vec::with_capacity(attributes.len());
        let mut exhibitors = Vec::with_capacity(attributes.len());

        for (a, code) in attributes.iter().enumerate() {
            index.insert(code.clone(), a);
            let column: Vec<u32> = records.iter().map(|r| r.frequency(code)).collect();
            values.push(
                column
                    .iter()
                    .map(|&c| if c == 0 { epsilon } else { c as f64 })
                    .collect(),
            );
            exhibitors.push(
                column
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| **c > 0)
                    .map(|(i, _)| i)
                    .collect(),
            );
            counts.push(column);
        }

        Self {
            index,
            record_count: records.len(),
            counts,
            values,
            exhibitors,
        }
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn index_of(&self, code: &AttributeCode) -> Option<usize> {
        self.index.get(code).copied()
    }

    /// Raw member count of `record` for attribute column `attr`.
    pub fn count(&self, attr: usize, record: usize) -> u32 {
        self.counts[attr][record]
    }

    /// Epsilon-substituted frequency column for `attr`.
    pub fn column(&self, attr: usize) -> &[f64] {
        &self.values[attr]
    }

    /// Records with a non-zero raw count for `attr`.
    pub fn exhibitors(&self, attr: usize) -> &[usize] {
        &self.exhibitors[attr]
    }

    /// Σ weight·frequency over every record.
    pub fn weighted_sum(&self, attr: usize, weights: &[f64]) -> f64 {
        self.values[attr]
            .iter()
            .zip(weights)
            .map(|(f, w)| f * w)
            .sum()
    }
}
