use std::collections::BTreeMap;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::models::JobRecord;
use crate::store::TabularStore;

/// A pay figure with an optional thousands suffix, e.g. `45,000` or `120k`.
static FIGURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:,\d{3})*(?:\.\d+)?)\s?(k\b)?").expect("valid regex")
});

const BLANK: &str = "(none)";

/// Low and high ends of a `Comp` cell; a single figure is both ends.
pub fn parse_comp_range(text: &str) -> Option<(f64, f64)> {
    let figures: Vec<(f64, bool)> = FIGURE
        .captures_iter(text)
        .filter_map(|caps| {
            let value: f64 = caps[1].replace(',', "").parse().ok()?;
            Some((value, caps.get(2).is_some()))
        })
        .take(2)
        .collect();

    let scale = |(value, k): (f64, bool)| if k { value * 1000.0 } else { value };
    let (low, high) = match figures.as_slice() {
        [] => return None,
        [one] => (scale(*one), scale(*one)),
        [a, b, ..] => {
            // "120-140k" shares the suffix
            let low = if !a.1 && b.1 && a.0 < 1000.0 {
                a.0 * 1000.0
            } else {
                scale(*a)
            };
            (low, scale(*b))
        }
    };
    Some(if low > high { (high, low) } else { (low, high) })
}

/// Compensation figures seen for one currency.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct CompStats {
    pub min: f64,
    pub max: f64,
    midpoint_sum: f64,
    pub count: usize,
}

impl CompStats {
    pub fn add(&mut self, low: f64, high: f64) {
        if self.count == 0 {
            self.min = low;
            self.max = high;
        } else {
            self.min = self.min.min(low);
            self.max = self.max.max(high);
        }
        self.midpoint_sum += (low + high) / 2.0;
        self.count += 1;
    }

    pub fn merge(&mut self, other: &CompStats) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.midpoint_sum += other.midpoint_sum;
        self.count += other.count;
    }

    /// Mean of the range midpoints.
    pub fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| self.midpoint_sum / self.count as f64)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct FitStats {
    sum: f64,
    pub count: usize,
}

impl FitStats {
    pub fn add(&mut self, score: f64) {
        self.sum += score;
        self.count += 1;
    }

    pub fn merge(&mut self, other: &FitStats) {
        self.sum += other.sum;
        self.count += other.count;
    }

    pub fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct PartitionSummary {
    pub name: String,
    pub rows: usize,
    pub ats: usize,
    /// Row count per `Source` value; blank sources are counted under "(none)".
    pub by_source: BTreeMap<String, usize>,
    /// Keyed by `Currency`; rows whose `Comp` holds no figure are skipped.
    pub comp_by_currency: BTreeMap<String, CompStats>,
    /// Keyed by `Source`, over rows with a numeric `FitScore`.
    pub fit_by_source: BTreeMap<String, FitStats>,
}

fn or_blank(value: &str) -> String {
    match value.trim() {
        "" => BLANK.to_string(),
        v => v.to_string(),
    }
}

pub fn summarize_rows(name: &str, rows: &[Vec<String>]) -> PartitionSummary {
    let mut summary = PartitionSummary {
        name: name.to_string(),
        ..Default::default()
    };
    let Some((header, data)) = rows.split_first() else {
        return summary;
    };

    for row in data.iter().filter(|r| r.iter().any(|c| !c.trim().is_empty())) {
        let record = JobRecord::from_row(header.as_slice(), row);
        summary.rows += 1;
        if record.is_ats() {
            summary.ats += 1;
        }
        let source = or_blank(&record.source);
        if let Some((low, high)) = parse_comp_range(&record.comp) {
            summary
                .comp_by_currency
                .entry(or_blank(&record.currency))
                .or_default()
                .add(low, high);
        }
        if let Some(fit) = record.fit_score.trim().parse::<f64>().ok().filter(|f| f.is_finite()) {
            summary.fit_by_source.entry(source.clone()).or_default().add(fit);
        }
        *summary.by_source.entry(source).or_default() += 1;
    }
    summary
}

/// Compensation stats per currency across all partitions.
pub fn comp_totals(summaries: &[PartitionSummary]) -> BTreeMap<String, CompStats> {
    let mut totals: BTreeMap<String, CompStats> = BTreeMap::new();
    for (currency, stats) in summaries.iter().flat_map(|s| &s.comp_by_currency) {
        totals.entry(currency.clone()).or_default().merge(stats);
    }
    totals
}

/// FitScore stats per source across all partitions.
pub fn fit_totals(summaries: &[PartitionSummary]) -> BTreeMap<String, FitStats> {
    let mut totals: BTreeMap<String, FitStats> = BTreeMap::new();
    for (source, stats) in summaries.iter().flat_map(|s| &s.fit_by_source) {
        totals.entry(source.clone()).or_default().merge(stats);
    }
    totals
}

/// Summaries of every partition the store holds, in the store's order.
pub fn summarize(store: &mut dyn TabularStore) -> Result<Vec<PartitionSummary>> {
    let mut out = Vec::new();
    for name in store.partitions()? {
        let rows = store
            .read_rows(&name)
            .with_context(|| format!("Failed to read partition {}", name))?;
        out.push(summarize_rows(&name, &rows));
    }
    Ok(out)
}
