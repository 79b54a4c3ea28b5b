use std::collections::BTreeMap;

use anyhow::Result;
use chrono::Local;
use tracing::{debug, info, warn};

use crate::dedup::DedupIndex;
use crate::email::{MailQuery, MailSource};
use crate::fields::{RecordInput, build_record, classify_source};
use crate::ledger::SeenLedger;
use crate::message::parse_email;
use crate::models::{JobRecord, PARTITIONS};
use crate::store::{TabularStore, append_records, ensure_partition_and_headers, read_all_urls};
use crate::urls::UrlRules;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    FetchingCandidates,
    Processing,
    Writing,
    Done,
}

/// What happened to a single inspected message.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Accepted {
        partition: &'static str,
        record: JobRecord,
    },
    Duplicate {
        url: String,
    },
    /// No URL and too short a subject to be worth a row.
    Discarded,
}

/// Counts printed once at the end of a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub candidates: usize,
    pub already_seen: usize,
    pub inspected: usize,
    pub accepted: usize,
    pub duplicates: usize,
    pub discarded: usize,
    /// Messages whose content could not be fetched; left unseen so the next run retries them.
    pub failed_messages: usize,
    pub listing_failed: bool,
    pub written: BTreeMap<String, usize>,
    pub failed_partitions: Vec<String>,
}

impl RunReport {
    pub fn total_written(&self) -> usize {
        self.written.values().sum()
    }

    pub fn failures(&self) -> usize {
        self.failed_messages + self.failed_partitions.len() + usize::from(self.listing_failed)
    }
}

#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub query: MailQuery,
    pub min_subject_len: usize,
}

/// Drives one batch: candidates → seen filter → parse/extract/classify → dedup → write.
pub struct Ingester<'a> {
    rules: &'a UrlRules,
    settings: IngestSettings,
    phase: Phase,
}

impl<'a> Ingester<'a> {
    pub fn new(rules: &'a UrlRules, settings: IngestSettings) -> Self {
        Self {
            rules,
            settings,
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, phase: Phase) {
        info!(from = ?self.phase, to = ?phase, "phase");
        self.phase = phase;
    }

    /// Runs every phase to completion. Remote failures are counted, never returned.
    pub fn run(
        &mut self,
        source: &mut dyn MailSource,
        store: &mut dyn TabularStore,
        ledger: &mut SeenLedger,
    ) -> RunReport {
        let mut report = RunReport::default();

        self.enter(Phase::FetchingCandidates);
        let known = read_all_urls(store, &PARTITIONS, self.rules);
        let unreadable = known.unreadable;
        let mut dedup = DedupIndex::new(known.urls);
        info!(known_urls = dedup.len(), unreadable = unreadable.len(), "dedup index seeded");

        let ids = match source.list_candidate_ids(&self.settings.query) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "could not list candidate messages");
                report.listing_failed = true;
                Vec::new()
            }
        };
        report.candidates = ids.len();
        info!(candidates = ids.len(), label = %self.settings.query.label, "fetched candidates");

        self.enter(Phase::Processing);
        let mut batches: BTreeMap<&'static str, Vec<JobRecord>> = BTreeMap::new();
        for id in &ids {
            if ledger.contains(id) {
                report.already_seen += 1;
                continue;
            }

            let raw = match source.get_raw_message(id) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(id = %id, error = %e, "could not fetch message");
                    report.failed_messages += 1;
                    continue;
                }
            };

            report.inspected += 1;
            let outcome = self.judge(id, &raw, &mut dedup);
            if let Err(e) = ledger.mark(id) {
                warn!(id = %id, error = %e, "could not persist seen-ids ledger");
            }

            match outcome {
                Outcome::Accepted { partition, record } => {
                    debug!(id = %id, partition, url = %record.apply_url, "accepted");
                    report.accepted += 1;
                    batches.entry(partition).or_default().push(record);
                }
                Outcome::Duplicate { url } => {
                    debug!(id = %id, url = %url, "duplicate URL");
                    report.duplicates += 1;
                }
                Outcome::Discarded => {
                    debug!(id = %id, "no URL and subject too short");
                    report.discarded += 1;
                }
            }
        }

        self.enter(Phase::Writing);
        for partition in PARTITIONS {
            let records = batches.remove(partition).unwrap_or_default();
            if unreadable.iter().any(|p| p == partition) {
                warn!(partition, records = records.len(), "skipping partition whose rows could not be read");
                report.failed_partitions.push(partition.to_string());
                continue;
            }
            match write_partition(store, partition, &records) {
                Ok(n) => {
                    if n > 0 {
                        info!(partition, rows = n, "appended");
                    }
                    report.written.insert(partition.to_string(), n);
                }
                Err(e) => {
                    warn!(partition, error = %e, records = records.len(), "partition write failed");
                    report.failed_partitions.push(partition.to_string());
                }
            }
        }

        self.enter(Phase::Done);
        if let Err(e) = ledger.persist() {
            warn!(error = %e, "could not persist seen-ids ledger");
        }
        if let Err(e) = source.close() {
            debug!(error = %e, "closing mail source");
        }
        info!(
            inspected = report.inspected,
            accepted = report.accepted,
            duplicates = report.duplicates,
            written = report.total_written(),
            "run finished"
        );
        report
    }

    /// Turns one raw message into an outcome, updating the dedup index on acceptance.
    pub fn judge(&self, id: &str, raw: &[u8], dedup: &mut DedupIndex) -> Outcome {
        let email = parse_email(raw);
        let combined = format!("{}\n{}", email.subject, email.text);

        let url = self.rules.best_job_url(&combined);
        if url.is_empty() && email.subject.trim().chars().count() < self.settings.min_subject_len {
            return Outcome::Discarded;
        }

        let source = classify_source(&email.sender, &email.subject, &url, Some(&email.text));
        let apply_url = self.rules.normalize(&url);
        // URL-less records carry no key to dedupe on
        if !apply_url.is_empty() && !dedup.try_accept(&apply_url) {
            return Outcome::Duplicate { url: apply_url };
        }

        let record = build_record(
            &RecordInput {
                message_id: id,
                source,
                subject: &email.subject,
                text: &email.text,
                apply_url: &apply_url,
                is_ats: self.rules.is_ats(&apply_url),
            },
            Local::now(),
        );
        Outcome::Accepted {
            partition: source.partition(),
            record,
        }
    }
}

fn write_partition(
    store: &mut dyn TabularStore,
    partition: &str,
    records: &[JobRecord],
) -> Result<usize> {
    ensure_partition_and_headers(store, partition)?;
    append_records(store, partition, records)
}
