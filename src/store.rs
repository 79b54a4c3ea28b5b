use std::collections::{BTreeMap, HashSet};

use anyhow::{Result, anyhow};
use tracing::{debug, info, warn};

use crate::models::{HEADERS, JobRecord, URL_HEADER};
use crate::urls::UrlRules;

/// A spreadsheet-like store: named partitions of string rows, row 1 being the header.
pub trait TabularStore {
    fn partitions(&mut self) -> Result<Vec<String>>;

    fn create_partition(&mut self, name: &str) -> Result<()>;

    /// Every row of the partition, header row first.
    fn read_rows(&mut self, partition: &str) -> Result<Vec<Vec<String>>>;

    fn read_header(&mut self, partition: &str) -> Result<Vec<String>> {
        Ok(self
            .read_rows(partition)?
            .into_iter()
            .next()
            .unwrap_or_default())
    }

    /// Replaces row 1.
    fn write_header(&mut self, partition: &str, header: &[String]) -> Result<()>;

    /// Inserts rows after the last existing row. Returns how many were written.
    fn append_rows(&mut self, partition: &str, rows: &[Vec<String>]) -> Result<usize>;
}

/// Creates the partition if needed and makes sure row 1 carries every schema column.
///
/// An empty row 1 gets the canonical header. An existing header keeps its order;
/// schema columns it lacks are appended at the end. Returns the effective header.
pub fn ensure_partition_and_headers(
    store: &mut dyn TabularStore,
    name: &str,
) -> Result<Vec<String>> {
    if !store.partitions()?.iter().any(|p| p == name) {
        store.create_partition(name)?;
        info!(partition = %name, "created partition");
    }

    let header = store.read_header(name)?;
    if header.iter().all(|cell| cell.trim().is_empty()) {
        let canonical: Vec<String> = HEADERS.iter().map(|h| h.to_string()).collect();
        store.write_header(name, &canonical)?;
        info!(partition = %name, "wrote header row");
        return Ok(canonical);
    }

    let missing: Vec<String> = HEADERS
        .iter()
        .filter(|h| !header.iter().any(|cell| cell.trim() == **h))
        .map(|h| h.to_string())
        .collect();
    if missing.is_empty() {
        return Ok(header);
    }

    let mut extended = header;
    extended.extend(missing);
    store.write_header(name, &extended)?;
    info!(partition = %name, columns = extended.len(), "extended header row");
    Ok(extended)
}

/// What seeding the dedup index found: the known URLs, and the partitions that exist
/// but could not be read. Writing to an unreadable partition could duplicate its rows.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KnownUrls {
    pub urls: HashSet<String>,
    pub unreadable: Vec<String>,
}

/// Normalized apply URLs found in the given partitions. The URL column is located by
/// header name. Partitions that do not exist yet contribute nothing.
pub fn read_all_urls(
    store: &mut dyn TabularStore,
    partitions: &[&str],
    rules: &UrlRules,
) -> KnownUrls {
    let mut known = KnownUrls::default();
    let existing = match store.partitions() {
        Ok(existing) => existing,
        Err(e) => {
            warn!(error = %e, "could not list partitions for dedup");
            known.unreadable = partitions.iter().map(|p| p.to_string()).collect();
            return known;
        }
    };

    for partition in partitions {
        if !existing.iter().any(|p| p == partition) {
            debug!(partition = %partition, "partition does not exist yet");
            continue;
        }
        let rows = match store.read_rows(partition) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(partition = %partition, error = %e, "could not read partition for dedup");
                known.unreadable.push(partition.to_string());
                continue;
            }
        };
        let Some((header, data)) = rows.split_first() else {
            continue;
        };
        let Some(idx) = header.iter().position(|cell| cell.trim() == URL_HEADER) else {
            debug!(partition = %partition, "partition has no {} column", URL_HEADER);
            continue;
        };

        let before = known.urls.len();
        for row in data {
            if let Some(url) = row.get(idx).filter(|u| !u.trim().is_empty()) {
                known.urls.insert(rules.normalize(url));
            }
        }
        debug!(partition = %partition, urls = known.urls.len() - before, "seeded dedup index");
    }
    known
}

/// Appends records under the partition's current header, matching values by column name.
pub fn append_records(
    store: &mut dyn TabularStore,
    partition: &str,
    records: &[JobRecord],
) -> Result<usize> {
    if records.is_empty() {
        return Ok(0);
    }
    let header = store.read_header(partition)?;
    if header.is_empty() {
        return Err(anyhow!("partition {} has no header row", partition));
    }
    let rows: Vec<Vec<String>> = records.iter().map(|r| r.to_row(header.as_slice())).collect();
    store.append_rows(partition, &rows)
}

/// In-process store, used for dry runs and tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    partitions: BTreeMap<String, Vec<Vec<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies every partition of another store.
    pub fn snapshot_of(store: &mut dyn TabularStore) -> Result<Self> {
        let mut copy = Self::new();
        for name in store.partitions()? {
            let rows = store.read_rows(&name)?;
            copy.partitions.insert(name, rows);
        }
        Ok(copy)
    }

    #[cfg(test)]
    pub fn rows(&self, partition: &str) -> &[Vec<String>] {
        self.partitions
            .get(partition)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

impl TabularStore for MemoryStore {
    fn partitions(&mut self) -> Result<Vec<String>> {
        Ok(self.partitions.keys().cloned().collect())
    }

    fn create_partition(&mut self, name: &str) -> Result<()> {
        self.partitions.entry(name.to_string()).or_default();
        Ok(())
    }

    fn read_rows(&mut self, partition: &str) -> Result<Vec<Vec<String>>> {
        self.partitions
            .get(partition)
            .cloned()
            .ok_or_else(|| anyhow!("no such partition: {}", partition))
    }

    fn write_header(&mut self, partition: &str, header: &[String]) -> Result<()> {
        let rows = self
            .partitions
            .get_mut(partition)
            .ok_or_else(|| anyhow!("no such partition: {}", partition))?;
        match rows.first_mut() {
            Some(first) => *first = header.to_vec(),
            None => rows.push(header.to_vec()),
        }
        Ok(())
    }

    fn append_rows(&mut self, partition: &str, rows: &[Vec<String>]) -> Result<usize> {
        let existing = self
            .partitions
            .get_mut(partition)
            .ok_or_else(|| anyhow!("no such partition: {}", partition))?;
        existing.extend(rows.iter().cloned());
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_ensure_creates_partition_and_header_once() {
        let mut store = MemoryStore::new();
        let header = ensure_partition_and_headers(&mut store, "LinkedIn").unwrap();
        assert_eq!(header.len(), HEADERS.len());
        ensure_partition_and_headers(&mut store, "LinkedIn").unwrap();

        assert_eq!(store.rows("LinkedIn").len(), 1);
        assert_eq!(store.rows("LinkedIn")[0][0], "CreatedAt");
    }

    #[test]
    fn test_ensure_fills_empty_first_row() {
        let mut store = MemoryStore::new();
        store.create_partition("Registry").unwrap();
        store.write_header("Registry", &strings(&["", " "])).unwrap();

        ensure_partition_and_headers(&mut store, "Registry").unwrap();
        assert_eq!(store.rows("Registry")[0], strings(&HEADERS));
    }

    #[test]
    fn test_ensure_appends_missing_columns_without_reordering() {
        let mut store = MemoryStore::new();
        store.create_partition("Indeed").unwrap();
        store
            .write_header("Indeed", &strings(&["Role", "ApplyURL", "MyColumn"]))
            .unwrap();
        store
            .append_rows("Indeed", &[strings(&["SRE", "https://a.example/1", "keep"])])
            .unwrap();

        let header = ensure_partition_and_headers(&mut store, "Indeed").unwrap();
        assert_eq!(&header[..3], &strings(&["Role", "ApplyURL", "MyColumn"])[..]);
        assert_eq!(header.len(), 3 + HEADERS.len() - 2);
        assert_eq!(store.rows("Indeed")[1], strings(&["SRE", "https://a.example/1", "keep"]));
    }

    #[test]
    fn test_append_aligns_values_by_header_name() {
        let mut store = MemoryStore::new();
        store.create_partition("Glassdoor").unwrap();
        let mut reversed = strings(&HEADERS);
        reversed.reverse();
        store.write_header("Glassdoor", &reversed).unwrap();

        let record = JobRecord {
            role: "Data Engineer".to_string(),
            company: "Globex".to_string(),
            apply_url: "https://www.glassdoor.com/job-listing/x".to_string(),
            ..Default::default()
        };
        assert_eq!(append_records(&mut store, "Glassdoor", &[record]).unwrap(), 1);

        let rows = store.rows("Glassdoor");
        let back = JobRecord::from_row(rows[0].as_slice(), &rows[1]);
        assert_eq!(back.role, "Data Engineer");
        assert_eq!(back.company, "Globex");
        assert_eq!(back.apply_url, "https://www.glassdoor.com/job-listing/x");
        assert_eq!(rows[1][reversed.iter().position(|h| h == "Role").unwrap()], "Data Engineer");
    }

    #[test]
    fn test_append_preserves_existing_rows() {
        let mut store = MemoryStore::new();
        ensure_partition_and_headers(&mut store, "Registry").unwrap();
        let first = JobRecord {
            role: "one".to_string(),
            ..Default::default()
        };
        let second = JobRecord {
            role: "two".to_string(),
            ..Default::default()
        };
        append_records(&mut store, "Registry", &[first]).unwrap();
        append_records(&mut store, "Registry", &[second]).unwrap();
        assert_eq!(append_records(&mut store, "Registry", &[]).unwrap(), 0);

        let rows = store.rows("Registry");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1][2], "one");
        assert_eq!(rows[2][2], "two");
    }

    #[test]
    fn test_read_all_urls_locates_column_and_normalizes() {
        let rules = UrlRules::default();
        let mut store = MemoryStore::new();
        store.create_partition("A").unwrap();
        store.write_header("A", &strings(&["Notes", "ApplyURL"])).unwrap();
        store
            .append_rows(
                "A",
                &[
                    strings(&["x", "https://Example.com/job?id=5&utm_source=mail"]),
                    strings(&["short row"]),
                    strings(&["y", ""]),
                ],
            )
            .unwrap();
        store.create_partition("B").unwrap();
        store.write_header("B", &strings(&["NoUrlHere"])).unwrap();

        let known = read_all_urls(&mut store, &["A", "B", "Missing"], &rules);
        assert_eq!(known.urls, HashSet::from(["https://example.com/job?id=5".to_string()]));
        // not created yet is not a read failure
        assert!(known.unreadable.is_empty());
    }

    /// Lists its partitions but refuses to read one of them.
    struct BrokenRead {
        inner: MemoryStore,
        broken: &'static str,
    }

    impl TabularStore for BrokenRead {
        fn partitions(&mut self) -> Result<Vec<String>> {
            self.inner.partitions()
        }
        fn create_partition(&mut self, name: &str) -> Result<()> {
            self.inner.create_partition(name)
        }
        fn read_rows(&mut self, partition: &str) -> Result<Vec<Vec<String>>> {
            if partition == self.broken {
                return Err(anyhow!("HTTP 503"));
            }
            self.inner.read_rows(partition)
        }
        fn write_header(&mut self, partition: &str, header: &[String]) -> Result<()> {
            self.inner.write_header(partition, header)
        }
        fn append_rows(&mut self, partition: &str, rows: &[Vec<String>]) -> Result<usize> {
            self.inner.append_rows(partition, rows)
        }
    }

    #[test]
    fn test_read_all_urls_reports_unreadable_partitions() {
        let mut inner = MemoryStore::new();
        ensure_partition_and_headers(&mut inner, "LinkedIn").unwrap();
        ensure_partition_and_headers(&mut inner, "Indeed").unwrap();
        let record = JobRecord {
            apply_url: "https://www.indeed.com/viewjob?jk=1".to_string(),
            ..Default::default()
        };
        append_records(&mut inner, "Indeed", &[record]).unwrap();
        let mut store = BrokenRead {
            inner,
            broken: "LinkedIn",
        };

        let known = read_all_urls(&mut store, &["LinkedIn", "Indeed", "Glassdoor"], &UrlRules::default());
        assert_eq!(known.unreadable, vec!["LinkedIn".to_string()]);
        assert_eq!(known.urls.len(), 1);
    }
}
