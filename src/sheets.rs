use anyhow::{Context, Result, anyhow};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use url::Url;

use crate::error::HuntError;
use crate::store::TabularStore;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct Sheet {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<Sheet>,
}

/// Google Sheets as the tabular store: one tab per partition.
///
/// Authenticates with a ready-made OAuth bearer token; obtaining it is left to the caller.
pub struct SheetsStore {
    client: Client,
    base: Url,
    spreadsheet_id: String,
    token: String,
}

impl SheetsStore {
    pub fn new(spreadsheet_id: &str, token: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base: Url::parse(SHEETS_API)?,
            spreadsheet_id: spreadsheet_id.to_string(),
            token: token.trim().to_string(),
        })
    }

    /// `<base>/<spreadsheet id><suffix>/<extra segments...>`
    fn endpoint(&self, first_suffix: &str, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| anyhow!("Sheets base URL cannot hold a path"))?;
            path.push(&format!("{}{}", self.spreadsheet_id, first_suffix));
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    fn values_url(&self, range: &str, action: &str) -> Result<Url> {
        self.endpoint("", &["values", &format!("{}{}", range, action)])
    }

    fn send(&self, what: &str, request: RequestBuilder) -> Result<Response> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .map_err(|e| HuntError::remote(what, e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(HuntError::remote(what, format!("HTTP {}: {}", status, body.trim())).into());
        }
        Ok(response)
    }

    fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>> {
        let url = self.values_url(range, "")?;
        let what = format!("read {}", range);
        let response = self.send(&what, self.client.get(url))?;
        let body: ValueRange = response
            .json()
            .with_context(|| format!("decoding values of {}", range))?;
        Ok(body.values)
    }
}

/// A1 reference into a tab, quoting the tab name so spaces and punctuation survive.
pub fn a1_range(tab: &str, cells: &str) -> String {
    let quoted = format!("'{}'", tab.replace('\'', "''"));
    if cells.is_empty() {
        quoted
    } else {
        format!("{}!{}", quoted, cells)
    }
}

impl TabularStore for SheetsStore {
    fn partitions(&mut self) -> Result<Vec<String>> {
        let mut url = self.endpoint("", &[])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties.title");
        let response = self.send("list tabs", self.client.get(url))?;
        let meta: SpreadsheetMeta = response.json().context("decoding spreadsheet metadata")?;
        Ok(meta
            .sheets
            .into_iter()
            .map(|s| s.properties.title)
            .collect())
    }

    fn create_partition(&mut self, name: &str) -> Result<()> {
        let url = self.endpoint(":batchUpdate", &[])?;
        let body = json!({ "requests": [{ "addSheet": { "properties": { "title": name } } }] });
        self.send(&format!("create tab {}", name), self.client.post(url).json(&body))?;
        Ok(())
    }

    fn read_rows(&mut self, partition: &str) -> Result<Vec<Vec<String>>> {
        self.get_values(&a1_range(partition, ""))
    }

    fn read_header(&mut self, partition: &str) -> Result<Vec<String>> {
        Ok(self
            .get_values(&a1_range(partition, "1:1"))?
            .into_iter()
            .next()
            .unwrap_or_default())
    }

    fn write_header(&mut self, partition: &str, header: &[String]) -> Result<()> {
        let range = a1_range(partition, "1:1");
        let mut url = self.values_url(&range, "")?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        let body = json!({ "values": [header] });
        self.send(&format!("write header {}", partition), self.client.put(url).json(&body))?;
        Ok(())
    }

    fn append_rows(&mut self, partition: &str, rows: &[Vec<String>]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let range = a1_range(partition, "A1");
        let mut url = self.values_url(&range, ":append")?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED")
            .append_pair("insertDataOption", "INSERT_ROWS");
        let body = json!({ "values": rows });
        self.send(&format!("append {}", partition), self.client.post(url).json(&body))?;
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_a1_range_quotes_tab_names() {
        assert_eq!(a1_range("LinkedIn", "1:1"), "'LinkedIn'!1:1");
        assert_eq!(a1_range("Bob's Jobs", ""), "'Bob''s Jobs'");
    }

    #[test]
    fn test_values_url_encodes_range() {
        let store = SheetsStore::new("sheet123", "token").unwrap();
        let url = store
            .values_url(&a1_range("My Tab", "A1"), ":append")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet123/values/'My%20Tab'!A1:append"
        );
    }

    #[test]
    fn test_batch_update_endpoint() {
        let store = SheetsStore::new("abc", "token").unwrap();
        assert_eq!(
            store.endpoint(":batchUpdate", &[]).unwrap().as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc:batchUpdate"
        );
    }

    #[test]
    fn test_value_range_without_values_is_empty() {
        let body: ValueRange = serde_json::from_str(r#"{"range": "'Registry'!A1:Z1000"}"#).unwrap();
        assert!(body.values.is_empty());
    }
}
