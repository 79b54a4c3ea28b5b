use std::fmt;

/// Column names of every partition, in canonical order.
pub const HEADERS: [&str; 24] = [
    "CreatedAt",
    "Company",
    "Role",
    "Location",
    "RemoteScope",
    "ApplyURL",
    "Source",
    "RecruiterEmail",
    "Currency",
    "Comp",
    "Seniority",
    "WorkAuthReq",
    "Status",
    "NextAction",
    "SLA_Date",
    "ContactName",
    "ContactEmail",
    "ThreadId",
    "LastEmailAt",
    "LastEmailSnippet",
    "FitScore",
    "Why",
    "Notes",
    "UseLaTeXCV",
];

/// Header of the column holding the canonical apply URL (the dedup key).
pub const URL_HEADER: &str = "ApplyURL";

pub const TAB_REGISTRY: &str = "Registry";
pub const TAB_LINKEDIN: &str = "LinkedIn";
pub const TAB_INDEED: &str = "Indeed";
pub const TAB_GLASSDOOR: &str = "Glassdoor";

/// Every partition the ingester writes to; all of them seed the dedup index.
pub const PARTITIONS: [&str; 4] = [TAB_REGISTRY, TAB_LINKEDIN, TAB_INDEED, TAB_GLASSDOOR];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    LinkedIn,
    Indeed,
    Glassdoor,
    Unknown,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::LinkedIn => "LinkedIn",
            Source::Indeed => "Indeed",
            Source::Glassdoor => "Glassdoor",
            Source::Unknown => "Unknown",
        }
    }

    /// Partition a record from this source is routed to.
    pub fn partition(self) -> &'static str {
        match self {
            Source::LinkedIn => TAB_LINKEDIN,
            Source::Indeed => TAB_INDEED,
            Source::Glassdoor => TAB_GLASSDOOR,
            Source::Unknown => TAB_REGISTRY,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One job posting as stored in the tabular store. Unknown values are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobRecord {
    pub created_at: String,
    pub company: String,
    pub role: String,
    pub location: String,
    pub remote_scope: String,
    pub apply_url: String,
    pub source: String,
    pub recruiter_email: String,
    pub currency: String,
    pub comp: String,
    pub seniority: String,
    pub work_auth_req: String,
    pub status: String,
    pub next_action: String,
    pub sla_date: String,
    pub contact_name: String,
    pub contact_email: String,
    pub thread_id: String,
    pub last_email_at: String,
    pub last_email_snippet: String,
    pub fit_score: String,
    pub why: String,
    pub notes: String,
    pub use_latex_cv: String,
}

impl JobRecord {
    fn field_mut(&mut self, header: &str) -> Option<&mut String> {
        let field = match header {
            "CreatedAt" => &mut self.created_at,
            "Company" => &mut self.company,
            "Role" => &mut self.role,
            "Location" => &mut self.location,
            "RemoteScope" => &mut self.remote_scope,
            "ApplyURL" => &mut self.apply_url,
            "Source" => &mut self.source,
            "RecruiterEmail" => &mut self.recruiter_email,
            "Currency" => &mut self.currency,
            "Comp" => &mut self.comp,
            "Seniority" => &mut self.seniority,
            "WorkAuthReq" => &mut self.work_auth_req,
            "Status" => &mut self.status,
            "NextAction" => &mut self.next_action,
            "SLA_Date" => &mut self.sla_date,
            "ContactName" => &mut self.contact_name,
            "ContactEmail" => &mut self.contact_email,
            "ThreadId" => &mut self.thread_id,
            "LastEmailAt" => &mut self.last_email_at,
            "LastEmailSnippet" => &mut self.last_email_snippet,
            "FitScore" => &mut self.fit_score,
            "Why" => &mut self.why,
            "Notes" => &mut self.notes,
            "UseLaTeXCV" => &mut self.use_latex_cv,
            _ => return None,
        };
        Some(field)
    }

    /// Value stored under `header`, or `None` when the header is not part of the schema.
    pub fn get(&self, header: &str) -> Option<&str> {
        let value = match header {
            "CreatedAt" => &self.created_at,
            "Company" => &self.company,
            "Role" => &self.role,
            "Location" => &self.location,
            "RemoteScope" => &self.remote_scope,
            "ApplyURL" => &self.apply_url,
            "Source" => &self.source,
            "RecruiterEmail" => &self.recruiter_email,
            "Currency" => &self.currency,
            "Comp" => &self.comp,
            "Seniority" => &self.seniority,
            "WorkAuthReq" => &self.work_auth_req,
            "Status" => &self.status,
            "NextAction" => &self.next_action,
            "SLA_Date" => &self.sla_date,
            "ContactName" => &self.contact_name,
            "ContactEmail" => &self.contact_email,
            "ThreadId" => &self.thread_id,
            "LastEmailAt" => &self.last_email_at,
            "LastEmailSnippet" => &self.last_email_snippet,
            "FitScore" => &self.fit_score,
            "Why" => &self.why,
            "Notes" => &self.notes,
            "UseLaTeXCV" => &self.use_latex_cv,
            _ => return None,
        };
        Some(value.as_str())
    }

    /// Lays the record out under `headers`, matching by name. Columns outside the
    /// schema get an empty cell.
    pub fn to_row<S: AsRef<str>>(&self, headers: &[S]) -> Vec<String> {
        headers
            .iter()
            .map(|h| self.get(h.as_ref().trim()).unwrap_or_default().to_string())
            .collect()
    }

    /// Rebuilds a record from a stored row. Short rows are padded with empty values.
    pub fn from_row<S: AsRef<str>>(headers: &[S], row: &[String]) -> Self {
        let mut record = Self::default();
        for (idx, header) in headers.iter().enumerate() {
            if let Some(field) = record.field_mut(header.as_ref().trim()) {
                *field = row.get(idx).cloned().unwrap_or_default();
            }
        }
        record
    }

    pub fn is_ats(&self) -> bool {
        self.use_latex_cv.eq_ignore_ascii_case("yes")
    }
}
