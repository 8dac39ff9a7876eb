use std::{io::Write, path::Path, sync::LazyLock};

use regex::Regex;
use reqwest::Client;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use super::{LookupError, LookupRow, LookupTable};

/// Windows security log encyclopedia index page.
pub const DEFAULT_SOURCE_URL: &str =
    "https://www.ultimatewindowssecurity.com/securitylog/encyclopedia/";

const REFERENCE_BASE: &str = "https://learn.microsoft.com/en-us/previous-versions/windows/it-pro/windows-10/security/threat-protection/auditing/event-";

static ROW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tr\b.*?</tr>").expect("row pattern is valid"));
static EVENT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)eventid=(\d+)").expect("event id pattern is valid"));
static ANCHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a\b[^>]*>(.*?)</a>").expect("anchor pattern is valid"));
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern is valid"));

/// Scrapes the Windows security event encyclopedia into a lookup table file.
#[derive(Debug, Clone)]
pub struct LookupBuilder {
    client: Client,
    source_url: String,
}

impl LookupBuilder {
    /// Builder scraping `source_url` with `client`.
    pub fn new(client: Client, source_url: impl Into<String>) -> Self {
        Self {
            client,
            source_url: source_url.into(),
        }
    }

    /// Downloads and parses the page. An empty parse is an error.
    pub async fn fetch(&self) -> Result<Vec<LookupRow>, LookupError> {
        let response = self
            .client
            .get(&self.source_url)
            .send()
            .await?
            .error_for_status()?;
        let html = response.text().await?;
        info!(url = %self.source_url, bytes = html.len(), "fetched event code encyclopedia");

        let rows = parse_encyclopedia(&html);
        if rows.is_empty() {
            return Err(LookupError::Parse(
                "no event rows found in encyclopedia page".to_string(),
            ));
        }
        Ok(rows)
    }

    /// Fetches, writes `path` and returns the freshly loaded table. A failed
    /// fetch leaves any existing file untouched.
    pub async fn refresh(&self, path: &Path) -> Result<LookupTable, LookupError> {
        let rows = self.fetch().await?;
        write_table(path, &rows)?;
        info!(path = %path.display(), rows = rows.len(), "lookup table written");
        Ok(LookupTable::from_rows(rows))
    }
}

/// Extracts `(Eventid, Description, See on)` rows from the encyclopedia HTML.
pub fn parse_encyclopedia(html: &str) -> Vec<LookupRow> {
    let mut rows = Vec::new();

    for row in ROW_RE.find_iter(html) {
        let row = row.as_str();
        let Some(event_id) = EVENT_ID_RE.captures(row).map(|c| c[1].to_string()) else {
            continue;
        };

        let anchors: Vec<&str> = ANCHOR_RE
            .captures_iter(row)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        if anchors.len() < 2 {
            continue;
        }

        let description = clean_text(anchors[1]);
        if description.is_empty() {
            warn!(event_id = %event_id, "missing description for event id");
            continue;
        }

        rows.push(LookupRow {
            see_on: format!("{REFERENCE_BASE}{event_id}"),
            event_id,
            description,
        });
    }

    rows
}

/// Writes the rows next to `path` and renames into place so readers never see
/// a partial file.
pub fn write_table(path: &Path, rows: &[LookupRow]) -> Result<(), LookupError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let io_err = |source| LookupError::Io {
        path: path.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(dir).map_err(io_err)?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    {
        let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush().map_err(io_err)?;
    }
    tmp.as_file_mut().flush().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

fn clean_text(fragment: &str) -> String {
    let text = TAG_RE.replace_all(fragment, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
