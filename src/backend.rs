//! Client for the spreadsheet row backend (`action=get` / `action=update`).

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend returned status {status:?}: {body}")]
    Status { status: Option<String>, body: String },
}

/// Values allowed in the editable column L.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum TriageCategory {
    Minor,
    Delayed,
    Immediate,
    Decreased,
}

impl TriageCategory {
    pub const ALL: [TriageCategory; 4] = [
        TriageCategory::Minor,
        TriageCategory::Delayed,
        TriageCategory::Immediate,
        TriageCategory::Decreased,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TriageCategory::Minor => "Minor",
            TriageCategory::Delayed => "Delayed",
            TriageCategory::Immediate => "Immediate",
            TriageCategory::Decreased => "Decreased",
        }
    }

    /// Unknown or missing values select the first category.
    pub fn from_current(value: Option<&str>) -> Self {
        Self::ALL
            .into_iter()
            .find(|c| Some(c.as_str()) == value)
            .unwrap_or(TriageCategory::Minor)
    }
}

/// One data row as returned by `action=get`.
#[derive(Clone, Debug, Deserialize)]
pub struct RowRecord {
    pub status: String,
    #[serde(rename = "A_K", default)]
    pub a_k: Map<String, Value>,
    #[serde(rename = "A_L", default)]
    pub a_l: Map<String, Value>,
    #[serde(rename = "current_L", default)]
    pub current_l: Option<String>,
    #[serde(default = "default_max_rows")]
    pub max_rows: u32,
    /// Raw timer value found by [`timer_core::extract_timer`].
    #[serde(skip)]
    pub timer: Option<Value>,
}

fn default_max_rows() -> u32 {
    1
}

impl RowRecord {
    pub fn from_json(body: Value) -> Result<Self> {
        check_status(&body)?;
        let timer = timer_core::extract_timer(&body).cloned();
        let mut record: RowRecord =
            serde_json::from_value(body).context("unexpected row response shape")?;
        record.timer = timer;
        Ok(record)
    }

    pub fn category(&self) -> TriageCategory {
        TriageCategory::from_current(self.current_l.as_deref())
    }
}

pub fn check_status(body: &Value) -> Result<(), BackendError> {
    let status = body.get("status").and_then(Value::as_str);
    if status == Some("ok") {
        Ok(())
    } else {
        Err(BackendError::Status {
            status: status.map(str::to_string),
            body: body.to_string(),
        })
    }
}

#[derive(Clone)]
pub struct RowClient {
    http: reqwest::blocking::Client,
    url: String,
    token: Option<String>,
}

impl RowClient {
    pub fn new(url: &str, token: Option<String>) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("http client init failed")?;
        Ok(Self {
            http,
            url: url.to_string(),
            token,
        })
    }

    fn params<'a>(&'a self, mut base: Vec<(&'a str, String)>) -> Vec<(&'a str, String)> {
        if let Some(token) = &self.token {
            base.push(("token", token.clone()));
        }
        base
    }

    pub fn get_row(&self, row: u32) -> Result<RowRecord> {
        let query = self.params(vec![("action", "get".into()), ("row", row.to_string())]);
        let body: Value = self
            .http
            .get(&self.url)
            .query(&query)
            .send()
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("failed to fetch row {}", row))?
            .json()
            .context("row response is not JSON")?;
        log::debug!("fetched row {}", row);
        RowRecord::from_json(body)
    }

    pub fn update_field(&self, row: u32, value: TriageCategory) -> Result<()> {
        let form = self.params(vec![
            ("action", "update".into()),
            ("row", row.to_string()),
            ("value", value.as_str().into()),
        ]);
        let body: Value = self
            .http
            .post(&self.url)
            .form(&form)
            .send()
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("failed to update row {}", row))?
            .json()
            .context("update response is not JSON")?;
        check_status(&body)?;
        log::info!("row {} set to {}", row, value.as_str());
        Ok(())
    }
}
