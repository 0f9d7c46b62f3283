//! Handoff links between dashboard instances.
//!
//! `lock=1` tells the receiver to hide navigation and editing and to take its
//! countdown from `timer_token` only, never from its own backend fetch.

use url::form_urlencoded;

pub const PARAM_ROW: &str = "row";
pub const PARAM_LOCK: &str = "lock";
pub const PARAM_TOKEN: &str = "timer_token";
pub const PARAM_MODE: &str = "mode";

/// `<base_url>?row=<row>&lock=1&timer_token=<token>`
pub fn build_link(base_url: &str, row: u32, token: &str) -> String {
    format!(
        "{}?{}={}&{}=1&{}={}",
        base_url, PARAM_ROW, row, PARAM_LOCK, PARAM_TOKEN, token
    )
}

/// Query parameters a receiving instance acts on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundParams {
    pub row: u32,
    pub lock: bool,
    pub timer_token: Option<String>,
    /// `view` or `edit`, lowercased. Ignored by the receiver when `lock` is set.
    pub mode: Option<String>,
}

impl Default for InboundParams {
    fn default() -> Self {
        Self {
            row: 1,
            lock: false,
            timer_token: None,
            mode: None,
        }
    }
}

/// Accepts a full link or just its query string.
pub fn parse_link(input: &str) -> InboundParams {
    let input = input.trim();
    let query = match input.split_once('?') {
        Some((_, q)) => q,
        None if input.contains('=') => input,
        None => "",
    };
    let query = query.split('#').next().unwrap_or("");

    let mut params = InboundParams::default();
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        match &*key {
            PARAM_ROW => params.row = parse_row(&value),
            PARAM_LOCK => params.lock = matches!(&*value, "1" | "true"),
            PARAM_TOKEN if !value.is_empty() => params.timer_token = Some(value.into_owned()),
            PARAM_MODE if !value.trim().is_empty() => {
                params.mode = Some(value.trim().to_ascii_lowercase())
            }
            _ => {}
        }
    }
    params
}

/// 1-based data row; anything unusable selects the first row.
pub fn parse_row(raw: &str) -> u32 {
    match raw.trim().parse::<i64>() {
        Ok(n) if n >= 1 => u32::try_from(n).unwrap_or(1),
        _ => 1,
    }
}
