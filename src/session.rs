use serde_json::Value;
use thiserror::Error;
use timer_core::{
    build_link, AnchorStore, CountdownAnchor, HandoffPayload, ParsedDuration, SessionKey, Signer,
    TokenError,
};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HandoffFailure {
    #[error("locked link carries no timer_token")]
    MissingToken,
    #[error(transparent)]
    Token(#[from] TokenError),
}

#[derive(Clone, Debug, PartialEq)]
pub enum CountdownSource {
    Local {
        anchor: CountdownAnchor,
        parsed: ParsedDuration,
    },
    Handoff { anchor: CountdownAnchor, row: u32 },
    /// A locked view whose token was missing or failed verification.
    Rejected(HandoffFailure),
}

impl CountdownSource {
    pub fn anchor(&self) -> Option<CountdownAnchor> {
        match self {
            CountdownSource::Local { anchor, .. } | CountdownSource::Handoff { anchor, .. } => {
                Some(*anchor)
            }
            CountdownSource::Rejected(_) => None,
        }
    }
}

/// Anchors live as long as the session does.
pub struct DashboardSession {
    id: String,
    anchors: AnchorStore,
    signer: Signer,
}

impl DashboardSession {
    pub fn new(id: impl Into<String>, signer: Signer) -> Self {
        Self {
            id: id.into(),
            anchors: AnchorStore::new(),
            signer,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    fn key(&self, row: u32) -> SessionKey {
        SessionKey::new(self.id.clone(), row)
    }

    /// Calling this on every render keeps the countdown running until the value changes.
    pub fn local_countdown(&mut self, row: u32, timer: Option<&Value>, now: i64) -> CountdownSource {
        let parsed = timer.map(timer_core::parse).unwrap_or_default();
        let key = self.key(row);
        let anchor = self.anchors.latch(key, parsed.seconds, now);
        CountdownSource::Local { anchor, parsed }
    }

    pub fn handoff_countdown(&mut self, token: Option<&str>, now: i64) -> CountdownSource {
        let Some(token) = token else {
            log::warn!("locked view opened without a timer token");
            return CountdownSource::Rejected(HandoffFailure::MissingToken);
        };
        match self.signer.decode(token, now) {
            Ok(payload) => {
                let anchor = payload.anchor();
                let key = self.key(payload.row);
                self.anchors.insert(key, anchor);
                log::info!(
                    "accepted handoff for row {} ({}s from {})",
                    payload.row,
                    anchor.origin,
                    anchor.anchored_at
                );
                CountdownSource::Handoff {
                    anchor,
                    row: payload.row,
                }
            }
            Err(e) => {
                log::warn!("rejected handoff token: {}", e);
                CountdownSource::Rejected(e.into())
            }
        }
    }

    pub fn handoff_token(&self, row: u32, anchor: CountdownAnchor) -> String {
        self.signer.encode(&HandoffPayload::for_anchor(row, anchor))
    }

    pub fn handoff_link(&self, base_url: &str, row: u32, anchor: CountdownAnchor) -> String {
        build_link(base_url, row, &self.handoff_token(row, anchor))
    }

    pub fn anchor_for(&self, row: u32) -> Option<CountdownAnchor> {
        self.anchors.get(&self.key(row))
    }

    pub fn end(&mut self) {
        self.anchors.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use timer_core::{parse_link, remaining};

    fn session(secret: &str) -> DashboardSession {
        DashboardSession::new("test", Signer::new(Some(secret)))
    }

    #[test]
    fn test_local_countdown_survives_rerender() {
        let mut s = session("k");
        let value = json!("00:02:00");
        let first = s.local_countdown(3, Some(&value), 1000);
        let again = s.local_countdown(3, Some(&value), 1040);
        assert_eq!(first.anchor(), again.anchor());
        assert_eq!(remaining(again.anchor().unwrap(), 1040), 80);

        let changed = json!(600);
        let reset = s.local_countdown(3, Some(&changed), 1050);
        assert_eq!(reset.anchor(), Some(CountdownAnchor::new(600, 1050)));
    }

    #[test]
    fn test_missing_timer_is_zero_without_note() {
        let mut s = session("k");
        match s.local_countdown(1, None, 10) {
            CountdownSource::Local { anchor, parsed } => {
                assert_eq!(anchor.origin, 0);
                assert!(!parsed.is_suspicious());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_handoff_between_instances() {
        let mut sender = session("shared");
        let value = json!("00:02:00");
        let anchor = sender.local_countdown(9, Some(&value), 1000).anchor().unwrap();
        let link = sender.handoff_link("https://b.example/", 9, anchor);

        let params = parse_link(&link);
        let mut receiver = DashboardSession::new("other", Signer::new(Some("shared")));
        let source = receiver.handoff_countdown(params.timer_token.as_deref(), 1050);
        assert_eq!(source, CountdownSource::Handoff { anchor, row: 9 });
        assert_eq!(receiver.anchor_for(9), Some(anchor));
        assert_eq!(remaining(anchor, 1050), 70);
    }

    #[test]
    fn test_same_anchor_same_token() {
        let s = session("k");
        let anchor = CountdownAnchor::new(60, 500);
        assert_eq!(s.handoff_token(2, anchor), s.handoff_token(2, anchor));
        assert_ne!(
            s.handoff_token(2, anchor),
            s.handoff_token(2, CountdownAnchor::new(60, 501))
        );
    }

    #[test]
    fn test_handoff_failures_are_distinct() {
        let mut receiver = session("right");
        assert_eq!(
            receiver.handoff_countdown(None, 0),
            CountdownSource::Rejected(HandoffFailure::MissingToken)
        );

        let wrong = DashboardSession::new("x", Signer::new(Some("wrong")));
        let token = wrong.handoff_token(1, CountdownAnchor::new(60, 0));
        assert_eq!(
            receiver.handoff_countdown(Some(&token), 10),
            CountdownSource::Rejected(HandoffFailure::Token(TokenError::BadSignature))
        );
        assert_eq!(
            receiver.handoff_countdown(Some("junk"), 10),
            CountdownSource::Rejected(HandoffFailure::Token(TokenError::Malformed))
        );
        assert!(receiver.anchor_for(1).is_none());
    }

    #[test]
    fn test_end_drops_anchors() {
        let mut s = session("k");
        s.local_countdown(1, Some(&json!(30)), 0);
        s.end();
        assert!(s.anchor_for(1).is_none());
    }
}
