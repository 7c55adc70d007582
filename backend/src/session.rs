use actix_web::cookie::{Cookie, SameSite};
use actix_web::{FromRequest, HttpRequest};
use chrono::{DateTime, Utc};
use futures::future::{Ready, ok};
use shared::LatestPrediction;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "pneumoscan_session";

/// Browser session identified by a cookie. A request without a valid cookie
/// gets a fresh id, which the handler must send back with [`SessionId::cookie`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionId {
    id: Uuid,
    fresh: bool,
}

impl SessionId {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            fresh: true,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    pub fn cookie(&self) -> Cookie<'static> {
        Cookie::build(SESSION_COOKIE, self.id.to_string())
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .finish()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromRequest for SessionId {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        match req
            .cookie(SESSION_COOKIE)
            .and_then(|c| Uuid::parse_str(c.value()).ok())
        {
            Some(id) => ok(SessionId { id, fresh: false }),
            None => {
                let session = SessionId::new();
                log::debug!("Starting session {} for {}", session.id, req.path());
                ok(session)
            }
        }
    }
}

struct Entry {
    prediction: LatestPrediction,
    updated_at: DateTime<Utc>,
}

/// Most recent prediction per session. Bounded: recording into a full store
/// evicts the least recently updated session.
pub struct PredictionStore {
    entries: RwLock<HashMap<Uuid, Entry>>,
    max_sessions: usize,
}

impl PredictionStore {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
        }
    }

    pub fn record(&self, session: &SessionId, prediction: LatestPrediction) {
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if !entries.contains_key(&session.id()) && entries.len() >= self.max_sessions {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.updated_at)
                .map(|(id, _)| *id);
            if let Some(id) = oldest {
                entries.remove(&id);
                log::debug!("Evicted prediction for session {}", id);
            }
        }

        entries.insert(
            session.id(),
            Entry {
                prediction,
                updated_at: Utc::now(),
            },
        );
    }

    pub fn latest(&self, session: &SessionId) -> Option<LatestPrediction> {
        let entries = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.get(&session.id()).map(|e| e.prediction.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
