use actix_web::{HttpResponse, web};
use shared::{ChatRequest, ChatResponse};

use crate::chatbot;
use crate::session::{PredictionStore, SessionId};

/// Takes the raw body so that a missing or malformed JSON document is read as
/// an empty message instead of being rejected.
pub async fn chatbot_reply(
    body: web::Bytes,
    session: SessionId,
    predictions: web::Data<PredictionStore>,
) -> HttpResponse {
    let message = serde_json::from_slice::<ChatRequest>(&body)
        .ok()
        .and_then(|req| req.message)
        .unwrap_or_default();

    let latest = predictions.latest(&session);
    let reply = chatbot::respond(&message, latest.as_ref());
    log::debug!("Chatbot {:?} -> {:?}", message, reply);

    let mut builder = HttpResponse::Ok();
    if session.is_fresh() {
        builder.cookie(session.cookie());
    }
    builder.json(ChatResponse { reply })
}
