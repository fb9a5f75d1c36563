use axum::Json;
use axum::{extract::State, http::HeaderMap, response::IntoResponse};
use axum::{http::StatusCode, response::Response};
use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::responses::JsonResponse;
use crate::services::billing::{self, TransitionOutcome};
use crate::state::AppState;

// Small helper: nested json lookup
fn jget<'a>(val: &'a serde_json::Value, path: &[&str]) -> Option<&'a serde_json::Value> {
    let mut cur = val;
    for key in path {
        cur = cur.get(*key)?;
    }
    Some(cur)
}

fn extract_str<'a>(val: &'a serde_json::Value, path: &[&str]) -> Option<&'a str> {
    jget(val, path)?.as_str()
}

fn extract_subscription_id(event: &serde_json::Value) -> Option<&str> {
    extract_str(event, &["data", "object", "id"])
}

fn extract_customer_id(event: &serde_json::Value) -> Option<&str> {
    extract_str(event, &["data", "object", "customer"])
}

fn extract_metadata_tenant_id(event: &serde_json::Value) -> Option<&str> {
    extract_str(
        event,
        &["data", "object", "metadata", billing::TENANT_METADATA_KEY],
    )
}

fn extract_period_end(event: &serde_json::Value) -> Option<OffsetDateTime> {
    let ts = jget(event, &["data", "object", "current_period_end"])?.as_i64()?;
    OffsetDateTime::from_unix_timestamp(ts).ok()
}

fn received() -> Response {
    Json(serde_json::json!({ "received": true })).into_response()
}

// POST /api/stripe/webhook
pub async fn webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let sig = match headers
        .get("Stripe-Signature")
        .and_then(|h| h.to_str().ok())
    {
        Some(s) => s,
        None => return JsonResponse::bad_request("Missing Stripe-Signature").into_response(),
    };

    // Bad signature is the only rejection that can never have had side
    // effects; nothing is written before this point.
    let evt = match app_state.stripe.verify_webhook(&body, sig) {
        Ok(e) => e,
        Err(err) => {
            warn!(?err, "stripe webhook verification failed");
            return (StatusCode::BAD_REQUEST, "invalid webhook").into_response();
        }
    };

    let evt_type = evt.r#type.as_str();
    let payload = &evt.payload;

    // The unique insert is the idempotency boundary. Concurrent duplicate
    // deliveries race on it and exactly one proceeds past this match.
    match app_state.event_log.record_event(&evt.id, evt_type).await {
        Ok(true) => {}
        Ok(false) => {
            info!(event_id = %evt.id, evt_type, "duplicate stripe event acknowledged");
            return Json(serde_json::json!({ "received": true, "duplicate": true }))
                .into_response();
        }
        Err(err) => {
            error!(?err, event_id = %evt.id, "failed to record stripe event");
            return JsonResponse::server_error("event log unavailable").into_response();
        }
    }

    let dispatched = match evt_type {
        "customer.subscription.created" | "customer.subscription.updated" => {
            let Some(subscription_id) = extract_subscription_id(payload) else {
                warn!(evt_type, "subscription event missing subscription id");
                return received();
            };
            billing::activate(
                app_state.tenants.as_ref(),
                app_state.stripe.as_ref(),
                subscription_id,
                extract_customer_id(payload),
                extract_metadata_tenant_id(payload),
            )
            .await
        }

        "invoice.payment_failed" => {
            billing::mark_past_due(
                app_state.tenants.as_ref(),
                app_state.stripe.as_ref(),
                extract_str(payload, &["data", "object", "subscription"]),
                extract_customer_id(payload),
                OffsetDateTime::now_utc(),
            )
            .await
        }

        "customer.subscription.deleted" => {
            let Some(subscription_id) = extract_subscription_id(payload) else {
                warn!(evt_type, "subscription deletion missing subscription id");
                return received();
            };
            billing::cancel(
                app_state.tenants.as_ref(),
                subscription_id,
                extract_customer_id(payload),
                extract_metadata_tenant_id(payload),
                extract_period_end(payload),
            )
            .await
        }

        // Acknowledged so the provider stops retrying types we ignore.
        _ => {
            info!(evt_type, "unhandled stripe event acknowledged");
            Ok(TransitionOutcome::Unresolved)
        }
    };

    match dispatched {
        Ok(_) => {
            if let Err(err) = app_state
                .event_log
                .mark_processed(&evt.id, OffsetDateTime::now_utc())
                .await
            {
                // The row already blocks redelivery; losing the processed
                // stamp only costs observability.
                warn!(?err, event_id = %evt.id, "failed to mark stripe event processed");
            }
            received()
        }
        Err(err) => {
            // Transient: the ledger row stays unprocessed and the provider
            // will retry the delivery.
            error!(?err, event_id = %evt.id, evt_type, "stripe event processing failed");
            JsonResponse::server_error("webhook processing failed").into_response()
        }
    }
}
