//! API handlers.
//!
//! [`model_wrapper`] is the single generic dispatcher: everything it knows
//! about a model comes from the model's descriptor.
use crate::envelope::{attachment, json_ok, ApiError};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use crashstats_core::{
    validate, BackendError, BackendResult, Caller, GatewayError, ModelDescriptor, ModelKind,
    RawParams, GATEWAY_VERSION,
};
use crashstats_policy::{
    authorize_model, authorize_params, filter_restricted_params, redact, Verdict,
};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, warn};

fn parse_pairs(input: &[u8]) -> RawParams {
    RawParams::from_pairs(url::form_urlencoded::parse(input).into_owned())
}

fn check(verdict: Verdict, caller: &Caller, model: &ModelDescriptor) -> Result<(), ApiError> {
    if let Verdict::Forbid { permission, .. } = &verdict {
        warn!(
            model = %model.name,
            caller = %caller.label(),
            permission = %permission,
            "Permission denied"
        );
    }
    verdict.into_result().map_err(ApiError)
}

fn backend_failure(model: &ModelDescriptor, err: BackendError) -> ApiError {
    if err.is_argument_error() {
        debug!(model = %model.name, error = %err, "Backend rejected arguments");
    } else {
        warn!(model = %model.name, error = %err, "Backend call failed");
    }
    ApiError(GatewayError::from(err))
}

/// `GET|POST /api/{model_name}/`
pub async fn model_wrapper(
    State(state): State<AppState>,
    Path(model_name): Path<String>,
    Extension(caller): Extension<Caller>,
    method: Method,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    let response = match dispatch(&state, &model_name, &caller, &method, query, &body).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    };

    let label = if state.registry.lookup(&model_name).is_ok() {
        model_name.as_str()
    } else {
        "unknown"
    };
    state.metrics.observe_request(label, response.status().as_u16());
    response
}

async fn dispatch(
    state: &AppState,
    model_name: &str,
    caller: &Caller,
    method: &Method,
    query: Option<String>,
    body: &[u8],
) -> Result<Response, ApiError> {
    let model = state.registry.lookup(model_name)?;
    check(authorize_model(caller, model), caller, model)?;

    let verb = if *method == Method::HEAD { "GET" } else { method.as_str() };
    if !model.methods().contains(&verb) {
        return Err(ApiError(GatewayError::MethodNotAllowed {
            method: method.to_string(),
            allowed: match model.kind {
                ModelKind::Action => "POST",
                ModelKind::Query => "GET, POST",
            },
        }));
    }

    let mut raw = parse_pairs(query.as_deref().unwrap_or_default().as_bytes());
    if *method == Method::POST {
        raw.extend(parse_pairs(body));
    }

    let mut params = validate(model, &raw, &state.validation).map_err(GatewayError::Validation)?;
    check(authorize_params(caller, model, &params), caller, model)?;
    filter_restricted_params(caller, model, &mut params);
    let backend_params = model.backend_params(&params);

    if model.kind == ModelKind::Action {
        let value = state
            .backend
            .act(model, &backend_params)
            .await
            .map_err(|e| backend_failure(model, e))?;
        debug!(model = %model.name, "Action performed");
        return Ok(json_ok(&value, None));
    }

    let cacheable = state.config.response_cache && model.is_cacheable();
    let cache_header = model.is_cacheable().then_some(model.cache_seconds);
    let cache_key = cacheable
        .then(|| serde_json::to_string(&backend_params).ok())
        .flatten()
        .map(|canonical| format!("response:{}:{}", model.name, canonical));

    if let Some(key) = &cache_key {
        match state.store.get(key).await {
            Ok(Some(cached)) => match serde_json::from_str::<Value>(&cached) {
                Ok(value) => {
                    debug!(model = %model.name, "Response served from cache");
                    return Ok(json_ok(&value, cache_header));
                }
                Err(err) => warn!(key = %key, error = %err, "Discarding unreadable cache entry"),
            },
            Ok(None) => {}
            Err(err) => warn!(key = %key, error = %err, "Response cache unavailable"),
        }
    }

    let result = state
        .backend
        .get(model, &backend_params)
        .await
        .map_err(|e| backend_failure(model, e))?;

    let filename = || {
        model
            .attachment_filename(&params)
            .unwrap_or_else(|| format!("{}.bin", model.name))
    };
    let value = match result {
        BackendResult::Binary(bytes) => return Ok(attachment(bytes, &filename())),
        BackendResult::Json(Value::String(blob)) if model.wants_binary(&params) => {
            return Ok(attachment(blob.into_bytes(), &filename()))
        }
        BackendResult::Json(value) => redact(model, &caller.effective_permissions(), value),
    };

    if let Some(key) = &cache_key {
        if let Ok(text) = serde_json::to_string(&value) {
            let ttl = Duration::from_secs(model.cache_seconds);
            if let Err(err) = state.store.set(key, &text, ttl).await {
                warn!(key = %key, error = %err, "Failed to cache response");
            }
        }
    }

    debug!(model = %model.name, caller = %caller.label(), "Model served");
    Ok(json_ok(&value, cache_header))
}

/// `GET /api/`: every addressable model and how to call it
pub async fn documentation(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "version": GATEWAY_VERSION,
        "models": state.registry.documentation(),
    }))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": GATEWAY_VERSION }))
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.encode() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
