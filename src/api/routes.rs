//! API route handlers

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

use super::error::ApiError;
use super::server::AppState;
use crate::auth::{
    bearer_token, ChangePasswordRequest, LoginRequest, LoginResponse, Principal, SessionView,
};
use crate::meter::{
    frame, register_address, AcquisitionStats, MeterError, Reading, MAX_REGISTERS_PER_READ,
};

/// Default start register for block reads
const DEFAULT_START_REGISTER: u32 = 44001;

// Request/Response types

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub polling: bool,
    pub has_data: bool,
    pub stats: AcquisitionStats,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub sessions: std::collections::HashMap<String, SessionView>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct PowerResponse {
    #[serde(flatten)]
    pub reading: Option<Reading>,
    pub authenticated: bool,
    pub user: String,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub register: u32,
    pub modbus_address: u32,
    pub modbus_address_hex: String,
    pub value: u16,
    pub hex_value: String,
    pub timestamp: DateTime<Utc>,
    pub read_by: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRangeQuery {
    pub start: Option<String>,
    pub count: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterRangeResponse {
    pub start_register: u32,
    pub modbus_start: u32,
    pub modbus_address_hex: String,
    pub count: usize,
    pub values: Vec<u16>,
    pub hex_values: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub read_by: String,
}

#[derive(Debug, Deserialize)]
pub struct CommandQuery {
    pub command: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub command: Vec<u8>,
    pub command_hex: String,
    pub response: Vec<u8>,
    pub response_hex: String,
    pub parsed: Value,
    pub timestamp: DateTime<Utc>,
    pub executed_by: String,
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("No data provided".to_string()));
    }
    serde_json::from_slice(body).map_err(|_| ApiError::BadRequest("Invalid JSON data".to_string()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn hex_string(value: impl std::fmt::LowerHex) -> String {
    format!("{:#x}", value)
}

// Health check

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        polling: state.acquisition.is_running().await,
        has_data: state.acquisition.get_data().is_some(),
        stats: state.acquisition.stats(),
    })
}

// Auth routes

pub async fn login(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<LoginResponse>, ApiError> {
    let credentials: LoginRequest = parse_body(&body)?;

    let (Some(username), Some(password)) = (
        non_empty(credentials.username),
        non_empty(credentials.password),
    ) else {
        return Err(ApiError::BadRequest(
            "Username and password required".to_string(),
        ));
    };

    // the manager logs the reason for a rejection
    match state.auth.authenticate(&username, &password).await {
        Ok(login) => Ok(Json(login)),
        Err(_) => Err(ApiError::InvalidCredentials),
    }
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> impl IntoResponse {
    state.auth.logout(&principal.session.token).await;
    MessageResponse::new("Logged out successfully")
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    body: Bytes,
) -> Result<Json<MessageResponse>, ApiError> {
    let request: ChangePasswordRequest = parse_body(&body)?;

    let (Some(old_password), Some(new_password)) = (
        non_empty(request.old_password),
        non_empty(request.new_password),
    ) else {
        return Err(ApiError::BadRequest(
            "Old and new passwords required".to_string(),
        ));
    };

    if state
        .auth
        .change_password(principal.username(), &old_password, &new_password)
        .await
    {
        Ok(MessageResponse::new("Password changed successfully"))
    } else {
        Err(ApiError::BadRequest("Invalid old password".to_string()))
    }
}

/// Report whether the caller's token is live. Never rejected by the gate.
pub async fn validate_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let Some(token) = bearer_token(&headers) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "valid": false, "error": "No token provided" })),
        );
    };

    match state.auth.validate_session(token).await {
        Some(principal) => (
            StatusCode::OK,
            Json(json!({
                "valid": true,
                "user": principal.user.view(),
                "expires_at": principal.session.expires_at,
            })),
        ),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "valid": false, "error": "Invalid or expired session" })),
        ),
    }
}

pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.auth.active_sessions().await;
    let count = sessions.len();
    Json(SessionsResponse { sessions, count })
}

// Meter routes

pub async fn power(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> impl IntoResponse {
    Json(PowerResponse {
        reading: state.acquisition.get_data().as_deref().cloned(),
        authenticated: true,
        user: principal.user.username.clone(),
        role: principal.user.role.clone(),
    })
}

pub async fn read_register(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(register): Path<String>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let register: u32 = register
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid register number".to_string()))?;

    let value = state
        .acquisition
        .read_register(register)
        .await
        .map_err(|e| match e {
            MeterError::NoResponse | MeterError::InvalidRegister(_) => {
                ApiError::NotFound(format!("Failed to read register {}", register))
            }
            other => {
                tracing::error!("Error reading register {}: {}", register, other);
                ApiError::from(other)
            }
        })?;

    let modbus_address = register_address(register);
    Ok(Json(RegisterResponse {
        register,
        modbus_address,
        modbus_address_hex: hex_string(modbus_address),
        value,
        hex_value: hex_string(value),
        timestamp: Utc::now(),
        read_by: principal.user.username.clone(),
    }))
}

pub async fn read_registers(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<RegisterRangeQuery>,
) -> Result<Json<RegisterRangeResponse>, ApiError> {
    let start: u32 = match query.start.as_deref() {
        None => DEFAULT_START_REGISTER,
        Some(raw) => raw
            .parse()
            .map_err(|_| ApiError::BadRequest("Invalid start register".to_string()))?,
    };
    let requested: u32 = match query.count.as_deref() {
        None => 1,
        Some(raw) => raw
            .parse()
            .map_err(|_| ApiError::BadRequest("Invalid register count".to_string()))?,
    };
    if requested == 0 {
        return Err(ApiError::BadRequest(
            "Register count must be at least 1".to_string(),
        ));
    }
    let count = requested.min(u32::from(MAX_REGISTERS_PER_READ)) as u16;
    let last = start.saturating_add(u32::from(count) - 1);

    let values = state
        .acquisition
        .read_registers(start, count)
        .await
        .map_err(|e| match e {
            MeterError::NoResponse | MeterError::InvalidRegister(_) => {
                ApiError::NotFound(format!("Failed to read registers {}-{}", start, last))
            }
            other => {
                tracing::error!("Error reading registers {}-{}: {}", start, last, other);
                ApiError::from(other)
            }
        })?;

    if values.is_empty() {
        return Err(ApiError::NotFound(format!(
            "Failed to read registers {}-{}",
            start, last
        )));
    }

    let modbus_start = register_address(start);
    Ok(Json(RegisterRangeResponse {
        start_register: start,
        modbus_start,
        modbus_address_hex: hex_string(modbus_start),
        count: values.len(),
        hex_values: values.iter().map(|v| hex_string(*v)).collect(),
        values,
        timestamp: Utc::now(),
        read_by: principal.user.username.clone(),
    }))
}

pub async fn modbus_command(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<CommandQuery>,
) -> Result<Json<CommandResponse>, ApiError> {
    let raw = query.command.unwrap_or_default();
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ApiError::BadRequest("No command provided".to_string()));
    }
    let command =
        hex::decode(raw).map_err(|_| ApiError::BadRequest("Invalid hex string".to_string()))?;
    let command_hex = hex::encode(&command);

    tracing::info!(
        "User '{}' sending Modbus command: {}",
        principal.username(),
        command_hex
    );

    let response = state.acquisition.send_raw_command(command.clone()).await?;
    if response.is_empty() {
        return Err(ApiError::NotFound("No response received".to_string()));
    }

    Ok(Json(CommandResponse {
        parsed: frame::parse_response(&command, &response),
        command_hex,
        response_hex: hex::encode(&response),
        command,
        response,
        timestamp: Utc::now(),
        executed_by: principal.user.username.clone(),
    }))
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound("Not found".to_string())
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}
