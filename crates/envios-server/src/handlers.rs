use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use chrono::NaiveDate;
use envios_core::{LifecycleError, PolicyRow};
use envios_types::{
    DEFAULT_PAGE_LIMIT, DeliveryState, Department, Evidence, MessageRecord, NewShipment, Page, Shipment,
    ShipmentFilter, ShipmentId, TrackingView, TransitionPayload,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::AppState;
use crate::error::ApiError;
use crate::identity::Identity;

pub const BANNER: &str = "API de Gestión de Envíos - Uruguay";

const DEFAULT_MESSAGE_LIMIT: usize = 50;

/// Ids that do not parse cannot name a stored shipment.
fn shipment_id(raw: &str) -> Result<ShipmentId, ApiError> {
    raw.parse()
        .map_err(|_| LifecycleError::NotFound(raw.to_string()).into())
}

/// Listing filter as sent by the back-office UI.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default, alias = "departamento")]
    pub department: Option<Department>,
    #[serde(default, alias = "motivo")]
    pub reason: Option<String>,
    #[serde(default, alias = "estado")]
    pub state: Option<DeliveryState>,
    #[serde(default, alias = "fecha_desde")]
    pub date_from: Option<NaiveDate>,
    #[serde(default, alias = "fecha_hasta")]
    pub date_to: Option<NaiveDate>,
    #[serde(default)]
    pub ticket: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub skip: Option<usize>,
}

impl ListQuery {
    fn filter(&self) -> ShipmentFilter {
        ShipmentFilter {
            department: self.department,
            reason: self.reason.clone().filter(|r| !r.trim().is_empty()),
            state: self.state,
            date_from: self.date_from,
            date_to: self.date_to,
            ticket: self.ticket.clone(),
        }
    }

    fn page(&self) -> Page {
        Page::new(self.limit.unwrap_or(DEFAULT_PAGE_LIMIT), self.skip.unwrap_or(0))
    }
}

/// Body of `PATCH /api/envios/{id}/estado`.
#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    #[serde(alias = "state")]
    pub nuevo_estado: DeliveryState,
    #[serde(default, alias = "receiver_name")]
    pub receptor_nombre: Option<String>,
    #[serde(default, alias = "receiver_id")]
    pub receptor_cedula: Option<String>,
    #[serde(default, alias = "reason")]
    pub comentario: Option<String>,
    #[serde(default, alias = "evidence_url")]
    pub imagen_url: Option<String>,
}

impl From<StatusUpdate> for TransitionPayload {
    fn from(update: StatusUpdate) -> Self {
        TransitionPayload {
            receiver_name: update.receptor_nombre,
            receiver_id: update.receptor_cedula,
            reason: update.comentario,
            evidence: update
                .imagen_url
                .filter(|u| !u.trim().is_empty())
                .map(Evidence::Reference),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn banner() -> Json<Value> {
    Json(json!({ "message": BANNER }))
}

pub async fn departments(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "departamentos": state.manager.catalog().departments }))
}

pub async fn reasons(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "motivos": state.manager.catalog().reasons }))
}

pub async fn create(
    State(state): State<AppState>,
    Identity(actor): Identity,
    body: Result<Json<NewShipment>, JsonRejection>,
) -> Result<Json<Shipment>, ApiError> {
    let Json(fields) = body?;
    let shipment = state.manager.create_shipment(&fields, &actor).await?;
    Ok(Json(shipment))
}

pub async fn list(
    State(state): State<AppState>,
    Identity(_): Identity,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<Shipment>>, ApiError> {
    let Query(query) = query?;
    let items = state.manager.query_shipments(&query.filter(), query.page()).await?;
    Ok(Json(items))
}

pub async fn count(
    State(state): State<AppState>,
    Identity(_): Identity,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let count = state.manager.count_shipments(&query.filter()).await?;
    Ok(Json(json!({ "count": count })))
}

pub async fn get_one(
    State(state): State<AppState>,
    Identity(_): Identity,
    Path(id): Path<String>,
) -> Result<Json<Shipment>, ApiError> {
    let shipment = state.manager.get_shipment(shipment_id(&id)?).await?;
    Ok(Json(shipment))
}

pub async fn delete_one(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.manager.delete_shipment(shipment_id(&id)?, &actor).await?;
    Ok(Json(json!({ "message": "Envío eliminado exitosamente" })))
}

pub async fn transition(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Path(id): Path<String>,
    body: Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Json<Shipment>, ApiError> {
    let id = shipment_id(&id)?;
    let Json(update) = body?;
    let target = update.nuevo_estado;
    let shipment = state
        .manager
        .transition_shipment(id, target, update.into(), &actor)
        .await?;
    Ok(Json(shipment))
}

pub async fn upload_image(
    State(state): State<AppState>,
    Identity(_): Identity,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let url = state.manager.upload_evidence_image(shipment_id(&id)?, &body).await?;
    Ok(Json(json!({ "url": url })))
}

pub async fn tracking(
    State(state): State<AppState>,
    Path(ticket): Path<String>,
) -> Result<Json<TrackingView>, ApiError> {
    Ok(Json(state.manager.get_shipment_by_ticket(&ticket).await?))
}

pub async fn messages(
    State(state): State<AppState>,
    Identity(_): Identity,
    query: Result<Query<MessagesQuery>, QueryRejection>,
) -> Result<Json<Vec<MessageRecord>>, ApiError> {
    let Query(query) = query?;
    let limit = query.limit.unwrap_or(DEFAULT_MESSAGE_LIMIT);
    Ok(Json(state.manager.list_messages(limit).await?))
}

pub async fn policy(State(state): State<AppState>) -> Json<Vec<PolicyRow>> {
    Json(state.manager.policy_rows())
}
