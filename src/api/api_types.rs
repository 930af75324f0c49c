//! Serde types matching the helpdesk REST API payloads.
//!
//! The backend speaks Spanish field names; these types are kept separate from
//! the domain types so the rest of the crate never sees the wire shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{
  Attachment, Building, Group, Location, Message, Order, OrderDraft, OrderId, OrderPatch,
  OrderStatus, Page, Priority, Sector, Tag, TagRef, User, UserDraft, UserRef,
};
use crate::error::DeskError;

// ============================================================================
// Enumerations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiEstado {
  Abierta,
  Resuelta,
  Cancelada,
}

impl ApiEstado {
  pub fn as_param(self) -> &'static str {
    match self {
      ApiEstado::Abierta => "abierta",
      ApiEstado::Resuelta => "resuelta",
      ApiEstado::Cancelada => "cancelada",
    }
  }
}

impl From<ApiEstado> for OrderStatus {
  fn from(estado: ApiEstado) -> Self {
    match estado {
      ApiEstado::Abierta => OrderStatus::Open,
      ApiEstado::Resuelta => OrderStatus::Resolved,
      ApiEstado::Cancelada => OrderStatus::Cancelled,
    }
  }
}

impl From<OrderStatus> for ApiEstado {
  fn from(status: OrderStatus) -> Self {
    match status {
      OrderStatus::Open => ApiEstado::Abierta,
      OrderStatus::Resolved => ApiEstado::Resuelta,
      OrderStatus::Cancelled => ApiEstado::Cancelada,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiPrioridad {
  Baja,
  Media,
  Alta,
  #[serde(alias = "crítica")]
  Critica,
}

impl ApiPrioridad {
  pub fn as_param(self) -> &'static str {
    match self {
      ApiPrioridad::Baja => "baja",
      ApiPrioridad::Media => "media",
      ApiPrioridad::Alta => "alta",
      ApiPrioridad::Critica => "critica",
    }
  }
}

impl From<ApiPrioridad> for Priority {
  fn from(p: ApiPrioridad) -> Self {
    match p {
      ApiPrioridad::Baja => Priority::Low,
      ApiPrioridad::Media => Priority::Medium,
      ApiPrioridad::Alta => Priority::High,
      ApiPrioridad::Critica => Priority::Critical,
    }
  }
}

impl From<Priority> for ApiPrioridad {
  fn from(p: Priority) -> Self {
    match p {
      Priority::Low => ApiPrioridad::Baja,
      Priority::Medium => ApiPrioridad::Media,
      Priority::High => ApiPrioridad::Alta,
      Priority::Critical => ApiPrioridad::Critica,
    }
  }
}

// ============================================================================
// Nested references
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiUserRef {
  pub id: u64,
  #[serde(default)]
  pub username: String,
  #[serde(default)]
  pub first_name: String,
  #[serde(default)]
  pub last_name: String,
}

impl From<ApiUserRef> for UserRef {
  fn from(u: ApiUserRef) -> Self {
    UserRef {
      id: u.id,
      username: u.username,
      first_name: u.first_name,
      last_name: u.last_name,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiTag {
  pub id: u64,
  pub nombre: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiAdjunto {
  pub nombre: String,
  pub url: String,
}

// ============================================================================
// Orders and messages
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMensaje {
  pub id: u64,
  #[serde(default)]
  pub texto: String,
  pub autor: ApiUserRef,
  #[serde(default)]
  pub adjuntos: Vec<ApiAdjunto>,
  pub created_at: DateTime<Utc>,
  /// Present on live frames, absent inside an order payload
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub orden: Option<OrderId>,
}

impl From<ApiMensaje> for Message {
  fn from(m: ApiMensaje) -> Self {
    Message {
      id: m.id,
      text: m.texto,
      author: m.autor.into(),
      attachments: m
        .adjuntos
        .into_iter()
        .map(|a| Attachment {
          name: a.nombre,
          url: a.url,
        })
        .collect(),
      created: m.created_at,
    }
  }
}

impl ApiMensaje {
  /// Wire form of a message sent from here, tagged with its order.
  pub fn announce(order: OrderId, m: &Message) -> Self {
    ApiMensaje {
      id: m.id,
      texto: m.text.clone(),
      autor: ApiUserRef {
        id: m.author.id,
        username: m.author.username.clone(),
        first_name: m.author.first_name.clone(),
        last_name: m.author.last_name.clone(),
      },
      adjuntos: m
        .attachments
        .iter()
        .map(|a| ApiAdjunto {
          nombre: a.name.clone(),
          url: a.url.clone(),
        })
        .collect(),
      created_at: m.created,
      orden: Some(order),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiOrden {
  pub id: OrderId,
  pub titulo: String,
  #[serde(default)]
  pub detalle: String,
  pub estado: ApiEstado,
  pub prioridad: ApiPrioridad,
  pub cliente: ApiUserRef,
  #[serde(default)]
  pub agentes: Vec<ApiUserRef>,
  #[serde(default)]
  pub tags: Vec<ApiTag>,
  pub edificio: Option<String>,
  pub piso: Option<String>,
  pub oficina: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  #[serde(default)]
  pub mensajes: Vec<ApiMensaje>,
}

impl TryFrom<ApiOrden> for Order {
  type Error = DeskError;

  fn try_from(o: ApiOrden) -> Result<Self, Self::Error> {
    if o.titulo.trim().is_empty() {
      return Err(DeskError::Decode(format!("order {} has no title", o.id)));
    }
    let mut messages: Vec<Message> = o.mensajes.into_iter().map(Message::from).collect();
    // Chat is rendered oldest first
    messages.sort_by_key(|m| (m.created, m.id));
    Ok(Order {
      id: o.id,
      title: o.titulo,
      detail: o.detalle,
      status: o.estado.into(),
      priority: o.prioridad.into(),
      client: o.cliente.into(),
      agents: o.agentes.into_iter().map(UserRef::from).collect(),
      tags: o
        .tags
        .into_iter()
        .map(|t| TagRef {
          id: t.id,
          name: t.nombre,
        })
        .collect(),
      location: Location {
        building: o.edificio,
        floor: o.piso,
        office: o.oficina,
      },
      created: o.created_at,
      updated: o.updated_at,
      messages,
    })
  }
}

/// Body for `POST /ordenes/` and `PATCH /ordenes/{id}/`
#[derive(Debug, Default, Serialize)]
pub struct ApiOrdenWrite {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub titulo: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub detalle: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub estado: Option<ApiEstado>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub prioridad: Option<ApiPrioridad>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cliente: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub agentes: Option<Vec<u64>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tags: Option<Vec<u64>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub edificio: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub piso: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub oficina: Option<String>,
}

impl From<&OrderDraft> for ApiOrdenWrite {
  fn from(d: &OrderDraft) -> Self {
    ApiOrdenWrite {
      titulo: Some(d.title.trim().to_string()),
      detalle: Some(d.detail.clone()),
      estado: Some(ApiEstado::Abierta),
      prioridad: Some(d.priority.into()),
      cliente: Some(d.client),
      agentes: Some(d.agents.clone()),
      tags: Some(d.tags.clone()),
      edificio: d.location.building.clone(),
      piso: d.location.floor.clone(),
      oficina: d.location.office.clone(),
    }
  }
}

impl From<&OrderPatch> for ApiOrdenWrite {
  fn from(p: &OrderPatch) -> Self {
    let location = p.location.clone().unwrap_or_default();
    ApiOrdenWrite {
      titulo: p.title.as_ref().map(|t| t.trim().to_string()),
      detalle: p.detail.clone(),
      estado: p.status.map(ApiEstado::from),
      prioridad: p.priority.map(ApiPrioridad::from),
      cliente: None,
      agentes: p.agents.clone(),
      tags: p.tags.clone(),
      edificio: location.building,
      piso: location.floor,
      oficina: location.office,
    }
  }
}

#[derive(Debug, Serialize)]
pub struct ApiMensajeWrite {
  pub texto: String,
}

// ============================================================================
// Users and reference data
// ============================================================================

/// Groups arrive either as plain names or as `{id, name}` objects
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ApiGroupRef {
  Name(String),
  Object { name: String },
}

impl ApiGroupRef {
  fn into_name(self) -> String {
    match self {
      ApiGroupRef::Name(name) | ApiGroupRef::Object { name } => name,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiUser {
  pub id: u64,
  pub username: String,
  #[serde(default)]
  pub email: String,
  #[serde(default)]
  pub first_name: String,
  #[serde(default)]
  pub last_name: String,
  #[serde(default)]
  pub groups: Vec<ApiGroupRef>,
  #[serde(default)]
  pub external_id: Option<String>,
}

impl From<ApiUser> for User {
  fn from(u: ApiUser) -> Self {
    User {
      id: u.id,
      username: u.username,
      email: u.email,
      first_name: u.first_name,
      last_name: u.last_name,
      groups: u.groups.into_iter().map(ApiGroupRef::into_name).collect(),
      external_id: u.external_id.filter(|id| !id.is_empty()),
    }
  }
}

#[derive(Debug, Serialize)]
pub struct ApiUserWrite<'a> {
  pub username: &'a str,
  pub email: &'a str,
  pub first_name: &'a str,
  pub last_name: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub external_id: Option<&'a str>,
}

impl<'a> From<&'a UserDraft> for ApiUserWrite<'a> {
  fn from(d: &'a UserDraft) -> Self {
    ApiUserWrite {
      username: &d.username,
      email: &d.email,
      first_name: &d.first_name,
      last_name: &d.last_name,
      external_id: d.external_id.as_deref(),
    }
  }
}

impl From<ApiTag> for Tag {
  fn from(t: ApiTag) -> Self {
    Tag {
      id: t.id,
      name: t.nombre,
    }
  }
}

#[derive(Debug, Serialize)]
pub struct ApiTagWrite<'a> {
  pub nombre: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ApiEdificio {
  pub id: u64,
  pub nombre: String,
  #[serde(default)]
  pub pisos: Vec<String>,
}

impl From<ApiEdificio> for Building {
  fn from(b: ApiEdificio) -> Self {
    Building {
      id: b.id,
      name: b.nombre,
      floors: b.pisos,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiSector {
  pub id: u64,
  pub nombre: String,
}

impl From<ApiSector> for Sector {
  fn from(s: ApiSector) -> Self {
    Sector {
      id: s.id,
      name: s.nombre,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiGroup {
  pub id: u64,
  pub name: String,
}

impl From<ApiGroup> for Group {
  fn from(g: ApiGroup) -> Self {
    Group {
      id: g.id,
      name: g.name,
    }
  }
}

// ============================================================================
// Envelopes
// ============================================================================

/// Paginated list envelope: `{count, next, previous, results}`
#[derive(Debug, Deserialize)]
pub struct ApiPage<T> {
  #[serde(default)]
  pub count: u64,
  pub next: Option<String>,
  #[allow(dead_code)]
  pub previous: Option<String>,
  #[serde(default = "Vec::new")]
  pub results: Vec<T>,
}

impl<T> ApiPage<T> {
  pub fn into_page<U: From<T>>(self, page: u32) -> Page<U> {
    Page {
      items: self.results.into_iter().map(U::from).collect(),
      total: self.count,
      page,
      has_next: self.next.is_some(),
    }
  }

  /// Convert the envelope, validating each item on the way in.
  pub fn try_into_page<U>(self, page: u32) -> Result<Page<U>, DeskError>
  where
    U: TryFrom<T, Error = DeskError>,
  {
    let items = self
      .results
      .into_iter()
      .map(U::try_from)
      .collect::<Result<Vec<U>, DeskError>>()?;
    Ok(Page {
      items,
      total: self.count,
      page,
      has_next: self.next.is_some(),
    })
  }
}

/// Reference-data listings come back either bare or paginated
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiList<T> {
  Plain(Vec<T>),
  Paged(ApiPage<T>),
}

impl<T> ApiList<T> {
  pub fn into_vec<U: From<T>>(self) -> Vec<U> {
    let items = match self {
      ApiList::Plain(items) => items,
      ApiList::Paged(page) => page.results,
    };
    items.into_iter().map(U::from).collect()
  }
}

/// Error body; the backend uses either `detail` or `message`
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
  pub detail: Option<String>,
  pub message: Option<String>,
}

/// Pull a readable message out of a non-2xx response body.
pub fn error_message(body: &str) -> String {
  if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body) {
    if let Some(msg) = parsed.detail.or(parsed.message) {
      return msg;
    }
  }
  // Field errors: {"titulo": ["Este campo es requerido."]}
  if let Ok(serde_json::Value::Object(fields)) = serde_json::from_str::<serde_json::Value>(body) {
    let parts: Vec<String> = fields
      .iter()
      .map(|(field, errs)| match errs {
        serde_json::Value::Array(list) => {
          let msgs: Vec<&str> = list.iter().filter_map(|e| e.as_str()).collect();
          format!("{}: {}", field, msgs.join(" "))
        }
        other => format!("{}: {}", field, other),
      })
      .collect();
    if !parts.is_empty() {
      return parts.join("; ");
    }
  }
  let trimmed = body.trim();
  if trimmed.is_empty() {
    "no response body".to_string()
  } else {
    trimmed.chars().take(200).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const ORDER_JSON: &str = r#"{
    "id": 42,
    "titulo": "No puedo iniciar sesión",
    "detalle": "El login devuelve error 500",
    "estado": "abierta",
    "prioridad": "alta",
    "cliente": {"id": 7, "username": "mgarcia", "first_name": "María", "last_name": "García"},
    "agentes": [{"id": 2, "username": "soporte1"}],
    "tags": [{"id": 3, "nombre": "login"}],
    "edificio": "Central",
    "piso": "2",
    "oficina": null,
    "created_at": "2024-03-01T10:00:00Z",
    "updated_at": "2024-03-01T12:00:00Z",
    "mensajes": [
      {"id": 11, "texto": "segundo", "autor": {"id": 2}, "created_at": "2024-03-01T11:30:00Z"},
      {"id": 10, "texto": "primero", "autor": {"id": 7}, "created_at": "2024-03-01T11:00:00Z"}
    ]
  }"#;

  #[test]
  fn test_order_conversion() {
    let wire: ApiOrden = serde_json::from_str(ORDER_JSON).unwrap();
    let order = Order::try_from(wire).unwrap();

    assert_eq!(order.id, 42);
    assert_eq!(order.status, OrderStatus::Open);
    assert_eq!(order.priority, Priority::High);
    assert_eq!(order.client.display_name(), "María García");
    assert_eq!(order.agents[0].display_name(), "soporte1");
    assert_eq!(order.tags[0].name, "login");
    assert_eq!(order.location.describe(), "Central / 2");
    // Messages sorted oldest first
    assert_eq!(order.messages[0].text, "primero");
    assert_eq!(order.messages[1].text, "segundo");
  }

  #[test]
  fn test_order_without_title_is_rejected() {
    let mut wire: ApiOrden = serde_json::from_str(ORDER_JSON).unwrap();
    wire.titulo = "   ".to_string();
    assert!(matches!(Order::try_from(wire), Err(DeskError::Decode(_))));
  }

  #[test]
  fn test_unknown_status_fails_to_decode() {
    let json = ORDER_JSON.replace("\"abierta\"", "\"archivada\"");
    assert!(serde_json::from_str::<ApiOrden>(&json).is_err());
  }

  #[test]
  fn test_page_envelope() {
    let json = format!(
      r#"{{"count": 25, "next": "https://x/api/ordenes/?page=2", "previous": null, "results": [{}]}}"#,
      ORDER_JSON
    );
    let wire: ApiPage<ApiOrden> = serde_json::from_str(&json).unwrap();
    let page: Page<Order> = wire.try_into_page(1).unwrap();
    assert_eq!(page.total, 25);
    assert!(page.has_next);
    assert!(!page.has_prev());
    assert_eq!(page.items.len(), 1);
  }

  #[test]
  fn test_reference_lists_bare_or_paged() {
    let bare: ApiList<ApiTag> = serde_json::from_str(r#"[{"id": 1, "nombre": "red"}]"#).unwrap();
    let tags: Vec<Tag> = bare.into_vec();
    assert_eq!(tags[0].name, "red");

    let paged: ApiList<ApiTag> = serde_json::from_str(
      r#"{"count": 1, "next": null, "previous": null, "results": [{"id": 2, "nombre": "vpn"}]}"#,
    )
    .unwrap();
    let tags: Vec<Tag> = paged.into_vec();
    assert_eq!(tags[0].id, 2);
  }

  #[test]
  fn test_user_groups_accept_names_and_objects() {
    let json = r#"{"id": 1, "username": "root", "groups": ["admin", {"id": 2, "name": "superadmin"}], "external_id": ""}"#;
    let user: User = serde_json::from_str::<ApiUser>(json).unwrap().into();
    assert_eq!(user.groups, vec!["admin", "superadmin"]);
    assert_eq!(user.external_id, None);
  }

  #[test]
  fn test_patch_only_serializes_set_fields() {
    let patch = OrderPatch {
      status: Some(OrderStatus::Resolved),
      ..Default::default()
    };
    let body = serde_json::to_value(ApiOrdenWrite::from(&patch)).unwrap();
    assert_eq!(body, serde_json::json!({"estado": "resuelta"}));
  }

  #[test]
  fn test_error_message_variants() {
    assert_eq!(error_message(r#"{"detail": "No encontrado."}"#), "No encontrado.");
    assert_eq!(
      error_message(r#"{"titulo": ["Este campo es requerido."]}"#),
      "titulo: Este campo es requerido."
    );
    assert_eq!(error_message(""), "no response body");
    assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
  }
}
