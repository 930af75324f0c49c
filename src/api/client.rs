use color_eyre::{eyre::eyre, Result};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::api::api_types::{
  error_message, ApiEdificio, ApiGroup, ApiList, ApiMensaje, ApiMensajeWrite, ApiOrden,
  ApiOrdenWrite, ApiPage, ApiSector, ApiTag, ApiTagWrite, ApiUser, ApiUserWrite,
};
use crate::api::types::{
  Building, Group, Message, Order, OrderDraft, OrderId, OrderPatch, Page, Sector, Tag, TagId,
  User, UserDraft, UserId,
};
use crate::api::DeskApi;
use crate::config::Config;
use crate::error::{DeskError, DeskResult};
use crate::filter::FilterSnapshot;

/// Helpdesk REST client
#[derive(Clone)]
pub struct HttpApi {
  client: reqwest::Client,
  base: Url,
  token: String,
}

impl HttpApi {
  pub fn new(config: &Config) -> Result<Self> {
    let token = Config::get_api_token()?;
    let base = config.api.base_url()?;

    let client = reqwest::Client::builder()
      .timeout(config.api.timeout())
      .user_agent(concat!("deskboard/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base,
      token,
    })
  }

  pub fn token(&self) -> &str {
    &self.token
  }

  fn url(&self, path: &str) -> DeskResult<Url> {
    self
      .base
      .join(path)
      .map_err(|e| DeskError::Validation(format!("bad API path {}: {}", path, e)))
  }

  fn request(&self, method: Method, path: &str) -> DeskResult<RequestBuilder> {
    let url = self.url(path)?;
    debug!(%method, %url, "api request");
    Ok(self.client.request(method, url).bearer_auth(&self.token))
  }

  /// Turn non-2xx responses into `DeskError::Api` with the server's message.
  async fn check(response: Response) -> DeskResult<Response> {
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DeskError::Api {
      status: status.as_u16(),
      message: error_message(&body),
    })
  }

  async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> DeskResult<T> {
    let response = self.request(Method::GET, path)?.query(query).send().await?;
    let response = Self::check(response).await?;
    Ok(response.json::<T>().await?)
  }

  async fn send<B: Serialize, T: DeserializeOwned>(
    &self,
    method: Method,
    path: &str,
    body: &B,
  ) -> DeskResult<T> {
    let response = self.request(method, path)?.json(body).send().await?;
    let response = Self::check(response).await?;
    Ok(response.json::<T>().await?)
  }

  async fn delete(&self, path: &str) -> DeskResult<()> {
    let response = self.request(Method::DELETE, path)?.send().await?;
    Self::check(response).await?;
    Ok(())
  }
}

impl DeskApi for HttpApi {
  /// Get one page of orders, newest activity first
  async fn list_orders(&self, page: u32, filters: &FilterSnapshot) -> DeskResult<Page<Order>> {
    let mut query = filters.to_query();
    query.push(("page", page.to_string()));
    query.push(("ordering", "-updated_at".to_string()));

    let response: ApiPage<ApiOrden> = self.get("ordenes/", &query).await?;
    response.try_into_page(page)
  }

  async fn get_order(&self, id: OrderId) -> DeskResult<Order> {
    let order: ApiOrden = self.get(&format!("ordenes/{}/", id), &[]).await?;
    Order::try_from(order)
  }

  async fn create_order(&self, draft: &OrderDraft) -> DeskResult<Order> {
    let body = ApiOrdenWrite::from(draft);
    let order: ApiOrden = self.send(Method::POST, "ordenes/", &body).await?;
    Order::try_from(order)
  }

  async fn update_order(&self, id: OrderId, patch: &OrderPatch) -> DeskResult<Order> {
    let body = ApiOrdenWrite::from(patch);
    let order: ApiOrden = self
      .send(Method::PATCH, &format!("ordenes/{}/", id), &body)
      .await?;
    Order::try_from(order)
  }

  async fn delete_order(&self, id: OrderId) -> DeskResult<()> {
    self.delete(&format!("ordenes/{}/", id)).await
  }

  async fn post_message(&self, order: OrderId, text: &str) -> DeskResult<Message> {
    let body = ApiMensajeWrite {
      texto: text.to_string(),
    };
    let message: ApiMensaje = self
      .send(Method::POST, &format!("ordenes/{}/mensajes/", order), &body)
      .await?;
    Ok(message.into())
  }

  async fn list_users(&self, page: u32, search: &str) -> DeskResult<Page<User>> {
    let mut query = vec![("page", page.to_string())];
    if !search.is_empty() {
      query.push(("search", search.to_string()));
    }
    let response: ApiPage<ApiUser> = self.get("users/", &query).await?;
    Ok(response.into_page(page))
  }

  async fn get_user(&self, id: UserId) -> DeskResult<User> {
    let user: ApiUser = self.get(&format!("users/{}/", id), &[]).await?;
    Ok(user.into())
  }

  async fn current_user(&self) -> DeskResult<User> {
    let user: ApiUser = self.get("users/me/", &[]).await?;
    Ok(user.into())
  }

  async fn find_user_by_external_id(&self, external_id: &str) -> DeskResult<Option<User>> {
    let query = [("external_id", external_id.to_string())];
    let response: ApiList<ApiUser> = self.get("users/", &query).await?;
    let users: Vec<User> = response.into_vec();
    Ok(
      users
        .into_iter()
        .find(|u| u.external_id.as_deref() == Some(external_id)),
    )
  }

  async fn create_user(&self, draft: &UserDraft) -> DeskResult<User> {
    let user: ApiUser = self
      .send(Method::POST, "users/", &ApiUserWrite::from(draft))
      .await?;
    Ok(user.into())
  }

  async fn update_user(&self, id: UserId, draft: &UserDraft) -> DeskResult<User> {
    let user: ApiUser = self
      .send(
        Method::PATCH,
        &format!("users/{}/", id),
        &ApiUserWrite::from(draft),
      )
      .await?;
    Ok(user.into())
  }

  async fn delete_user(&self, id: UserId) -> DeskResult<()> {
    self.delete(&format!("users/{}/", id)).await
  }

  async fn list_tags(&self) -> DeskResult<Vec<Tag>> {
    let response: ApiList<ApiTag> = self.get("tags/", &[]).await?;
    Ok(response.into_vec())
  }

  async fn create_tag(&self, name: &str) -> DeskResult<Tag> {
    let tag: ApiTag = self
      .send(Method::POST, "tags/", &ApiTagWrite { nombre: name })
      .await?;
    Ok(tag.into())
  }

  async fn delete_tag(&self, id: TagId) -> DeskResult<()> {
    self.delete(&format!("tags/{}/", id)).await
  }

  async fn list_buildings(&self) -> DeskResult<Vec<Building>> {
    let response: ApiList<ApiEdificio> = self.get("edificios/", &[]).await?;
    Ok(response.into_vec())
  }

  async fn list_sectors(&self) -> DeskResult<Vec<Sector>> {
    let response: ApiList<ApiSector> = self.get("sectores/", &[]).await?;
    Ok(response.into_vec())
  }

  async fn list_groups(&self) -> DeskResult<Vec<Group>> {
    let response: ApiList<ApiGroup> = self.get("groups/", &[]).await?;
    Ok(response.into_vec())
  }
}
