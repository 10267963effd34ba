// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! REST client for the Airplane Navigator service.
//!
//! All endpoints live under a common `/services/api` prefix and list
//! endpoints share a paginated envelope ([`Page`]). Protected calls carry a
//! bearer token sourced from the [`Session`]; any 401 response is broadcast
//! as [`crate::session::SessionEvent::Invalidated`] before the error is
//! returned, so every consumer sees the logout exactly once.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grid::RawGrid;
use crate::session::Session;

/// Errors surfaced by API calls.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// 401 split out from other status codes: it invalidates the session.
    #[error("unauthorized")]
    Unauthorized,

    #[error("server returned {status} for {url}")]
    Status { status: StatusCode, url: String },
}

/// Paginated list envelope used by every list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// Number of pages for a given server page size.
    #[must_use]
    pub fn total_pages(&self, page_size: u64) -> u64 {
        self.count.div_ceil(page_size.max(1))
    }
}

/// Facing direction of an airplane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Heading {
    Up,
    Down,
    Left,
    Right,
}

impl Heading {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Heading::Up => "UP",
            Heading::Down => "DOWN",
            Heading::Left => "LEFT",
            Heading::Right => "RIGHT",
        }
    }
}

/// World row as returned by the list endpoint (no basemap).
#[derive(Debug, Clone, Deserialize)]
pub struct WorldSummary {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Full world record including the base map grid.
#[derive(Debug, Clone, Deserialize)]
pub struct World {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub basemap: RawGrid,
}

/// Payload for creating a world.
#[derive(Debug, Clone, Serialize)]
pub struct NewWorld {
    pub name: String,
    pub description: String,
    pub width: u32,
    pub height: u32,
}

/// A simulated airplane owned by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct Airplane {
    pub id: i64,
    pub name: String,
    pub pos_x: i32,
    pub pos_y: i32,
    pub rotation: Heading,
    /// Display color as `#rrggbb`.
    pub color: String,
    #[serde(default)]
    pub flight_ended: bool,
    pub updated_at: DateTime<Utc>,
}

/// A grid cell previously observed by some airplane's scanner.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ScannedCell {
    pub pos_x: i32,
    pub pos_y: i32,
}

/// Access token granting an external agent entry to a world.
#[derive(Debug, Clone, Deserialize)]
pub struct WorldToken {
    pub world_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlightLog {
    pub id: i64,
    pub name: String,
    pub coverage: String,
    pub world: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InventoryItem {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DistributionCenter {
    pub id: i64,
    pub center_name: String,
}

/// Payload for requesting an inventory item.
#[derive(Debug, Clone, Serialize)]
pub struct ItemRequest {
    pub item: i64,
    pub quantity: i64,
}

/// Async client for the `/services/api` surface.
///
/// Cheap to clone; the underlying connection pool and session are shared.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<Session>,
}

impl ApiClient {
    /// Create a client rooted at `base_url` (e.g.
    /// `http://localhost:8000/services/api`). A trailing slash is trimmed.
    #[must_use]
    pub fn new(base_url: &str, session: Arc<Session>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        }
    }

    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.http.request(method, url);
        if let Some(token) = self.session.bearer_token() {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    /// Run a request, mapping 401 to [`ApiError::Unauthorized`] and signalling
    /// session invalidation.
    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.session.invalidate();
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            return Err(ApiError::Status {
                status,
                url: response.url().to_string(),
            });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.send(self.request(Method::GET, path)).await?;
        Ok(response.json().await?)
    }

    pub async fn list_worlds(&self, page: u32, search: &str) -> Result<Page<WorldSummary>, ApiError> {
        let builder = self
            .request(Method::GET, "/worlds/")
            .query(&[("page", page.to_string()), ("search", search.to_string())]);
        Ok(self.send(builder).await?.json().await?)
    }

    pub async fn create_world(&self, world: &NewWorld) -> Result<World, ApiError> {
        let builder = self.request(Method::POST, "/worlds/").json(world);
        Ok(self.send(builder).await?.json().await?)
    }

    /// Fetch one world including its basemap grid.
    pub async fn get_world(&self, id: i64) -> Result<World, ApiError> {
        self.get_json(&format!("/worlds/{id}")).await
    }

    pub async fn delete_world(&self, id: i64) -> Result<(), ApiError> {
        self.send(self.request(Method::DELETE, &format!("/worlds/{id}/")))
            .await?;
        Ok(())
    }

    /// Fetch the access token for a world.
    pub async fn world_token(&self, world_id: i64) -> Result<WorldToken, ApiError> {
        self.get_json(&format!("/worldtoken/?world={world_id}")).await
    }

    pub async fn list_airplanes(&self, world_id: i64) -> Result<Page<Airplane>, ApiError> {
        self.get_json(&format!("/airplanes?world={world_id}")).await
    }

    pub async fn delete_airplane(&self, id: i64) -> Result<(), ApiError> {
        self.send(self.request(Method::DELETE, &format!("/airplanes/{id}/")))
            .await?;
        Ok(())
    }

    /// Mark an airplane's flight as complete.
    pub async fn end_flight(&self, id: i64) -> Result<(), ApiError> {
        self.send(self.request(Method::POST, &format!("/airplanes/{id}/end_flight/")))
            .await?;
        Ok(())
    }

    pub async fn scanned_cells(
        &self,
        world_id: i64,
        page_size: u32,
    ) -> Result<Page<ScannedCell>, ApiError> {
        self.get_json(&format!("/scanned-cell/?world={world_id}&page_size={page_size}"))
            .await
    }

    pub async fn list_users(&self, page: u32, search: &str) -> Result<Page<UserRecord>, ApiError> {
        let builder = self
            .request(Method::GET, "/users")
            .query(&[("page", page.to_string()), ("search", search.to_string())]);
        Ok(self.send(builder).await?.json().await?)
    }

    pub async fn list_flight_logs(
        &self,
        page: u32,
        search: &str,
    ) -> Result<Page<FlightLog>, ApiError> {
        let builder = self
            .request(Method::GET, "/flightlogs")
            .query(&[("page", page.to_string()), ("search", search.to_string())]);
        Ok(self.send(builder).await?.json().await?)
    }

    pub async fn list_inventory(
        &self,
        center: Option<i64>,
        search: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Page<InventoryItem>, ApiError> {
        let mut builder = self.request(Method::GET, "/inventory-item/").query(&[
            ("search", search.to_string()),
            ("page", page.to_string()),
            ("page_size", page_size.to_string()),
        ]);
        if let Some(center) = center {
            builder = builder.query(&[("distribution_center", center)]);
        }
        Ok(self.send(builder).await?.json().await?)
    }

    pub async fn set_inventory_quantity(&self, item_id: i64, quantity: i64) -> Result<(), ApiError> {
        let builder = self
            .request(Method::PATCH, &format!("/inventory-item/{item_id}/"))
            .json(&serde_json::json!({ "quantity": quantity }));
        self.send(builder).await?;
        Ok(())
    }

    pub async fn list_distribution_centers(&self) -> Result<Page<DistributionCenter>, ApiError> {
        self.get_json("/distribution-center/").await
    }

    pub async fn request_item(&self, request: &ItemRequest) -> Result<(), ApiError> {
        let builder = self.request(Method::POST, "/requests/").json(request);
        self.send(builder).await?;
        Ok(())
    }
}
