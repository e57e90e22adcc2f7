use async_trait::async_trait;
use reqwest::Method;
use reqwest::RequestBuilder;
use reqwest::Response;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::BackendError;
use super::DeviceStore;
use super::DeviceUpdate;
use super::NewDevice;
use super::ReadingSource;
use crate::config::BackendConfig;
use crate::model::Device;
use crate::model::Reading;

const DEVICE_COLUMNS: &str = "deviceid,container_name,min_quantity_g,max_capacity_g,image_url";
const READING_COLUMNS: &str = "deviceid,weight_g,created_at";

/// Client for the backend's PostgREST-style table API
/// (`{url}/rest/v1/{table}`).
#[derive(Debug, Clone)]
pub struct RestBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/rest/v1/{}", self.base_url, table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        let response = check(request.send().await?).await?;
        Ok(response.json().await?)
    }

    /// Run a write that returns the affected rows, expecting exactly one.
    async fn write_one(
        &self,
        request: RequestBuilder,
        device_id: &str,
    ) -> Result<Device, BackendError> {
        let rows: Vec<Device> = self
            .send(request.header("Prefer", "return=representation"))
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::DeviceNotFound(device_id.to_string()))
    }
}

async fn check(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Status {
        status: status.as_u16(),
        body,
    })
}

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

#[async_trait]
impl ReadingSource for RestBackend {
    async fn fetch_latest_reading(&self, device_id: &str) -> Result<Option<Reading>, BackendError> {
        let request = self.request(Method::GET, "readings").query(&[
            ("select", READING_COLUMNS.to_string()),
            ("deviceid", eq(device_id)),
            ("order", "created_at.desc".to_string()),
            ("limit", "1".to_string()),
        ]);

        let rows: Vec<Reading> = self.send(request).await?;
        debug!("Latest reading for {}: {:?}", device_id, rows.first());
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl DeviceStore for RestBackend {
    async fn list_devices(&self) -> Result<Vec<Device>, BackendError> {
        let request = self
            .request(Method::GET, "devices")
            .query(&[("select", DEVICE_COLUMNS), ("order", "created_at.desc")]);
        self.send(request).await
    }

    async fn add_device(&self, device: &NewDevice) -> Result<Device, BackendError> {
        let request = self.request(Method::POST, "devices").json(device);
        self.write_one(request, &device.device_id).await
    }

    async fn update_device(
        &self,
        device_id: &str,
        update: &DeviceUpdate,
    ) -> Result<Device, BackendError> {
        let request = self
            .request(Method::PATCH, "devices")
            .query(&[("deviceid", eq(device_id))])
            .json(update);
        self.write_one(request, device_id).await
    }

    async fn delete_device(&self, device_id: &str) -> Result<Device, BackendError> {
        let request = self
            .request(Method::DELETE, "devices")
            .query(&[("deviceid", eq(device_id))]);
        self.write_one(request, device_id).await
    }
}
