use anyhow::{anyhow, bail, Context};
use devicecore::{Ranking, Record};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RemovedBody {
    removed: usize,
}

/// Thin typed wrapper over the server's HTTP routes.
pub struct SpecClient {
    http: reqwest::Client,
    base_url: String,
}

impl SpecClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `/stat/{mac}/{sensor}` with both identifiers percent-encoded.
    pub fn stat_url(&self, mac: &str, sensor: &str) -> anyhow::Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("parsing server URL {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("server URL {} cannot take a path", self.base_url))?
            .pop_if_empty()
            .extend(["stat", mac, sensor]);
        Ok(url)
    }

    pub async fn submit(&self, batch: &Record) -> anyhow::Result<Record> {
        let response = self
            .http
            .post(self.url("/specs"))
            .json(batch)
            .send()
            .await
            .context("submitting batch")?;
        if response.status() != StatusCode::CREATED {
            return Err(server_error(response).await);
        }
        response.json().await.context("decoding stored record")
    }

    pub async fn list(&self) -> anyhow::Result<Vec<Record>> {
        let response = self
            .http
            .get(self.url("/specs"))
            .send()
            .await
            .context("listing records")?;
        if !response.status().is_success() {
            return Err(server_error(response).await);
        }
        response.json().await.context("decoding record list")
    }

    pub async fn clear(&self) -> anyhow::Result<usize> {
        let response = self
            .http
            .delete(self.url("/specs"))
            .send()
            .await
            .context("deleting records")?;
        if !response.status().is_success() {
            return Err(server_error(response).await);
        }
        let body: RemovedBody = response.json().await.context("decoding delete result")?;
        Ok(body.removed)
    }

    /// `Ok(None)` when the server has no record for the device and sensor.
    pub async fn rank(&self, mac: &str, sensor: &str) -> anyhow::Result<Option<Ranking>> {
        let response = self
            .http
            .get(self.stat_url(mac, sensor)?)
            .send()
            .await
            .context("querying ranking")?;
        match response.status() {
            StatusCode::OK => Ok(Some(response.json().await.context("decoding ranking")?)),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(server_error(response).await),
        }
    }
}

async fn server_error(response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    match response.json::<ErrorBody>().await {
        Ok(body) => anyhow!(
            "server returned {}: {} ({})",
            status,
            body.error,
            body.message
        ),
        Err(_) => anyhow!("server returned {}", status),
    }
}

pub fn ensure_base_url(base_url: &str) -> anyhow::Result<()> {
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        bail!("server URL must start with http:// or https://, got {base_url}");
    }
    Ok(())
}
