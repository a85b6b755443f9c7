use crate::config::types::{InfluxConfig, InfluxVersion};
use crate::destinations::point::Point;
use crate::destinations::{BatchWriter, WriteError};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

/// Upper bound for retry backoff growth.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Line-protocol writer for InfluxDB 1.x, 2.x, and 3.x.
///
/// The target database or bucket is ensured (created if missing) at most
/// once per writer instance; an ensure failure leaves the cache unset so the
/// next write attempts it again.
pub struct InfluxWriter {
    config: InfluxConfig,
    client: reqwest::Client,
    target_ready: OnceCell<()>,
}

impl InfluxWriter {
    pub fn new(config: InfluxConfig) -> Result<Self, WriteError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            config,
            client,
            target_ready: OnceCell::new(),
        })
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn database(&self) -> Result<&str, WriteError> {
        self.config
            .database
            .as_deref()
            .ok_or_else(|| WriteError::Config("influxdb database is not set".to_string()))
    }

    fn write_url(&self) -> Result<String, WriteError> {
        let base = self.base_url();
        match self.config.version {
            InfluxVersion::V1 => {
                let db = self.database()?;
                Ok(format!("{base}/write?db={db}&precision=ms"))
            }
            InfluxVersion::V2 => {
                let org = self
                    .config
                    .org
                    .as_deref()
                    .ok_or_else(|| WriteError::Config("influxdb org is not set".to_string()))?;
                let bucket = self
                    .config
                    .bucket
                    .as_deref()
                    .ok_or_else(|| WriteError::Config("influxdb bucket is not set".to_string()))?;
                Ok(format!(
                    "{base}/api/v2/write?org={org}&bucket={bucket}&precision=ms"
                ))
            }
            InfluxVersion::V3 => {
                let db = self.database()?;
                Ok(format!(
                    "{base}/api/v3/write_lp?db={db}&precision=millisecond"
                ))
            }
        }
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.version {
            InfluxVersion::V1 => match (&self.config.username, &self.config.password) {
                (Some(username), Some(password)) => request.basic_auth(username, Some(password)),
                _ => request,
            },
            InfluxVersion::V2 | InfluxVersion::V3 => match &self.config.token {
                Some(token) => request.header("Authorization", format!("Token {token}")),
                None => request,
            },
        }
    }

    /// Create the target database/bucket if it does not exist yet.
    ///
    /// Runs at most once per writer; concurrent callers share one attempt.
    async fn ensure_target(&self) -> Result<(), WriteError> {
        self.target_ready
            .get_or_try_init(|| async {
                match self.config.version {
                    InfluxVersion::V1 => self.ensure_v1_database().await,
                    InfluxVersion::V2 => self.ensure_v2_bucket().await,
                    InfluxVersion::V3 => self.ensure_v3_database().await,
                }
            })
            .await
            .map(|_| ())
    }

    async fn ensure_v1_database(&self) -> Result<(), WriteError> {
        let db = self.database()?;
        let url = format!("{}/query", self.base_url());
        let response = self
            .apply_auth(self.client.post(&url))
            .query(&[("q", format!("CREATE DATABASE \"{db}\""))])
            .send()
            .await?;
        check_response(response).await?;
        info!(database = db, "InfluxDB v1 database ensured");
        Ok(())
    }

    async fn ensure_v2_bucket(&self) -> Result<(), WriteError> {
        let org = self
            .config
            .org
            .as_deref()
            .ok_or_else(|| WriteError::Config("influxdb org is not set".to_string()))?;
        let bucket = self
            .config
            .bucket
            .as_deref()
            .ok_or_else(|| WriteError::Config("influxdb bucket is not set".to_string()))?;

        let lookup_url = format!("{}/api/v2/buckets", self.base_url());
        let response = self
            .apply_auth(self.client.get(&lookup_url))
            .query(&[("name", bucket)])
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            let found: BucketsResponse = response.json().await?;
            if !found.buckets.is_empty() {
                debug!(bucket, "InfluxDB v2 bucket already exists");
                return Ok(());
            }
        } else if status.as_u16() != 404 {
            return Err(WriteError::Rejected {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let orgs_url = format!("{}/api/v2/orgs", self.base_url());
        let response = self
            .apply_auth(self.client.get(&orgs_url))
            .query(&[("org", org)])
            .send()
            .await?;
        check_status(&response)?;
        let orgs: OrgsResponse = response.json().await?;
        let org_id = orgs
            .orgs
            .first()
            .map(|o| o.id.clone())
            .ok_or_else(|| WriteError::Config(format!("influxdb org '{org}' not found")))?;

        let create_url = format!("{}/api/v2/buckets", self.base_url());
        let response = self
            .apply_auth(self.client.post(&create_url))
            .json(&serde_json::json!({ "orgID": org_id, "name": bucket }))
            .send()
            .await?;
        check_response(response).await?;
        info!(bucket, org, "InfluxDB v2 bucket created");
        Ok(())
    }

    async fn ensure_v3_database(&self) -> Result<(), WriteError> {
        let db = self.database()?;
        let url = format!("{}/api/v3/configure/database", self.base_url());
        let response = self
            .apply_auth(self.client.post(&url))
            .json(&serde_json::json!({ "db": db }))
            .send()
            .await?;

        // 409 means the database already exists.
        if response.status().as_u16() == 409 {
            debug!(database = db, "InfluxDB v3 database already exists");
            return Ok(());
        }
        check_response(response).await?;
        info!(database = db, "InfluxDB v3 database created");
        Ok(())
    }

    async fn write_lines(&self, points: &[Point]) -> Result<(), WriteError> {
        let mut body = String::new();
        for point in points {
            if let Some(line) = point.to_line_protocol() {
                body.push_str(&line);
                body.push('\n');
            }
        }
        if body.is_empty() {
            return Ok(());
        }

        let request = self
            .apply_auth(self.client.post(self.write_url()?))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body);
        check_response(request.send().await?).await
    }

    /// Retry transient failures with doubling backoff; permanent rejections
    /// (4xx) surface immediately.
    async fn write_with_retry(&self, points: &[Point]) -> Result<(), WriteError> {
        let mut attempts = 0;
        let mut backoff = self.config.retry_interval;

        loop {
            match self.write_lines(points).await {
                Ok(()) => return Ok(()),
                Err(e) if !is_transient(&e) => return Err(e),
                Err(e) => {
                    attempts += 1;
                    if attempts >= self.config.max_retries {
                        error!(
                            url = %self.config.url,
                            attempts,
                            error = %e,
                            "Max retries exceeded writing to InfluxDB"
                        );
                        return Err(WriteError::MaxRetriesExceeded);
                    }

                    warn!(
                        url = %self.config.url,
                        attempt = attempts,
                        backoff_ms = backoff.as_millis(),
                        error = %e,
                        "InfluxDB write failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = std::cmp::min(backoff * 2, MAX_BACKOFF);
                }
            }
        }
    }
}

#[async_trait]
impl BatchWriter for InfluxWriter {
    fn destination_name(&self) -> &str {
        "influxdb"
    }

    async fn write_batch(&self, points: &[Point]) -> Result<(), WriteError> {
        self.ensure_target().await?;
        self.write_with_retry(points).await
    }
}

fn is_transient(error: &WriteError) -> bool {
    match error {
        WriteError::Http(_) => true,
        WriteError::Rejected { status, .. } => *status >= 500,
        _ => false,
    }
}

fn check_status(response: &reqwest::Response) -> Result<(), WriteError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(WriteError::Rejected {
            status: status.as_u16(),
            message: String::new(),
        })
    }
}

async fn check_response(response: reqwest::Response) -> Result<(), WriteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let message = response.text().await.unwrap_or_default();
    Err(WriteError::Rejected {
        status: status.as_u16(),
        message,
    })
}

#[derive(Deserialize)]
struct BucketsResponse {
    #[serde(default)]
    buckets: Vec<BucketEntry>,
}

#[derive(Deserialize)]
struct BucketEntry {
    #[allow(dead_code)]
    id: String,
}

#[derive(Deserialize)]
struct OrgsResponse {
    #[serde(default)]
    orgs: Vec<OrgEntry>,
}

#[derive(Deserialize)]
struct OrgEntry {
    id: String,
}
