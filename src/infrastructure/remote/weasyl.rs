//! Weasyl adapter (JSON API, API key header)

use super::http::{send, send_json};
use super::{Cursor, Page, RemoteError, RequestGate, ServiceAdapter};
use crate::domain::{Service, Submission, TagSet};
use crate::infrastructure::config::WeasylConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;

const BASE_URL: &str = "https://www.weasyl.com";
const PAGE_SIZE: &str = "100";

pub struct Weasyl {
    client: reqwest::Client,
    base_url: String,
    user: String,
}

#[derive(Debug, Deserialize)]
struct GalleryResponse {
    nextid: Option<i64>,
    submissions: Vec<GalleryEntry>,
}

#[derive(Debug, Deserialize)]
struct GalleryEntry {
    submitid: i64,
}

#[derive(Debug, Deserialize)]
struct SubmissionView {
    submitid: i64,
    title: String,
    posted_at: DateTime<Utc>,
    tags: Vec<String>,
}

impl From<SubmissionView> for Submission {
    fn from(view: SubmissionView) -> Self {
        Submission {
            service: Service::Weasyl,
            id: view.submitid,
            title: view.title,
            posted_at: view.posted_at,
            tags: view.tags.into_iter().collect(),
        }
    }
}

impl Weasyl {
    pub fn new(config: &WeasylConfig) -> Result<Self, RemoteError> {
        Self::with_base_url(config, BASE_URL)
    }

    pub fn with_base_url(config: &WeasylConfig, base_url: &str) -> Result<Self, RemoteError> {
        let mut headers = HeaderMap::with_capacity(1);
        let api_key = HeaderValue::from_str(&config.api_key)
            .map_err(|_| RemoteError::permanent("Weasyl API key is not a valid header value"))?;
        headers.insert("X-Weasyl-API-Key", api_key);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| RemoteError::permanent(format!("Could not build HTTP client: {}", e)))?;

        Ok(Weasyl {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user: config.user.clone(),
        })
    }

    async fn view(&self, id: i64) -> Result<Submission, RemoteError> {
        let view: SubmissionView = send_json(
            self.client
                .get(format!("{}/api/submissions/{}/view", self.base_url, id)),
            &format!("view Weasyl submission {}", id),
        )
        .await?;

        Ok(view.into())
    }
}

#[async_trait]
impl ServiceAdapter for Weasyl {
    fn service(&self) -> Service {
        Service::Weasyl
    }

    async fn enumerate(
        &self,
        gate: &RequestGate,
        cursor: Option<Cursor>,
    ) -> Result<Page, RemoteError> {
        log::debug!("Loading Weasyl gallery page at {:?}", cursor);

        let mut query = vec![("count", PAGE_SIZE.to_string())];
        if let Some(cursor) = &cursor {
            query.push(("nextid", cursor.0.clone()));
        }

        let gallery: GalleryResponse = gate
            .run(send_json(
                self.client
                    .get(format!("{}/api/users/{}/gallery", self.base_url, self.user))
                    .query(&query),
                "load Weasyl gallery",
            ))
            .await?;

        let mut submissions = Vec::with_capacity(gallery.submissions.len());
        for entry in gallery.submissions {
            submissions.push(self.fetch(gate, entry.submitid).await?);
        }

        Ok(Page {
            submissions,
            next: gallery.nextid.map(|id| Cursor(id.to_string())),
        })
    }

    async fn fetch(&self, gate: &RequestGate, id: i64) -> Result<Submission, RemoteError> {
        gate.run(self.view(id)).await
    }

    async fn set_tags(
        &self,
        gate: &RequestGate,
        id: i64,
        tags: &TagSet,
    ) -> Result<TagSet, RemoteError> {
        let joined = tags.iter().cloned().collect::<Vec<_>>().join(" ");
        let context = format!("set Weasyl tags for {}", id);

        gate.run(send(
            self.client
                .post(format!("{}/submit/tags", self.base_url))
                .form(&[("submitid", id.to_string()), ("tags", joined)]),
            &context,
        ))
        .await?;

        // Weasyl normalizes tags server-side; read back what it kept
        Ok(gate.finish(self.view(id)).await?.tags)
    }
}
