//! FurAffinity adapter (cookie session, HTML pages)

use super::http::{send, send_text};
use super::{Cursor, Page, RemoteError, RequestGate, ServiceAdapter};
use crate::domain::{Service, Submission, TagSet};
use crate::infrastructure::config::FurAffinityConfig;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;

const BASE_URL: &str = "https://www.furaffinity.net";

fn selector(cell: &'static OnceLock<Selector>, css: &str) -> &'static Selector {
    cell.get_or_init(|| Selector::parse(css).unwrap())
}

fn gallery_link_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    selector(&SELECTOR, ".submission-list u a")
}

fn title_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    selector(&SELECTOR, ".submission-title h2 p")
}

fn posted_at_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    selector(&SELECTOR, ".submission-id-sub-container strong span.popup_date")
}

fn tag_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    selector(&SELECTOR, "section.tags-row a")
}

fn form_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    selector(&SELECTOR, r#"form[name="MsgForm"]"#)
}

fn key_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    selector(&SELECTOR, r#"input[name="key"]"#)
}

fn rating_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    selector(&SELECTOR, r#"input[name="rating"][checked]"#)
}

fn title_input_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    selector(&SELECTOR, "#title")
}

fn message_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    selector(&SELECTOR, "#JSMessage")
}

fn cat_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    selector(&SELECTOR, r#"select[name="cat"] option[selected]"#)
}

fn atype_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    selector(&SELECTOR, r#"select[name="atype"] option[selected]"#)
}

fn species_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    selector(&SELECTOR, r#"select[name="species"] option[selected]"#)
}

fn gender_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    selector(&SELECTOR, r#"select[name="gender"] option[selected]"#)
}

fn ordinal_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"(\d{1,2})(st|nd|rd|th)").unwrap())
}

pub struct FurAffinity {
    client: reqwest::Client,
    base_url: String,
    cookies: String,
    user: String,
}

/// Fields of the "change info" form that must be posted back unchanged
#[derive(Debug, PartialEq, Eq)]
struct EditForm {
    key: String,
    cat: String,
    atype: String,
    species: String,
    gender: String,
    rating: String,
    title: String,
    message: String,
}

impl FurAffinity {
    pub fn new(config: &FurAffinityConfig) -> Result<Self, RemoteError> {
        Self::with_base_url(config, BASE_URL)
    }

    pub fn with_base_url(config: &FurAffinityConfig, base_url: &str) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| RemoteError::permanent(format!("Could not build HTTP client: {}", e)))?;

        Ok(FurAffinity {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cookies: format!("a={};b={}", config.cookie_a, config.cookie_b),
            user: config.user.clone(),
        })
    }

    fn get(&self, url: String) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header(reqwest::header::COOKIE, &self.cookies)
    }

    fn change_info_url(&self, id: i64) -> String {
        format!("{}/controls/submissions/changeinfo/{}/", self.base_url, id)
    }

    async fn view(&self, id: i64) -> Result<Submission, RemoteError> {
        let body = send_text(
            self.get(format!("{}/view/{}/", self.base_url, id)),
            &format!("view FurAffinity submission {}", id),
        )
        .await?;

        parse_submission(id, &body).map_err(|e| {
            RemoteError::permanent(format!("FurAffinity submission {}: {:#}", id, e))
        })
    }
}

#[async_trait]
impl ServiceAdapter for FurAffinity {
    fn service(&self) -> Service {
        Service::FurAffinity
    }

    async fn enumerate(
        &self,
        gate: &RequestGate,
        cursor: Option<Cursor>,
    ) -> Result<Page, RemoteError> {
        let page: u32 = match &cursor {
            Some(cursor) => cursor
                .0
                .parse()
                .map_err(|_| RemoteError::permanent(format!("Invalid gallery cursor: {}", cursor)))?,
            None => 1,
        };
        log::debug!("Loading FurAffinity gallery page {}", page);

        let body = gate
            .run(send_text(
                self.get(format!("{}/gallery/{}/{}/", self.base_url, self.user, page)),
                "load FurAffinity gallery",
            ))
            .await?;

        let ids = parse_gallery_ids(&body);
        if ids.is_empty() {
            return Ok(Page::default());
        }

        let mut submissions = Vec::with_capacity(ids.len());
        for id in ids {
            submissions.push(self.fetch(gate, id).await?);
        }

        Ok(Page {
            submissions,
            next: Some(Cursor((page + 1).to_string())),
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
        let url = self.change_info_url(id);
        let page = gate
            .run(send_text(
                self.get(url.clone()),
                &format!("load FurAffinity edit form for {}", id),
            ))
            .await?;

        let form = parse_edit_form(&page).map_err(|e| {
            RemoteError::permanent(format!("FurAffinity edit form for {}: {:#}", id, e))
        })?;

        let keywords = tags.iter().cloned().collect::<Vec<_>>().join(" ");
        let body = [
            ("update", "yes".to_string()),
            ("submit", "+Finalize".to_string()),
            ("keywords", keywords),
            ("key", form.key),
            ("cat", form.cat),
            ("atype", form.atype),
            ("species", form.species),
            ("gender", form.gender),
            ("rating", form.rating),
            ("title", form.title),
            ("message", form.message),
        ];

        gate.run(send(
            self.client
                .post(url)
                .header(reqwest::header::COOKIE, &self.cookies)
                .form(&body),
            &format!("set FurAffinity tags for {}", id),
        ))
        .await?;

        Ok(gate.finish(self.view(id)).await?.tags)
    }
}

fn parse_gallery_ids(body: &str) -> Vec<i64> {
    let document = Html::parse_document(body);
    document
        .select(gallery_link_selector())
        .filter_map(|link| link.value().attr("href"))
        .filter_map(|href| href.split('/').nth(2))
        .filter_map(|id| id.parse().ok())
        .collect()
}

fn parse_submission(id: i64, body: &str) -> anyhow::Result<Submission> {
    let document = Html::parse_document(body);

    let title = document
        .select(title_selector())
        .next()
        .map(text_content)
        .context("Submission must have title")?;

    let posted_at = document
        .select(posted_at_selector())
        .next()
        .and_then(|span| span.value().attr("title"))
        .context("Missing posted at date")?;
    let posted_at = parse_posted_at(posted_at)?;

    let tags: TagSet = document
        .select(tag_selector())
        .map(text_content)
        .filter(|tag| !tag.is_empty())
        .collect();

    Ok(Submission {
        service: Service::FurAffinity,
        id,
        title,
        posted_at,
        tags,
    })
}

/// Parse dates like "Sep 5th, 2021 03:14 PM". The site shows times in the
/// viewer's local timezone.
fn parse_posted_at(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    let cleaned = ordinal_regex().replace(raw, "$1");
    let naive = NaiveDateTime::parse_from_str(cleaned.trim(), "%b %e, %Y %I:%M %p")
        .with_context(|| format!("Unknown date format: {}", raw))?;
    let local = naive
        .and_local_timezone(Local)
        .earliest()
        .with_context(|| format!("Time does not exist in local timezone: {}", raw))?;
    Ok(local.with_timezone(&Utc))
}

fn parse_edit_form(page: &str) -> anyhow::Result<EditForm> {
    let document = Html::parse_document(page);
    let form = document
        .select(form_selector())
        .next()
        .context("Page was missing form")?;

    Ok(EditForm {
        key: attr(form, key_selector(), "value").context("Form was missing key value")?,
        rating: attr(form, rating_selector(), "value")
            .context("Form was missing selected rating")?,
        title: attr(form, title_input_selector(), "value")
            .context("Form was missing title value")?,
        message: form
            .select(message_selector())
            .next()
            .map(|textarea| textarea.text().collect::<String>())
            .context("Form was missing description")?,
        cat: attr(form, cat_selector(), "value").context("Form was missing selected category")?,
        atype: attr(form, atype_selector(), "value").context("Form was missing selected atype")?,
        species: attr(form, species_selector(), "value")
            .context("Form was missing selected species")?,
        gender: attr(form, gender_selector(), "value")
            .context("Form was missing selected gender")?,
    })
}

fn attr(scope: ElementRef<'_>, selector: &Selector, name: &str) -> Option<String> {
    scope
        .select(selector)
        .next()
        .and_then(|element| element.value().attr(name))
        .map(str::to_string)
}

fn text_content(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}
