use chrono::NaiveDate;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

use crate::config::{ClientConfig, HeaderOverrides};
use crate::error::Error;
use crate::http_client::{HttpClient, RequestOptions};
use crate::models::{Anime, IdSource, ItemStatus, Language};

const BASE_URL: &str = "https://animego.org/";

/// One card from the site-wide search page.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub url: String,
    /// Entity segment of the URL: anime, manga, character, person.
    pub kind: String,
    pub item_id: String,
    pub title_ru: Option<String>,
    pub title_en: Option<String>,
    pub thumbnail: Option<String>,
}

/// Animego metadata source. The search endpoint expects XHR-style headers;
/// session cookies from `Set-Cookie` are carried over by the client.
pub struct Animego {
    client: HttpClient,
}

impl Animego {
    pub fn new() -> Result<Self, Error> {
        let config = ClientConfig {
            base_url: Some(BASE_URL.to_string()),
            headers: HeaderOverrides {
                accept: Some("application/json, text/javascript, */*; q=0.01".to_string()),
                x_requested_with: Some("XMLHttpRequest".to_string()),
                referer: Some(BASE_URL.to_string()),
                ..HeaderOverrides::default()
            },
            ..ClientConfig::default()
        };
        Ok(Animego {
            client: HttpClient::with_config(config)?,
        })
    }

    pub fn with_client(client: HttpClient) -> Self {
        Animego { client }
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, Error> {
        let response = self
            .client
            .request(RequestOptions {
                url: Some("search/all".to_string()),
                params: Some(vec![("q".to_string(), query.to_string())]),
                ..RequestOptions::default()
            })
            .await?;
        Ok(parse_search(response.html()))
    }

    pub async fn get_anime(&self, url: &str) -> Result<Anime, Error> {
        let response = self.client.get(url).await?;
        Ok(anime_from_page(url, response.html()))
    }
}

fn parse_search(html: &Html) -> Vec<SearchHit> {
    let card = Selector::parse("div.animes-grid-item").unwrap();
    let link = Selector::parse("a.d-block").unwrap();
    let titled = Selector::parse("a[title]").unwrap();
    let subtitle = Selector::parse("div.text-gray-dark-6.small.mb-1 div").unwrap();
    let thumb = Selector::parse("div.anime-grid-lazy.lazy").unwrap();

    let mut hits = Vec::new();
    for item in html.select(&card) {
        let Some(href) = item.select(&link).next().and_then(|a| a.value().attr("href")) else {
            continue;
        };
        let kind = href.rsplit('/').nth(1).unwrap_or_default().to_string();
        let item_id = if kind == "character" || kind == "person" {
            // character/person slugs lead with the id: /character/72301-isla
            href.rsplit('/')
                .next()
                .unwrap_or_default()
                .split('-')
                .next()
                .unwrap_or_default()
                .to_string()
        } else {
            // works trail with it: /anime/plastic-memories-902
            href.rsplit('-').next().unwrap_or_default().to_string()
        };
        let title_ru = item
            .select(&titled)
            .next()
            .and_then(|a| a.value().attr("title"))
            .map(str::to_string);
        let title_en = item
            .select(&subtitle)
            .next()
            .map(|div| div.text().collect::<String>().trim().to_string())
            .filter(|title| !title.is_empty());
        let thumbnail = item
            .select(&thumb)
            .next()
            .and_then(|div| div.value().attr("data-original"))
            .map(str::to_string);
        hits.push(SearchHit {
            url: href.to_string(),
            kind,
            item_id,
            title_ru,
            title_en,
            thumbnail,
        });
    }
    hits
}

fn anime_from_page(url: &str, html: &Html) -> Anime {
    let mut anime = Anime::default();
    anime.url = Some(url.to_string());

    let id_re = Regex::new(r"-(\d+)/?$").unwrap();
    if let Some(caps) = id_re.captures(url) {
        anime.ids.insert(IdSource::Animego, caps[1].to_string());
    }

    let title_sel = Selector::parse("div.anime-title h1").unwrap();
    if let Some(h1) = html.select(&title_sel).next() {
        let title = h1.text().collect::<String>().trim().to_string();
        if !title.is_empty() {
            anime.title.entry(Language::Russian).or_default().push(title);
        }
    }

    let ld_sel = Selector::parse(r#"script[type="application/ld+json"]"#).unwrap();
    if let Some(script) = html.select(&ld_sel).next() {
        if let Ok(ld) = serde_json::from_str::<Value>(&script.text().collect::<String>()) {
            apply_ld_json(&mut anime, &ld);
        }
    }

    anime
}

fn apply_ld_json(anime: &mut Anime, ld: &Value) {
    for headline in ld
        .get("alternativeHeadline")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let Some(title) = headline.as_str() else {
            continue;
        };
        let language = if contains_japanese(title) {
            Language::Japanese
        } else {
            Language::Romaji
        };
        anime
            .title
            .entry(language)
            .or_default()
            .push(title.to_string());
    }

    anime.thumbnail = ld.get("image").and_then(Value::as_str).map(str::to_string);
    if let Some(description) = ld.get("description").and_then(Value::as_str) {
        anime
            .description
            .insert(Language::Russian, description.to_string());
    }
    anime.episodes = ld
        .get("numberOfEpisodes")
        .and_then(Value::as_u64)
        .map(|n| n as u32);
    anime.started = iso_date(ld.get("startDate"));
    anime.released = iso_date(ld.get("endDate"));
    anime.genres = match ld.get("genre") {
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(genre)) => vec![genre.clone()],
        _ => Vec::new(),
    };
    if anime.released.is_some() {
        anime.status = ItemStatus::Released;
    } else if anime.started.is_some() {
        anime.status = ItemStatus::Ongoing;
    }
}

/// Leading `YYYY-MM-DD` of an ISO 8601 date or datetime string.
fn iso_date(value: Option<&Value>) -> Option<NaiveDate> {
    let s = value?.as_str()?;
    NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok()
}

fn contains_japanese(s: &str) -> bool {
    s.chars().any(|c| {
        matches!(c,
            '\u{3000}'..='\u{303f}'
                | '\u{3040}'..='\u{309f}'
                | '\u{30a0}'..='\u{30ff}'
                | '\u{ff00}'..='\u{ff9f}'
                | '\u{4e00}'..='\u{9fff}'
        )
    })
}
