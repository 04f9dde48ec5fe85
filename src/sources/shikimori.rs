use chrono::NaiveDate;
use reqwest::Method;
use serde_json::{json, Value};

use crate::config::{ClientConfig, HeaderOverrides};
use crate::error::Error;
use crate::http_client::{HttpClient, RequestOptions};
use crate::models::{
    Anime, Character, IdSource, Ids, ItemKind, ItemStatus, Language, Manga, Person, Titles,
};

const BASE_URL: &str = "https://shikimori.one/";
const GRAPHQL_PATH: &str = "api/graphql";

const ANIMES_QUERY: &str = "{animes({params}) {id malId name russian english japanese kind rating score status episodes episodesAired duration airedOn {date} releasedOn {date} url poster {mainUrl} genres {name} studios {name} personRoles {rolesEn person {id malId name russian japanese url website birthOn {date} deceasedOn {date} poster {mainUrl}}} characterRoles {rolesEn character {id malId name russian japanese description url poster {previewUrl}}} description}}";
const MANGAS_QUERY: &str = "{mangas({params}) {id malId name russian english japanese kind score status volumes chapters airedOn {date} releasedOn {date} url poster {mainUrl} genres {name} publishers {name} characterRoles {rolesEn character {id malId name russian japanese description url poster {previewUrl}}} description}}";
const CHARACTERS_QUERY: &str = "{characters({params}) {id malId name russian japanese url description poster {previewUrl}}}";
const PEOPLE_QUERY: &str = "{people({params}) {id malId name russian japanese url website birthOn {date} deceasedOn {date} poster {mainUrl}}}";

/// Shikimori metadata source, backed by the site's GraphQL endpoint.
pub struct Shikimori {
    client: HttpClient,
}

impl Shikimori {
    pub fn new() -> Result<Self, Error> {
        let config = ClientConfig {
            base_url: Some(BASE_URL.to_string()),
            headers: HeaderOverrides {
                accept: Some("application/json, text/javascript, */*; q=0.01".to_string()),
                referer: Some(BASE_URL.to_string()),
                ..HeaderOverrides::default()
            },
            ..ClientConfig::default()
        };
        Ok(Shikimori {
            client: HttpClient::with_config(config)?,
        })
    }

    /// Use a preconfigured client (proxy pool, custom base URL, ...).
    pub fn with_client(client: HttpClient) -> Self {
        Shikimori { client }
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    pub async fn search_animes(
        &self,
        search: &str,
        limit: u32,
        page: u32,
    ) -> Result<Vec<Anime>, Error> {
        let data = self.graphql(ANIMES_QUERY, search, limit, page).await?;
        Ok(array_at(&data, "/data/animes")
            .iter()
            .map(|entry| anime_from_data(entry))
            .collect())
    }

    pub async fn search_mangas(
        &self,
        search: &str,
        limit: u32,
        page: u32,
    ) -> Result<Vec<Manga>, Error> {
        let data = self.graphql(MANGAS_QUERY, search, limit, page).await?;
        Ok(array_at(&data, "/data/mangas")
            .iter()
            .map(|entry| manga_from_data(entry))
            .collect())
    }

    pub async fn search_characters(
        &self,
        search: &str,
        limit: u32,
        page: u32,
    ) -> Result<Vec<Character>, Error> {
        let data = self.graphql(CHARACTERS_QUERY, search, limit, page).await?;
        Ok(array_at(&data, "/data/characters")
            .iter()
            .map(|entry| character_from_data(entry))
            .collect())
    }

    pub async fn search_people(
        &self,
        search: &str,
        limit: u32,
        page: u32,
    ) -> Result<Vec<Person>, Error> {
        let data = self.graphql(PEOPLE_QUERY, search, limit, page).await?;
        Ok(array_at(&data, "/data/people")
            .iter()
            .map(|entry| person_from_data(entry))
            .collect())
    }

    async fn graphql(
        &self,
        template: &str,
        search: &str,
        limit: u32,
        page: u32,
    ) -> Result<Value, Error> {
        let query = template.replace("{params}", &graphql_params(search, limit, page));
        let response = self
            .client
            .request(RequestOptions {
                url: Some(GRAPHQL_PATH.to_string()),
                method: Method::POST,
                json: Some(json!({
                    "operationName": null,
                    "variables": {},
                    "query": query,
                })),
                ..RequestOptions::default()
            })
            .await?;
        let Some(json) = response.json.clone() else {
            log::warn!(
                "shikimori graphql returned a non-json payload (status {})",
                response.status
            );
            return Ok(Value::Null);
        };
        Ok(json)
    }
}

fn graphql_params(search: &str, limit: u32, page: u32) -> String {
    // Value's Display emits a JSON string literal, quoting and escaping
    let search = Value::String(search.to_string());
    format!("search: {search}, limit: {limit}, page: {page}")
}

fn array_at<'a>(data: &'a Value, pointer: &str) -> Vec<&'a Value> {
    data.pointer(pointer)
        .and_then(Value::as_array)
        .map(|entries| entries.iter().collect())
        .unwrap_or_default()
}

fn str_at(data: &Value, key: &str) -> Option<String> {
    data.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn u32_at(data: &Value, key: &str) -> Option<u32> {
    data.get(key)
        .and_then(Value::as_u64)
        .filter(|n| *n > 0)
        .map(|n| n as u32)
}

fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn ids_from(data: &Value) -> Ids {
    let mut ids = Ids::new();
    if let Some(id) = id_string(data.get("id")) {
        ids.insert(IdSource::Shikimori, id);
    }
    if let Some(id) = id_string(data.get("malId")) {
        ids.insert(IdSource::Mal, id);
    }
    ids
}

fn insert_title(titles: &mut Titles, language: Language, value: Option<String>) {
    if let Some(value) = value {
        titles.entry(language).or_default().push(value);
    }
}

/// Titles of a work: shikimori's `name` field is the romaji title.
fn work_titles(data: &Value) -> Titles {
    let mut titles = Titles::new();
    insert_title(&mut titles, Language::Russian, str_at(data, "russian"));
    insert_title(&mut titles, Language::English, str_at(data, "english"));
    insert_title(&mut titles, Language::Japanese, str_at(data, "japanese"));
    insert_title(&mut titles, Language::Romaji, str_at(data, "name"));
    titles
}

/// Names of a character or person: `name` is the english rendering here.
fn actor_names(data: &Value) -> Titles {
    let mut names = Titles::new();
    insert_title(&mut names, Language::English, str_at(data, "name"));
    insert_title(&mut names, Language::Russian, str_at(data, "russian"));
    insert_title(&mut names, Language::Japanese, str_at(data, "japanese"));
    names
}

fn date_at(data: &Value, key: &str) -> Option<NaiveDate> {
    data.pointer(&format!("/{key}/date"))
        .and_then(Value::as_str)
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

fn names_at(data: &Value, key: &str) -> Vec<String> {
    data.get(key)
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn roles_of(role: &Value) -> Vec<&str> {
    role.get("rolesEn")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

fn characters_from(data: &Value) -> Vec<Character> {
    let mut characters = Vec::new();
    for role in array_at(data, "/characterRoles") {
        let Some(character_data) = role.get("character") else {
            continue;
        };
        let mut character = character_from_data(character_data);
        character.role = roles_of(role).first().map(|r| r.to_lowercase());
        characters.push(character);
    }
    characters
}

fn anime_from_data(data: &Value) -> Anime {
    let mut anime = Anime {
        ids: ids_from(data),
        title: work_titles(data),
        kind: ItemKind::parse(data.get("kind").and_then(Value::as_str).unwrap_or("")),
        status: ItemStatus::parse(data.get("status").and_then(Value::as_str).unwrap_or("")),
        score: data.get("score").and_then(Value::as_f64).filter(|s| *s > 0.0),
        episodes: u32_at(data, "episodes"),
        episodes_aired: u32_at(data, "episodesAired"),
        episode_duration: u32_at(data, "duration"),
        age_rating: str_at(data, "rating").filter(|r| !r.eq_ignore_ascii_case("none")),
        started: date_at(data, "airedOn"),
        released: date_at(data, "releasedOn"),
        thumbnail: data
            .pointer("/poster/mainUrl")
            .and_then(Value::as_str)
            .map(str::to_string),
        url: str_at(data, "url"),
        genres: names_at(data, "genres"),
        studios: names_at(data, "studios"),
        ..Anime::default()
    };
    if let Some(description) = str_at(data, "description") {
        anime.description.insert(Language::Russian, description);
    }
    for role in array_at(data, "/personRoles") {
        let Some(person_data) = role.get("person") else {
            continue;
        };
        let roles = roles_of(role);
        let person = person_from_data(person_data);
        if roles.contains(&"Director") {
            anime.directors.push(person.clone());
        }
        if roles.contains(&"Producer") {
            anime.producers.push(person.clone());
        }
        if roles.contains(&"Voice Actor") {
            anime.voice_actors.push(person);
        }
    }
    anime.characters = characters_from(data);
    anime
}

fn manga_from_data(data: &Value) -> Manga {
    let mut manga = Manga {
        ids: ids_from(data),
        title: work_titles(data),
        kind: ItemKind::parse(data.get("kind").and_then(Value::as_str).unwrap_or("")),
        status: ItemStatus::parse(data.get("status").and_then(Value::as_str).unwrap_or("")),
        score: data.get("score").and_then(Value::as_f64).filter(|s| *s > 0.0),
        volumes: u32_at(data, "volumes"),
        chapters: u32_at(data, "chapters"),
        started: date_at(data, "airedOn"),
        released: date_at(data, "releasedOn"),
        thumbnail: data
            .pointer("/poster/mainUrl")
            .and_then(Value::as_str)
            .map(str::to_string),
        url: str_at(data, "url"),
        genres: names_at(data, "genres"),
        publishers: names_at(data, "publishers"),
        ..Manga::default()
    };
    if let Some(description) = str_at(data, "description") {
        manga.description.insert(Language::Russian, description);
    }
    manga.characters = characters_from(data);
    manga
}

fn character_from_data(data: &Value) -> Character {
    let mut character = Character {
        ids: ids_from(data),
        name: actor_names(data),
        thumbnail: data
            .pointer("/poster/previewUrl")
            .and_then(Value::as_str)
            .map(str::to_string),
        url: str_at(data, "url"),
        ..Character::default()
    };
    if let Some(description) = str_at(data, "description") {
        character.description.insert(Language::Russian, description);
    }
    character
}

fn person_from_data(data: &Value) -> Person {
    Person {
        ids: ids_from(data),
        name: actor_names(data),
        birthday: date_at(data, "birthOn"),
        deceased: date_at(data, "deceasedOn"),
        website: str_at(data, "website"),
        thumbnail: data
            .pointer("/poster/mainUrl")
            .and_then(Value::as_str)
            .map(str::to_string),
        url: str_at(data, "url"),
    }
}
