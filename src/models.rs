use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Languages a title or description can be carried in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Russian,
    English,
    Japanese,
    Romaji,
}

/// Site an item id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdSource {
    Mal,
    Shikimori,
    Animego,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Tv,
    Movie,
    Ova,
    Ona,
    Special,
    Music,
    Manga,
    Manhwa,
    Manhua,
    Novel,
    OneShot,
    Doujin,
    #[default]
    Unknown,
}

impl ItemKind {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "tv" => ItemKind::Tv,
            "movie" => ItemKind::Movie,
            "ova" => ItemKind::Ova,
            "ona" => ItemKind::Ona,
            "special" | "tv_special" => ItemKind::Special,
            "music" => ItemKind::Music,
            "manga" => ItemKind::Manga,
            "manhwa" => ItemKind::Manhwa,
            "manhua" => ItemKind::Manhua,
            "novel" | "light_novel" => ItemKind::Novel,
            "one_shot" => ItemKind::OneShot,
            "doujin" => ItemKind::Doujin,
            _ => ItemKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Announced,
    Ongoing,
    Released,
    Paused,
    Discontinued,
    #[default]
    Unknown,
}

impl ItemStatus {
    /// Sites disagree on wording; `anons` is the announced state.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "anons" | "announced" => ItemStatus::Announced,
            "ongoing" | "airing" | "publishing" => ItemStatus::Ongoing,
            "released" | "finished" => ItemStatus::Released,
            "paused" | "on_hold" => ItemStatus::Paused,
            "discontinued" => ItemStatus::Discontinued,
            _ => ItemStatus::Unknown,
        }
    }
}

pub type Titles = HashMap<Language, Vec<String>>;
pub type Ids = HashMap<IdSource, String>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Anime {
    pub ids: Ids,
    pub title: Titles,
    pub kind: ItemKind,
    pub status: ItemStatus,
    pub score: Option<f64>,
    pub episodes: Option<u32>,
    pub episodes_aired: Option<u32>,
    /// Episode length in minutes.
    pub episode_duration: Option<u32>,
    pub age_rating: Option<String>,
    pub started: Option<NaiveDate>,
    pub released: Option<NaiveDate>,
    pub thumbnail: Option<String>,
    pub url: Option<String>,
    pub genres: Vec<String>,
    pub studios: Vec<String>,
    pub description: HashMap<Language, String>,
    pub directors: Vec<Person>,
    pub producers: Vec<Person>,
    pub voice_actors: Vec<Person>,
    pub characters: Vec<Character>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manga {
    pub ids: Ids,
    pub title: Titles,
    pub kind: ItemKind,
    pub status: ItemStatus,
    pub score: Option<f64>,
    pub volumes: Option<u32>,
    pub chapters: Option<u32>,
    pub started: Option<NaiveDate>,
    pub released: Option<NaiveDate>,
    pub thumbnail: Option<String>,
    pub url: Option<String>,
    pub genres: Vec<String>,
    pub publishers: Vec<String>,
    pub description: HashMap<Language, String>,
    pub characters: Vec<Character>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Character {
    pub ids: Ids,
    pub name: Titles,
    /// Role in the work this character was found on (main, supporting, ...).
    pub role: Option<String>,
    pub thumbnail: Option<String>,
    pub url: Option<String>,
    pub description: HashMap<Language, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Person {
    pub ids: Ids,
    pub name: Titles,
    pub birthday: Option<NaiveDate>,
    pub deceased: Option<NaiveDate>,
    pub website: Option<String>,
    pub thumbnail: Option<String>,
    pub url: Option<String>,
}
