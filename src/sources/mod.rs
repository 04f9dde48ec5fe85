// Metadata sources built on the scraping client core

// API/GraphQL sources
pub mod shikimori;

// HTML sources
pub mod animego;
