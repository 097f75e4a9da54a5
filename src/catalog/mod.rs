//! Marketplace listings and filtered search over them.

mod mock;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::store::keys;
use crate::store::repository::{Entity, LocalRepository, RepoError, Repository};
use crate::store::LocalStorage;

pub use mock::seed_listings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
  Product,
  Service,
  Property,
  Job,
  Event,
}

impl Category {
  pub const ALL: [Category; 5] = [
    Category::Product,
    Category::Service,
    Category::Property,
    Category::Job,
    Category::Event,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Category::Product => "product",
      Category::Service => "service",
      Category::Property => "property",
      Category::Job => "job",
      Category::Event => "event",
    }
  }
}

impl fmt::Display for Category {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Category {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Category::ALL
      .into_iter()
      .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
      .ok_or_else(|| format!("unknown category: {}", s))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
  pub id: u64,
  pub title: String,
  pub description: String,
  pub category: Category,
  /// Price in won
  pub price: u64,
  pub vendor: String,
  /// Days since the listing was posted
  pub age_days: u32,
}

impl Entity for Listing {
  fn id(&self) -> u64 {
    self.id
  }

  fn set_id(&mut self, id: u64) {
    self.id = id;
  }
}

impl Listing {
  fn matches_text(&self, needle: &str) -> bool {
    [&self.title, &self.description, &self.vendor]
      .iter()
      .any(|field| field.to_lowercase().contains(needle))
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
  /// Catalog order
  #[default]
  Relevance,
  PriceAsc,
  PriceDesc,
  Newest,
}

impl FromStr for SortOrder {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "relevance" => Ok(SortOrder::Relevance),
      "price-asc" | "price_asc" => Ok(SortOrder::PriceAsc),
      "price-desc" | "price_desc" => Ok(SortOrder::PriceDesc),
      "newest" => Ok(SortOrder::Newest),
      other => Err(format!("unknown sort order: {}", other)),
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
  pub query: String,
  pub category: Option<Category>,
  pub min_price: Option<u64>,
  pub max_price: Option<u64>,
  pub sort: SortOrder,
}

impl SearchFilters {
  fn accepts(&self, listing: &Listing, needle: &str) -> bool {
    (needle.is_empty() || listing.matches_text(needle))
      && self.category.map_or(true, |c| listing.category == c)
      && self.min_price.map_or(true, |min| listing.price >= min)
      && self.max_price.map_or(true, |max| listing.price <= max)
  }
}

/// Listings backed by an injected repository.
#[derive(Clone)]
pub struct Catalog {
  repo: Arc<dyn Repository<Listing>>,
}

impl Catalog {
  pub fn new(repo: Arc<dyn Repository<Listing>>) -> Self {
    Self { repo }
  }

  /// Catalog kept in local storage, seeded with the mock listings on first use.
  pub fn stored(local: LocalStorage) -> Result<Self, RepoError> {
    let repo = LocalRepository::seeded(local, keys::LISTINGS, seed_listings())?;
    Ok(Self::new(Arc::new(repo)))
  }

  pub fn repository(&self) -> &Arc<dyn Repository<Listing>> {
    &self.repo
  }

  pub fn get(&self, id: u64) -> Result<Option<Listing>, RepoError> {
    self.repo.get(id)
  }

  /// Case-insensitive substring search with filters, then a stable sort.
  pub fn search(&self, filters: &SearchFilters) -> Result<Vec<Listing>, RepoError> {
    let needle = filters.query.trim().to_lowercase();
    let mut results: Vec<Listing> = self
      .repo
      .list()?
      .into_iter()
      .filter(|listing| filters.accepts(listing, &needle))
      .collect();

    match filters.sort {
      SortOrder::Relevance => {}
      SortOrder::PriceAsc => results.sort_by_key(|l| l.price),
      SortOrder::PriceDesc => results.sort_by_key(|l| std::cmp::Reverse(l.price)),
      SortOrder::Newest => results.sort_by_key(|l| l.age_days),
    }

    Ok(results)
  }
}
