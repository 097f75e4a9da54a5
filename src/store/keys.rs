//! Fixed storage keys shared with the UI.

pub const CART: &str = "swumarket_cart";
pub const SETTINGS: &str = "swumarket_settings";
pub const RECENT_SEARCHES: &str = "swumarket_recent_searches";
pub const SEARCH_HISTORY: &str = "swumarket_search_history";
pub const LANGUAGE: &str = "swumarket_language";
pub const LISTINGS: &str = "swumarket_listings";

/// Cart entries waiting for `cart-sync`
pub const PENDING_CART_SYNC: &str = "swumarket_pending_cart_sync";
/// Search entries waiting for `search-sync`
pub const PENDING_SEARCH_SYNC: &str = "swumarket_pending_search_sync";
