use super::{Category, Listing};

fn listing(
  id: u64,
  title: &str,
  description: &str,
  category: Category,
  price: u64,
  vendor: &str,
  age_days: u32,
) -> Listing {
  Listing {
    id,
    title: title.to_string(),
    description: description.to_string(),
    category,
    price,
    vendor: vendor.to_string(),
    age_days,
  }
}

/// Canned listings used when no real backend is wired in.
pub fn seed_listings() -> Vec<Listing> {
  vec![
    listing(
      1,
      "Road bike",
      "Aluminium frame, 21 gears, lightly used",
      Category::Product,
      320_000,
      "Campus Cycles",
      3,
    ),
    listing(
      2,
      "Bike repair",
      "Tune-up and flat fixes at your door",
      Category::Service,
      25_000,
      "Campus Cycles",
      12,
    ),
    listing(
      3,
      "Standing desk",
      "Electric height adjustment, 140cm top",
      Category::Product,
      180_000,
      "Office Outlet",
      1,
    ),
    listing(
      4,
      "Studio near campus",
      "Furnished one-room, 5 minutes to the main gate",
      Category::Property,
      550_000,
      "Nowon Realty",
      7,
    ),
    listing(
      5,
      "Cafe part-time barista",
      "Weekend shifts, training provided",
      Category::Job,
      11_000,
      "Bean There",
      2,
    ),
    listing(
      6,
      "Spring flea market",
      "Student sellers, food trucks and live music",
      Category::Event,
      0,
      "Student Union",
      20,
    ),
    listing(
      7,
      "Mirrorless camera",
      "24MP body with kit lens and two batteries",
      Category::Product,
      450_000,
      "Photo Hub",
      5,
    ),
    listing(
      8,
      "English tutoring",
      "Conversation and exam prep, 1 hour sessions",
      Category::Service,
      40_000,
      "Tutor Kim",
      9,
    ),
    listing(
      9,
      "Kids balance bike",
      "Ages 2-4, adjustable seat",
      Category::Product,
      45_000,
      "Toy Box",
      30,
    ),
    listing(
      10,
      "Frontend developer intern",
      "React and TypeScript, 3 month contract",
      Category::Job,
      2_000_000,
      "Swu Labs",
      4,
    ),
  ]
}
