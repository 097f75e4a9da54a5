//! Shopping cart persisted in local storage.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use super::{keys, LocalStorage};
use crate::db::StorageError;

#[derive(Debug, Error)]
pub enum CartError {
  #[error(transparent)]
  Storage(#[from] StorageError),
  #[error("Quantity for product {product_id} exceeds the supported maximum")]
  QuantityOverflow { product_id: u64 },
}

/// Selected options of a line item (size, color, ...).
///
/// Backed by a sorted map so two variants compare equal regardless of the
/// order their options were chosen in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variant(BTreeMap<String, String>);

#[cfg(test)]
impl Variant {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.0.insert(name.into(), value.into());
    self
  }
}

impl Variant {
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl fmt::Display for Variant {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    f.write_str(&parts.join(", "))
  }
}

impl FromIterator<(String, String)> for Variant {
  fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
    Self(iter.into_iter().collect())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
  pub product_id: u64,
  pub name: String,
  /// Price per unit in won
  pub unit_price: u64,
  pub quantity: u32,
  #[serde(default)]
  pub variant: Variant,
}

impl CartItem {
  /// Same product with the same options.
  pub fn same_line(&self, product_id: u64, variant: &Variant) -> bool {
    self.product_id == product_id && &self.variant == variant
  }

  /// Saturates instead of wrapping on absurd prices.
  pub fn subtotal(&self) -> u64 {
    self.unit_price.saturating_mul(u64::from(self.quantity))
  }
}

/// Cart operations over the persisted item list.
#[derive(Clone)]
pub struct CartStore {
  local: LocalStorage,
}

impl CartStore {
  pub fn new(local: LocalStorage) -> Self {
    Self { local }
  }

  pub fn items(&self) -> Result<Vec<CartItem>, StorageError> {
    self.local.get_list(keys::CART)
  }

  fn save(&self, items: &[CartItem]) -> Result<(), StorageError> {
    self.local.set_json(keys::CART, items)?;
    Ok(())
  }

  /// Add an item, merging quantities into an existing line with the same variant.
  ///
  /// A merge that would overflow the line quantity is rejected and nothing is saved.
  pub fn add(&self, item: CartItem) -> Result<Vec<CartItem>, CartError> {
    let mut items = self.items()?;
    match items
      .iter_mut()
      .find(|line| line.same_line(item.product_id, &item.variant))
    {
      Some(line) => {
        line.quantity = line
          .quantity
          .checked_add(item.quantity)
          .ok_or(CartError::QuantityOverflow {
            product_id: item.product_id,
          })?;
      }
      None => items.push(item),
    }
    self.save(&items)?;
    Ok(items)
  }

  /// Set a line's quantity; zero removes the line. Returns false if no line matched.
  pub fn set_quantity(
    &self,
    product_id: u64,
    variant: &Variant,
    quantity: u32,
  ) -> Result<bool, StorageError> {
    let mut items = self.items()?;
    let Some(index) = items.iter().position(|l| l.same_line(product_id, variant)) else {
      return Ok(false);
    };

    if quantity == 0 {
      items.remove(index);
    } else {
      items[index].quantity = quantity;
    }
    self.save(&items)?;
    Ok(true)
  }

  /// Remove every line for a product. Returns the number of lines removed.
  pub fn remove_product(&self, product_id: u64) -> Result<usize, StorageError> {
    let mut items = self.items()?;
    let before = items.len();
    items.retain(|l| l.product_id != product_id);
    let removed = before - items.len();
    if removed > 0 {
      self.save(&items)?;
    }
    Ok(removed)
  }

  pub fn clear(&self) -> Result<(), StorageError> {
    self.local.remove(keys::CART)?;
    Ok(())
  }

  pub fn total(&self) -> Result<u64, StorageError> {
    Ok(
      self
        .items()?
        .iter()
        .fold(0u64, |sum, l| sum.saturating_add(l.subtotal())),
    )
  }

  /// Number of units across all lines.
  pub fn count(&self) -> Result<u64, StorageError> {
    Ok(self.items()?.iter().map(|l| u64::from(l.quantity)).sum())
  }

  /// Snapshot the cart into the pending `cart-sync` queue.
  pub fn queue_for_sync(&self) -> Result<usize, StorageError> {
    let items = self.items()?;
    self.local.set_json(keys::PENDING_CART_SYNC, &items)?;
    Ok(items.len())
  }

  pub fn pending_sync(&self) -> Result<Vec<CartItem>, StorageError> {
    self.local.get_list(keys::PENDING_CART_SYNC)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::memory_storage;

  fn item(product_id: u64, quantity: u32, variant: Variant) -> CartItem {
    CartItem {
      product_id,
      name: format!("product {}", product_id),
      unit_price: 1_000,
      quantity,
      variant,
    }
  }

  #[test]
  fn test_variant_equality_ignores_option_order() {
    let a = Variant::new().with("size", "M").with("color", "red");
    let b = Variant::new().with("color", "red").with("size", "M");
    assert_eq!(a, b);
    assert_ne!(a, Variant::new().with("size", "L").with("color", "red"));
    assert_eq!(a.to_string(), "color=red, size=M");
  }

  #[test]
  fn test_add_merges_matching_lines() {
    let cart = CartStore::new(memory_storage());
    cart
      .add(item(1, 1, Variant::new().with("size", "M").with("color", "red")))
      .unwrap();
    let items = cart
      .add(item(1, 2, Variant::new().with("color", "red").with("size", "M")))
      .unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 3);

    let items = cart.add(item(1, 1, Variant::new().with("size", "S"))).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(cart.count().unwrap(), 4);
    assert_eq!(cart.total().unwrap(), 4_000);
  }

  #[test]
  fn test_set_quantity_and_remove() {
    let cart = CartStore::new(memory_storage());
    let plain = Variant::new();
    cart.add(item(7, 1, plain.clone())).unwrap();

    assert!(cart.set_quantity(7, &plain, 5).unwrap());
    assert_eq!(cart.items().unwrap()[0].quantity, 5);
    assert!(!cart.set_quantity(8, &plain, 1).unwrap());

    assert!(cart.set_quantity(7, &plain, 0).unwrap());
    assert!(cart.items().unwrap().is_empty());

    cart.add(item(9, 1, plain.clone())).unwrap();
    cart.add(item(9, 1, Variant::new().with("size", "L"))).unwrap();
    assert_eq!(cart.remove_product(9).unwrap(), 2);
    assert_eq!(cart.remove_product(9).unwrap(), 0);
  }

  #[test]
  fn test_queue_for_sync_leaves_cart_intact() {
    let cart = CartStore::new(memory_storage());
    cart.add(item(1, 2, Variant::new())).unwrap();

    assert_eq!(cart.queue_for_sync().unwrap(), 1);
    assert_eq!(cart.pending_sync().unwrap(), cart.items().unwrap());

    cart.clear().unwrap();
    assert!(cart.items().unwrap().is_empty());
    assert_eq!(cart.pending_sync().unwrap().len(), 1);
  }

  #[test]
  fn test_add_rejects_quantity_overflow() {
    let cart = CartStore::new(memory_storage());
    cart.add(item(1, u32::MAX, Variant::new())).unwrap();

    let err = cart.add(item(1, 1, Variant::new())).unwrap_err();

    assert!(matches!(err, CartError::QuantityOverflow { product_id: 1 }));
    assert_eq!(cart.items().unwrap()[0].quantity, u32::MAX);
  }

  #[test]
  fn test_count_and_total_exceed_u32() {
    let cart = CartStore::new(memory_storage());
    cart.add(item(1, 3_000_000_000, Variant::new())).unwrap();
    cart.add(item(2, 3_000_000_000, Variant::new())).unwrap();

    assert_eq!(cart.count().unwrap(), 6_000_000_000);
    assert_eq!(cart.total().unwrap(), 6_000_000_000_000);

    let mut pricey = item(3, 2, Variant::new());
    pricey.unit_price = u64::MAX;
    assert_eq!(pricey.subtotal(), u64::MAX);
    cart.add(pricey).unwrap();
    assert_eq!(cart.total().unwrap(), u64::MAX);
  }

  #[test]
  fn test_serialized_shape() {
    let json = serde_json::to_value(item(3, 1, Variant::new().with("size", "M"))).unwrap();
    assert_eq!(json["productId"], 3);
    assert_eq!(json["unitPrice"], 1000);
    assert_eq!(json["variant"]["size"], "M");
  }
}
