use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A bookable service as priced by the catalog collaborator.
///
/// This is the shape the catalog hands us when the user taps "add"; the cart
/// keeps its own copy so a later catalog change cannot silently reprice an
/// in-progress checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceOffering {
    pub service_id: String,
    pub display_name: String,
    pub unit_price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discounted_unit_price: Option<Decimal>,
    pub room_type_slug: String,
    pub property_type_slug: String,
    pub category_slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_quantity: Option<u32>,
}

/// One selected service and its quantity.
///
/// Invariant: `quantity >= 1`. An item whose quantity would drop below 1 is
/// removed from the cart instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLineItem {
    pub service_id: String,
    pub display_name: String,
    pub unit_price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discounted_unit_price: Option<Decimal>,
    pub quantity: u32,
    pub room_type_slug: String,
    pub property_type_slug: String,
    pub category_slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_quantity: Option<u32>,
}

impl CartLineItem {
    fn from_offering(service: &ServiceOffering) -> Self {
        Self {
            service_id: service.service_id.clone(),
            display_name: service.display_name.clone(),
            unit_price: service.unit_price,
            discounted_unit_price: service.discounted_unit_price,
            quantity: 1,
            room_type_slug: service.room_type_slug.clone(),
            property_type_slug: service.property_type_slug.clone(),
            category_slug: service.category_slug.clone(),
            max_quantity: service.max_quantity,
        }
    }

    /// The price used in every computation: the discounted unit price when
    /// present, the regular unit price otherwise.
    pub fn effective_unit_price(&self) -> Decimal {
        self.discounted_unit_price.unwrap_or(self.unit_price)
    }

    pub fn line_total(&self) -> Decimal {
        self.effective_unit_price() * Decimal::from(self.quantity)
    }
}

/// Shopping cart: service id -> line item, insertion-ordered for display.
///
/// Duplicate service ids are folded into one entry by incrementing its
/// quantity. The cart is cleared exactly once, on successful submission or
/// explicit abandonment, never partially.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    items: Vec<CartLineItem>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[CartLineItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn get(&self, service_id: &str) -> Option<&CartLineItem> {
        self.items.iter().find(|i| i.service_id == service_id)
    }

    pub fn quantity_of(&self, service_id: &str) -> u32 {
        self.get(service_id).map(|i| i.quantity).unwrap_or(0)
    }

    pub fn service_ids(&self) -> Vec<String> {
        self.items.iter().map(|i| i.service_id.clone()).collect()
    }

    /// Adds one unit of the service, inserting a new line at quantity 1 when
    /// the service is not in the cart yet.
    ///
    /// Returns `false` (no-op) when the max-quantity bound would be exceeded;
    /// the bound is checked before incrementing, so the stored quantity never
    /// passes it. A service capped at zero cannot enter the cart at all.
    pub fn add_item(&mut self, service: &ServiceOffering) -> bool {
        if let Some(item) = self
            .items
            .iter_mut()
            .find(|i| i.service_id == service.service_id)
        {
            if let Some(max) = item.max_quantity {
                if item.quantity >= max {
                    return false;
                }
            }
            item.quantity += 1;
            true
        } else {
            if matches!(service.max_quantity, Some(0)) {
                return false;
            }
            self.items.push(CartLineItem::from_offering(service));
            true
        }
    }

    /// Removes one unit; the entry is deleted when the quantity reaches zero.
    /// No-op when the service is not in the cart. Returns `true` if the cart
    /// changed.
    pub fn remove_one_unit(&mut self, service_id: &str) -> bool {
        let Some(pos) = self.items.iter().position(|i| i.service_id == service_id) else {
            return false;
        };
        if self.items[pos].quantity > 1 {
            self.items[pos].quantity -= 1;
        } else {
            self.items.remove(pos);
        }
        true
    }

    /// Removes the entry entirely regardless of quantity. Returns `true` if
    /// the cart changed.
    pub fn remove_item(&mut self, service_id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.service_id != service_id);
        self.items.len() != before
    }

    /// `Σ (discounted_unit_price ?? unit_price) × quantity` over all entries.
    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(|i| i.line_total()).sum()
    }
}
