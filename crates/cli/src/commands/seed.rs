//! Seed the catalog with products and initial stock.
//!
//! Reads a YAML file of the form:
//!
//! ```yaml
//! products:
//!   - title: Pineapple
//!     price: "10.00"
//!     stock:
//!       quantity: 5
//!       min: 2
//!       max: 50
//!       cost_price: "4.20"
//! ```
//!
//! `active` defaults to true; `stock` may be omitted for unstocked products.

use std::collections::HashSet;
use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{error, info};

use cartwright_checkout::models::{NewProduct, StockLevels};
use cartwright_core::Price;

use super::{CommandError, service};

/// Top-level seed file.
#[derive(Debug, Deserialize)]
pub struct SeedCatalog {
    /// Products to insert, in order.
    pub products: Vec<SeedProduct>,
}

/// One product entry.
#[derive(Debug, Deserialize)]
pub struct SeedProduct {
    pub title: String,
    pub price: Price,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub stock: Option<SeedStock>,
}

/// Initial stock for a product.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedStock {
    pub quantity: i32,
    #[serde(default)]
    pub min: i32,
    /// Defaults to the larger of `quantity` and `min`.
    #[serde(default)]
    pub max: Option<i32>,
    #[serde(default)]
    pub cost_price: Option<Decimal>,
}

const fn default_active() -> bool {
    true
}

impl SeedProduct {
    fn new_product(&self) -> NewProduct {
        NewProduct {
            title: self.title.clone(),
            price: self.price,
            is_active: self.active,
        }
    }
}

impl From<SeedStock> for StockLevels {
    fn from(stock: SeedStock) -> Self {
        Self {
            quantity: stock.quantity,
            min_stock_level: stock.min,
            max_stock_level: stock.max.unwrap_or(stock.quantity.max(stock.min)),
            cost_price: stock.cost_price,
        }
    }
}

/// Check a parsed catalog before touching the database.
///
/// Returns one message per problem found.
#[must_use]
pub fn validate_catalog(catalog: &SeedCatalog) -> Vec<String> {
    let mut errors = Vec::new();
    let mut titles = HashSet::new();

    if catalog.products.is_empty() {
        errors.push("catalog has no products".to_string());
    }

    for (index, product) in catalog.products.iter().enumerate() {
        let title = product.title.trim();
        if title.is_empty() {
            errors.push(format!("product #{index}: title is empty"));
        } else if !titles.insert(title.to_lowercase()) {
            errors.push(format!("product #{index}: duplicate title '{title}'"));
        }

        if let Some(stock) = &product.stock {
            if stock.quantity < 0 {
                errors.push(format!("{title}: stock quantity cannot be negative"));
            }
            if stock.min < 0 {
                errors.push(format!("{title}: min stock level cannot be negative"));
            }
            if stock.max.is_some_and(|max| max < stock.min) {
                errors.push(format!("{title}: max stock level is below min"));
            }
        }
    }

    errors
}

/// Seed products from a YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, fails validation,
/// or a product cannot be inserted.
pub async fn catalog(path: &Path) -> Result<(), CommandError> {
    if !path.exists() {
        return Err(CommandError::Invalid(format!(
            "File not found: {}",
            path.display()
        )));
    }

    info!(path = %path.display(), "Loading catalog from file");

    // Read and validate YAML before connecting to database
    let content = tokio::fs::read_to_string(path).await?;
    let catalog: SeedCatalog = serde_yaml::from_str(&content)?;

    info!(products = catalog.products.len(), "Parsed catalog");

    let errors = validate_catalog(&catalog);
    if !errors.is_empty() {
        error!("Catalog validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(CommandError::Invalid(format!(
            "{} validation errors found",
            errors.len()
        )));
    }

    let checkout = service().await?;

    let mut stocked = 0_usize;
    for entry in catalog.products {
        let stock = entry.stock.clone().map(StockLevels::from);
        if stock.is_some() {
            stocked += 1;
        }
        let product = checkout.add_product(entry.new_product(), stock).await?;
        info!(
            product_id = %product.id,
            title = %product.title,
            price = %product.price,
            active = product.is_active,
            "  Seeded product"
        );
    }

    info!("Seeding complete!");
    info!("  Products stocked: {stocked}");

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bundled_catalog() {
        let catalog: SeedCatalog =
            serde_yaml::from_str(include_str!("../../seed/catalog.yaml")).unwrap();
        assert_eq!(catalog.products.len(), 4);
        assert!(validate_catalog(&catalog).is_empty());

        let pineapple = &catalog.products[0];
        assert_eq!(pineapple.price.to_string(), "10.00");
        assert!(pineapple.active);

        let boxed = &catalog.products[3];
        assert!(!boxed.active);
        assert!(boxed.stock.is_none());
    }

    #[test]
    fn test_stock_max_defaults() {
        let yaml = r#"
products:
  - title: Mango
    price: "2.00"
    stock:
      quantity: 3
      min: 8
"#;
        let catalog: SeedCatalog = serde_yaml::from_str(yaml).unwrap();
        let stock = catalog.products[0].stock.clone().unwrap();
        let levels = StockLevels::from(stock);
        assert_eq!(levels.max_stock_level, 8);
        assert_eq!(levels.cost_price, None);
    }

    #[test]
    fn test_rejects_negative_price() {
        let yaml = r#"
products:
  - title: Mango
    price: "-2.00"
"#;
        assert!(serde_yaml::from_str::<SeedCatalog>(yaml).is_err());
    }

    #[test]
    fn test_validate_catalog_reports_each_problem() {
        let yaml = r#"
products:
  - title: Mango
    price: "2.00"
  - title: mango
    price: "2.00"
  - title: "  "
    price: "1.00"
  - title: Kiwi
    price: "1.00"
    stock:
      quantity: -1
      min: 5
      max: 2
"#;
        let catalog: SeedCatalog = serde_yaml::from_str(yaml).unwrap();
        let errors = validate_catalog(&catalog);
        assert_eq!(errors.len(), 4);
        assert!(errors[0].contains("duplicate"));
        assert!(errors[1].contains("empty"));
    }

    #[test]
    fn test_validate_empty_catalog() {
        let catalog = SeedCatalog {
            products: Vec::new(),
        };
        assert_eq!(validate_catalog(&catalog).len(), 1);
    }
}
