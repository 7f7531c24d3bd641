//! Data-driven shop definitions for Crema.
//!
//! Loads a station's machine configuration and the upgrade price lists from
//! RON, TOML or JSON files, converts on-disk `f64` quantities into
//! `Fixed64`, and validates the result before any machine is built.
//!
//! ```rust,ignore
//! let shop = crema_data::load_shop(Path::new("data/shop"))?;
//! let mut station = CoffeeStation::new(shop.station)?;
//! shop.upgrades.apply_all(&mut station)?;
//! ```

pub mod loader;
pub mod schema;
pub mod shop;

pub use loader::DataLoadError;
pub use shop::{ShopData, load_shop};
