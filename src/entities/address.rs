use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Deduplicated on (street_number, street_name, city).
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "address")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub street_number: String,
    pub street_name: String,
    pub city: String,
    pub postal_code: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }

    /// Free-form query text handed to the geocoder.
    pub fn query_text(&self) -> String {
        format!(
            "{} {}, {} {}",
            self.street_number, self.street_name, self.postal_code, self.city
        )
    }
}
