use std::sync::Arc;

use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
};
use serde::Deserialize;

use crate::entities::address;
use crate::error::{AppError, AppResult};
use crate::routing::Geocoder;
use crate::utils::geo::GeoPoint;

const MAX_FIELD_LEN: usize = 255;

#[derive(Debug, Clone, Deserialize)]
pub struct AddressInput {
    pub street_number: String,
    pub street_name: String,
    pub city: String,
    pub postal_code: String,
}

impl AddressInput {
    fn normalized(&self) -> AppResult<AddressInput> {
        let street_number = self.street_number.trim();
        let street_name = self.street_name.trim();
        let city = self.city.trim();
        let postal_code = self.postal_code.trim();

        if street_number.is_empty() {
            return Err(AppError::missing("STREET_NUMBER_REQUIRED"));
        }
        if street_name.is_empty() {
            return Err(AppError::missing("STREET_NAME_REQUIRED"));
        }
        if city.is_empty() {
            return Err(AppError::missing("CITY_REQUIRED"));
        }
        if postal_code.is_empty() {
            return Err(AppError::missing("POSTAL_CODE_REQUIRED"));
        }
        if street_number.len() > MAX_FIELD_LEN {
            return Err(AppError::invalid("STREET_NUMBER_TOO_LONG"));
        }
        if street_name.len() > MAX_FIELD_LEN {
            return Err(AppError::invalid("STREET_NAME_TOO_LONG"));
        }
        if city.len() > MAX_FIELD_LEN {
            return Err(AppError::invalid("CITY_TOO_LONG"));
        }
        if postal_code.len() > MAX_FIELD_LEN {
            return Err(AppError::invalid("POSTAL_CODE_TOO_LONG"));
        }

        Ok(AddressInput {
            street_number: street_number.to_string(),
            street_name: street_name.to_string(),
            city: city.to_string(),
            postal_code: postal_code.to_string(),
        })
    }
}

/// Insert-or-get store for addresses, geocoded on first insert.
#[derive(Clone)]
pub struct AddressStore {
    db: DatabaseConnection,
    geocoder: Arc<dyn Geocoder>,
}

impl AddressStore {
    pub fn new(db: DatabaseConnection, geocoder: Arc<dyn Geocoder>) -> Self {
        Self { db, geocoder }
    }

    /// Id of the address matching (street_number, street_name, city),
    /// creating and geocoding it when no match exists yet.
    pub async fn resolve(&self, input: &AddressInput) -> AppResult<i32> {
        let input = input.normalized()?;

        if let Some(existing) = self.find_exact(&input).await? {
            return Ok(existing.id);
        }

        let mut candidate = address::Model {
            id: 0,
            street_number: input.street_number.clone(),
            street_name: input.street_name.clone(),
            city: input.city.clone(),
            postal_code: input.postal_code.clone(),
            latitude: None,
            longitude: None,
        };
        let point = self.geocode(&candidate).await?;
        candidate.latitude = Some(point.lat);
        candidate.longitude = Some(point.lon);

        let new_address = address::ActiveModel {
            street_number: Set(candidate.street_number),
            street_name: Set(candidate.street_name),
            city: Set(candidate.city),
            postal_code: Set(candidate.postal_code),
            latitude: Set(candidate.latitude),
            longitude: Set(candidate.longitude),
            ..Default::default()
        };

        let inserted = address::Entity::insert(new_address)
            .on_conflict(
                OnConflict::columns([
                    address::Column::StreetNumber,
                    address::Column::StreetName,
                    address::Column::City,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec(&self.db)
            .await;

        match inserted {
            Ok(result) => {
                tracing::info!(address_id = result.last_insert_id, "Address created");
                Ok(result.last_insert_id)
            }
            // Lost an insert race against an identical address.
            Err(DbErr::RecordNotInserted) => self
                .find_exact(&input)
                .await?
                .map(|a| a.id)
                .ok_or_else(|| AppError::Internal("address vanished after conflict".to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Single best match from the geocoding provider.
    pub async fn geocode(&self, address: &address::Model) -> AppResult<GeoPoint> {
        Ok(self.geocoder.geocode(&address.query_text()).await?)
    }

    pub async fn find(&self, id: i32) -> AppResult<address::Model> {
        address::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::not_found("ADDRESS_NOT_FOUND"))
    }

    /// Coordinates of an address, geocoding and storing them if the row
    /// predates geocoding. Coordinates are never overwritten once set.
    pub async fn coordinates(&self, id: i32) -> AppResult<GeoPoint> {
        let address = self.find(id).await?;
        if let Some((lat, lon)) = address.coordinates() {
            return GeoPoint::new(lat, lon)
                .ok_or_else(|| AppError::Internal(format!("address {id} has invalid coordinates")));
        }

        let point = self.geocode(&address).await?;
        let mut active: address::ActiveModel = address.into();
        active.latitude = Set(Some(point.lat));
        active.longitude = Set(Some(point.lon));
        active.update(&self.db).await?;

        tracing::debug!(address_id = id, "Address geocoded lazily");
        Ok(point)
    }

    /// Ids of every address sitting on exactly these coordinates.
    pub async fn ids_at(&self, point: GeoPoint) -> AppResult<Vec<i32>> {
        let ids = address::Entity::find()
            .filter(address::Column::Latitude.eq(point.lat))
            .filter(address::Column::Longitude.eq(point.lon))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|a| a.id)
            .collect();
        Ok(ids)
    }

    async fn find_exact(&self, input: &AddressInput) -> AppResult<Option<address::Model>> {
        Ok(address::Entity::find()
            .filter(address::Column::StreetNumber.eq(input.street_number.as_str()))
            .filter(address::Column::StreetName.eq(input.street_name.as_str()))
            .filter(address::Column::City.eq(input.city.as_str()))
            .one(&self.db)
            .await?)
    }
}
