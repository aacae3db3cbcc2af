use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "on_course")]
    OnCourse,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "canceled")]
    Canceled,
}

impl TripStatus {
    /// The only edges of the trip lifecycle.
    pub fn can_transition_to(self, next: TripStatus) -> bool {
        matches!(
            (self, next),
            (TripStatus::Pending, TripStatus::OnCourse)
                | (TripStatus::Pending, TripStatus::Canceled)
                | (TripStatus::OnCourse, TripStatus::Completed)
        )
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "trip")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub driver_id: Uuid,
    pub departure_address_id: i32,
    pub arrival_address_id: i32,
    pub total_passenger_count: i32,
    pub timestamp_proposed: DateTimeUtc,
    pub status: TripStatus,
    pub price: f64,
    pub distance_km: f64,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::DriverId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Driver,
    #[sea_orm(
        belongs_to = "super::address::Entity",
        from = "Column::DepartureAddressId",
        to = "super::address::Column::Id"
    )]
    DepartureAddress,
    #[sea_orm(
        belongs_to = "super::address::Entity",
        from = "Column::ArrivalAddressId",
        to = "super::address::Column::Id"
    )]
    ArrivalAddress,
    #[sea_orm(has_many = "super::booking::Entity")]
    Bookings,
}

impl Related<super::booking::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bookings.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Driver.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
