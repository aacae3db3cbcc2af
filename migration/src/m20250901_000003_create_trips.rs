use sea_orm_migration::{prelude::*, schema::*};

use super::m20250901_000001_create_users::AppUser;
use super::m20250901_000002_create_addresses::Address;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Trip::Table)
                    .if_not_exists()
                    .col(uuid(Trip::Id).primary_key())
                    .col(uuid(Trip::DriverId).not_null())
                    .col(integer(Trip::DepartureAddressId).not_null())
                    .col(integer(Trip::ArrivalAddressId).not_null())
                    .col(integer(Trip::TotalPassengerCount).not_null())
                    .col(timestamp_with_time_zone(Trip::TimestampProposed).not_null())
                    .col(string_len(Trip::Status, 16).not_null().default("pending"))
                    .col(double(Trip::Price).not_null())
                    .col(double(Trip::DistanceKm).not_null())
                    .col(
                        timestamp_with_time_zone(Trip::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .check(Expr::col(Trip::TotalPassengerCount).gte(1))
                    .check(
                        Expr::col(Trip::DepartureAddressId)
                            .ne(Expr::col(Trip::ArrivalAddressId)),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_trip_driver")
                            .from(Trip::Table, Trip::DriverId)
                            .to(AppUser::Table, AppUser::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_trip_departure_address")
                            .from(Trip::Table, Trip::DepartureAddressId)
                            .to(Address::Table, Address::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_trip_arrival_address")
                            .from(Trip::Table, Trip::ArrivalAddressId)
                            .to(Address::Table, Address::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // Matching scans Pending trips by departure time
        manager
            .create_index(
                Index::create()
                    .name("idx_trip_status_timestamp")
                    .table(Trip::Table)
                    .col(Trip::Status)
                    .col(Trip::TimestampProposed)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_trip_driver")
                    .table(Trip::Table)
                    .col(Trip::DriverId)
                    .to_owned(),
            )
            .await?;

        // One live trip per driver, endpoints, time and capacity.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_trip_active_unique \
                 ON trip (driver_id, departure_address_id, arrival_address_id, \
                 timestamp_proposed, total_passenger_count) WHERE status <> 'canceled'",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Trip::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Trip {
    Table,
    Id,
    DriverId,
    DepartureAddressId,
    ArrivalAddressId,
    TotalPassengerCount,
    TimestampProposed,
    Status,
    Price,
    DistanceKm,
    CreatedAt,
}
