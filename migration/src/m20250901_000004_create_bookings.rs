use sea_orm_migration::{prelude::*, schema::*};

use super::m20250901_000001_create_users::AppUser;
use super::m20250901_000003_create_trips::Trip;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Booking::Table)
                    .if_not_exists()
                    .col(uuid(Booking::Id).primary_key())
                    .col(uuid(Booking::TripId).not_null())
                    .col(uuid(Booking::UserId).not_null())
                    .col(integer(Booking::PassengerCount).not_null())
                    // 0 requested, 1 accepted, -1 rejected, -2 cancelled
                    .col(integer(Booking::Accepted).not_null().default(0))
                    .col(string_len_null(Booking::VerificationCode, 4))
                    .col(boolean(Booking::Joined).not_null().default(false))
                    .col(integer(Booking::CodeAttempts).not_null().default(0))
                    .col(
                        timestamp_with_time_zone(Booking::DateRequested)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .check(Expr::col(Booking::PassengerCount).gte(1))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_booking_trip")
                            .from(Booking::Table, Booking::TripId)
                            .to(Trip::Table, Trip::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_booking_user")
                            .from(Booking::Table, Booking::UserId)
                            .to(AppUser::Table, AppUser::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // At most one requested or accepted booking per rider and trip.
        // sea-query has no partial index builder, hence raw SQL.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_booking_active_rider \
                 ON booking (trip_id, user_id) WHERE accepted IN (0, 1)",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Booking::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Booking {
    Table,
    Id,
    TripId,
    UserId,
    PassengerCount,
    Accepted,
    VerificationCode,
    Joined,
    CodeAttempts,
    DateRequested,
}
