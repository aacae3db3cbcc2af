use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Address::Table)
                    .if_not_exists()
                    .col(pk_auto(Address::Id))
                    .col(string_len(Address::StreetNumber, 255).not_null())
                    .col(string_len(Address::StreetName, 255).not_null())
                    .col(string_len(Address::City, 255).not_null())
                    .col(string_len(Address::PostalCode, 255).not_null())
                    .col(double_null(Address::Latitude))
                    .col(double_null(Address::Longitude))
                    .to_owned(),
            )
            .await?;

        // One row per physical address
        manager
            .create_index(
                Index::create()
                    .name("idx_address_unique")
                    .table(Address::Table)
                    .col(Address::StreetNumber)
                    .col(Address::StreetName)
                    .col(Address::City)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Trip search looks up every address sharing the university's coordinates
        manager
            .create_index(
                Index::create()
                    .name("idx_address_coordinates")
                    .table(Address::Table)
                    .col(Address::Latitude)
                    .col(Address::Longitude)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Address::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Address {
    Table,
    Id,
    StreetNumber,
    StreetName,
    City,
    PostalCode,
    Latitude,
    Longitude,
}
