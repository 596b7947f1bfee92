use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ConsentPurposes::Table)
                    .if_not_exists()
                    .col(string(ConsentPurposes::PurposeId))
                    .col(string(ConsentPurposes::OrgId))
                    .col(string(ConsentPurposes::Name))
                    .col(string_null(ConsentPurposes::Description))
                    .col(string(ConsentPurposes::PurposeType))
                    .primary_key(
                        Index::create()
                            .col(ConsentPurposes::PurposeId)
                            .col(ConsentPurposes::OrgId),
                    )
                    .to_owned(),
            )
            .await?;

        // Backstop for concurrent creates of the same purpose name
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_consent_purposes_org_name")
                    .table(ConsentPurposes::Table)
                    .col(ConsentPurposes::OrgId)
                    .col(ConsentPurposes::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ConsentPurposeAttributes::Table)
                    .if_not_exists()
                    .col(string(ConsentPurposeAttributes::PurposeId))
                    .col(string(ConsentPurposeAttributes::OrgId))
                    .col(string(ConsentPurposeAttributes::AttKey))
                    .col(text(ConsentPurposeAttributes::AttValue))
                    .primary_key(
                        Index::create()
                            .col(ConsentPurposeAttributes::PurposeId)
                            .col(ConsentPurposeAttributes::OrgId)
                            .col(ConsentPurposeAttributes::AttKey),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ConsentPurposeMappings::Table)
                    .if_not_exists()
                    .col(string(ConsentPurposeMappings::ConsentId))
                    .col(string(ConsentPurposeMappings::OrgId))
                    .col(string(ConsentPurposeMappings::PurposeId))
                    .col(text_null(ConsentPurposeMappings::Value))
                    .col(boolean(ConsentPurposeMappings::IsUserApproved).default(false))
                    .col(boolean(ConsentPurposeMappings::IsMandatory).default(false))
                    .primary_key(
                        Index::create()
                            .col(ConsentPurposeMappings::ConsentId)
                            .col(ConsentPurposeMappings::OrgId)
                            .col(ConsentPurposeMappings::PurposeId),
                    )
                    .to_owned(),
            )
            .await?;

        // Binding counts are looked up by purpose before rename/delete
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_consent_purpose_mappings_purpose")
                    .table(ConsentPurposeMappings::Table)
                    .col(ConsentPurposeMappings::PurposeId)
                    .col(ConsentPurposeMappings::OrgId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(ConsentPurposeMappings::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(ConsentPurposeAttributes::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(ConsentPurposes::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ConsentPurposes {
    Table,
    PurposeId,
    OrgId,
    Name,
    Description,
    PurposeType,
}

#[derive(DeriveIden)]
enum ConsentPurposeAttributes {
    Table,
    PurposeId,
    OrgId,
    AttKey,
    AttValue,
}

#[derive(DeriveIden)]
enum ConsentPurposeMappings {
    Table,
    ConsentId,
    OrgId,
    PurposeId,
    Value,
    IsUserApproved,
    IsMandatory,
}
