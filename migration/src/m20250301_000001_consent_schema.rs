use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Consents::Table)
                    .if_not_exists()
                    .col(string(Consents::ConsentId))
                    .col(string(Consents::OrgId))
                    .col(string(Consents::ClientId))
                    .col(string(Consents::ConsentType))
                    .col(string(Consents::CurrentStatus))
                    .col(big_integer_null(Consents::ConsentFrequency))
                    .col(big_integer_null(Consents::ValidityTime))
                    .col(boolean_null(Consents::RecurringIndicator))
                    .col(big_integer_null(Consents::DataAccessValidityDuration))
                    .col(text_null(Consents::Receipt))
                    .col(big_integer(Consents::CreatedTime))
                    .col(big_integer(Consents::UpdatedTime))
                    .primary_key(
                        Index::create()
                            .col(Consents::ConsentId)
                            .col(Consents::OrgId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_consents_org_client")
                    .table(Consents::Table)
                    .col(Consents::OrgId)
                    .col(Consents::ClientId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_consents_org_status")
                    .table(Consents::Table)
                    .col(Consents::OrgId)
                    .col(Consents::CurrentStatus)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ConsentAttributes::Table)
                    .if_not_exists()
                    .col(string(ConsentAttributes::ConsentId))
                    .col(string(ConsentAttributes::OrgId))
                    .col(string(ConsentAttributes::AttKey))
                    .col(string(ConsentAttributes::AttValue))
                    .primary_key(
                        Index::create()
                            .col(ConsentAttributes::ConsentId)
                            .col(ConsentAttributes::OrgId)
                            .col(ConsentAttributes::AttKey),
                    )
                    .to_owned(),
            )
            .await?;

        // Attribute search goes by key (and optionally value) across a tenant
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_consent_attributes_key")
                    .table(ConsentAttributes::Table)
                    .col(ConsentAttributes::OrgId)
                    .col(ConsentAttributes::AttKey)
                    .to_owned(),
            )
            .await?;

        // Audit rows outlive the consent they describe, so no foreign key here.
        manager
            .create_table(
                Table::create()
                    .table(ConsentStatusAudits::Table)
                    .if_not_exists()
                    .col(string(ConsentStatusAudits::StatusAuditId).primary_key())
                    .col(string(ConsentStatusAudits::ConsentId))
                    .col(string(ConsentStatusAudits::OrgId))
                    .col(string(ConsentStatusAudits::CurrentStatus))
                    .col(string(ConsentStatusAudits::PreviousStatus))
                    .col(big_integer(ConsentStatusAudits::ActionTime))
                    .col(big_integer(ConsentStatusAudits::Sequence))
                    .col(string_null(ConsentStatusAudits::ActionBy))
                    .col(string_null(ConsentStatusAudits::Reason))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_consent_status_audits_consent")
                    .table(ConsentStatusAudits::Table)
                    .col(ConsentStatusAudits::ConsentId)
                    .col(ConsentStatusAudits::OrgId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AuthorizationResources::Table)
                    .if_not_exists()
                    .col(string(AuthorizationResources::AuthId))
                    .col(string(AuthorizationResources::OrgId))
                    .col(string(AuthorizationResources::ConsentId))
                    .col(string(AuthorizationResources::AuthType))
                    .col(string_null(AuthorizationResources::UserId))
                    .col(string(AuthorizationResources::AuthStatus))
                    .col(big_integer(AuthorizationResources::UpdatedTime))
                    .col(text_null(AuthorizationResources::ApprovedPurposeDetails))
                    .primary_key(
                        Index::create()
                            .col(AuthorizationResources::AuthId)
                            .col(AuthorizationResources::OrgId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_authorization_resources_consent")
                    .table(AuthorizationResources::Table)
                    .col(AuthorizationResources::ConsentId)
                    .col(AuthorizationResources::OrgId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_authorization_resources_user")
                    .table(AuthorizationResources::Table)
                    .col(AuthorizationResources::OrgId)
                    .col(AuthorizationResources::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(AuthorizationResources::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(ConsentStatusAudits::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ConsentAttributes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Consents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Consents {
    Table,
    ConsentId,
    OrgId,
    ClientId,
    ConsentType,
    CurrentStatus,
    ConsentFrequency,
    ValidityTime,
    RecurringIndicator,
    DataAccessValidityDuration,
    Receipt,
    CreatedTime,
    UpdatedTime,
}

#[derive(DeriveIden)]
enum ConsentAttributes {
    Table,
    ConsentId,
    OrgId,
    AttKey,
    AttValue,
}

#[derive(DeriveIden)]
enum ConsentStatusAudits {
    Table,
    StatusAuditId,
    ConsentId,
    OrgId,
    CurrentStatus,
    PreviousStatus,
    ActionTime,
    Sequence,
    ActionBy,
    Reason,
}

#[derive(DeriveIden)]
enum AuthorizationResources {
    Table,
    AuthId,
    OrgId,
    ConsentId,
    AuthType,
    UserId,
    AuthStatus,
    UpdatedTime,
    ApprovedPurposeDetails,
}
