use sea_orm::*;
use serde::{Deserialize, Serialize};

use crate::entities::company;
use crate::norm;
use crate::policy::Principal;

/// The company profile shown on the settings screen. A singleton: the
/// store keeps at most one row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanyProfile {
    pub name: String,
    pub contact_email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub social_links: Vec<String>,
    pub metadata: serde_json::Value,
}

impl Default for CompanyProfile {
    fn default() -> Self {
        CompanyProfile {
            name: String::new(),
            contact_email: None,
            phone: None,
            website: None,
            social_links: Vec::new(),
            metadata: serde_json::json!({}),
        }
    }
}

impl From<company::Model> for CompanyProfile {
    fn from(model: company::Model) -> Self {
        CompanyProfile {
            name: model.name,
            contact_email: model.contact_email,
            phone: model.phone,
            website: model.website,
            social_links: norm::string_list(&model.social_links),
            metadata: model.metadata,
        }
    }
}

/// Field patch for the company profile; absent fields are left untouched.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateCompanyRequest {
    pub name: Option<String>,
    pub contact_email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub social_links: Option<Vec<String>>,
    pub metadata: Option<serde_json::Value>,
}

/// Error type for CompanyService operations.
#[derive(Debug, thiserror::Error)]
pub enum CompanyServiceError {
    /// Represents a denied operation.
    #[error("Forbidden")]
    Forbidden,
    /// Represents a database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

pub struct CompanyService<'a> {
    db: &'a DatabaseConnection,
}

impl CompanyService<'_> {
    pub fn new(db: &DatabaseConnection) -> CompanyService {
        CompanyService { db }
    }

    /// Returns the company profile, or defaults if none has been saved yet.
    #[tracing::instrument(skip(self))]
    pub async fn get_profile(&self) -> Result<CompanyProfile, CompanyServiceError> {
        let model = company::Entity::find()
            .order_by_asc(company::Column::Id)
            .one(self.db)
            .await?;
        Ok(model.map(CompanyProfile::from).unwrap_or_default())
    }

    /// Applies a patch to the company profile, creating the row on first
    /// write. Admin only.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update_profile(
        &self,
        principal: &Principal,
        patch: UpdateCompanyRequest,
    ) -> Result<CompanyProfile, CompanyServiceError> {
        if !principal.is_admin() {
            return Err(CompanyServiceError::Forbidden);
        }

        let existing = company::Entity::find()
            .order_by_asc(company::Column::Id)
            .one(self.db)
            .await?;
        let now = chrono::Utc::now();
        let saved = match existing {
            Some(model) => {
                let mut active_model: company::ActiveModel = model.into();
                if let Some(name) = patch.name {
                    active_model.name = ActiveValue::Set(name);
                }
                if let Some(contact_email) = patch.contact_email {
                    active_model.contact_email = ActiveValue::Set(Some(contact_email));
                }
                if let Some(phone) = patch.phone {
                    active_model.phone = ActiveValue::Set(Some(phone));
                }
                if let Some(website) = patch.website {
                    active_model.website = ActiveValue::Set(Some(website));
                }
                if let Some(social_links) = patch.social_links {
                    active_model.social_links = ActiveValue::Set(serde_json::json!(social_links));
                }
                if let Some(metadata) = patch.metadata {
                    active_model.metadata = ActiveValue::Set(metadata);
                }
                active_model.updated_at = ActiveValue::Set(now);
                active_model.update(self.db).await?
            }
            None => {
                let active_model = company::ActiveModel {
                    name: ActiveValue::Set(patch.name.unwrap_or_default()),
                    contact_email: ActiveValue::Set(patch.contact_email),
                    phone: ActiveValue::Set(patch.phone),
                    website: ActiveValue::Set(patch.website),
                    social_links: ActiveValue::Set(serde_json::json!(
                        patch.social_links.unwrap_or_default()
                    )),
                    metadata: ActiveValue::Set(
                        patch.metadata.unwrap_or_else(|| serde_json::json!({})),
                    ),
                    updated_at: ActiveValue::Set(now),
                    ..Default::default()
                };
                active_model.insert(self.db).await?
            }
        };
        Ok(CompanyProfile::from(saved))
    }
}
