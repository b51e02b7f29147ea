//! Template management on top of the document store.
//!
//! A template is a saved document summary, grouped by folder and owned by a
//! user. Documents live in the `templates` collection; the display name is
//! stored under the `template` field. Creation has two paths (a composite
//! `{uid}-{folder}-{name}` key that refuses to overwrite, and a
//! store-generated key), updates are full overwrites with `updatedAt` set,
//! and a folder can be harmonized into a single merged template stored under
//! the reserved name [`HARMONIZED_TEMPLATE_NAME`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::analysis::AnalysisClient;
use crate::errors::{Error, Result};
use crate::store::DocumentStore;
use crate::types::{DocumentValue, TemplateId};

pub const TEMPLATES_COLLECTION: &str = "templates";

/// Reserved template name holding a folder's merged summary.
pub const HARMONIZED_TEMPLATE_NAME: &str = "template-harmonized";

/// The composite document key for user-named templates.
pub fn composite_template_id(uid: &str, folder: &str, name: &str) -> TemplateId {
    format!("{uid}-{folder}-{name}")
}

/// A saved template as stored in the `templates` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    /// The store key; not part of the stored document value.
    #[serde(skip)]
    pub id: TemplateId,
    pub user_id: String,
    pub folder: String,
    /// Display name; stored under the `template` field.
    #[serde(rename = "template")]
    pub name: String,
    pub summary: Value,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

fn to_document(template: &Template) -> Result<DocumentValue> {
    DocumentValue::try_from(serde_json::to_value(template)?)
}

fn from_document(id: &str, document: DocumentValue) -> Result<Template> {
    let mut template: Template = serde_json::from_value(document.into())?;
    template.id = id.to_string();
    Ok(template)
}

/// Create/read/update/delete and harmonization of saved templates.
#[derive(Clone)]
pub struct TemplateService {
    store: Arc<dyn DocumentStore>,
    analysis: AnalysisClient,
    http: reqwest::Client,
}

impl TemplateService {
    pub fn new(store: Arc<dyn DocumentStore>, analysis: AnalysisClient) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self { store, analysis, http }
    }

    /// Fetch one template by id.
    pub async fn get(&self, template_id: &str) -> Result<Template> {
        let document = self
            .store
            .get(TEMPLATES_COLLECTION, template_id)
            .await?
            .ok_or_else(|| Error::NotFound {
                resource: "Template".to_string(),
                id: template_id.to_string(),
            })?;
        from_document(template_id, document)
    }

    /// All templates a user owns, grouped by folder. Folder names iterate in
    /// sorted order; templates within a folder are sorted by name.
    pub async fn list_grouped(&self, uid: &str) -> Result<BTreeMap<String, Vec<Template>>> {
        let rows = self
            .store
            .query_eq(TEMPLATES_COLLECTION, "userId", &Value::String(uid.to_string()))
            .await?;

        let mut grouped: BTreeMap<String, Vec<Template>> = BTreeMap::new();
        for (id, document) in rows {
            let template = from_document(&id, document)?;
            grouped.entry(template.folder.clone()).or_default().push(template);
        }
        for templates in grouped.values_mut() {
            templates.sort_by(|a, b| a.name.cmp(&b.name));
        }
        Ok(grouped)
    }

    /// A user's templates in one folder, sorted by name.
    pub async fn templates_in_folder(&self, uid: &str, folder: &str) -> Result<Vec<Template>> {
        let rows = self
            .store
            .query_eq(TEMPLATES_COLLECTION, "userId", &Value::String(uid.to_string()))
            .await?;

        let mut templates = rows
            .into_iter()
            .map(|(id, document)| from_document(&id, document))
            .collect::<Result<Vec<_>>>()?;
        templates.retain(|template| template.folder == folder);
        templates.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(templates)
    }

    /// Save a new template under the composite `{uid}-{folder}-{name}` key.
    ///
    /// # Errors
    /// [`Error::TemplateExists`] if that key is already taken.
    pub async fn save_new(&self, uid: &str, folder: &str, name: &str, summary: Value) -> Result<Template> {
        let id = composite_template_id(uid, folder, name);
        if self.store.get(TEMPLATES_COLLECTION, &id).await?.is_some() {
            return Err(Error::TemplateExists {
                name: name.to_string(),
                folder: folder.to_string(),
            });
        }

        let template = Template {
            id: id.clone(),
            user_id: uid.to_string(),
            folder: folder.to_string(),
            name: name.to_string(),
            summary,
            created_at: Utc::now(),
            updated_at: None,
            webhook_url: None,
        };
        self.store.set(TEMPLATES_COLLECTION, &id, to_document(&template)?).await?;
        debug!("Saved template {} in folder {}", template.name, template.folder);
        Ok(template)
    }

    /// Save a new template under a store-generated key.
    pub async fn add(&self, uid: &str, folder: &str, name: &str, summary: Value) -> Result<Template> {
        let mut template = Template {
            id: TemplateId::new(),
            user_id: uid.to_string(),
            folder: folder.to_string(),
            name: name.to_string(),
            summary,
            created_at: Utc::now(),
            updated_at: None,
            webhook_url: None,
        };
        template.id = self.store.add(TEMPLATES_COLLECTION, to_document(&template)?).await?;
        debug!("Added template {} with generated id {}", template.name, template.id);
        Ok(template)
    }

    /// Overwrite an existing template, stamping `updatedAt`. Last write wins;
    /// there is no conflict detection.
    pub async fn update(&self, template: &Template) -> Result<Template> {
        let mut updated = template.clone();
        updated.updated_at = Some(Utc::now());
        self.store
            .set(TEMPLATES_COLLECTION, &updated.id, to_document(&updated)?)
            .await?;
        Ok(updated)
    }

    /// Delete a template by id. Deleting an absent id is not an error.
    pub async fn delete(&self, template_id: &str) -> Result<()> {
        self.store.delete(TEMPLATES_COLLECTION, template_id).await
    }

    /// Set the webhook URL with a single-field merge, leaving the rest of the
    /// document untouched.
    pub async fn set_webhook_url(&self, template_id: &str, url: &str) -> Result<()> {
        let mut patch = DocumentValue::new();
        patch.insert("webhookUrl", Value::String(url.to_string()));
        self.store.merge(TEMPLATES_COLLECTION, template_id, patch).await
    }

    /// POST the template's summary to its stored webhook URL.
    ///
    /// # Errors
    /// [`Error::BadRequest`] when no URL is stored, [`Error::WebhookTest`]
    /// when the endpoint answers non-2xx.
    pub async fn test_webhook(&self, template_id: &str) -> Result<()> {
        let template = self.get(template_id).await?;
        let url = template
            .webhook_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| Error::BadRequest {
                message: "No template selected or webhook URL is empty.".to_string(),
            })?;
        debug!("Testing webhook for template {} against {}", template.id, url);

        let response = self.http.post(url).json(&template.summary).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::WebhookTest {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    /// Merge a folder's template summaries into one harmonized template.
    ///
    /// Prior harmonized output is excluded from the input set and replaced by
    /// the new result, stored under the composite key for
    /// [`HARMONIZED_TEMPLATE_NAME`].
    pub async fn harmonize_folder(&self, uid: &str, folder: &str) -> Result<Template> {
        let summaries: Vec<Value> = self
            .templates_in_folder(uid, folder)
            .await?
            .into_iter()
            .filter(|template| template.name != HARMONIZED_TEMPLATE_NAME)
            .map(|template| template.summary)
            .collect();
        if summaries.is_empty() {
            return Err(Error::BadRequest {
                message: format!("No templates to harmonize in folder \"{folder}\""),
            });
        }
        debug!("Harmonizing {} templates in folder {}", summaries.len(), folder);

        let merged = self.analysis.harmonize_templates(&summaries).await?;

        let harmonized = Template {
            id: composite_template_id(uid, folder, HARMONIZED_TEMPLATE_NAME),
            user_id: uid.to_string(),
            folder: folder.to_string(),
            name: HARMONIZED_TEMPLATE_NAME.to_string(),
            summary: merged,
            created_at: Utc::now(),
            updated_at: None,
            webhook_url: None,
        };
        self.store
            .set(TEMPLATES_COLLECTION, &harmonized.id, to_document(&harmonized)?)
            .await?;
        Ok(harmonized)
    }
}
