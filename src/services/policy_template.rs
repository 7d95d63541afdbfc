use crate::services::error::{ErrorCode, ServiceError, ServiceResult};
use crate::utils::validation::{require_non_blank, validate_policy_json};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Placeholder replaced by the bucket name when a template is applied.
pub const BUCKET_PLACEHOLDER: &str = "{bucket}";

const PUBLIC_POLICY: &str = r#"{
  "Version": "2012-10-17",
  "Statement": [
    {
      "Effect": "Allow",
      "Principal": {"AWS": ["*"]},
      "Action": ["s3:GetBucketLocation", "s3:ListBucket", "s3:ListBucketMultipartUploads"],
      "Resource": ["arn:aws:s3:::{bucket}"]
    },
    {
      "Effect": "Allow",
      "Principal": {"AWS": ["*"]},
      "Action": ["s3:GetObject", "s3:ListMultipartUploadParts", "s3:PutObject", "s3:AbortMultipartUpload", "s3:DeleteObject"],
      "Resource": ["arn:aws:s3:::{bucket}/*"]
    }
  ]
}"#;

const READONLY_POLICY: &str = r#"{
  "Version": "2012-10-17",
  "Statement": [
    {
      "Effect": "Allow",
      "Principal": {"AWS": ["*"]},
      "Action": ["s3:GetObject"],
      "Resource": ["arn:aws:s3:::{bucket}/*"]
    }
  ]
}"#;

const PRIVATE_POLICY: &str = r#"{
  "Version": "2012-10-17",
  "Statement": []
}"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PolicyType {
    Public,
    Readonly,
    Private,
    Custom,
}

impl PolicyType {
    /// Canned policy body; `None` for `Custom`.
    pub fn builtin_policy(&self) -> Option<&'static str> {
        match self {
            PolicyType::Public => Some(PUBLIC_POLICY),
            PolicyType::Readonly => Some(READONLY_POLICY),
            PolicyType::Private => Some(PRIVATE_POLICY),
            PolicyType::Custom => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyType::Public => "public",
            PolicyType::Readonly => "readonly",
            PolicyType::Private => "private",
            PolicyType::Custom => "custom",
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct PolicyTemplate {
    pub template_name: String,
    pub description: Option<String>,
    pub policy_type: PolicyType,
    /// Policy JSON, possibly containing `{bucket}`.
    pub policy: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct CreatePolicyTemplateRequest {
    pub template_name: String,
    pub description: Option<String>,
    pub policy_type: PolicyType,
    /// Required for `custom`, ignored otherwise.
    pub policy: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct UpdatePolicyTemplateRequest {
    pub description: Option<String>,
    pub policy_type: PolicyType,
    pub policy: Option<String>,
}

/// Named bucket policies, seeded with `public`, `readonly` and `private`.
///
/// Owned by the application state; nothing is persisted.
#[derive(Debug)]
pub struct PolicyTemplateRegistry {
    templates: DashMap<String, PolicyTemplate>,
}

impl Default for PolicyTemplateRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl PolicyTemplateRegistry {
    pub fn with_builtins() -> Self {
        let now = Utc::now();
        let templates = DashMap::new();
        for (policy_type, description) in [
            (PolicyType::Public, "Anonymous read, write and delete"),
            (PolicyType::Readonly, "Anonymous read"),
            (PolicyType::Private, "No anonymous access"),
        ] {
            let name = policy_type.as_str().to_string();
            templates.insert(
                name.clone(),
                PolicyTemplate {
                    template_name: name,
                    description: Some(description.to_string()),
                    policy_type,
                    policy: policy_type.builtin_policy().unwrap_or_default().to_string(),
                    created_at: now,
                    updated_at: now,
                },
            );
        }
        Self { templates }
    }

    pub fn is_built_in(name: &str) -> bool {
        matches!(name, "public" | "readonly" | "private")
    }

    pub fn create(&self, req: CreatePolicyTemplateRequest) -> ServiceResult<PolicyTemplate> {
        require_non_blank(&req.template_name, "template_name")?;
        let policy = resolve_policy(req.policy_type, req.policy.as_deref())?;

        match self.templates.entry(req.template_name.clone()) {
            Entry::Occupied(_) => Err(ServiceError::Conflict(format!(
                "Policy template '{}' already exists",
                req.template_name
            ))),
            Entry::Vacant(slot) => {
                let now = Utc::now();
                let template = PolicyTemplate {
                    template_name: req.template_name,
                    description: req.description,
                    policy_type: req.policy_type,
                    policy,
                    created_at: now,
                    updated_at: now,
                };
                slot.insert(template.clone());
                tracing::info!("Created policy template {}", template.template_name);
                Ok(template)
            }
        }
    }

    pub fn get(&self, name: &str) -> ServiceResult<PolicyTemplate> {
        self.templates
            .get(name)
            .map(|t| t.value().clone())
            .ok_or_else(|| not_found(name))
    }

    /// All templates, sorted by name.
    pub fn list(&self) -> Vec<PolicyTemplate> {
        let mut all: Vec<PolicyTemplate> = self.templates.iter().map(|t| t.value().clone()).collect();
        all.sort_by(|a, b| a.template_name.cmp(&b.template_name));
        all
    }

    /// Replaces description, type and body. A built-in keeps its type but
    /// its body may change.
    pub fn update(&self, name: &str, req: UpdatePolicyTemplateRequest) -> ServiceResult<PolicyTemplate> {
        let mut entry = self.templates.get_mut(name).ok_or_else(|| not_found(name))?;

        if Self::is_built_in(name) && entry.policy_type != req.policy_type {
            return Err(ServiceError::invalid(
                ErrorCode::BuiltInTemplate,
                format!("The type of built-in template '{}' cannot change", name),
            ));
        }

        let policy = match (req.policy_type, req.policy.as_deref()) {
            // Built-ins may carry an edited body; keep it unless a new one is sent.
            (_, Some(body)) => {
                validate_policy_json(body)?;
                body.to_string()
            }
            (policy_type, None) if policy_type == entry.policy_type => entry.policy.clone(),
            (policy_type, None) => resolve_policy(policy_type, None)?,
        };

        entry.description = req.description;
        entry.policy_type = req.policy_type;
        entry.policy = policy;
        entry.updated_at = Utc::now();

        tracing::info!("Updated policy template {}", name);
        Ok(entry.value().clone())
    }

    pub fn delete(&self, name: &str) -> ServiceResult<()> {
        if !self.templates.contains_key(name) {
            return Err(not_found(name));
        }
        if Self::is_built_in(name) {
            return Err(ServiceError::invalid(
                ErrorCode::BuiltInTemplate,
                format!("Built-in template '{}' cannot be deleted", name),
            ));
        }
        self.templates.remove(name);
        tracing::info!("Deleted policy template {}", name);
        Ok(())
    }

    /// The template's policy with every `{bucket}` replaced.
    pub fn render(&self, name: &str, bucket: &str) -> ServiceResult<String> {
        let template = self.get(name)?;
        Ok(template.policy.replace(BUCKET_PLACEHOLDER, bucket))
    }
}

fn resolve_policy(policy_type: PolicyType, policy: Option<&str>) -> ServiceResult<String> {
    if let Some(builtin) = policy_type.builtin_policy() {
        return Ok(builtin.to_string());
    }
    let body = policy.unwrap_or_default();
    if body.trim().is_empty() {
        return Err(ServiceError::invalid(
            ErrorCode::InvalidPolicy,
            "A custom template needs a policy body",
        ));
    }
    validate_policy_json(body)?;
    Ok(body.to_string())
}

fn not_found(name: &str) -> ServiceError {
    ServiceError::NotFound(format!("Policy template '{}' does not exist", name))
}
