use crate::services::error::{ErrorCode, ServiceError, ServiceResult};
use crate::services::policy_template::PolicyTemplateRegistry;
use crate::services::storage::ObjectStore;
use crate::utils::validation::{validate_bucket_name, validate_policy_json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use utoipa::ToSchema;

/// Template stamped on new buckets unless the request names another.
pub const DEFAULT_BUCKET_TEMPLATE: &str = "readonly";

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct CreateBucketRequest {
    pub bucket_name: String,
    /// Policy template to apply, `readonly` when absent.
    pub policy_template: Option<String>,
    /// Actions granted to everyone on the bucket's objects, e.g. `s3:GetObject`.
    /// Replaces the template when given.
    #[serde(default)]
    pub actions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BucketPolicy {
    pub bucket_name: String,
    pub policy: String,
}

pub struct BucketService {
    store: Arc<dyn ObjectStore>,
    templates: Arc<PolicyTemplateRegistry>,
}

impl BucketService {
    pub fn new(store: Arc<dyn ObjectStore>, templates: Arc<PolicyTemplateRegistry>) -> Self {
        Self { store, templates }
    }

    pub async fn create_bucket(&self, req: &CreateBucketRequest) -> ServiceResult<()> {
        validate_bucket_name(&req.bucket_name)?;
        let template = req
            .policy_template
            .as_deref()
            .filter(|t| !t.trim().is_empty());
        // Resolve before touching the store so a bad request leaves nothing behind.
        let (policy, source) = match (&req.actions, template) {
            (Some(_), Some(_)) => {
                return Err(ServiceError::invalid(
                    ErrorCode::InvalidParameter,
                    "Give either actions or policy_template, not both",
                ));
            }
            (Some(actions), None) => (
                object_actions_policy(&req.bucket_name, actions)?,
                "custom actions",
            ),
            (None, template) => {
                let template = template.unwrap_or(DEFAULT_BUCKET_TEMPLATE);
                (self.templates.render(template, &req.bucket_name)?, template)
            }
        };

        if self.store.bucket_exists(&req.bucket_name).await? {
            return Err(ServiceError::Conflict(format!(
                "Bucket '{}' already exists",
                req.bucket_name
            )));
        }

        self.store.make_bucket(&req.bucket_name).await?;
        self.store.set_bucket_policy(&req.bucket_name, &policy).await?;
        tracing::info!("Created bucket {} with policy {}", req.bucket_name, source);
        Ok(())
    }

    pub async fn delete_bucket(&self, bucket: &str) -> ServiceResult<()> {
        self.ensure_exists(bucket).await?;
        self.store.remove_bucket(bucket).await?;
        tracing::info!("Deleted bucket {}", bucket);
        Ok(())
    }

    pub async fn list_buckets(&self) -> ServiceResult<Vec<String>> {
        Ok(self.store.list_buckets().await?)
    }

    /// Stores `policy` verbatim after checking it is JSON.
    pub async fn set_bucket_policy(&self, bucket: &str, policy: &str) -> ServiceResult<()> {
        validate_policy_json(policy)?;
        self.ensure_exists(bucket).await?;
        self.store.set_bucket_policy(bucket, policy).await?;
        tracing::info!("Set policy on bucket {}", bucket);
        Ok(())
    }

    pub async fn get_bucket_policy(&self, bucket: &str) -> ServiceResult<BucketPolicy> {
        let policy = self.store.get_bucket_policy(bucket).await?;
        Ok(BucketPolicy {
            bucket_name: bucket.to_string(),
            policy,
        })
    }

    /// Renders `template_name` for `bucket` and pushes it to the store.
    pub async fn apply_template(&self, bucket: &str, template_name: &str) -> ServiceResult<BucketPolicy> {
        let policy = self.templates.render(template_name, bucket)?;
        self.ensure_exists(bucket).await?;
        self.store.set_bucket_policy(bucket, &policy).await?;
        tracing::info!("Applied policy template {} to bucket {}", template_name, bucket);
        Ok(BucketPolicy {
            bucket_name: bucket.to_string(),
            policy,
        })
    }

    async fn ensure_exists(&self, bucket: &str) -> ServiceResult<()> {
        if !self.store.bucket_exists(bucket).await? {
            return Err(ServiceError::NotFound(format!(
                "Bucket '{}' does not exist",
                bucket
            )));
        }
        Ok(())
    }
}

/// Policy allowing `actions` for anyone on every object of `bucket`.
pub fn object_actions_policy(bucket: &str, actions: &[String]) -> ServiceResult<String> {
    if actions.is_empty() || actions.iter().any(|a| a.trim().is_empty()) {
        return Err(ServiceError::invalid(
            ErrorCode::InvalidPolicy,
            "actions must be a non-empty list of non-blank action names",
        ));
    }
    let policy = json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "AWS": ["*"] },
            "Action": actions,
            "Resource": [format!("arn:aws:s3:::{}/*", bucket)],
        }]
    });
    Ok(policy.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::storage::InMemoryObjectStore;

    fn service() -> BucketService {
        BucketService::new(
            Arc::new(InMemoryObjectStore::with_buckets(["public"])),
            Arc::new(PolicyTemplateRegistry::with_builtins()),
        )
    }

    fn create(name: &str) -> CreateBucketRequest {
        CreateBucketRequest {
            bucket_name: name.to_string(),
            policy_template: None,
            actions: None,
        }
    }

    #[tokio::test]
    async fn test_create_stamps_readonly_policy() {
        let svc = service();
        svc.create_bucket(&create("media")).await.unwrap();

        let policy = svc.get_bucket_policy("media").await.unwrap();
        assert!(policy.policy.contains("arn:aws:s3:::media/*"));
        assert!(policy.policy.contains("s3:GetObject"));
        assert!(!policy.policy.contains("s3:PutObject"));
    }

    #[tokio::test]
    async fn test_create_existing_is_conflict() {
        let err = service().create_bucket(&create("public")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_name_and_unknown_template() {
        let svc = service();
        assert_eq!(
            svc.create_bucket(&create("Bad_Name")).await.unwrap_err().code(),
            Some(ErrorCode::InvalidBucketName)
        );

        let err = svc
            .create_bucket(&CreateBucketRequest {
                bucket_name: "media".to_string(),
                policy_template: Some("nope".to_string()),
                actions: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert!(!svc.list_buckets().await.unwrap().contains(&"media".to_string()));
    }

    #[tokio::test]
    async fn test_delete_missing_bucket() {
        let err = service().delete_bucket("ghost").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_set_policy_requires_json() {
        let svc = service();
        assert_eq!(
            svc.set_bucket_policy("public", "allow all").await.unwrap_err().code(),
            Some(ErrorCode::InvalidPolicy)
        );
        svc.set_bucket_policy("public", r#"{"Statement":[]}"#).await.unwrap();
        assert_eq!(
            svc.get_bucket_policy("public").await.unwrap().policy,
            r#"{"Statement":[]}"#
        );
    }

    #[tokio::test]
    async fn test_apply_template() {
        let svc = service();
        let applied = svc.apply_template("public", "private").await.unwrap();
        assert!(applied.policy.contains("\"Statement\": []"));
        assert!(matches!(
            svc.apply_template("ghost", "private").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_with_custom_actions() {
        let svc = service();
        svc.create_bucket(&CreateBucketRequest {
            bucket_name: "drop-box".to_string(),
            policy_template: None,
            actions: Some(vec!["s3:PutObject".to_string(), "s3:GetObject".to_string()]),
        })
        .await
        .unwrap();

        let stored = svc.get_bucket_policy("drop-box").await.unwrap().policy;
        let policy: serde_json::Value = serde_json::from_str(&stored).unwrap();
        let statement = &policy["Statement"][0];
        assert_eq!(statement["Effect"], "Allow");
        assert_eq!(statement["Action"], json!(["s3:PutObject", "s3:GetObject"]));
        assert_eq!(statement["Resource"], json!(["arn:aws:s3:::drop-box/*"]));
    }

    #[tokio::test]
    async fn test_custom_actions_are_checked_before_creating() {
        let svc = service();
        let cases = [
            (Some(vec![]), None, ErrorCode::InvalidPolicy),
            (Some(vec![" ".to_string()]), None, ErrorCode::InvalidPolicy),
            (
                Some(vec!["s3:GetObject".to_string()]),
                Some("public".to_string()),
                ErrorCode::InvalidParameter,
            ),
        ];
        for (actions, policy_template, code) in cases {
            let err = svc
                .create_bucket(&CreateBucketRequest {
                    bucket_name: "drop-box".to_string(),
                    policy_template,
                    actions,
                })
                .await
                .unwrap_err();
            assert_eq!(err.code(), Some(code));
        }
        assert!(!svc.list_buckets().await.unwrap().contains(&"drop-box".to_string()));
    }
}
