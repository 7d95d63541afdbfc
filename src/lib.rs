pub mod api;
pub mod config;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::OssConfig;
use crate::services::bucket_service::BucketService;
use crate::services::chunk_upload::ChunkUploadService;
use crate::services::object_service::ObjectService;
use crate::services::policy_template::PolicyTemplateRegistry;
use crate::services::storage::ObjectStore;
use axum::{
    Router,
    http::HeaderValue,
    middleware::from_fn,
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::health_check,
        api::handlers::chunk_upload::init_chunk_upload,
        api::handlers::chunk_upload::upload_chunk,
        api::handlers::chunk_upload::complete_chunk_upload,
        api::handlers::chunk_upload::chunk_upload_status,
        api::handlers::chunk_upload::cancel_chunk_upload,
        api::handlers::buckets::list_buckets,
        api::handlers::buckets::create_bucket,
        api::handlers::buckets::delete_bucket,
        api::handlers::buckets::get_bucket_policy,
        api::handlers::buckets::set_bucket_policy,
        api::handlers::buckets::apply_policy_template,
        api::handlers::policy_templates::list_templates,
        api::handlers::policy_templates::create_template,
        api::handlers::policy_templates::get_template,
        api::handlers::policy_templates::update_template,
        api::handlers::policy_templates::delete_template,
        api::handlers::objects::upload_object,
        api::handlers::objects::list_objects,
        api::handlers::objects::download_object,
        api::handlers::objects::object_chunk_count,
        api::handlers::objects::delete_object,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            api::handlers::buckets::SetBucketPolicyRequest,
            services::chunk_upload::InitChunkUploadRequest,
            services::chunk_upload::ChunkUploadStatus,
            services::chunk_upload::UploadChunkResponse,
            services::chunk_upload::CompleteChunkUploadRequest,
            services::chunk_upload::CompletedUpload,
            services::chunk_upload::CleanupReport,
            services::chunk_upload::FailedRemoval,
            services::bucket_service::CreateBucketRequest,
            services::bucket_service::BucketPolicy,
            services::policy_template::PolicyType,
            services::policy_template::PolicyTemplate,
            services::policy_template::CreatePolicyTemplateRequest,
            services::policy_template::UpdatePolicyTemplateRequest,
            services::object_service::UploadedObject,
            services::object_service::ObjectChunkCount,
        )
    ),
    tags(
        (name = "system", description = "Health"),
        (name = "chunk-uploads", description = "Resumable chunked uploads"),
        (name = "buckets", description = "Bucket management and policies"),
        (name = "policy-templates", description = "Named bucket policy templates"),
        (name = "objects", description = "Single-shot upload, download and removal")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn ObjectStore>,
    pub chunk_uploads: Arc<ChunkUploadService>,
    pub buckets: Arc<BucketService>,
    pub objects: Arc<ObjectService>,
    pub policy_templates: Arc<PolicyTemplateRegistry>,
    pub config: OssConfig,
}

impl AppState {
    /// Wires every service around one object store and a freshly seeded
    /// template registry.
    pub fn new(storage: Arc<dyn ObjectStore>, config: OssConfig) -> Self {
        let policy_templates = Arc::new(PolicyTemplateRegistry::with_builtins());
        Self {
            chunk_uploads: Arc::new(ChunkUploadService::new(storage.clone(), config.clone())),
            buckets: Arc::new(BucketService::new(storage.clone(), policy_templates.clone())),
            objects: Arc::new(ObjectService::new(storage.clone(), config.clone())),
            policy_templates,
            storage,
            config,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/chunk-uploads",
            delete(api::handlers::chunk_upload::cancel_chunk_upload),
        )
        .route(
            "/chunk-uploads/init",
            post(api::handlers::chunk_upload::init_chunk_upload),
        )
        .route(
            "/chunk-uploads/sessions/:upload_session_id/:file_md5/chunks/:chunk_index",
            put(api::handlers::chunk_upload::upload_chunk),
        )
        .route(
            "/chunk-uploads/complete",
            post(api::handlers::chunk_upload::complete_chunk_upload),
        )
        .route(
            "/chunk-uploads/status",
            get(api::handlers::chunk_upload::chunk_upload_status),
        )
        .route(
            "/buckets",
            get(api::handlers::buckets::list_buckets).post(api::handlers::buckets::create_bucket),
        )
        .route(
            "/buckets/:bucket",
            delete(api::handlers::buckets::delete_bucket),
        )
        .route(
            "/buckets/:bucket/policy",
            get(api::handlers::buckets::get_bucket_policy)
                .put(api::handlers::buckets::set_bucket_policy),
        )
        .route(
            "/buckets/:bucket/policy-template/:template",
            put(api::handlers::buckets::apply_policy_template),
        )
        .route(
            "/policy-templates",
            get(api::handlers::policy_templates::list_templates)
                .post(api::handlers::policy_templates::create_template),
        )
        .route(
            "/policy-templates/:name",
            get(api::handlers::policy_templates::get_template)
                .put(api::handlers::policy_templates::update_template)
                .delete(api::handlers::policy_templates::delete_template),
        )
        .route(
            "/objects/:bucket",
            get(api::handlers::objects::list_objects).post(api::handlers::objects::upload_object),
        )
        .route(
            "/objects/:bucket/*key",
            get(api::handlers::objects::download_object)
                .delete(api::handlers::objects::delete_object),
        )
        .route(
            "/object-chunks/:bucket/*key",
            get(api::handlers::objects::object_chunk_count),
        )
        .layer(from_fn(api::middleware::metrics::metrics_middleware))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(cors_layer(&state.config))
        .layer(axum::extract::DefaultBodyLimit::max(
            state.config.max_file_size + 10 * 1024 * 1024, // multipart overhead
        ))
        .with_state(state)
}

fn cors_layer(config: &OssConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any)
}
