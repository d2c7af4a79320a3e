//! OpenAPI documentation, served at `/api/openapi.json` and rendered by RapiDoc at `/docs`.

use utoipa::OpenApi;

use crate::error;
use crate::handlers;
use likeness_core::models;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Likeness API",
        version = "0.1.0",
        description = "Builds identity photo sets from social-media profiles: profile intake, seedream enhancement, anchor and variant generation, and a media library."
    ),
    paths(
        // Generation
        handlers::generation::generate_anchors,
        handlers::generation::generate_variants,
        handlers::seedream::create_seedream,
        // Intake
        handlers::intake::analyze_profile,
        handlers::intake::collect_reels,
        // Media
        handlers::media::list_media,
        handlers::media::delete_all_media,
        handlers::media::delete_media,
        handlers::media::upload_media,
        handlers::media::save_reel,
        handlers::media::save_frames,
        // Proxies
        handlers::proxy::media_proxy,
        handlers::proxy::video_proxy,
        // Identities
        handlers::identities::list_identities,
        handlers::identities::delete_identity,
        handlers::identities::set_primary,
        handlers::identities::get_primary,
        // Progress
        handlers::progress::get_progress,
        handlers::progress::stream_progress,
        // Health
        handlers::health::health_check,
        handlers::health::liveness_check,
    ),
    components(
        schemas(
            models::Identity,
            models::IdentityStatus,
            models::IdentitySource,
            models::GenerationState,
            models::BatchSummary,
            models::AnchorGenerateRequest,
            models::VariantGenerateRequest,
            models::SeedreamRequest,
            models::SeedreamResponse,
            models::SeedreamIdentity,
            models::SetPrimaryRequest,
            models::MediaItem,
            models::MediaType,
            models::MediaSource,
            models::SaveReelRequest,
            models::SaveFramesRequest,
            models::SaveFramesResponse,
            handlers::intake::ProfileRequest,
            handlers::media::UploadResponse,
            handlers::media::SaveReelResponse,
            handlers::media::DeleteAllResponse,
            handlers::identities::PrimaryResponse,
            handlers::health::HealthCheckResponse,
            // Error
            error::ErrorResponse,
        )
    ),
    tags(
        (name = "generation", description = "Seedream, anchor and variant batch generation"),
        (name = "intake", description = "Profile photo and reel collection (NDJSON streams)"),
        (name = "media", description = "Media library operations"),
        (name = "proxy", description = "Image and video proxies"),
        (name = "identities", description = "Identity listing, deletion and primary selection"),
        (name = "progress", description = "Per-profile generation progress"),
        (name = "health", description = "Health checks")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_generation_routes() {
        let spec = ApiDoc::openapi();
        assert!(spec.paths.paths.contains_key("/api/anchor/generate"));
        assert!(spec.paths.paths.contains_key("/api/identities/{id}/primary"));
    }
}
