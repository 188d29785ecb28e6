use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::features::auth;
use crate::features::files::{dtos as files_dtos, handlers as files_handlers};
use crate::features::rate_limits::{dtos as rate_limits_dtos, handlers as rate_limits_handlers};
use crate::shared::types::{ApiResponse, Meta};

#[derive(OpenApi)]
#[openapi(
    paths(
        // Auth
        auth::handlers::register,
        auth::handlers::login,
        auth::handlers::get_me,
        auth::handlers::logout,
        // Files
        files_handlers::file_handler::upload_file,
        files_handlers::file_handler::download_file,
        files_handlers::file_handler::download_file_by_query,
        files_handlers::file_handler::get_file_info,
        files_handlers::file_handler::list_files,
        files_handlers::file_handler::delete_file,
        // Rate Limits
        rate_limits_handlers::rate_limit_handler::get_user_rate_limit,
    ),
    components(
        schemas(
            // Shared
            Meta,
            // Auth
            auth::model::AuthenticatedUser,
            auth::dtos::RegisterRequestDto,
            auth::dtos::LoginRequestDto,
            auth::dtos::AuthResponseDto,
            auth::dtos::AuthUserDto,
            auth::dtos::MeResponseDto,
            auth::dtos::LogoutResponseDto,
            ApiResponse<auth::dtos::MeResponseDto>,
            ApiResponse<auth::dtos::AuthResponseDto>,
            ApiResponse<auth::dtos::LogoutResponseDto>,
            // Files
            files_dtos::UploadFileDto,
            files_dtos::UploadResponseDto,
            files_dtos::FileInfoDto,
            files_dtos::DeleteFileResponseDto,
            ApiResponse<files_dtos::UploadResponseDto>,
            ApiResponse<files_dtos::FileInfoDto>,
            ApiResponse<Vec<files_dtos::FileInfoDto>>,
            ApiResponse<files_dtos::DeleteFileResponseDto>,
            // Rate Limits
            rate_limits_dtos::UserRateLimitStatusDto,
            ApiResponse<rate_limits_dtos::UserRateLimitStatusDto>,
        )
    ),
    tags(
        (name = "auth", description = "Registration, login, logout and the current user"),
        (name = "files", description = "Encrypted file sharing: upload, download, metadata and owner management"),
        (name = "rate-limits", description = "Per-user upload/download rate limit status"),
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Bahasha API",
        version = "0.1.0",
        description = "API documentation for Bahasha, encrypted file sharing with expiring links",
    )
)]
pub struct ApiDoc;

/// Adds Bearer JWT security scheme to OpenAPI spec
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Modifier to override OpenAPI info from config
pub struct SwaggerInfoModifier {
    pub title: String,
    pub version: String,
    pub description: String,
}

impl Modify for SwaggerInfoModifier {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        openapi.info.title = self.title.clone();
        openapi.info.version = self.version.clone();
        openapi.info.description = Some(self.description.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_share_routes() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/auth/register",
            "/api/auth/logout",
            "/api/files/upload",
            "/api/files/download/{file}",
            "/api/files/{id}/info",
            "/api/rate-limit",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }

        let schemes = doc.components.unwrap().security_schemes;
        assert!(schemes.contains_key("bearer_auth"));
    }
}
