//! OpenAPI / Swagger UI Documentation
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::gateway::types::{CreditBody, HealthResponse, RegisterUserRequest, TransferBody};
use crate::wallet::{CurrencyType, UserWallet, Wallet};

/// HS256 bearer token security scheme
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
                        .description(Some(
                            "HS256 JWT; admin routes require the claim role = \"admin\"",
                        ))
                        .build(),
                ),
            );
        }
    }
}

/// Main API Documentation struct
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Wallet Service API",
        version = "1.0.0",
        description = "Users, two-ledger wallets and atomic wallet-to-wallet transfers.",
        license(
            name = "MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::health_check,
        crate::gateway::handlers::list_users,
        crate::gateway::handlers::stream_users,
        crate::gateway::handlers::register_user,
        crate::gateway::handlers::get_user,
        crate::gateway::handlers::delete_user,
        crate::gateway::handlers::transfer,
        crate::gateway::handlers::credit,
    ),
    components(
        schemas(
            HealthResponse,
            UserWallet,
            Wallet,
            CurrencyType,
            RegisterUserRequest,
            TransferBody,
            CreditBody,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "System", description = "Health"),
        (name = "User", description = "User and wallet management"),
        (name = "Transfer", description = "Wallet-to-wallet transfers"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generates() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "Wallet Service API");
        assert_eq!(spec.info.version, "1.0.0");
    }

    #[test]
    fn test_openapi_json_serializable() {
        let json_str = ApiDoc::openapi().to_json().unwrap();
        assert!(json_str.contains("Wallet Service API"));
    }

    #[test]
    fn test_endpoints_registered() {
        let paths = ApiDoc::openapi().paths;
        assert!(paths.paths.contains_key("/api/v1/health"));
        assert!(paths.paths.contains_key("/api/v1/user"));
        assert!(paths.paths.contains_key("/api/v1/user/stream"));
        assert!(paths.paths.contains_key("/api/v1/user/transfer"));
        assert!(paths.paths.contains_key("/api/v1/user/{user_id}"));
        assert!(paths.paths.contains_key("/api/v1/user/{user_id}/credit"));
    }

    #[test]
    fn test_security_scheme_registered() {
        let spec = ApiDoc::openapi();
        let components = spec.components.expect("should have components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
