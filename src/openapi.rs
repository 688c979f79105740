//! OpenAPI documentation and the Swagger UI mount.

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "smartpay-gateway",
        description = "Payment reconciliation service for Smartpay hosted checkout"
    ),
    paths(
        crate::handlers::checkout::create_checkout_session,
        crate::handlers::checkout::complete_checkout,
        crate::handlers::checkout::cancel_checkout,
        crate::handlers::webhooks::smartpay_webhook,
        crate::handlers::health::health_check,
    ),
    components(schemas(crate::errors::ErrorResponse)),
    tags(
        (name = "Checkout", description = "Checkout session lifecycle and redirect confirmation"),
        (name = "Webhooks", description = "Inbound processor notifications"),
        (name = "Health", description = "Service health")
    )
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
