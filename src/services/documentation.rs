use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for PlayDesk Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::clock::server_time,
        crate::routes::push::shop_stream,
        crate::routes::stations::list_stations,
        crate::routes::stations::read_station,
        crate::routes::stations::write_station,
        crate::routes::stations::mark_paid,
        crate::routes::subscription::resolve_subscription,
        crate::routes::subscription::provision_subscription,
        crate::routes::subscription::renew_subscription,
        crate::routes::subscription::list_events,
        crate::routes::subscription::list_plans,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::clock::ServerTime,
            crate::dto::station::StationRecord,
            crate::dto::station::MarkPaidRequest,
            crate::dto::station::MarkPaidResponse,
            crate::dao::models::StationPatch,
            crate::dto::push::PushMessage,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::subscription::SubscriptionView,
            crate::dto::subscription::SubscriptionEventView,
            crate::dto::subscription::PlanView,
            crate::dto::subscription::ProvisionRequest,
            crate::dto::subscription::RenewRequest,
            crate::dto::subscription::PaymentInput,
            crate::error::ErrorBody,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "clock", description = "Authoritative server time"),
        (name = "stations", description = "Station timers and billing, gated by subscription"),
        (name = "push", description = "Shop-scoped server-sent events"),
        (name = "subscription", description = "Subscription status, renewals and plans"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_the_gated_station_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/shops/{shop_id}/stations/paid"));
        assert!(doc.paths.paths.contains_key("/time"));
    }
}
