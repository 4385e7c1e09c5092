/// Server clock sampling.
pub mod clock_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Shop precondition middleware.
pub mod gate;
/// Health check service.
pub mod health_service;
/// Plans lookup table.
pub mod plan_service;
/// Shop push streams over SSE.
pub mod push_service;
/// Station rows and paid resets.
pub mod station_service;
/// Storage connection supervisor with backoff.
pub mod storage_supervisor;
/// Lazily computed subscription status.
pub mod subscription;
