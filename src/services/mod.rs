/// Backend connection supervisor and degraded-mode toggling.
pub mod backend_supervisor;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Room session lifecycle and action dispatch.
pub mod room_service;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
