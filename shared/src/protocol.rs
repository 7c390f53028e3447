/// API path prefix
pub const API_PREFIX: &str = "/api/v1";

/// Wire-protocol versions a registrar accepts when none are configured
pub const DEFAULT_SUPPORTED_PROTOCOLS: &[u32] = &[1];
