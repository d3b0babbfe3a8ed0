//! API constants.

/// API base path prefix (version-independent)
pub const API_BASE: &str = "/api";

pub const API_VERSION: &str = "v0";

/// Prefix every versioned route is nested under.
pub const API_PREFIX: &str = "/api/v0";

/// Header carrying the authenticated owner, set by the upstream auth gateway.
pub const OWNER_HEADER: &str = "x-owner-id";
