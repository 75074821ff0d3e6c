use flowline_core::config::{ApiKeyRole, GatewayConfig};

/// Result of a successful authentication.
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub name: String,
    pub role: ApiKeyRole,
}

/// Bearer header -> api_keys -> legacy token -> anonymous.
///
/// Returns `None` when the caller is not authenticated.
pub fn validate_auth(config: &GatewayConfig, bearer: Option<&str>) -> Option<AuthResult> {
    if let Some(bearer_val) = bearer {
        if let Some(ak) = config.api_keys.iter().find(|ak| ak.key == bearer_val) {
            return Some(AuthResult {
                name: ak.name.clone(),
                role: ak.role.clone(),
            });
        }
        if config.token.as_deref() == Some(bearer_val) {
            return Some(legacy_admin());
        }
        return None;
    }

    // Nothing configured = anonymous access
    if config.token.is_none() && config.api_keys.is_empty() {
        Some(AuthResult {
            name: "anonymous".into(),
            role: ApiKeyRole::Admin,
        })
    } else {
        None
    }
}

fn legacy_admin() -> AuthResult {
    AuthResult {
        name: "legacy-token".into(),
        role: ApiKeyRole::Admin,
    }
}

/// Check if a role has at least viewer-level access.
pub fn has_viewer_access(role: &ApiKeyRole) -> bool {
    matches!(role, ApiKeyRole::Viewer | ApiKeyRole::Operator | ApiKeyRole::Admin)
}

/// Check if a role has at least operator-level access.
pub fn has_operator_access(role: &ApiKeyRole) -> bool {
    matches!(role, ApiKeyRole::Operator | ApiKeyRole::Admin)
}

pub fn has_admin_access(role: &ApiKeyRole) -> bool {
    matches!(role, ApiKeyRole::Admin)
}
