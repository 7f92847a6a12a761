use poise::serenity_prelude as serenity;

/// Failure taxonomy shared by attribution, the ledger and role mutations.
#[derive(Debug, thiserror::Error)]
pub enum AutomationError {
    #[error("missing permission: {0}")]
    PermissionDenied(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("platform request failed: {0}")]
    TransientFetchFailure(String),

    #[error("ledger invariant violated: {0}")]
    InvariantViolation(String),

    #[error("role {role_id} is not below the bot's highest role")]
    ConfigurationError { role_id: serenity::RoleId },

    #[error(transparent)]
    Database(#[from] sea_orm::DbErr),
}

impl AutomationError {
    pub fn role_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "role",
            name: name.into(),
        }
    }
}

impl From<::serenity::Error> for AutomationError {
    fn from(err: ::serenity::Error) -> Self {
        if let ::serenity::Error::Http(http_err) = &err {
            match http_err.status_code().map(|status| status.as_u16()) {
                Some(403) => return Self::PermissionDenied(http_err.to_string()),
                Some(404) => {
                    return Self::NotFound {
                        kind: "resource",
                        name: http_err.to_string(),
                    };
                }
                _ => {}
            }
        }

        Self::TransientFetchFailure(err.to_string())
    }
}
