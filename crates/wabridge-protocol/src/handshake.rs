use wabridge_core::config::AuthConfig;

/// Outcome of checking a connecting socket's credentials against `AuthConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Accepted,
    Rejected,
}

/// Checks a bearer token presented on connect (query param or header) against
/// the configured gateway auth mode. `None` mode accepts everything.
pub fn check_token(config: &AuthConfig, presented: Option<&str>) -> AuthOutcome {
    use wabridge_core::config::AuthMode;

    match config.mode {
        AuthMode::None => AuthOutcome::Accepted,
        AuthMode::Token => match (&config.token, presented) {
            (Some(expected), Some(got)) if expected == got => AuthOutcome::Accepted,
            _ => AuthOutcome::Rejected,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wabridge_core::config::AuthMode;

    #[test]
    fn none_mode_always_accepts() {
        let config = AuthConfig {
            mode: AuthMode::None,
            token: None,
        };
        assert_eq!(check_token(&config, None), AuthOutcome::Accepted);
    }

    #[test]
    fn token_mode_rejects_mismatch() {
        let config = AuthConfig {
            mode: AuthMode::Token,
            token: Some("secret".to_string()),
        };
        assert_eq!(check_token(&config, Some("wrong")), AuthOutcome::Rejected);
        assert_eq!(check_token(&config, None), AuthOutcome::Rejected);
        assert_eq!(check_token(&config, Some("secret")), AuthOutcome::Accepted);
    }
}
