use crate::error::ApiError;
use crate::{BrokerSession, DerivSession, PaperSession};
use configuration::{BrokerSettings, CredentialStore};
use std::sync::Arc;

/// Builds the session described by `settings`, pulling its secret (if any) out
/// of the credential store. A missing or empty credential is fatal.
pub fn build_session(
    settings: &BrokerSettings,
    credentials: &CredentialStore,
) -> Result<Arc<dyn BrokerSession>, ApiError> {
    match settings {
        BrokerSettings::Paper(paper) => Ok(Arc::new(PaperSession::from_settings(paper))),
        BrokerSettings::Deriv(deriv) => {
            let token = credentials.get_credential(deriv.token_line)?;
            Ok(Arc::new(DerivSession::new(deriv.clone(), token)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use configuration::DerivSettings;
    use configuration::error::ConfigError;
    use std::time::Duration;

    fn deriv(token_line: usize) -> BrokerSettings {
        BrokerSettings::Deriv(DerivSettings {
            app_id: 1089,
            endpoint: "wss://ws.derivws.com/websockets/v3".to_string(),
            token_line,
            currency: None,
            symbols: core_types::SymbolConvention::FrxPrefix,
            request_timeout: Duration::from_secs(10),
        })
    }

    #[test]
    fn builds_each_kind() {
        let creds = CredentialStore::from_lines(["", "abc123"]);
        let paper = build_session(&BrokerSettings::default(), &creds).unwrap();
        assert_eq!(paper.name(), "paper");
        let live = build_session(&deriv(1), &creds).unwrap();
        assert_eq!(live.name(), "deriv");
    }

    #[test]
    fn empty_token_is_a_configuration_error() {
        let creds = CredentialStore::from_lines(["", "abc123"]);
        let err = build_session(&deriv(0), &creds).err().unwrap();
        assert!(matches!(
            err,
            ApiError::Configuration(ConfigError::EmptyCredential(0))
        ));
    }
}
