use thiserror::Error;

/// Erreurs du moteur. Aucune n'est fatale pour une session : transport et
/// schéma dégradent vers le dernier état connu, validation remonte à l'UI.
#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("schema error: {0}")]
    Schema(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("config error: {0}")]
    Config(String),
}

impl DashboardError {
    pub fn kind(&self) -> &'static str {
        match self {
            DashboardError::Transport(_) => "transport",
            DashboardError::Schema(_) => "schema",
            DashboardError::Validation(_) => "validation",
            DashboardError::Config(_) => "config",
        }
    }
}

impl From<serde_json::Error> for DashboardError {
    fn from(err: serde_json::Error) -> Self {
        DashboardError::Schema(err.to_string())
    }
}

impl From<reqwest::Error> for DashboardError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            DashboardError::Schema(err.to_string())
        } else {
            DashboardError::Transport(err.to_string())
        }
    }
}

impl From<rumqttc::ClientError> for DashboardError {
    fn from(err: rumqttc::ClientError) -> Self {
        DashboardError::Transport(err.to_string())
    }
}

impl From<rumqttc::ConnectionError> for DashboardError {
    fn from(err: rumqttc::ConnectionError) -> Self {
        DashboardError::Transport(err.to_string())
    }
}

pub type Result<T, E = DashboardError> = std::result::Result<T, E>;
