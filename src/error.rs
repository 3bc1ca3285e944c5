// Error taxonomy for both components
// Locator errors surface as blocking notices; extraction errors map to HTTP statuses

use thiserror::Error;

/// Errors raised by the locator page controller.
///
/// Every variant is rejected before any state change. The `Display`
/// text is the notice shown to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocatorError {
    #[error("Veuillez entrer au moins une référence d'appartement")]
    EmptySearch,

    #[error("Les données ne sont pas encore chargées. Vérifiez que l'URL du Google Sheets est correcte.")]
    RecordsNotLoaded,

    #[error("Veuillez d'abord rechercher et afficher des appartements sur la carte.")]
    EmptySelection,

    #[error("Impossible de charger les données ({0}). Vérifiez l'URL de votre Google Sheets.")]
    Network(String),
}

/// Errors raised while serving one extraction request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// Missing or unusable request field, rejected before any upstream call
    #[error("{0}")]
    Input(String),

    #[error("Clé API Claude non configurée sur le serveur")]
    Config,

    #[error("Clé API Claude invalide. Vérifiez la variable CLAUDE_API_KEY sur le serveur.")]
    UpstreamAuth { details: String },

    #[error("Trop de requêtes. Veuillez réessayer dans quelques secondes.")]
    UpstreamRateLimit { details: String },

    #[error("Fichier non valide ou trop volumineux. Max 32 MB pour les PDF, 100 pages.")]
    UpstreamBadRequest { details: String },

    #[error("{message}")]
    Upstream { message: String, details: String },

    #[error("Impossible de parser la réponse de Claude : {excerpt}")]
    ResponseParse { excerpt: String },
}

impl ExtractError {
    /// HTTP status code reported for this failure class
    pub fn status_code(&self) -> u16 {
        match self {
            ExtractError::Input(_) => 400,
            _ => 500,
        }
    }

    /// Raw diagnostic detail; `None` for errors raised at the boundary
    pub fn details(&self) -> Option<String> {
        match self {
            ExtractError::Input(_) | ExtractError::Config => None,
            ExtractError::UpstreamAuth { details }
            | ExtractError::UpstreamRateLimit { details }
            | ExtractError::UpstreamBadRequest { details }
            | ExtractError::Upstream { details, .. } => Some(details.clone()),
            ExtractError::ResponseParse { .. } => Some(format!("Error: {}", self)),
        }
    }
}

/// Failure reported by the LLM provider for one round trip.
///
/// `status` is `None` when the request never produced an HTTP response
/// (DNS, TLS, timeout).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct UpstreamError {
    pub status: Option<u16>,
    pub message: String,
}

impl From<UpstreamError> for ExtractError {
    fn from(err: UpstreamError) -> Self {
        let details = match err.status {
            Some(status) => format!("Error: {} {}", status, err.message),
            None => format!("Error: {}", err.message),
        };

        match err.status {
            Some(401) => ExtractError::UpstreamAuth { details },
            Some(429) => ExtractError::UpstreamRateLimit { details },
            Some(400) => ExtractError::UpstreamBadRequest { details },
            _ => ExtractError::Upstream {
                message: err.message,
                details,
            },
        }
    }
}
