//! Entity status domain types
//!
//! A cierre (and each of its sub-resources, such as a payroll book) carries an
//! `estado` string owned by the backend. The client mirrors it and treats the
//! backend value as the source of truth.

use serde::{Deserialize, Serialize};

/// Backend-owned status of a closing record or sub-resource
///
/// Unknown strings are preserved verbatim so a newer backend never breaks
/// decoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityStatus {
    NoSubido,
    Subido,
    Procesando,
    Procesado,
    Clasificando,
    Clasificado,
    ConDiscrepancias,
    VerificacionDatos,
    VerificadoSinDiscrepancias,
    DatosConsolidados,
    GenerandoReportes,
    Finalizado,
    ConError,
    Other(String),
}

impl EntityStatus {
    pub fn as_str(&self) -> &str {
        match self {
            EntityStatus::NoSubido => "no_subido",
            EntityStatus::Subido => "subido",
            EntityStatus::Procesando => "procesando",
            EntityStatus::Procesado => "procesado",
            EntityStatus::Clasificando => "clasificando",
            EntityStatus::Clasificado => "clasificado",
            EntityStatus::ConDiscrepancias => "con_discrepancias",
            EntityStatus::VerificacionDatos => "verificacion_datos",
            EntityStatus::VerificadoSinDiscrepancias => "verificado_sin_discrepancias",
            EntityStatus::DatosConsolidados => "datos_consolidados",
            EntityStatus::GenerandoReportes => "generando_reportes",
            EntityStatus::Finalizado => "finalizado",
            EntityStatus::ConError => "con_error",
            EntityStatus::Other(raw) => raw,
        }
    }

    /// Statuses that only exist while a backend job is running
    ///
    /// A transient status is never a valid rollback target.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EntityStatus::Procesando | EntityStatus::Clasificando | EntityStatus::GenerandoReportes
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(self, EntityStatus::ConError)
    }
}

impl From<String> for EntityStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "no_subido" => EntityStatus::NoSubido,
            "subido" => EntityStatus::Subido,
            "procesando" => EntityStatus::Procesando,
            "procesado" => EntityStatus::Procesado,
            "clasificando" => EntityStatus::Clasificando,
            "clasificado" => EntityStatus::Clasificado,
            "con_discrepancias" => EntityStatus::ConDiscrepancias,
            "verificacion_datos" => EntityStatus::VerificacionDatos,
            "verificado_sin_discrepancias" => EntityStatus::VerificadoSinDiscrepancias,
            "datos_consolidados" => EntityStatus::DatosConsolidados,
            "generando_reportes" => EntityStatus::GenerandoReportes,
            "finalizado" => EntityStatus::Finalizado,
            "con_error" => EntityStatus::ConError,
            _ => EntityStatus::Other(raw),
        }
    }
}

impl From<&str> for EntityStatus {
    fn from(raw: &str) -> Self {
        EntityStatus::from(raw.to_string())
    }
}

impl From<EntityStatus> for String {
    fn from(status: EntityStatus) -> Self {
        match status {
            EntityStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closing record (or sub-resource) as returned by `GET /{resource}/{id}/`
///
/// Only `id` and `estado` are interpreted; every other field is kept as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    pub estado: EntityStatus,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}
