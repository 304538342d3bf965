use serde::{Deserialize, Serialize};
use std::fmt;

// ==============================================================================
// APPOINTMENT STATUS
// ==============================================================================

/// Lifecycle state of an appointment. Legal moves between states live in the
/// appointment cell's transition table, not on this type.
///
/// Serialized with the clinic's stored status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AppointmentStatus {
    #[serde(rename = "AGENDADO")]
    Scheduled,
    #[serde(rename = "CONFIRMADO")]
    Confirmed,
    #[serde(rename = "EM_ATENDIMENTO")]
    InProgress,
    #[serde(rename = "CONCLUIDO")]
    Completed,
    #[serde(rename = "CANCELADO")]
    Cancelled,
    #[serde(rename = "FALTOU")]
    NoShow,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 6] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::Confirmed,
        AppointmentStatus::InProgress,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::NoShow,
    ];
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "AGENDADO"),
            AppointmentStatus::Confirmed => write!(f, "CONFIRMADO"),
            AppointmentStatus::InProgress => write!(f, "EM_ATENDIMENTO"),
            AppointmentStatus::Completed => write!(f, "CONCLUIDO"),
            AppointmentStatus::Cancelled => write!(f, "CANCELADO"),
            AppointmentStatus::NoShow => write!(f, "FALTOU"),
        }
    }
}

// ==============================================================================
// PROCEDURE TYPES
// ==============================================================================

/// Category of dental work. Used both on appointments and as the waitlist
/// matching key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcedureType {
    #[serde(rename = "CONSULTA", alias = "consultation")]
    Consultation,
    #[serde(rename = "LIMPEZA", alias = "cleaning")]
    Cleaning,
    #[serde(rename = "RESTAURACAO", alias = "restoration")]
    Restoration,
    #[serde(rename = "EXTRACAO", alias = "extraction")]
    Extraction,
    #[serde(rename = "CANAL", alias = "root_canal")]
    RootCanal,
    #[serde(rename = "CLAREAMENTO", alias = "whitening")]
    Whitening,
    #[serde(rename = "ORTODONTIA", alias = "orthodontics")]
    Orthodontics,
    #[serde(rename = "IMPLANTE", alias = "implant")]
    Implant,
    #[serde(rename = "PROTESE", alias = "prosthesis")]
    Prosthesis,
    #[serde(rename = "CIRURGIA", alias = "surgery")]
    Surgery,
    #[serde(rename = "EMERGENCIA", alias = "emergency")]
    Emergency,
    #[serde(rename = "OUTROS", alias = "other")]
    Other,
}

impl fmt::Display for ProcedureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            ProcedureType::Consultation => "CONSULTA",
            ProcedureType::Cleaning => "LIMPEZA",
            ProcedureType::Restoration => "RESTAURACAO",
            ProcedureType::Extraction => "EXTRACAO",
            ProcedureType::RootCanal => "CANAL",
            ProcedureType::Whitening => "CLAREAMENTO",
            ProcedureType::Orthodontics => "ORTODONTIA",
            ProcedureType::Implant => "IMPLANTE",
            ProcedureType::Prosthesis => "PROTESE",
            ProcedureType::Surgery => "CIRURGIA",
            ProcedureType::Emergency => "EMERGENCIA",
            ProcedureType::Other => "OUTROS",
        };
        write!(f, "{}", code)
    }
}
