// Shared entity vocabulary for the detection engines
// All three engines emit the same flat record; the merger consumes a flat list

use serde::{Deserialize, Serialize};
use std::fmt;

/// Every label the masking layer can attach to a span of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    User,
    Email,
    Phone,
    Aadhaar,
    Pan,
    CreditCard,
    Ssn,
    IpAddress,
    Dob,
    BankAccount,
    Passport,
    VehicleReg,
    RollNumber,
    EmployeeId,
    Url,
    Address,
    Date,
    Money,
    Org,
    College,
    Location,
    Group,
    Facility,
    Product,
    Event,
    Work,
    Law,
    Language,
    Time,
    Percent,
    Quantity,
    Number,
    Other,
}

impl EntityType {
    pub const ALL: &'static [EntityType] = &[
        EntityType::User,
        EntityType::Email,
        EntityType::Phone,
        EntityType::Aadhaar,
        EntityType::Pan,
        EntityType::CreditCard,
        EntityType::Ssn,
        EntityType::IpAddress,
        EntityType::Dob,
        EntityType::BankAccount,
        EntityType::Passport,
        EntityType::VehicleReg,
        EntityType::RollNumber,
        EntityType::EmployeeId,
        EntityType::Url,
        EntityType::Address,
        EntityType::Date,
        EntityType::Money,
        EntityType::Org,
        EntityType::College,
        EntityType::Location,
        EntityType::Group,
        EntityType::Facility,
        EntityType::Product,
        EntityType::Event,
        EntityType::Work,
        EntityType::Law,
        EntityType::Language,
        EntityType::Time,
        EntityType::Percent,
        EntityType::Quantity,
        EntityType::Number,
        EntityType::Other,
    ];

    /// Token prefix used inside `[PREFIX_N]`.
    pub fn prefix(&self) -> &'static str {
        match self {
            EntityType::User => "USER",
            EntityType::Email => "EMAIL",
            EntityType::Phone => "PHONE",
            EntityType::Aadhaar => "AADHAAR",
            EntityType::Pan => "PAN",
            EntityType::CreditCard => "CARD",
            EntityType::Ssn => "SSN",
            EntityType::IpAddress => "IP",
            EntityType::Dob => "DOB",
            EntityType::BankAccount => "BANK",
            EntityType::Passport => "PASSPORT",
            EntityType::VehicleReg => "VEHICLE",
            EntityType::RollNumber => "ROLL",
            EntityType::EmployeeId => "EMPID",
            EntityType::Url => "URL",
            EntityType::Address => "ADDRESS",
            EntityType::Date => "DATE",
            EntityType::Money => "MONEY",
            EntityType::Org => "ORG",
            EntityType::College => "COLLEGE",
            EntityType::Location => "LOCATION",
            EntityType::Group => "GROUP",
            EntityType::Facility => "FACILITY",
            EntityType::Product => "PRODUCT",
            EntityType::Event => "EVENT",
            EntityType::Work => "WORK",
            EntityType::Law => "LAW",
            EntityType::Language => "LANG",
            EntityType::Time => "TIME",
            EntityType::Percent => "PERCENT",
            EntityType::Quantity => "QTY",
            EntityType::Number => "NUM",
            EntityType::Other => "OTHER",
        }
    }

    /// Resolve a token prefix back to its entity type.
    pub fn from_prefix(prefix: &str) -> Option<EntityType> {
        EntityType::ALL.iter().copied().find(|t| t.prefix() == prefix)
    }

    /// Canonical SCREAMING_SNAKE_CASE label, same spelling as the serde form.
    pub fn label(&self) -> &'static str {
        match self {
            EntityType::User => "USER",
            EntityType::Email => "EMAIL",
            EntityType::Phone => "PHONE",
            EntityType::Aadhaar => "AADHAAR",
            EntityType::Pan => "PAN",
            EntityType::CreditCard => "CREDIT_CARD",
            EntityType::Ssn => "SSN",
            EntityType::IpAddress => "IP_ADDRESS",
            EntityType::Dob => "DOB",
            EntityType::BankAccount => "BANK_ACCOUNT",
            EntityType::Passport => "PASSPORT",
            EntityType::VehicleReg => "VEHICLE_REG",
            EntityType::RollNumber => "ROLL_NUMBER",
            EntityType::EmployeeId => "EMPLOYEE_ID",
            EntityType::Url => "URL",
            EntityType::Address => "ADDRESS",
            EntityType::Date => "DATE",
            EntityType::Money => "MONEY",
            EntityType::Org => "ORG",
            EntityType::College => "COLLEGE",
            EntityType::Location => "LOCATION",
            EntityType::Group => "GROUP",
            EntityType::Facility => "FACILITY",
            EntityType::Product => "PRODUCT",
            EntityType::Event => "EVENT",
            EntityType::Work => "WORK",
            EntityType::Law => "LAW",
            EntityType::Language => "LANGUAGE",
            EntityType::Time => "TIME",
            EntityType::Percent => "PERCENT",
            EntityType::Quantity => "QUANTITY",
            EntityType::Number => "NUMBER",
            EntityType::Other => "OTHER",
        }
    }

    /// Masking priority: higher means more important to mask.
    pub fn priority(&self) -> u8 {
        match self {
            EntityType::User
            | EntityType::Email
            | EntityType::Aadhaar
            | EntityType::Pan
            | EntityType::CreditCard
            | EntityType::Ssn => 10,
            EntityType::Phone | EntityType::BankAccount | EntityType::Passport => 9,
            EntityType::Address | EntityType::Dob => 8,
            EntityType::Org
            | EntityType::College
            | EntityType::IpAddress
            | EntityType::VehicleReg => 7,
            EntityType::Location | EntityType::RollNumber | EntityType::EmployeeId => 6,
            EntityType::Url => 5,
            EntityType::Date => 4,
            EntityType::Money => 3,
            EntityType::Number => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which engine produced a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionSource {
    Regex,
    Ner,
    Fuzzy,
}

impl DetectionSource {
    /// Reliability weight applied to raw engine confidence.
    pub fn weight(&self) -> f64 {
        match self {
            DetectionSource::Regex => 1.0,
            DetectionSource::Ner => 0.9,
            DetectionSource::Fuzzy => 0.7,
        }
    }
}

/// Raw detection from one engine. Byte offsets `[start, end)` into the
/// (whitespace-collapsed) input. Lives only inside one mask call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedEntity {
    pub text: String,
    pub entity_type: EntityType,
    pub start: usize,
    pub end: usize,
    pub confidence: f64,
    pub source: DetectionSource,
}

/// Merged entity with its final confidence. The merger guarantees the
/// emitted set is non-overlapping and sorted by start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredEntity {
    pub text: String,
    pub entity_type: EntityType,
    pub start: usize,
    pub end: usize,
    pub confidence: f64,
    pub sources: Vec<DetectionSource>,
    pub priority: u8,
}
