use serde::{Deserialize, Serialize};

/// Kind of worked hours on a settlement line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HourCategory {
    Normal,
    Overtime,
    Night,
    Holiday,
}

impl HourCategory {
    pub const ALL: [HourCategory; 4] = [
        Self::Normal,
        Self::Overtime,
        Self::Night,
        Self::Holiday,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Overtime => "overtime",
            Self::Night => "night",
            Self::Holiday => "holiday",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(Self::Normal),
            "overtime" => Some(Self::Overtime),
            "night" => Some(Self::Night),
            "holiday" => Some(Self::Holiday),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Normal => "Normal hours",
            Self::Overtime => "Overtime",
            Self::Night => "Night shift",
            Self::Holiday => "Holiday",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentCategory {
    Absence,
    Permission,
    SickLeave,
    Vacation,
}

impl IncidentCategory {
    pub const ALL: [IncidentCategory; 4] = [
        Self::Absence,
        Self::Permission,
        Self::SickLeave,
        Self::Vacation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absence => "absence",
            Self::Permission => "permission",
            Self::SickLeave => "sick_leave",
            Self::Vacation => "vacation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "absence" => Some(Self::Absence),
            "permission" => Some(Self::Permission),
            "sick_leave" => Some(Self::SickLeave),
            "vacation" => Some(Self::Vacation),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Absence => "Absence",
            Self::Permission => "Permission",
            Self::SickLeave => "Sick leave",
            Self::Vacation => "Vacation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeductionCategory {
    TaxWithholding,
    Garnishment,
    Sanction,
    Advance,
    SocialSecurity,
    Other,
}

impl DeductionCategory {
    pub const ALL: [DeductionCategory; 6] = [
        Self::TaxWithholding,
        Self::Garnishment,
        Self::Sanction,
        Self::Advance,
        Self::SocialSecurity,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaxWithholding => "tax_withholding",
            Self::Garnishment => "garnishment",
            Self::Sanction => "sanction",
            Self::Advance => "advance",
            Self::SocialSecurity => "social_security",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tax_withholding" => Some(Self::TaxWithholding),
            "garnishment" => Some(Self::Garnishment),
            "sanction" => Some(Self::Sanction),
            "advance" => Some(Self::Advance),
            "social_security" => Some(Self::SocialSecurity),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::TaxWithholding => "Tax withholding",
            Self::Garnishment => "Garnishment",
            Self::Sanction => "Sanction",
            Self::Advance => "Advance",
            Self::SocialSecurity => "Social security",
            Self::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeCategory {
    PerDiem,
    Bonus,
    Award,
    Transportation,
    Other,
}

impl IncomeCategory {
    pub const ALL: [IncomeCategory; 5] = [
        Self::PerDiem,
        Self::Bonus,
        Self::Award,
        Self::Transportation,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PerDiem => "per_diem",
            Self::Bonus => "bonus",
            Self::Award => "award",
            Self::Transportation => "transportation",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "per_diem" => Some(Self::PerDiem),
            "bonus" => Some(Self::Bonus),
            "award" => Some(Self::Award),
            "transportation" => Some(Self::Transportation),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::PerDiem => "Per diem",
            Self::Bonus => "Bonus",
            Self::Award => "Award",
            Self::Transportation => "Transportation",
            Self::Other => "Other",
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn hour_category_codes_round_trip() {
        for category in HourCategory::ALL {
            assert_eq!(HourCategory::parse(category.as_str()), Some(category));
        }
    }

    #[test]
    fn incident_category_codes_round_trip() {
        for category in IncidentCategory::ALL {
            assert_eq!(IncidentCategory::parse(category.as_str()), Some(category));
        }
    }

    #[test]
    fn deduction_category_codes_round_trip() {
        for category in DeductionCategory::ALL {
            assert_eq!(DeductionCategory::parse(category.as_str()), Some(category));
        }
    }

    #[test]
    fn income_category_codes_round_trip() {
        for category in IncomeCategory::ALL {
            assert_eq!(IncomeCategory::parse(category.as_str()), Some(category));
        }
    }

    #[test]
    fn unknown_codes_are_rejected() {
        assert_eq!(HourCategory::parse("weekend"), None);
        assert_eq!(IncidentCategory::parse("SickLeave"), None);
        assert_eq!(DeductionCategory::parse(""), None);
        assert_eq!(IncomeCategory::parse("per-diem"), None);
    }
}
