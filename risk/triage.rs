//! # Clinical Triage Helpers
//!
//! Rule-based categories and advice layered on top of a prediction. None of
//! this feeds the classifier; it only interprets raw inputs and the predicted
//! probability for display.

use crate::service::PatientRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Probability below which a patient is low risk.
pub const LOW_RISK_CUTOFF: f64 = 0.3;
/// Probability below which a patient is moderate risk.
pub const HIGH_RISK_CUTOFF: f64 = 0.7;

/// Age above which periodic screening is advised.
const SCREENING_AGE: f64 = 45.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBand {
    Low,
    Moderate,
    High,
}

impl RiskBand {
    pub fn from_probability(p: f64) -> Self {
        if p < LOW_RISK_CUTOFF {
            RiskBand::Low
        } else if p < HIGH_RISK_CUTOFF {
            RiskBand::Moderate
        } else {
            RiskBand::High
        }
    }

    pub fn headline(self) -> &'static str {
        match self {
            RiskBand::Low => "Low Risk - Keep up the good work!",
            RiskBand::Moderate => "Moderate Risk - Take preventive action:",
            RiskBand::High => "High Risk - Seek immediate medical attention:",
        }
    }

    pub fn recommendations(self) -> &'static [&'static str] {
        match self {
            RiskBand::Low => &[
                "Maintain current healthy lifestyle",
                "Regular check-ups every 1-2 years",
                "Continue balanced diet and exercise",
            ],
            RiskBand::Moderate => &[
                "Consult healthcare provider for detailed assessment",
                "Consider lifestyle modifications (diet, exercise)",
                "Monitor blood glucose levels regularly",
                "Schedule follow-up in 6-12 months",
            ],
            RiskBand::High => &[
                "Consult endocrinologist or primary care physician immediately",
                "Comprehensive diabetes screening recommended",
                "Implement strict dietary and lifestyle changes",
                "Regular monitoring and follow-up required",
            ],
        }
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RiskBand::Low => "Low Risk",
            RiskBand::Moderate => "Moderate Risk",
            RiskBand::High => "High Risk",
        })
    }
}

/// Five-level reading of the predicted probability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    VeryLow,
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl Confidence {
    pub fn from_probability(p: f64) -> Self {
        match p {
            p if p < 0.2 => Confidence::VeryLow,
            p if p < 0.4 => Confidence::Low,
            p if p < 0.6 => Confidence::Moderate,
            p if p < 0.8 => Confidence::High,
            _ => Confidence::VeryHigh,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Confidence::VeryLow => "Very Low",
            Confidence::Low => "Low",
            Confidence::Moderate => "Moderate",
            Confidence::High => "High",
            Confidence::VeryHigh => "Very High",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BmiCategory {
    Underweight,
    Normal,
    Overweight,
    Obese,
}

pub fn bmi_category(bmi: f64) -> BmiCategory {
    if bmi < 18.5 {
        BmiCategory::Underweight
    } else if bmi < 25.0 {
        BmiCategory::Normal
    } else if bmi < 30.0 {
        BmiCategory::Overweight
    } else {
        BmiCategory::Obese
    }
}

impl fmt::Display for BmiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BmiCategory::Underweight => "Underweight",
            BmiCategory::Normal => "Normal",
            BmiCategory::Overweight => "Overweight",
            BmiCategory::Obese => "Obese",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GlucoseCategory {
    Low,
    Normal,
    PreDiabetic,
    Diabetic,
}

/// Fasting plasma glucose in mg/dL.
pub fn glucose_category(glucose: f64) -> GlucoseCategory {
    if glucose < 70.0 {
        GlucoseCategory::Low
    } else if glucose < 100.0 {
        GlucoseCategory::Normal
    } else if glucose < 126.0 {
        GlucoseCategory::PreDiabetic
    } else {
        GlucoseCategory::Diabetic
    }
}

impl fmt::Display for GlucoseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GlucoseCategory::Low => "Low",
            GlucoseCategory::Normal => "Normal",
            GlucoseCategory::PreDiabetic => "Pre-diabetic",
            GlucoseCategory::Diabetic => "Diabetic",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BloodPressureCategory {
    Normal,
    HighNormal,
    High,
}

/// Diastolic pressure in mmHg.
pub fn blood_pressure_category(bp: f64) -> BloodPressureCategory {
    if bp < 80.0 {
        BloodPressureCategory::Normal
    } else if bp < 90.0 {
        BloodPressureCategory::HighNormal
    } else {
        BloodPressureCategory::High
    }
}

impl fmt::Display for BloodPressureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BloodPressureCategory::Normal => "Normal",
            BloodPressureCategory::HighNormal => "High Normal",
            BloodPressureCategory::High => "High",
        })
    }
}

/// Values outside the physiologically typical range. These do not block a
/// prediction.
pub fn validate_medical_ranges(record: &PatientRecord) -> Vec<String> {
    let mut issues = Vec::new();
    if !(50.0..=300.0).contains(&record.glucose) {
        issues.push("Glucose level outside typical range (50-300 mg/dL)".to_string());
    }
    if !(40.0..=150.0).contains(&record.blood_pressure) {
        issues.push("Blood pressure outside typical range (40-150 mmHg)".to_string());
    }
    if !(10.0..=70.0).contains(&record.bmi) {
        issues.push("BMI outside typical range (10-70 kg/m2)".to_string());
    }
    if !(18.0..=120.0).contains(&record.age) {
        issues.push("Age outside typical range (18-120 years)".to_string());
    }
    if record.insulin > 1000.0 {
        issues.push("Insulin level seems unusually high".to_string());
    }
    issues
}

/// Softer warnings about inputs that are plausible but notable.
pub fn input_warnings(record: &PatientRecord) -> Vec<String> {
    let mut warnings = Vec::new();
    if record.glucose < 70.0 {
        warnings.push("Glucose level seems low (normal fasting: 70-100 mg/dL)".to_string());
    } else if record.glucose > 180.0 {
        warnings.push("Glucose level seems high (normal fasting: 70-100 mg/dL)".to_string());
    }
    if record.blood_pressure < 60.0 {
        warnings.push("Blood pressure seems low (normal: 80-120 mmHg)".to_string());
    } else if record.blood_pressure > 140.0 {
        warnings.push("Blood pressure seems high (normal: 80-120 mmHg)".to_string());
    }
    if record.bmi < 18.5 {
        warnings.push("BMI indicates underweight".to_string());
    } else if record.bmi > 30.0 {
        warnings.push("BMI indicates obesity".to_string());
    }
    warnings
}

pub fn health_tips(record: &PatientRecord, probability: f64) -> Vec<&'static str> {
    let mut tips = Vec::new();
    if matches!(
        bmi_category(record.bmi),
        BmiCategory::Overweight | BmiCategory::Obese
    ) {
        tips.push("Consider a balanced diet and regular exercise to achieve healthy weight");
    }
    if matches!(
        glucose_category(record.glucose),
        GlucoseCategory::PreDiabetic | GlucoseCategory::Diabetic
    ) {
        tips.push("Monitor carbohydrate intake and consider consulting a nutritionist");
    }
    if record.age > SCREENING_AGE {
        tips.push("Regular health screenings become more important with age");
    }
    if probability > 0.5 {
        tips.extend([
            "Aim for at least 150 minutes of moderate exercise per week",
            "Focus on a diet rich in vegetables, whole grains, and lean proteins",
            "Stay well hydrated and limit sugary beverages",
        ]);
    }
    tips
}

pub fn patient_summary(record: &PatientRecord) -> String {
    format!(
        "Patient Summary:\n\
         - Age: {} years\n\
         - BMI: {:.1} kg/m2 ({})\n\
         - Glucose: {} mg/dL ({})\n\
         - Blood Pressure: {} mmHg ({})\n\
         - Pregnancies: {}",
        record.age,
        record.bmi,
        bmi_category(record.bmi),
        record.glucose,
        glucose_category(record.glucose),
        record.blood_pressure,
        blood_pressure_category(record.blood_pressure),
        record.pregnancies,
    )
}
