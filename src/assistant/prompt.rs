//! Renders the healthcare prompt handed to the external language model.

use crate::assistant::context::{CaregiverContext, PatientContext, UserContext};
use crate::error::Result;
use crate::models::HealthMetric;
use std::fmt::{self, Write};

const PREAMBLE: &str = "You are a helpful AI assistant for an elderly health monitoring system. \
You provide informational health responses and always recommend consulting healthcare providers for medical advice. \
Keep responses clear, simple, and appropriate for elderly users. \
Never provide medical diagnosis or treatment recommendations.\n\n";

/// Full prompt for `user_message` asked by the user described by `context`
pub fn healthcare_prompt(context: &UserContext, user_message: &str) -> String {
    let mut out = String::from(PREAMBLE);
    render(&mut out, context, user_message).ok();
    out
}

/// JSON form of the context, for logging and debugging the assistant
pub fn serialize_context(context: &UserContext) -> Result<String> {
    Ok(serde_json::to_string(context)?)
}

fn render(out: &mut String, context: &UserContext, user_message: &str) -> fmt::Result {
    match context {
        UserContext::Patient(patient) => render_patient(out, patient)?,
        UserContext::Caregiver(caregiver) => render_caregiver(out, caregiver)?,
    }
    writeln!(out, "User Question: {}", user_message)?;
    out.push_str("AI Response:");
    Ok(())
}

fn render_patient(out: &mut String, patient: &PatientContext) -> fmt::Result {
    writeln!(out, "Current User: {} (Patient)", patient.name)?;
    writeln!(out, "Your Health Information:")?;
    writeln!(out, "- Age: {} years old", patient.age)?;
    writeln!(out, "- Gender: {}", patient.gender)?;
    writeln!(out, "- Blood Type: {}", patient.blood_type)?;
    writeln!(out, "- Height: {:.1} cm", patient.height)?;
    if !patient.medications.is_empty() {
        writeln!(out, "- Current Medications: {}", patient.medications)?;
    }
    if !patient.allergies.is_empty() {
        writeln!(out, "- Known Allergies: {}", patient.allergies)?;
    }
    if let Some(metrics) = &patient.latest_metrics {
        writeln!(out, "- Latest Vital Signs:")?;
        render_vitals(out, metrics, "  ")?;
    }

    out.push_str(
        "\nPlease answer questions about YOUR health data only. \
Do not provide medical diagnosis or treatment advice. \
Suggest consulting with healthcare providers for medical concerns.\n\n",
    );
    Ok(())
}

fn render_caregiver(out: &mut String, caregiver: &CaregiverContext) -> fmt::Result {
    writeln!(out, "Current User: {} (Admin/Caregiver)", caregiver.user_name)?;
    writeln!(
        out,
        "You are assisting a caregiver/admin who manages multiple patients."
    )?;
    writeln!(out, "Household Information: {}", caregiver.household_info)?;

    if !caregiver.patients.is_empty() {
        writeln!(out, "Patients under your care:")?;
        for patient in &caregiver.patients {
            writeln!(
                out,
                "\n• {} (Age: {}, Gender: {})",
                patient.name, patient.age, patient.gender
            )?;
            writeln!(
                out,
                "  - Blood Type: {}, Height: {:.1} cm",
                patient.blood_type, patient.height
            )?;
            if !patient.medications.is_empty() {
                writeln!(out, "  - Medications: {}", patient.medications)?;
            }
            if !patient.allergies.is_empty() {
                writeln!(out, "  - Allergies: {}", patient.allergies)?;
            }
            if let Some(metrics) = &patient.latest_metrics {
                writeln!(out, "  - Latest Vital Signs:")?;
                render_vitals(out, metrics, "    ")?;
            }
        }
    }

    out.push_str(
        "\nYou have access to detailed information about each patient including their current vital signs, medications, and health metrics. \
You can answer specific questions about any of these patients' health data. \
When referring to patient data, use the specific names and current information provided above.\n\n",
    );
    Ok(())
}

fn render_vitals(out: &mut String, metrics: &HealthMetric, indent: &str) -> fmt::Result {
    writeln!(
        out,
        "{indent}• Blood Pressure: {}/{} mmHg",
        metrics.systolic_bp, metrics.diastolic_bp
    )?;
    writeln!(out, "{indent}• Heart Rate: {} bpm", metrics.heart_rate)?;
    writeln!(out, "{indent}• Weight: {:.1} kg", metrics.weight)?;
    writeln!(
        out,
        "{indent}• Oxygen Saturation: {:.1}%",
        metrics.oxygen_saturation
    )?;
    if metrics.steps_count > 0 {
        writeln!(out, "{indent}• Daily Steps: {}", metrics.steps_count)?;
    }
    Ok(())
}
