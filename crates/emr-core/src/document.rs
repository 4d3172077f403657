//! Structured clinical record model.
//!
//! A document arrives as JSON keyed by `patient_id`, with each section an
//! object of field/value pairs. Section names pass through a closed
//! registry ([`SectionKind`]) so graph relationship types are always drawn
//! from a fixed set of constants; unknown sections route to a generic
//! `HAS_OTHER_SECTION` rather than minting arbitrary relationship types.
//!
//! Each known section carries a field table describing the expected value
//! type and unit of every scalar field. Flattening a document produces one
//! [`FactRow`] per usable value; null and empty raw values are skipped.

use serde_json::{Map, Value as Json};

use crate::error::{EngineError, EngineResult};

/// Closed registry of section categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    GeneralInformation,
    MenstrualHistory,
    MedicalHistory,
    ObstetricsHistory,
    PastMedication,
    PastTesting,
    SexualHistory,
    Other,
}

impl SectionKind {
    /// All known (non-Other) section kinds.
    pub const KNOWN: &'static [SectionKind] = &[
        Self::GeneralInformation,
        Self::MenstrualHistory,
        Self::MedicalHistory,
        Self::ObstetricsHistory,
        Self::PastMedication,
        Self::PastTesting,
        Self::SexualHistory,
    ];

    /// Resolve a source-document section key ("General_Information",
    /// "general information", "GeneralInformation", ...) to a registry entry.
    pub fn from_source_key(key: &str) -> Self {
        let normalized: String = key
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "generalinformation" => Self::GeneralInformation,
            "menstrualhistory" => Self::MenstrualHistory,
            "medicalhistory" => Self::MedicalHistory,
            "obstetricshistory" => Self::ObstetricsHistory,
            "pastmedication" => Self::PastMedication,
            "pasttesting" => Self::PastTesting,
            "sexualhistory" => Self::SexualHistory,
            _ => Self::Other,
        }
    }

    /// Canonical section name stored on `Section` and `Schema` nodes.
    pub fn canonical_name(&self) -> &'static str {
        match self {
            Self::GeneralInformation => "GeneralInformation",
            Self::MenstrualHistory => "MenstrualHistory",
            Self::MedicalHistory => "MedicalHistory",
            Self::ObstetricsHistory => "ObstetricsHistory",
            Self::PastMedication => "PastMedication",
            Self::PastTesting => "PastTesting",
            Self::SexualHistory => "SexualHistory",
            Self::Other => "Other",
        }
    }

    /// Relationship type linking `Patient` to this section's node.
    pub fn relationship(&self) -> &'static str {
        match self {
            Self::GeneralInformation => "HAS_GENERAL_INFORMATION",
            Self::MenstrualHistory => "HAS_MENSTRUAL_HISTORY",
            Self::MedicalHistory => "HAS_MEDICAL_HISTORY",
            Self::ObstetricsHistory => "HAS_OBSTETRICS_HISTORY",
            Self::PastMedication => "HAS_PAST_MEDICATION",
            Self::PastTesting => "HAS_PAST_TESTING",
            Self::SexualHistory => "HAS_SEXUAL_HISTORY",
            Self::Other => "HAS_OTHER_SECTION",
        }
    }
}

/// Declared type of a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Str,
    Int,
    Bool,
    Date,
    /// Keyed collection entry carrying extra properties.
    Dict,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Str => "string",
            Self::Int => "int",
            Self::Bool => "boolean",
            Self::Date => "date",
            Self::Dict => "dict",
        }
    }
}

/// A coerced field value. Dates stay as ISO-8601 strings; the declared
/// [`ValueKind`] distinguishes them in the merge key.
#[derive(Debug, Clone, PartialEq)]
pub enum FactValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl FactValue {
    /// String rendering used in canonical fact text.
    pub fn render(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Int(i) => i.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }
}

/// One retrievable fact extracted from a document.
#[derive(Debug, Clone)]
pub struct FactRow {
    pub section: SectionKind,
    /// Canonical section name; for `Other` sections, the normalized raw name.
    pub section_name: String,
    pub field: String,
    pub value: FactValue,
    pub value_kind: ValueKind,
    pub unit: Option<String>,
    /// Extra properties written onto the `Value` node for dict entries.
    pub entry_props: Vec<(String, Json)>,
}

/// Field table entry: (field name, source key, type, unit).
type FieldSpec = (&'static str, &'static str, ValueKind, Option<&'static str>);

const GENERAL_FIELDS: &[FieldSpec] = &[
    ("Name", "name", ValueKind::Str, None),
    ("Title", "title", ValueKind::Str, None),
];

const MENSTRUAL_FIELDS: &[FieldSpec] = &[
    ("AgeOfMenarche", "age of menarche", ValueKind::Int, Some("y")),
    ("LastMenstruationPeriod", "last menstruation period", ValueKind::Date, None),
    ("Regularity", "regularity", ValueKind::Str, None),
    ("Flow", "flow", ValueKind::Str, None),
    ("Dysmenorrhea", "dys", ValueKind::Str, None),
    ("IntermenstrualBleeding", "intermenstrual bleeding", ValueKind::Str, None),
    ("Consanguinity", "consanguinity", ValueKind::Bool, None),
    ("BowelChanges", "bowel changes", ValueKind::Str, None),
    ("MenstruationCycleDays", "menstruation cycle days", ValueKind::Int, Some("d")),
    ("MenstruationLength", "menstruation length", ValueKind::Int, Some("d")),
    ("Amenorrhea", "amenorrhea", ValueKind::Str, None),
    ("AmenorrheaType", "amenorrhea type", ValueKind::Str, None),
    ("MedicineUsed", "medicine used", ValueKind::Bool, None),
    ("Comments", "comments", ValueKind::Str, None),
];

const OBSTETRICS_FIELDS: &[FieldSpec] = &[
    ("Gravida", "gravida", ValueKind::Int, Some("d")),
    ("GestationWeeks", "gestation weeks", ValueKind::Int, Some("w")),
    ("Outcome", "outcome", ValueKind::Str, None),
    ("SexAssignedBirth", "sex_assigned_birth", ValueKind::Str, None),
    ("DeliveryMethod", "delivery_method", ValueKind::Str, None),
    ("TypeOfConceived", "type of conceived", ValueKind::Str, None),
    ("Complication", "complication", ValueKind::Bool, None),
    // Source documents consistently misspell this key.
    ("CongenitalAnomalies", "congenial anomalies", ValueKind::Bool, None),
    ("HistoryRecurrentAbortion", "history recurrent abortion", ValueKind::Bool, None),
    ("KaryotypingValuation", "karyotyping valuation", ValueKind::Bool, None),
    ("Indication", "indication", ValueKind::Str, None),
    ("SampleType", "sample type", ValueKind::Str, None),
    ("KaryotypingResult", "karyotyping result", ValueKind::Str, None),
    ("Comments", "comments", ValueKind::Str, None),
];

// The STD-since key appears with two spellings across document vintages;
// both map to the same field and the first present wins.
const SEXUAL_FIELDS: &[FieldSpec] = &[
    ("LastSexRelationDuration", "last sexual relationship duration", ValueKind::Str, None),
    ("LastSexRelationSince", "last sexual relationship since", ValueKind::Str, None),
    ("Married", "married", ValueKind::Str, None),
    ("Contraception", "contraception", ValueKind::Bool, None),
    ("ContraceptionMethod", "contraception_method", ValueKind::Str, None),
    ("FemaleInfertility", "female infertility", ValueKind::Bool, None),
    ("IntercourseFrequency", "intercourse frequency", ValueKind::Str, None),
    ("SexualDysfunction", "sexual dysfunction", ValueKind::Bool, None),
    ("Dyspareunia", "dyspareunia", ValueKind::Bool, None),
    ("LubricantUse", "lubricant use", ValueKind::Bool, None),
    ("OvulationKits", "ovulation kits", ValueKind::Bool, None),
    ("SexTransmitDiseaseSince", "sexually transmitted disease since", ValueKind::Str, None),
    ("SexTransmitDiseaseSince", "sexual transmitted disease since", ValueKind::Str, None),
    ("Comments", "comments", ValueKind::Str, None),
];

/// A parsed clinical record for one patient.
#[derive(Debug, Clone)]
pub struct Document {
    pub patient_id: String,
    sections: Map<String, Json>,
}

impl Document {
    /// Parse a raw JSON payload into one or more documents.
    ///
    /// Source files hold either a single record object or a list of them.
    pub fn parse_all(raw: &Json) -> EngineResult<Vec<Document>> {
        let records: Vec<&Json> = match raw {
            Json::Array(items) => items.iter().collect(),
            other => vec![other],
        };

        records
            .into_iter()
            .map(|r| {
                let obj = r.as_object().ok_or_else(|| {
                    EngineError::InvalidDocument("record is not a JSON object".to_string())
                })?;
                Self::from_record(obj)
            })
            .collect()
    }

    fn from_record(obj: &Map<String, Json>) -> EngineResult<Document> {
        let patient_id = obj
            .get("patient_id")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                EngineError::InvalidDocument("record has no patient_id".to_string())
            })?
            .to_string();

        let sections = obj
            .iter()
            .filter(|(k, v)| k.as_str() != "patient_id" && v.is_object())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Document {
            patient_id,
            sections,
        })
    }

    /// Flatten the document into fact rows via the section registry.
    pub fn facts(&self) -> Vec<FactRow> {
        let mut rows = Vec::new();

        for (key, body) in &self.sections {
            let Some(section) = body.as_object() else { continue };
            let kind = SectionKind::from_source_key(key);

            match kind {
                SectionKind::GeneralInformation => {
                    scalar_rows(&mut rows, kind, GENERAL_FIELDS, section);
                }
                SectionKind::MenstrualHistory => {
                    scalar_rows(&mut rows, kind, MENSTRUAL_FIELDS, section);
                    list_rows(&mut rows, kind, section, "medicine", "Medicine");
                }
                SectionKind::MedicalHistory => {
                    entry_rows(&mut rows, kind, section, "past disease", "PastDisease", disease_props);
                }
                SectionKind::ObstetricsHistory => {
                    scalar_rows(&mut rows, kind, OBSTETRICS_FIELDS, section);
                }
                SectionKind::PastMedication => {
                    entry_rows(&mut rows, kind, section, "past medication", "PastMedication", medication_props);
                }
                SectionKind::PastTesting => {
                    entry_rows(&mut rows, kind, section, "past testing", "PastTesting", testing_props);
                }
                SectionKind::SexualHistory => {
                    scalar_rows(&mut rows, kind, SEXUAL_FIELDS, section);
                    list_rows(&mut rows, kind, section, "sexually transmitted disease (STD)", "STD");
                }
                SectionKind::Other => {
                    other_rows(&mut rows, key, section);
                }
            }
        }

        rows
    }
}

/// Emit one row per field-table entry with a usable value.
fn scalar_rows(
    rows: &mut Vec<FactRow>,
    kind: SectionKind,
    fields: &[FieldSpec],
    section: &Map<String, Json>,
) {
    let mut seen: Vec<&str> = Vec::new();

    for &(field, source_key, value_kind, unit) in fields {
        if seen.contains(&field) {
            continue;
        }
        let Some(raw) = section.get(source_key) else { continue };
        let Some(value) = coerce(raw, value_kind) else { continue };

        seen.push(field);
        rows.push(FactRow {
            section: kind,
            section_name: kind.canonical_name().to_string(),
            field: field.to_string(),
            value,
            value_kind,
            unit: unit.map(str::to_string),
            entry_props: Vec::new(),
        });
    }
}

/// Emit one string row per element of a list-valued field.
fn list_rows(
    rows: &mut Vec<FactRow>,
    kind: SectionKind,
    section: &Map<String, Json>,
    source_key: &str,
    field: &str,
) {
    let Some(Json::Array(items)) = section.get(source_key) else { return };

    for item in items {
        let Some(text) = coerce_str(item) else { continue };
        rows.push(FactRow {
            section: kind,
            section_name: kind.canonical_name().to_string(),
            field: field.to_string(),
            value: FactValue::Str(text),
            value_kind: ValueKind::Str,
            unit: None,
            entry_props: Vec::new(),
        });
    }
}

/// Emit one dict row per entry of a keyed collection.
fn entry_rows(
    rows: &mut Vec<FactRow>,
    kind: SectionKind,
    section: &Map<String, Json>,
    source_key: &str,
    field: &str,
    props: fn(&Map<String, Json>) -> Vec<(String, Json)>,
) {
    let Some(Json::Object(entries)) = section.get(source_key) else { return };

    for (entry_id, entry) in entries {
        let Some(entry) = entry.as_object() else { continue };
        if entry_id.trim().is_empty() {
            continue;
        }
        rows.push(FactRow {
            section: kind,
            section_name: kind.canonical_name().to_string(),
            field: field.to_string(),
            value: FactValue::Str(entry_id.clone()),
            value_kind: ValueKind::Dict,
            unit: None,
            entry_props: props(entry),
        });
    }
}

/// Fallback for unknown sections: every scalar key becomes a string field.
fn other_rows(rows: &mut Vec<FactRow>, raw_section: &str, section: &Map<String, Json>) {
    let section_name = camel_case(raw_section);

    for (key, raw) in section {
        if raw.is_object() || raw.is_array() {
            continue;
        }
        let Some(text) = coerce_str(raw) else { continue };
        rows.push(FactRow {
            section: SectionKind::Other,
            section_name: section_name.clone(),
            field: camel_case(key),
            value: FactValue::Str(text),
            value_kind: ValueKind::Str,
            unit: None,
            entry_props: Vec::new(),
        });
    }
}

fn disease_props(entry: &Map<String, Json>) -> Vec<(String, Json)> {
    let mut props = Vec::new();
    push_str(&mut props, "category", entry.get("disease category"));
    push_str(&mut props, "type", entry.get("disease type"));
    if let Some(year) = entry.get("disease since when").and_then(coerce_int) {
        props.push(("since_year".to_string(), Json::from(year)));
    }
    let on_med = entry
        .get("disease on medication")
        .or_else(|| entry.get("on_medication"))
        .or_else(|| entry.get("on_medicatoin"));
    if let Some(b) = on_med.and_then(coerce_bool) {
        props.push(("on_medication".to_string(), Json::from(b)));
    }
    push_str(&mut props, "comments", entry.get("comments"));
    props
}

fn medication_props(entry: &Map<String, Json>) -> Vec<(String, Json)> {
    let mut props = Vec::new();
    push_str(&mut props, "generic_name", entry.get("generic name"));
    push_str(&mut props, "brand_name", entry.get("brand name"));
    // "does" is the dose key in source documents.
    push_str(&mut props, "dose", entry.get("does"));
    push_str(&mut props, "frequency", entry.get("frequency"));
    push_str(&mut props, "route", entry.get("route"));
    push_str(&mut props, "start_date", entry.get("start date"));
    push_str(&mut props, "end_date", entry.get("end date"));
    props
}

fn testing_props(entry: &Map<String, Json>) -> Vec<(String, Json)> {
    let mut props = Vec::new();
    push_str(&mut props, "test_name", entry.get("test_name"));
    push_str(&mut props, "result", entry.get("result"));
    push_str(&mut props, "date", entry.get("date"));
    push_str(&mut props, "remark", entry.get("remark/indication"));
    push_str(&mut props, "patient_name", entry.get("patient_name"));
    props
}

fn push_str(props: &mut Vec<(String, Json)>, name: &str, raw: Option<&Json>) {
    if let Some(text) = raw.and_then(coerce_str) {
        props.push((name.to_string(), Json::from(text)));
    }
}

fn coerce(raw: &Json, kind: ValueKind) -> Option<FactValue> {
    match kind {
        ValueKind::Int => coerce_int(raw).map(FactValue::Int),
        ValueKind::Bool => coerce_bool(raw).map(FactValue::Bool),
        ValueKind::Str | ValueKind::Date => coerce_str(raw).map(FactValue::Str),
        ValueKind::Dict => None,
    }
}

fn coerce_int(raw: &Json) -> Option<i64> {
    match raw {
        Json::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Json::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Tolerant boolean coercion: true/yes/y/1 and false/no/n/0, any casing.
fn coerce_bool(raw: &Json) -> Option<bool> {
    match raw {
        Json::Bool(b) => Some(*b),
        Json::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Some(true),
            "false" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        Json::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_str(raw: &Json) -> Option<String> {
    let text = match raw {
        Json::String(s) => s.trim().to_string(),
        Json::Number(n) => n.to_string(),
        Json::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn camel_case(raw: &str) -> String {
    raw.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_record() -> Json {
        json!({
            "patient_id": "00028",
            "General_Information": { "name": "", "title": "Ms" },
            "Menstrual_History": {
                "age of menarche": "13",
                "regularity": "regular",
                "consanguinity": "No",
                "menstruation cycle days": 28,
                "comments": "",
                "medicine": ["Bemfola", ""]
            },
            "Past_Medication": {
                "past medication": {
                    "med_001": {
                        "generic name": "Bemfola",
                        "does": "150 IU",
                        "frequency": "daily"
                    }
                }
            },
            "Lab_Results": { "hemoglobin": "12.1", "notes": {"nested": true} }
        })
    }

    #[test]
    fn parses_single_record_and_list() {
        let single = Document::parse_all(&sample_record()).unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].patient_id, "00028");

        let list = Document::parse_all(&json!([sample_record(), sample_record()])).unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn missing_patient_id_is_rejected() {
        let result = Document::parse_all(&json!({"General_Information": {}}));
        assert!(matches!(result, Err(EngineError::InvalidDocument(_))));
    }

    #[test]
    fn flattens_scalars_with_coercion() {
        let doc = &Document::parse_all(&sample_record()).unwrap()[0];
        let rows = doc.facts();

        // Empty name skipped, title kept.
        assert!(!rows.iter().any(|r| r.field == "Name"));
        let title = rows.iter().find(|r| r.field == "Title").unwrap();
        assert_eq!(title.value, FactValue::Str("Ms".to_string()));

        // String "13" coerced to int, unit from the field table.
        let menarche = rows.iter().find(|r| r.field == "AgeOfMenarche").unwrap();
        assert_eq!(menarche.value, FactValue::Int(13));
        assert_eq!(menarche.unit.as_deref(), Some("y"));
        assert_eq!(menarche.section.relationship(), "HAS_MENSTRUAL_HISTORY");

        // "No" coerced to boolean false.
        let consanguinity = rows.iter().find(|r| r.field == "Consanguinity").unwrap();
        assert_eq!(consanguinity.value, FactValue::Bool(false));

        // Empty comment skipped.
        assert!(!rows.iter().any(|r| r.field == "Comments"));
    }

    #[test]
    fn list_fields_fan_out_skipping_blanks() {
        let doc = &Document::parse_all(&sample_record()).unwrap()[0];
        let meds: Vec<_> = doc.facts().into_iter().filter(|r| r.field == "Medicine").collect();
        assert_eq!(meds.len(), 1);
        assert_eq!(meds[0].value, FactValue::Str("Bemfola".to_string()));
    }

    #[test]
    fn dict_entries_carry_props() {
        let doc = &Document::parse_all(&sample_record()).unwrap()[0];
        let rows = doc.facts();
        let med = rows.iter().find(|r| r.field == "PastMedication").unwrap();
        assert_eq!(med.value_kind, ValueKind::Dict);
        assert_eq!(med.value, FactValue::Str("med_001".to_string()));
        assert!(med
            .entry_props
            .iter()
            .any(|(k, v)| k == "generic_name" && v == &Json::from("Bemfola")));
        assert!(med.entry_props.iter().any(|(k, _)| k == "dose"));
    }

    #[test]
    fn unknown_sections_route_to_other() {
        let doc = &Document::parse_all(&sample_record()).unwrap()[0];
        let rows = doc.facts();
        let lab = rows.iter().find(|r| r.section_name == "LabResults").unwrap();
        assert_eq!(lab.section, SectionKind::Other);
        assert_eq!(lab.section.relationship(), "HAS_OTHER_SECTION");
        assert_eq!(lab.field, "Hemoglobin");
        // Nested objects under an unknown section are not flattened.
        assert!(!rows.iter().any(|r| r.field == "Notes"));
    }

    #[test]
    fn section_registry_resolves_loose_spellings() {
        assert_eq!(
            SectionKind::from_source_key("General_Information"),
            SectionKind::GeneralInformation
        );
        assert_eq!(
            SectionKind::from_source_key("general information"),
            SectionKind::GeneralInformation
        );
        assert_eq!(SectionKind::from_source_key("Imaging"), SectionKind::Other);
    }

    #[test]
    fn duplicate_source_keys_keep_first_match() {
        let section = json!({
            "patient_id": "1",
            "Sexual_History": {
                "sexually transmitted disease since": "2019",
                "sexual transmitted disease since": "2020"
            }
        });
        let doc = &Document::parse_all(&section).unwrap()[0];
        let rows: Vec<_> = doc
            .facts()
            .into_iter()
            .filter(|r| r.field == "SexTransmitDiseaseSince")
            .collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, FactValue::Str("2019".to_string()));
    }
}
