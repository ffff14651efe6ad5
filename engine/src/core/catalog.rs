//! Static capability table: every subsystem, its operations, and their
//! parameter contracts.
//!
//! Dispatch never reflects over collaborators. An operation exists only if it
//! is listed here, and its arguments are bound against the listed contract
//! before any collaborator is called.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::decode::Value;

/// Identifier of a simulated subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubsystemId {
    Email,
    Calendar,
    Map,
    Geography,
    Reservation,
    Bibliography,
    DataSystem,
    CourseSelection,
    Draft,
    Registration,
}

impl SubsystemId {
    pub const ALL: [SubsystemId; 10] = [
        SubsystemId::Email,
        SubsystemId::Calendar,
        SubsystemId::Map,
        SubsystemId::Geography,
        SubsystemId::Reservation,
        SubsystemId::Bibliography,
        SubsystemId::DataSystem,
        SubsystemId::CourseSelection,
        SubsystemId::Draft,
        SubsystemId::Registration,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SubsystemId::Email => "email",
            SubsystemId::Calendar => "calendar",
            SubsystemId::Map => "map",
            SubsystemId::Geography => "geography",
            SubsystemId::Reservation => "reservation",
            SubsystemId::Bibliography => "bibliography",
            SubsystemId::DataSystem => "data_system",
            SubsystemId::CourseSelection => "course_selection",
            SubsystemId::Draft => "draft",
            SubsystemId::Registration => "registration",
        }
    }
}

impl fmt::Display for SubsystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubsystemId {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        SubsystemId::ALL
            .into_iter()
            .find(|id| id.as_str() == name)
            .ok_or_else(|| format!("unknown subsystem '{name}'"))
    }
}

/// Accepted value shape for a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Text,
    Boolean,
    /// JSON object/array, or a string the collaborator interprets itself.
    Object,
}

impl ParamKind {
    fn label(self) -> &'static str {
        match self {
            ParamKind::Text => "text",
            ParamKind::Boolean => "boolean",
            ParamKind::Object => "object",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    /// Alternative names agents commonly use for this parameter.
    pub aliases: &'static [&'static str],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSpec {
    pub subsystem: SubsystemId,
    pub method: &'static str,
    pub params: Vec<ParamSpec>,
}

impl OperationSpec {
    /// Qualified `subsystem.method` name.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.subsystem, self.method)
    }

    fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params
            .iter()
            .find(|param| param.name == name || param.aliases.iter().any(|alias| *alias == name))
    }
}

fn text(name: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        kind: ParamKind::Text,
        required: true,
        aliases: &[],
    }
}

fn optional(spec: ParamSpec) -> ParamSpec {
    ParamSpec {
        required: false,
        ..spec
    }
}

fn of_kind(name: &'static str, kind: ParamKind) -> ParamSpec {
    ParamSpec {
        kind,
        ..text(name)
    }
}

fn op(subsystem: SubsystemId, method: &'static str, params: Vec<ParamSpec>) -> OperationSpec {
    OperationSpec {
        subsystem,
        method,
        params,
    }
}

/// Every operation the engine can dispatch.
pub static CATALOG: LazyLock<Vec<OperationSpec>> = LazyLock::new(|| {
    vec![
        op(
            SubsystemId::Email,
            "send_email",
            vec![
                ParamSpec {
                    aliases: &["to"],
                    ..text("recipient")
                },
                text("subject"),
                text("body"),
                optional(text("cc")),
            ],
        ),
        op(
            SubsystemId::Email,
            "view_inbox",
            vec![optional(of_kind("filter_unread", ParamKind::Boolean))],
        ),
        op(SubsystemId::Email, "reply_email", vec![text("email_id"), text("body")]),
        op(SubsystemId::Email, "delete_email", vec![text("email_id")]),
        op(
            SubsystemId::Calendar,
            "add_event",
            vec![
                text("calendar_id"),
                text("event_title"),
                text("location"),
                text("time"),
                optional(text("description")),
            ],
        ),
        op(SubsystemId::Calendar, "remove_event", vec![text("calendar_id"), text("event_id")]),
        op(
            SubsystemId::Calendar,
            "update_event",
            vec![
                text("calendar_id"),
                text("event_id"),
                of_kind("new_details", ParamKind::Object),
            ],
        ),
        op(SubsystemId::Calendar, "view_schedule", vec![text("calendar_id"), text("date")]),
        op(
            SubsystemId::Calendar,
            "query_advisor_availability",
            vec![text("advisor_id"), text("date")],
        ),
        op(SubsystemId::Map, "find_building_id", vec![text("building_name")]),
        op(SubsystemId::Map, "get_building_details", vec![text("building_id")]),
        op(
            SubsystemId::Map,
            "find_room_location",
            vec![
                text("room_query"),
                optional(text("building_id")),
                optional(text("zone")),
            ],
        ),
        op(
            SubsystemId::Map,
            "find_optimal_path",
            vec![
                text("source_building_id"),
                text("target_building_id"),
                optional(of_kind("constraints", ParamKind::Object)),
            ],
        ),
        op(
            SubsystemId::Map,
            "query_buildings_by_property",
            vec![
                optional(text("zone")),
                optional(text("building_type")),
                optional(text("amenity")),
            ],
        ),
        op(SubsystemId::Map, "get_building_complex_info", vec![text("building_id")]),
        op(SubsystemId::Map, "list_valid_query_properties", vec![]),
        op(SubsystemId::Geography, "get_current_location", vec![]),
        op(SubsystemId::Geography, "set_location", vec![text("building_id")]),
        op(
            SubsystemId::Geography,
            "walk_to",
            vec![of_kind("path_info", ParamKind::Object)],
        ),
        op(
            SubsystemId::Reservation,
            "query_availability",
            vec![text("location_id"), text("date")],
        ),
        op(
            SubsystemId::Reservation,
            "make_booking",
            vec![
                text("location_id"),
                text("item_name"),
                text("date"),
                text("time_slot"),
                optional(text("seat_id")),
            ],
        ),
        op(SubsystemId::Bibliography, "list_chapters", vec![text("book_title")]),
        op(
            SubsystemId::Bibliography,
            "list_sections",
            vec![text("book_title"), text("chapter_title")],
        ),
        op(
            SubsystemId::Bibliography,
            "list_articles",
            vec![
                text("book_title"),
                text("chapter_title"),
                text("section_title"),
            ],
        ),
        op(SubsystemId::Bibliography, "view_article", vec![text("identifier"), text("by")]),
        op(
            SubsystemId::DataSystem,
            "list_by_category",
            vec![
                text("category"),
                text("entity_type"),
                optional(text("level")),
            ],
        ),
        op(
            SubsystemId::DataSystem,
            "query_by_identifier",
            vec![text("identifier"), text("by"), text("entity_type")],
        ),
        op(SubsystemId::DataSystem, "list_books_by_category", vec![text("category")]),
        op(
            SubsystemId::DataSystem,
            "search_books",
            vec![text("query"), optional(text("search_type"))],
        ),
        op(
            SubsystemId::CourseSelection,
            "browse_courses",
            vec![optional(of_kind("filters", ParamKind::Object))],
        ),
        op(SubsystemId::Draft, "add_course", vec![text("section_id")]),
        op(SubsystemId::Draft, "remove_course", vec![text("section_id")]),
        op(
            SubsystemId::Draft,
            "assign_pass",
            vec![text("section_id"), text("pass_type")],
        ),
        op(SubsystemId::Draft, "view", vec![]),
        op(SubsystemId::Registration, "submit_draft", vec![]),
    ]
});

/// Look up an operation by subsystem and method.
pub fn find_operation(subsystem: SubsystemId, method: &str) -> Option<&'static OperationSpec> {
    CATALOG
        .iter()
        .find(|spec| spec.subsystem == subsystem && spec.method == method)
}

/// Operations belonging to `subsystem`, in catalog order.
pub fn operations_for(subsystem: SubsystemId) -> impl Iterator<Item = &'static OperationSpec> {
    CATALOG.iter().filter(move |spec| spec.subsystem == subsystem)
}

/// Arguments keyed by canonical parameter name, after contract checks.
pub type BoundArgs = IndexMap<String, Value>;

/// Arguments that violate an operation's parameter contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("missing required parameter `{param}` for `{operation}`")]
    Missing { operation: String, param: String },
    #[error("unknown parameter `{param}` for `{operation}`")]
    Unknown { operation: String, param: String },
    #[error("parameter `{param}` for `{operation}` is given more than once")]
    Duplicate { operation: String, param: String },
    #[error("parameter `{param}` for `{operation}` expects {expected}, got {found}")]
    WrongType {
        operation: String,
        param: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl ArgumentError {
    /// Name of the parameter at fault.
    pub fn param(&self) -> &str {
        match self {
            ArgumentError::Missing { param, .. }
            | ArgumentError::Unknown { param, .. }
            | ArgumentError::Duplicate { param, .. }
            | ArgumentError::WrongType { param, .. } => param,
        }
    }
}

/// Bind decoded arguments to `spec`: resolve aliases, reject unknown or
/// duplicate parameters, require mandatory ones, and check value kinds.
pub fn bind_arguments(
    spec: &OperationSpec,
    args: &IndexMap<String, Value>,
) -> Result<BoundArgs, ArgumentError> {
    let operation = spec.qualified_name();
    let mut bound = BoundArgs::new();

    for (name, value) in args {
        let param = spec.param(name).ok_or_else(|| ArgumentError::Unknown {
            operation: operation.clone(),
            param: name.clone(),
        })?;
        if bound.contains_key(param.name) {
            return Err(ArgumentError::Duplicate {
                operation,
                param: param.name.to_string(),
            });
        }
        let coerced = coerce(param.kind, value).ok_or_else(|| ArgumentError::WrongType {
            operation: operation.clone(),
            param: param.name.to_string(),
            expected: param.kind.label(),
            found: value.type_name(),
        })?;
        bound.insert(param.name.to_string(), coerced);
    }

    if let Some(missing) = spec
        .params
        .iter()
        .find(|param| param.required && !bound.contains_key(param.name))
    {
        return Err(ArgumentError::Missing {
            operation,
            param: missing.name.to_string(),
        });
    }

    Ok(bound)
}

fn coerce(kind: ParamKind, value: &Value) -> Option<Value> {
    match (kind, value) {
        (ParamKind::Text, _) => value.as_text().map(Value::Str),
        (ParamKind::Boolean, Value::Bool(_)) => Some(value.clone()),
        (ParamKind::Object, Value::Json(_) | Value::Str(_)) => Some(value.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn args(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    fn int(raw: &str) -> Value {
        Value::Int {
            value: raw.parse().expect("integer"),
            raw: raw.to_string(),
        }
    }

    fn spec(subsystem: SubsystemId, method: &str) -> &'static OperationSpec {
        find_operation(subsystem, method).expect("operation in catalog")
    }

    #[test]
    fn catalog_names_are_unique_and_well_formed() {
        let mut seen = HashSet::new();
        for spec in &*CATALOG {
            let name = spec.qualified_name();
            assert!(seen.insert(name.clone()), "duplicate {name}");
            assert!(
                name.chars().all(|ch| ch.is_ascii_lowercase() || ch == '_' || ch == '.'),
                "bad name {name}"
            );
        }
    }

    #[test]
    fn every_subsystem_has_operations() {
        for id in SubsystemId::ALL {
            assert!(operations_for(id).next().is_some(), "{id} has no operations");
        }
    }

    #[test]
    fn subsystem_ids_parse_from_names() {
        assert_eq!("data_system".parse::<SubsystemId>(), Ok(SubsystemId::DataSystem));
        assert!("library".parse::<SubsystemId>().is_err());
    }

    #[test]
    fn binds_alias_to_canonical_name() {
        let bound = bind_arguments(
            spec(SubsystemId::Email, "send_email"),
            &args(&[
                ("to", Value::Str("advisor@university.edu".to_string())),
                ("subject", Value::Str("Hi".to_string())),
                ("body", Value::Str("Hello".to_string())),
            ]),
        )
        .expect("bind");
        assert_eq!(
            bound.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["recipient", "subject", "body"]
        );
    }

    #[test]
    fn reports_missing_required_parameter() {
        let err = bind_arguments(
            spec(SubsystemId::Draft, "assign_pass"),
            &args(&[("section_id", Value::Str("A".to_string()))]),
        )
        .expect_err("missing");
        assert_eq!(err.param(), "pass_type");
        assert!(matches!(err, ArgumentError::Missing { .. }));
    }

    #[test]
    fn reports_unknown_parameter() {
        let err = bind_arguments(
            spec(SubsystemId::Draft, "view"),
            &args(&[("verbose", Value::Bool(true))]),
        )
        .expect_err("unknown");
        assert_eq!(
            err.to_string(),
            "unknown parameter `verbose` for `draft.view`"
        );
    }

    #[test]
    fn alias_and_canonical_together_is_duplicate() {
        let err = bind_arguments(
            spec(SubsystemId::Email, "send_email"),
            &args(&[
                ("to", Value::Str("a@b.edu".to_string())),
                ("recipient", Value::Str("c@d.edu".to_string())),
            ]),
        )
        .expect_err("duplicate");
        assert!(matches!(err, ArgumentError::Duplicate { .. }));
    }

    #[test]
    fn coerces_numbers_to_text_but_rejects_booleans() {
        let bound = bind_arguments(
            spec(SubsystemId::Reservation, "make_booking"),
            &args(&[
                ("location_id", Value::Ident("lib_01".to_string())),
                ("item_name", Value::Str("Seat".to_string())),
                ("date", Value::Str("Week 2, Monday".to_string())),
                ("time_slot", Value::Str("10:00-12:00".to_string())),
                ("seat_id", int("12")),
            ]),
        )
        .expect("bind");
        assert_eq!(bound["seat_id"], Value::Str("12".to_string()));

        let err = bind_arguments(
            spec(SubsystemId::Draft, "add_course"),
            &args(&[("section_id", Value::Bool(true))]),
        )
        .expect_err("wrong type");
        assert!(matches!(
            err,
            ArgumentError::WrongType {
                expected: "text",
                found: "boolean",
                ..
            }
        ));
    }

    #[test]
    fn object_parameters_accept_json_and_strings() {
        let walk = spec(SubsystemId::Geography, "walk_to");
        assert!(
            bind_arguments(
                walk,
                &args(&[("path_info", Value::Json(serde_json::json!({"path": ["B1"]})))])
            )
            .is_ok()
        );
        assert!(
            bind_arguments(walk, &args(&[("path_info", Value::Str("B1->B2".to_string()))]))
                .is_ok()
        );
        assert!(bind_arguments(walk, &args(&[("path_info", int("3"))])).is_err());
    }

    /// Unquoted numeric ids bind to text exactly as the agent wrote them.
    #[test]
    fn numeric_ids_bind_to_text_unchanged() {
        for raw in ["00042", "12345678901234567890"] {
            let call = crate::core::decode::decode_action_call(&format!(
                "email.delete_email(email_id={raw})"
            ))
            .expect("decode");
            let bound =
                bind_arguments(spec(SubsystemId::Email, "delete_email"), &call.args).expect("bind");
            assert_eq!(bound["email_id"], Value::Str(raw.to_string()));
        }
    }
}
