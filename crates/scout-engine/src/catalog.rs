//! Keyword-driven artifact catalog.
//!
//! Two independent tables:
//! - **rules** drive streamed artifacts during a chat turn. A rule matches when
//!   any of its clauses matches; a clause matches when every keyword group has
//!   at least one keyword contained in the lower-cased message.
//! - **lookups** answer whole-artifact requests. An entry matches when any of
//!   its keywords is contained in the lower-cased query.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use scout_core::artifacts::{ArtifactMetadata, ArtifactPayload, ArtifactType, CellValue};

use crate::error::EngineError;

/// Help text returned by [`ArtifactCatalog::lookup`] when nothing matches.
pub const NO_MATCH_MESSAGE: &str = "No specific artifact could be generated for your query. \
Please try phrases like 'generate sales table' or 'show python script for users'.";

/// Conjunction of keyword groups. Each group is a disjunction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    pub all_of: Vec<Vec<String>>,
}

impl Clause {
    pub fn new(groups: &[&[&str]]) -> Self {
        Self {
            all_of: groups
                .iter()
                .map(|g| g.iter().map(|k| k.to_lowercase()).collect())
                .collect(),
        }
    }

    fn matches(&self, lowered: &str) -> bool {
        !self.all_of.is_empty()
            && self
                .all_of
                .iter()
                .all(|group| group.iter().any(|kw| lowered.contains(kw.to_lowercase().as_str())))
    }
}

/// Content streamed when a rule fires.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArtifactTemplate {
    Code {
        language: String,
        title: String,
        lines: Vec<String>,
    },
    Data {
        title: String,
        format: String,
        columns: Vec<String>,
        rows: Vec<Vec<CellValue>>,
    },
}

impl ArtifactTemplate {
    pub fn artifact_type(&self) -> ArtifactType {
        match self {
            Self::Code { .. } => ArtifactType::Code,
            Self::Data { .. } => ArtifactType::Data,
        }
    }

    pub fn metadata(&self) -> ArtifactMetadata {
        match self {
            Self::Code { language, title, .. } => ArtifactMetadata::Code {
                language: language.clone(),
                title: title.clone(),
            },
            Self::Data {
                title,
                format,
                columns,
                ..
            } => ArtifactMetadata::Data {
                title: title.clone(),
                format: format.clone(),
                columns: columns.clone(),
            },
        }
    }

    /// One payload per chunk: code lines gain a trailing newline, rows pass through.
    pub fn payloads(&self) -> Vec<ArtifactPayload> {
        match self {
            Self::Code { lines, .. } => lines
                .iter()
                .map(|l| ArtifactPayload::Line(format!("{l}\n")))
                .collect(),
            Self::Data { rows, .. } => rows.iter().cloned().map(ArtifactPayload::Row).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRule {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub when: Vec<Clause>,
    pub template: ArtifactTemplate,
}

impl ArtifactRule {
    /// `lowered` must already be lower-cased.
    fn matches(&self, lowered: &str) -> bool {
        self.when.iter().any(|c| c.matches(lowered))
    }

    fn keywords(&self) -> impl Iterator<Item = &String> {
        self.when.iter().flat_map(|c| c.all_of.iter().flatten())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataContent {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

/// A complete artifact returned in one response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WholeArtifact {
    Code {
        language: String,
        content: String,
    },
    Data {
        format: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        content: DataContent,
    },
    Message {
        content: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LookupEntry {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub keywords: Vec<String>,
    pub artifact: WholeArtifact,
}

impl LookupEntry {
    fn matches(&self, lowered: &str) -> bool {
        self.keywords
            .iter()
            .any(|kw| lowered.contains(kw.to_lowercase().as_str()))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactCatalog {
    #[serde(default)]
    pub rules: Vec<ArtifactRule>,
    #[serde(default)]
    pub lookups: Vec<LookupEntry>,
}

impl ArtifactCatalog {
    /// Parse and validate a JSON catalog.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let catalog: Self =
            serde_json::from_str(json).map_err(|e| EngineError::Catalog(e.to_string()))?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Catalog(format!("{}: {e}", path.display())))?;
        Self::from_json(&content)
    }

    fn validate(&self) -> Result<(), EngineError> {
        let mut seen = HashSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(EngineError::Catalog(format!("duplicate rule id '{}'", rule.id)));
            }
            if rule.when.is_empty() || rule.when.iter().any(|c| c.all_of.iter().any(Vec::is_empty)) {
                return Err(EngineError::Catalog(format!(
                    "rule '{}' has an empty clause or keyword group",
                    rule.id
                )));
            }
            if let ArtifactTemplate::Data { columns, rows, .. } = &rule.template {
                if let Some(bad) = rows.iter().position(|r| r.len() != columns.len()) {
                    return Err(EngineError::Catalog(format!(
                        "rule '{}' row {bad} does not match {} columns",
                        rule.id,
                        columns.len()
                    )));
                }
            }
        }
        if let Some(entry) = self.lookups.iter().find(|e| e.keywords.is_empty()) {
            return Err(EngineError::Catalog(format!(
                "lookup '{}' has no keywords",
                entry.id
            )));
        }
        // A blank keyword is contained in every message.
        if let Some(rule) = self.rules.iter().find(|r| r.keywords().any(|k| is_blank(k))) {
            return Err(EngineError::Catalog(format!("rule '{}' has a blank keyword", rule.id)));
        }
        if let Some(entry) = self.lookups.iter().find(|e| e.keywords.iter().any(|k| is_blank(k))) {
            return Err(EngineError::Catalog(format!("lookup '{}' has a blank keyword", entry.id)));
        }
        Ok(())
    }

    /// First matching code rule, else first matching data rule.
    pub fn select(&self, message: &str) -> Option<&ArtifactRule> {
        let lowered = message.to_lowercase();
        let first_of = |kind: ArtifactType| {
            self.rules
                .iter()
                .find(|r| r.template.artifact_type() == kind && r.matches(&lowered))
        };
        first_of(ArtifactType::Code).or_else(|| first_of(ArtifactType::Data))
    }

    /// Whole-artifact lookup, falling back to a help message.
    pub fn lookup(&self, query: &str) -> WholeArtifact {
        let lowered = query.to_lowercase();
        self.lookups
            .iter()
            .find(|e| e.matches(&lowered))
            .map(|e| e.artifact.clone())
            .unwrap_or_else(|| WholeArtifact::Message {
                content: NO_MATCH_MESSAGE.to_string(),
            })
    }

    /// The canned rules and lookups the service ships with.
    pub fn builtin() -> Self {
        Self {
            rules: builtin_rules(),
            lookups: builtin_lookups(),
        }
    }
}

fn is_blank(keyword: &str) -> bool {
    keyword.trim().is_empty()
}

fn owned(src: &[&str]) -> Vec<String> {
    src.iter().map(|s| s.to_string()).collect()
}

fn builtin_rules() -> Vec<ArtifactRule> {
    vec![
        ArtifactRule {
            id: "python-user-processing".into(),
            description: "Python script that filters active users".into(),
            when: vec![Clause::new(&[&["python"], &["user", "processing", "script"]])],
            template: ArtifactTemplate::Code {
                language: "python".into(),
                title: "Python User Processing Script".into(),
                lines: owned(&[
                    "# Python script for user data processing",
                    "def process_users(users):",
                    "    active_users = []",
                    "    for user in users:",
                    "        if user.get('is_active'):",
                    "            print(f\"Processing: {user['name']}\")",
                    "            active_users.append(user)",
                    "    return active_users",
                    "",
                    "# Example:",
                    "# my_users = [{'name': 'Alice', 'is_active': True}]",
                    "# process_users(my_users)",
                ]),
            },
        },
        ArtifactRule {
            id: "javascript-form-validation".into(),
            description: "JavaScript form validation snippet".into(),
            when: vec![Clause::new(&[&["javascript"], &["validation", "script"]])],
            template: ArtifactTemplate::Code {
                language: "javascript".into(),
                title: "JS Form Validation".into(),
                lines: owned(&[
                    "// JavaScript for form validation",
                    "function validateForm() {",
                    "    const email = document.getElementById('email').value;",
                    "    if (!email.includes('@')) {",
                    "        alert('Invalid email!');",
                    "        return false;",
                    "    }",
                    "    return true;",
                    "}",
                ]),
            },
        },
        ArtifactRule {
            id: "sql-active-customers".into(),
            description: "SQL query for recently active customers".into(),
            when: vec![Clause::new(&[&["sql"], &["customer", "query"]])],
            template: ArtifactTemplate::Code {
                language: "sql".into(),
                title: "Active Customers Query".into(),
                lines: owned(&[
                    "SELECT customer_id, first_name, email",
                    "FROM customers",
                    "WHERE is_active = TRUE",
                    "  AND last_seen_days < 30;",
                ]),
            },
        },
        ArtifactRule {
            id: "quarterly-sales-report".into(),
            description: "Monthly revenue and units for the quarter".into(),
            when: vec![
                Clause::new(&[&["sales"]]),
                Clause::new(&[&["report"], &["table"]]),
            ],
            template: ArtifactTemplate::Data {
                title: "Quarterly Sales Report".into(),
                format: "json_table_rows".into(),
                columns: owned(&["Month", "Revenue", "Units Sold"]),
                rows: vec![
                    vec!["January".into(), 10500.into(), 520.into()],
                    vec!["February".into(), 12300.into(), 610.into()],
                    vec!["March".into(), 15600.into(), 770.into()],
                ],
            },
        },
        ArtifactRule {
            id: "product-inventory-status".into(),
            description: "Stock levels per product".into(),
            when: vec![Clause::new(&[&["product", "inventory"], &["table"]])],
            template: ArtifactTemplate::Data {
                title: "Product Inventory Status".into(),
                format: "json_table_rows".into(),
                columns: owned(&["Product_ID", "Name", "Stock_Level", "Category"]),
                rows: vec![
                    vec!["PID001".into(), "Laptop X".into(), 42.into(), "Electronics".into()],
                    vec!["PID002".into(), "Wireless Mouse".into(), 189.into(), "Accessories".into()],
                    vec!["PID003".into(), "Coffee Maker Pro".into(), 75.into(), "Appliances".into()],
                ],
            },
        },
    ]
}

fn builtin_lookups() -> Vec<LookupEntry> {
    vec![
        LookupEntry {
            id: "sales-data-table".into(),
            description: "A mock JSON data table for sales figures.".into(),
            keywords: owned(&["sales", "revenue", "table", "data", "report"]),
            artifact: WholeArtifact::Data {
                format: "json".into(),
                title: Some("Quarterly Sales Report".into()),
                content: DataContent {
                    columns: owned(&["Quarter", "Product Category", "Total Sales", "Units Sold"]),
                    rows: vec![
                        vec!["Q1 2024".into(), "Electronics".into(), 150000.into(), 350.into()],
                        vec!["Q1 2024".into(), "Appliances".into(), 120000.into(), 200.into()],
                        vec!["Q2 2024".into(), "Electronics".into(), 175000.into(), 400.into()],
                        vec!["Q2 2024".into(), "Appliances".into(), 110000.into(), 180.into()],
                    ],
                },
            },
        },
        LookupEntry {
            id: "product-inventory-table".into(),
            description: "A mock JSON data table for product inventory.".into(),
            keywords: owned(&["product", "inventory", "stock", "table", "data"]),
            artifact: WholeArtifact::Data {
                format: "json".into(),
                title: Some("Product Inventory Levels".into()),
                content: DataContent {
                    columns: owned(&["Product ID", "Name", "Category", "Stock Level", "Reorder Point"]),
                    rows: vec![
                        vec!["PID001".into(), "Laptop Pro X".into(), "Electronics".into(), 75.into(), 50.into()],
                        vec!["PID002".into(), "Smart Thermostat".into(), "Home Automation".into(), 120.into(), 100.into()],
                        vec!["PID003".into(), "Wireless Mouse".into(), "Accessories".into(), 300.into(), 150.into()],
                        vec!["PID004".into(), "Coffee Maker Deluxe".into(), "Appliances".into(), 45.into(), 50.into()],
                    ],
                },
            },
        },
        LookupEntry {
            id: "python-user-processing-script".into(),
            description: "A mock Python code snippet for user processing.".into(),
            keywords: owned(&["python", "user", "script", "code", "processing", "analysis"]),
            artifact: WholeArtifact::Code {
                language: "python".into(),
                content: [
                    "# Mock Python script for user data processing",
                    "",
                    "def process_users(user_list):",
                    "  active_users = []",
                    "  for user in user_list:",
                    "    if user.get('is_active'):",
                    "      print(f\"Processing active user: {user.get('name')}\")",
                    "      active_users.append(user)",
                    "  return active_users",
                    "",
                    "# Example usage:",
                    "# users = [{'name': 'Alice', 'is_active': True}, {'name': 'Bob', 'is_active': False}]",
                    "# process_users(users)",
                ]
                .join("\n"),
            },
        },
        LookupEntry {
            id: "sql-active-customers-query".into(),
            description: "A mock SQL query for fetching active customers.".into(),
            keywords: owned(&["sql", "active", "customer", "query", "database"]),
            artifact: WholeArtifact::Code {
                language: "sql".into(),
                content: [
                    "SELECT",
                    "  customer_id,",
                    "  first_name,",
                    "  last_name,",
                    "  email,",
                    "  last_login_date",
                    "FROM",
                    "  customers",
                    "WHERE",
                    "  is_active = TRUE",
                    "  AND last_login_date >= CURRENT_DATE - INTERVAL '30 days'",
                    "ORDER BY",
                    "  last_login_date DESC;",
                ]
                .join("\n"),
            },
        },
        LookupEntry {
            id: "javascript-ui-validation-script".into(),
            description: "A mock JavaScript code snippet for UI form validation.".into(),
            keywords: owned(&["javascript", "js", "ui", "form", "validation", "script", "code"]),
            artifact: WholeArtifact::Code {
                language: "javascript".into(),
                content: [
                    "// Mock JavaScript for UI form validation",
                    "",
                    "function validateEmail(email) {",
                    "  if (!email) return false;",
                    "  const emailRegex = /^[^\\s@]+@[^\\s@]+\\.[^\\s@]+$/;",
                    "  return emailRegex.test(email);",
                    "}",
                    "",
                    "function validatePassword(password) {",
                    "  if (!password || password.length < 8) return false;",
                    "  // Add more complex rules if needed",
                    "  return true;",
                    "}",
                    "",
                    "// Example usage:",
                    "// const emailInput = document.getElementById('email');",
                    "// const isValid = validateEmail(emailInput.value);",
                    "// console.log('Email is valid:', isValid);",
                ]
                .join("\n"),
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_script_selects_code_rule() {
        let catalog = ArtifactCatalog::builtin();
        let rule = catalog.select("generate python user processing script").unwrap();
        assert_eq!(rule.id, "python-user-processing");
        assert_eq!(rule.template.payloads().len(), 12);
        assert!(rule
            .template
            .payloads()
            .iter()
            .all(|p| p.as_line().is_some_and(|l| l.ends_with('\n'))));
    }

    #[test]
    fn matching_is_case_insensitive_substring() {
        let catalog = ArtifactCatalog::builtin();
        assert_eq!(catalog.select("Write SQL for our Customers").unwrap().id, "sql-active-customers");
        assert_eq!(catalog.select("JavaScript validation please").unwrap().id, "javascript-form-validation");
    }

    #[test]
    fn keyword_groups_are_conjunctive() {
        let catalog = ArtifactCatalog::builtin();
        // "python" alone lacks the second group
        assert!(catalog.select("what is python").is_none());
        // "table" alone lacks product/inventory and report
        assert!(catalog.select("a table please").is_none());
    }

    #[test]
    fn sales_rule_has_two_clauses() {
        let catalog = ArtifactCatalog::builtin();
        assert_eq!(catalog.select("show me the sales data table").unwrap().id, "quarterly-sales-report");
        assert_eq!(catalog.select("report as a table").unwrap().id, "quarterly-sales-report");
        assert_eq!(catalog.select("inventory table").unwrap().id, "product-inventory-status");
    }

    #[test]
    fn code_rules_win_over_data_rules() {
        let catalog = ArtifactCatalog::builtin();
        let rule = catalog.select("sales table via a python script").unwrap();
        assert_eq!(rule.template.artifact_type(), ArtifactType::Code);
    }

    #[test]
    fn sales_template_shape() {
        let catalog = ArtifactCatalog::builtin();
        let rule = catalog.rules.iter().find(|r| r.id == "quarterly-sales-report").unwrap();
        match rule.template.metadata() {
            ArtifactMetadata::Data { columns, format, .. } => {
                assert_eq!(columns, vec!["Month", "Revenue", "Units Sold"]);
                assert_eq!(format, "json_table_rows");
            }
            other => panic!("expected data metadata, got {other:?}"),
        }
        let rows = rule.template.payloads();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].as_row().unwrap()[1], CellValue::Integer(10500));
    }

    #[test]
    fn no_match_returns_none() {
        assert!(ArtifactCatalog::builtin().select("hello there").is_none());
        assert!(ArtifactCatalog::default().select("python script").is_none());
    }

    #[test]
    fn lookup_any_keyword() {
        let catalog = ArtifactCatalog::builtin();
        match catalog.lookup("give me some revenue numbers") {
            WholeArtifact::Data { title, content, .. } => {
                assert_eq!(title.as_deref(), Some("Quarterly Sales Report"));
                assert_eq!(content.rows.len(), 4);
            }
            other => panic!("expected data, got {other:?}"),
        }
        match catalog.lookup("an sql query") {
            WholeArtifact::Code { language, content } => {
                assert_eq!(language, "sql");
                assert!(content.starts_with("SELECT\n"));
            }
            other => panic!("expected code, got {other:?}"),
        }
    }

    #[test]
    fn lookup_fallback_message() {
        let artifact = ArtifactCatalog::builtin().lookup("weather tomorrow");
        assert_eq!(
            artifact,
            WholeArtifact::Message {
                content: NO_MATCH_MESSAGE.into()
            }
        );
        let json = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["type"], "message");
    }

    #[test]
    fn whole_data_artifact_wire_shape() {
        let json = serde_json::to_value(ArtifactCatalog::builtin().lookup("stock")).unwrap();
        assert_eq!(json["type"], "data");
        assert_eq!(json["format"], "json");
        assert_eq!(json["content"]["columns"][0], "Product ID");
        assert_eq!(json["content"]["rows"][0][3], 75);
    }

    #[test]
    fn builtin_round_trips_through_json() {
        let json = serde_json::to_string(&ArtifactCatalog::builtin()).unwrap();
        let parsed = ArtifactCatalog::from_json(&json).unwrap();
        assert_eq!(parsed, ArtifactCatalog::builtin());
    }

    #[test]
    fn load_custom_catalog_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(
            &path,
            r#"{
                "rules": [{
                    "id": "rust-hello",
                    "when": [{"all_of": [["rust"], ["hello", "example"]]}],
                    "template": {"type": "code", "language": "rust", "title": "Hello", "lines": ["fn main() {}"]}
                }]
            }"#,
        )
        .unwrap();

        let catalog = ArtifactCatalog::load(&path).unwrap();
        assert_eq!(catalog.select("rust hello").unwrap().id, "rust-hello");
        assert!(catalog.select("python script").is_none());
        assert!(matches!(catalog.lookup("anything"), WholeArtifact::Message { .. }));
    }

    #[test]
    fn invalid_catalogs_rejected() {
        let dup = r#"{"rules": [
            {"id": "a", "when": [{"all_of": [["x"]]}], "template": {"type": "code", "language": "l", "title": "t", "lines": []}},
            {"id": "a", "when": [{"all_of": [["y"]]}], "template": {"type": "code", "language": "l", "title": "t", "lines": []}}
        ]}"#;
        assert!(matches!(ArtifactCatalog::from_json(dup), Err(EngineError::Catalog(m)) if m.contains("duplicate")));

        let ragged = r#"{"rules": [
            {"id": "d", "when": [{"all_of": [["x"]]}], "template": {"type": "data", "title": "t", "format": "f", "columns": ["a", "b"], "rows": [[1]]}}
        ]}"#;
        assert!(ArtifactCatalog::from_json(ragged).is_err());

        let empty_group = r#"{"rules": [
            {"id": "e", "when": [{"all_of": [[]]}], "template": {"type": "code", "language": "l", "title": "t", "lines": []}}
        ]}"#;
        assert!(ArtifactCatalog::from_json(empty_group).is_err());

        let blank_keyword = r#"{"rules": [
            {"id": "x", "when": [{"all_of": [[""]]}], "template": {"type": "code", "language": "l", "title": "t", "lines": []}}
        ]}"#;
        assert!(matches!(ArtifactCatalog::from_json(blank_keyword), Err(EngineError::Catalog(m)) if m.contains("blank keyword")));

        let spaces_keyword = r#"{"rules": [
            {"id": "y", "when": [{"all_of": [["python"], ["  ", "script"]]}], "template": {"type": "code", "language": "l", "title": "t", "lines": []}}
        ]}"#;
        assert!(ArtifactCatalog::from_json(spaces_keyword).is_err());

        let blank_lookup = r#"{"lookups": [
            {"id": "z", "keywords": ["sales", ""], "artifact": {"type": "message", "content": "hi"}}
        ]}"#;
        assert!(matches!(ArtifactCatalog::from_json(blank_lookup), Err(EngineError::Catalog(m)) if m.contains("lookup 'z'")));

        assert!(ArtifactCatalog::from_json("not json").is_err());
        assert!(ArtifactCatalog::load(Path::new("/nonexistent/rules.json")).is_err());
    }
}
