//! Prompt construction: fixed instructions plus schema grounding plus the user's request
//!
//! Building is pure string composition. The same descriptor always yields the
//! same grounding text, table and column order preserved.

use crate::error::{PipelineError, Result};
use crate::schema::SchemaDescriptor;

/// Instruction block that precedes the schema grounding
const SYSTEM_INSTRUCTION: &str = "You are an intelligent SQL query generator and assistant for a {dialect} database. \
Your task is to generate valid SQL queries based on the user's natural language input. \
You should handle typos, capitalization inconsistencies, and ambiguous queries gracefully.

### Instructions:
1. Always generate only the SQL query as output, with no prose.
2. Do not include explanations or additional text unless the user explicitly asks for an explanation.
3. Ensure the SQL is syntactically correct for {dialect}.
4. Generate exactly one statement.

### General Guidelines:
1. Always handle typos in table names, column names, or user inputs.
2. Treat all identifiers as case-insensitive. Assume all table and column names are in lowercase.
3. If a request is ambiguous, make a best-effort guess that is consistent with the schema instead of refusing or asking questions.
4. If a request depends on data that is not explicitly in the schema, make an educated guess based on the available columns.";

const USER_PREFIX: &str = "Convert this natural language query to an SQL query: ";

/// Everything the translator needs for one call; owned by that call only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    pub system_instruction: String,
    pub schema_grounding: String,
    pub user_utterance: String,
}

impl TranslationRequest {
    /// System turn: instructions followed by the grounding text
    pub fn system_message(&self) -> String {
        format!("{}\n\n{}", self.system_instruction, self.schema_grounding)
    }

    /// User turn embedding the utterance
    pub fn user_message(&self) -> String {
        format!("{}{}", USER_PREFIX, self.user_utterance)
    }
}

/// Composes translation requests for one schema
pub struct PromptBuilder;

impl PromptBuilder {
    /// Build a request; empty or whitespace-only utterances are rejected
    pub fn build(user_utterance: &str, schema: &SchemaDescriptor) -> Result<TranslationRequest> {
        let utterance = user_utterance.trim();
        if utterance.is_empty() {
            return Err(PipelineError::InvalidInput(
                "No user input provided".to_string(),
            ));
        }

        Ok(TranslationRequest {
            system_instruction: SYSTEM_INSTRUCTION.replace("{dialect}", &schema.dialect),
            schema_grounding: Self::grounding(schema),
            user_utterance: utterance.to_string(),
        })
    }

    /// Deterministic description of every table, column and type in `schema`
    pub fn grounding(schema: &SchemaDescriptor) -> String {
        let mut text = String::from("### Database Structure:\n");
        text.push_str(&format!(
            "The schema is named `{}` (version {}) and contains the following {}:\n",
            schema.name,
            schema.version,
            if schema.tables.len() == 1 { "table" } else { "tables" }
        ));
        for (i, table) in schema.tables.iter().enumerate() {
            text.push_str(&format!("{}. `{}`", i + 1, schema.qualified_name(table)));
            if let Some(description) = &table.description {
                text.push_str(&format!(" ({})", description));
            }
            text.push_str(": Contains columns:\n");
            for column in &table.columns {
                text.push_str(&format!("   - `{}` ({})\n", column.name, column.column_type));
            }
        }

        if !schema.relationships.is_empty() {
            text.push_str("\n### Table Relationships:\n");
            for rel in &schema.relationships {
                text.push_str(&format!("- `{}` links to `{}`.\n", rel.from, rel.to));
            }
        }

        text.push_str("\n### Query Construction Rules:\n");
        text.push_str(&format!(
            "1. Use fully qualified table names by prepending `{}.` to all table names.\n",
            schema.name
        ));
        text.push_str("2. Only reference the tables and columns listed above, written in lowercase.\n");
        text.push_str("3. For calculations, use aggregate functions like SUM, AVG, or COUNT.\n");
        text.push_str(
            "4. When the request asks for totals or counts per some attribute, use the GROUP BY clause.\n",
        );
        text.push_str("5. Use filtering criteria based on the most relevant columns.\n");

        if !schema.examples.is_empty() {
            text.push_str("\n### Examples:\n");
            for example in &schema.examples {
                text.push_str(&format!(
                    "- If the user asks for '{}', {}\n",
                    example.request, example.guidance
                ));
            }
        }

        text.push_str(
            "\nGenerate only the SQL query as output unless the user explicitly asks for additional explanations.",
        );
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{invoice_schema, PromptExample, Relationship};

    #[test]
    fn test_grounding_lists_every_table_and_column() {
        let schema = invoice_schema().normalize().unwrap();
        let request = PromptBuilder::build("total quantity invoiced per product", &schema).unwrap();

        assert!(request.schema_grounding.contains("`erp.invoice`"));
        for table in &schema.tables {
            assert!(request.schema_grounding.contains(&table.name));
            for column in &table.columns {
                let line = format!("`{}` ({})", column.name, column.column_type);
                assert!(request.schema_grounding.contains(&line), "missing {}", line);
            }
        }
    }

    #[test]
    fn test_policy_clauses_present() {
        let schema = invoice_schema().normalize().unwrap();
        let request = PromptBuilder::build("net amount for each currency", &schema).unwrap();
        let system = request.system_message();

        assert!(system.contains("only the SQL query"));
        assert!(system.contains("prepending `erp.`"));
        assert!(system.contains("case-insensitive"));
        assert!(system.contains("SUM, AVG, or COUNT"));
        assert!(system.contains("GROUP BY"));
        assert!(system.contains("best-effort guess"));
        assert!(system.contains("for a duckdb database"));
    }

    #[test]
    fn test_user_message_embeds_utterance() {
        let schema = invoice_schema().normalize().unwrap();
        let request = PromptBuilder::build("  all invoices for vendor V12345 \n", &schema).unwrap();
        assert_eq!(
            request.user_message(),
            "Convert this natural language query to an SQL query: all invoices for vendor V12345"
        );
    }

    #[test]
    fn test_empty_utterance_rejected() {
        let schema = invoice_schema().normalize().unwrap();
        for input in ["", "   ", "\n\t"] {
            let err = PromptBuilder::build(input, &schema).unwrap_err();
            assert_eq!(err.kind(), "invalid_input");
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let schema = invoice_schema().normalize().unwrap();
        let a = PromptBuilder::build("count invoices", &schema).unwrap();
        let b = PromptBuilder::build("count invoices", &schema).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_optional_sections() {
        let mut schema = invoice_schema();
        assert!(!PromptBuilder::grounding(&schema).contains("### Examples"));

        schema.examples.push(PromptExample {
            request: "total quantity invoiced per product".to_string(),
            guidance: "group by `product_name` and SUM `invoiced_qty`.".to_string(),
        });
        schema.relationships.push(Relationship {
            from: "invoice.vendor_account".to_string(),
            to: "invoice.vendor_account".to_string(),
        });
        let grounding = PromptBuilder::grounding(&schema);
        assert!(grounding.contains("### Examples:"));
        assert!(grounding.contains("'total quantity invoiced per product'"));
        assert!(grounding.contains("### Table Relationships:"));
    }
}
