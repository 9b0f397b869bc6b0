//! Schema-aware SQL completion and hover.
//!
//! Providers are immutable once built: a schema change produces new providers
//! rather than mutating the registered ones.

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

use crate::schema::{ColumnDef, SchemaSnapshot, TableDef};

const KEYWORDS: [(&str, &str); 32] = [
    ("SELECT", "Retrieve rows from one or more tables."),
    ("FROM", "Name the tables a query reads from."),
    ("WHERE", "Filter rows with a boolean condition."),
    ("GROUP BY", "Collapse rows sharing the listed expressions into groups."),
    ("HAVING", "Filter groups produced by GROUP BY."),
    ("ORDER BY", "Sort the result set."),
    ("LIMIT", "Cap the number of returned rows."),
    ("OFFSET", "Skip rows before returning results."),
    ("JOIN", "Combine rows from two tables on a condition."),
    ("LEFT JOIN", "Keep every row of the left table, matching the right when possible."),
    ("INNER JOIN", "Keep only rows with a match in both tables."),
    ("ON", "Join condition."),
    ("AS", "Give a column or table an alias."),
    ("DISTINCT", "Remove duplicate rows from the result."),
    ("AND", "Logical conjunction."),
    ("OR", "Logical disjunction."),
    ("NOT", "Logical negation."),
    ("IN", "Test membership in a list or subquery."),
    ("BETWEEN", "Test that a value lies within an inclusive range."),
    ("LIKE", "Match a string against a pattern with % and _."),
    ("IS NULL", "Test for a missing value."),
    ("INSERT INTO", "Add rows to a table."),
    ("VALUES", "Literal rows for INSERT."),
    ("UPDATE", "Modify existing rows."),
    ("SET", "Column assignments for UPDATE."),
    ("DELETE FROM", "Remove rows from a table."),
    ("CREATE TABLE", "Define a new table."),
    ("UNION", "Concatenate the results of two queries, removing duplicates."),
    ("CASE", "Conditional expression: CASE WHEN cond THEN value ELSE other END."),
    ("ASC", "Ascending sort order."),
    ("DESC", "Descending sort order."),
    ("EXISTS", "Test whether a subquery returns any row."),
];

const FUNCTIONS: [(&str, &str); 12] = [
    ("COUNT", "COUNT(expr): number of non-null values; COUNT(*) counts rows."),
    ("SUM", "SUM(expr): total of a numeric column."),
    ("AVG", "AVG(expr): arithmetic mean of a numeric column."),
    ("MIN", "MIN(expr): smallest value."),
    ("MAX", "MAX(expr): largest value."),
    ("ROUND", "ROUND(x, digits): round to the given precision."),
    ("LENGTH", "LENGTH(text): number of characters."),
    ("UPPER", "UPPER(text): convert to upper case."),
    ("LOWER", "LOWER(text): convert to lower case."),
    ("COALESCE", "COALESCE(a, b, ...): first non-null argument."),
    ("SUBSTR", "SUBSTR(text, start, length): extract part of a string."),
    ("ABS", "ABS(x): absolute value."),
];

/// Keywords after which only table names make sense.
const TABLE_CONTEXT_KEYWORDS: [&str; 5] = ["FROM", "JOIN", "INTO", "UPDATE", "TABLE"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CompletionKind {
    Column,
    Table,
    Function,
    Keyword,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionItem {
    pub label: String,
    pub kind: CompletionKind,
    pub detail: Option<String>,
    pub documentation: Option<String>,
    pub insert_text: String,
    /// Byte range of the text the insertion replaces.
    pub replace: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hover {
    pub contents: Vec<String>,
    pub range: Range<usize>,
}

pub trait CompletionProvider: fmt::Debug {
    fn completions(&self, text: &str, offset: usize) -> Vec<CompletionItem>;

    fn is_completion_trigger(&self, typed: char) -> bool {
        typed == '.' || typed == '_' || typed.is_alphanumeric()
    }
}

pub trait HoverProvider: fmt::Debug {
    fn hover(&self, text: &str, offset: usize) -> Option<Hover>;
}

#[derive(Debug, Clone)]
pub struct SqlCompletionProvider {
    schema: Option<SchemaSnapshot>,
}

impl SqlCompletionProvider {
    #[must_use]
    pub fn new(schema: Option<SchemaSnapshot>) -> Self {
        Self { schema }
    }

    fn table_item(table: &TableDef, replace: &Range<usize>) -> CompletionItem {
        CompletionItem {
            label: table.table_name.clone(),
            kind: CompletionKind::Table,
            detail: Some(format!("table · {} columns", table.columns.len())),
            documentation: Some(describe_table(table).join("\n")),
            insert_text: table.table_name.clone(),
            replace: replace.clone(),
        }
    }

    fn column_item(table: &TableDef, column: &ColumnDef, replace: &Range<usize>) -> CompletionItem {
        CompletionItem {
            label: column.name.clone(),
            kind: CompletionKind::Column,
            detail: Some(format!("{} · {}", table.table_name, column.data_type)),
            documentation: Some(describe_column(table, column).join("\n")),
            insert_text: column.name.clone(),
            replace: replace.clone(),
        }
    }
}

impl CompletionProvider for SqlCompletionProvider {
    fn completions(&self, text: &str, offset: usize) -> Vec<CompletionItem> {
        let offset = clamp_offset(text, offset);
        let start = word_start(text, offset);
        let prefix = &text[start..offset];
        let replace = start..offset;
        let mut items = Vec::new();

        if let Some(qualifier) = qualifier_before(text, start) {
            let Some(schema) = &self.schema else {
                return items;
            };
            let aliases = collect_aliases(text);
            let table_name = aliases
                .get(&qualifier.to_ascii_lowercase())
                .map_or(qualifier, String::as_str);
            if let Some(table) = schema.table(table_name) {
                items.extend(
                    table
                        .columns
                        .iter()
                        .filter(|column| starts_with_ignore_case(&column.name, prefix))
                        .map(|column| Self::column_item(table, column, &replace)),
                );
            }
            return items;
        }

        let table_context = previous_word(text, start).is_some_and(|word| {
            TABLE_CONTEXT_KEYWORDS
                .iter()
                .any(|keyword| keyword.eq_ignore_ascii_case(word))
        });

        if let Some(schema) = &self.schema {
            if !table_context {
                items.extend(
                    schema
                        .columns()
                        .filter(|(_, column)| starts_with_ignore_case(&column.name, prefix))
                        .map(|(table, column)| Self::column_item(table, column, &replace)),
                );
            }
            items.extend(
                schema
                    .tables
                    .iter()
                    .filter(|table| starts_with_ignore_case(&table.table_name, prefix))
                    .map(|table| Self::table_item(table, &replace)),
            );
        }

        if table_context {
            return items;
        }

        items.extend(
            FUNCTIONS
                .iter()
                .filter(|(name, _)| starts_with_ignore_case(name, prefix))
                .map(|(name, doc)| CompletionItem {
                    label: (*name).to_string(),
                    kind: CompletionKind::Function,
                    detail: Some("function".to_string()),
                    documentation: Some((*doc).to_string()),
                    insert_text: format!("{name}()"),
                    replace: replace.clone(),
                }),
        );
        items.extend(
            KEYWORDS
                .iter()
                .filter(|(keyword, _)| starts_with_ignore_case(keyword, prefix))
                .map(|(keyword, doc)| CompletionItem {
                    label: (*keyword).to_string(),
                    kind: CompletionKind::Keyword,
                    detail: Some("keyword".to_string()),
                    documentation: Some((*doc).to_string()),
                    insert_text: (*keyword).to_string(),
                    replace: replace.clone(),
                }),
        );
        items
    }
}

#[derive(Debug, Clone)]
pub struct SqlHoverProvider {
    schema: Option<SchemaSnapshot>,
}

impl SqlHoverProvider {
    #[must_use]
    pub fn new(schema: Option<SchemaSnapshot>) -> Self {
        Self { schema }
    }
}

impl HoverProvider for SqlHoverProvider {
    fn hover(&self, text: &str, offset: usize) -> Option<Hover> {
        let offset = clamp_offset(text, offset);
        let start = word_start(text, offset);
        let end = word_end(text, offset);
        if start == end {
            return None;
        }
        let word = &text[start..end];
        let range = start..end;

        if let Some(schema) = &self.schema {
            if let Some(qualifier) = qualifier_before(text, start) {
                let aliases = collect_aliases(text);
                let table_name = aliases
                    .get(&qualifier.to_ascii_lowercase())
                    .map_or(qualifier, String::as_str);
                if let Some((table, column)) = schema
                    .table(table_name)
                    .and_then(|table| table.column(word).map(|column| (table, column)))
                {
                    return Some(Hover {
                        contents: describe_column(table, column),
                        range,
                    });
                }
            }

            if let Some(table) = schema.table(word) {
                return Some(Hover {
                    contents: describe_table(table),
                    range,
                });
            }

            let mut contents = Vec::new();
            for (table, column) in schema
                .columns()
                .filter(|(_, column)| column.name.eq_ignore_ascii_case(word))
            {
                if !contents.is_empty() {
                    contents.push(String::new());
                }
                contents.extend(describe_column(table, column));
            }
            if !contents.is_empty() {
                return Some(Hover { contents, range });
            }
        }

        FUNCTIONS
            .iter()
            .chain(KEYWORDS.iter())
            .find(|(name, _)| name.eq_ignore_ascii_case(word))
            .map(|(name, doc)| Hover {
                contents: vec![format!("**{name}**"), (*doc).to_string()],
                range,
            })
    }
}

fn describe_table(table: &TableDef) -> Vec<String> {
    let mut lines = vec![format!("**{}** (table)", table.table_name)];
    if let Some(comment) = &table.comment {
        lines.push(comment.clone());
    }
    for column in &table.columns {
        let key = if column.is_primary { " PK" } else { "" };
        lines.push(format!("- {}: {}{key}", column.name, column.data_type));
    }
    lines
}

fn describe_column(table: &TableDef, column: &ColumnDef) -> Vec<String> {
    let mut lines = vec![
        format!("**{}.{}** (column)", table.table_name, column.name),
        format!("type: {}", column.data_type),
    ];
    if column.is_primary {
        lines.push("primary key".to_string());
    }
    lines.push(if column.nullable { "nullable" } else { "not null" }.to_string());
    if let Some(reference) = &column.references {
        lines.push(format!(
            "references {}.{}",
            reference.table, reference.column
        ));
    }
    if let Some(comment) = &column.comment {
        lines.push(comment.clone());
    }
    lines
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

fn clamp_offset(text: &str, offset: usize) -> usize {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

fn word_start(text: &str, offset: usize) -> usize {
    text[..offset]
        .char_indices()
        .rev()
        .take_while(|(_, ch)| is_word_char(*ch))
        .last()
        .map_or(offset, |(index, _)| index)
}

fn word_end(text: &str, offset: usize) -> usize {
    text[offset..]
        .char_indices()
        .find(|(_, ch)| !is_word_char(*ch))
        .map_or(text.len(), |(index, _)| offset + index)
}

/// `users` for a cursor sitting after `users.`.
fn qualifier_before(text: &str, word_start_offset: usize) -> Option<&str> {
    let before = text[..word_start_offset].strip_suffix('.')?;
    let start = word_start(before, before.len());
    let qualifier = &before[start..];
    (!qualifier.is_empty()).then_some(qualifier)
}

fn previous_word(text: &str, word_start_offset: usize) -> Option<&str> {
    let before = text[..word_start_offset].trim_end();
    let start = word_start(before, before.len());
    let word = &before[start..];
    (!word.is_empty()).then_some(word)
}

fn is_keyword(word: &str) -> bool {
    KEYWORDS
        .iter()
        .flat_map(|(keyword, _)| keyword.split(' '))
        .any(|part| part.eq_ignore_ascii_case(word))
}

fn starts_with_ignore_case(candidate: &str, prefix: &str) -> bool {
    candidate
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Alias → table name for `FROM users u` / `JOIN orders AS o` patterns.
fn collect_aliases(text: &str) -> HashMap<String, String> {
    let words = text
        .split(|ch: char| !is_word_char(ch) && ch != '.')
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>();
    let mut aliases = HashMap::new();

    for (index, word) in words.iter().enumerate() {
        if !(word.eq_ignore_ascii_case("FROM") || word.eq_ignore_ascii_case("JOIN")) {
            continue;
        }
        let Some(table) = words.get(index + 1) else {
            continue;
        };
        let mut alias_index = index + 2;
        if words
            .get(alias_index)
            .is_some_and(|word| word.eq_ignore_ascii_case("AS"))
        {
            alias_index += 1;
        }
        if let Some(alias) = words.get(alias_index) {
            if !is_keyword(alias) && !alias.contains('.') {
                aliases.insert(alias.to_ascii_lowercase(), (*table).to_string());
            }
        }
    }
    aliases
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{
        CompletionKind, CompletionProvider, HoverProvider, SqlCompletionProvider, SqlHoverProvider,
    };
    use crate::schema::tests::sample_structure;

    fn completion_provider() -> SqlCompletionProvider {
        SqlCompletionProvider::new(Some(Arc::new(sample_structure())))
    }

    fn labels(provider: &SqlCompletionProvider, text: &str) -> Vec<String> {
        provider
            .completions(text, text.len())
            .into_iter()
            .map(|item| item.label)
            .collect()
    }

    #[test]
    fn table_context_offers_only_tables() {
        let provider = completion_provider();
        assert_eq!(labels(&provider, "SELECT * FROM "), vec!["users", "orders"]);
        assert_eq!(labels(&provider, "select * from us"), vec!["users"]);
    }

    #[test]
    fn qualified_prefix_offers_table_columns() {
        let provider = completion_provider();
        assert_eq!(
            labels(&provider, "SELECT orders."),
            vec!["id", "user_id", "total"]
        );
        assert_eq!(labels(&provider, "SELECT orders.t"), vec!["total"]);
    }

    #[test]
    fn aliases_resolve_to_tables() {
        let provider = completion_provider();
        let text = "SELECT o.u FROM orders AS o";
        let items = provider.completions(text, "SELECT o.u".len());
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].label, "user_id");
        assert_eq!(items[0].replace, 9..10);
    }

    #[test]
    fn general_context_mixes_schema_functions_and_keywords() {
        let provider = completion_provider();
        let items = provider.completions("SELECT e", "SELECT e".len());
        let kinds = items
            .iter()
            .map(|item| (item.label.as_str(), item.kind))
            .collect::<Vec<_>>();
        assert!(kinds.contains(&("email", CompletionKind::Column)));
        assert!(kinds.contains(&("EXISTS", CompletionKind::Keyword)));

        let functions = provider.completions("SELECT cou", "SELECT cou".len());
        assert_eq!(functions[0].kind, CompletionKind::Function);
        assert_eq!(functions[0].insert_text, "COUNT()");
    }

    #[test]
    fn missing_schema_still_serves_keywords() {
        let provider = SqlCompletionProvider::new(None);
        assert_eq!(labels(&provider, "SEL"), vec!["SELECT"]);
        assert!(labels(&provider, "SELECT users.").is_empty());
    }

    #[test]
    fn hover_describes_tables_columns_and_keywords() {
        let provider = SqlHoverProvider::new(Some(Arc::new(sample_structure())));
        let text = "SELECT o.user_id FROM orders o WHERE email LIKE '%x'";

        let column = provider
            .hover(text, text.find("user_id").expect("column") + 2)
            .expect("column hover");
        assert_eq!(column.contents[0], "**orders.user_id** (column)");
        assert!(column.contents.contains(&"references users.id".to_string()));

        let table = provider
            .hover(text, text.find("orders").expect("table") + 1)
            .expect("table hover");
        assert_eq!(table.contents[0], "**orders** (table)");

        let email = provider
            .hover(text, text.find("email").expect("email"))
            .expect("email hover");
        assert_eq!(email.contents[0], "**users.email** (column)");

        let keyword = provider
            .hover(text, text.find("LIKE").expect("keyword"))
            .expect("keyword hover");
        assert_eq!(keyword.contents[0], "**LIKE**");

        assert!(provider.hover("   ", 1).is_none());
    }

    #[test]
    fn trigger_characters() {
        let provider = completion_provider();
        assert!(provider.is_completion_trigger('.'));
        assert!(provider.is_completion_trigger('a'));
        assert!(!provider.is_completion_trigger(' '));
    }
}
