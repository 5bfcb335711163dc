use crate::filter::{CompiledComparison, CompiledFilter};
use crate::tree::FilterTree;
use colored::Colorize;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, ContentArrangement, Table};
use serde_json::json;
use std::fmt::Write;

pub fn create_styled_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(|h| Cell::new(h)).collect::<Vec<_>>());
    table
}

fn flag(set: bool) -> &'static str {
    if set { "yes" } else { "" }
}

fn comparison_cells(comparison: &CompiledComparison) -> [String; 4] {
    [
        comparison.field().to_string(),
        comparison.operator().to_string(),
        comparison.raw_value().unwrap_or("-").to_string(),
        flag(comparison.is_negated()).to_string(),
    ]
}

/// One row per comparison of the compiled filter.
pub fn compiled_table(filter: &CompiledFilter) -> Table {
    let mut table = create_styled_table(&[
        "#",
        "Join",
        "Field",
        "Operator",
        "Value",
        "Not",
        "Clause not",
    ]);
    for (index, expression) in filter.expressions().iter().enumerate() {
        let clause_not = flag(expression.is_negated());
        let [field, op, value, not] = comparison_cells(expression.left());
        table.add_row(vec![
            Cell::new(index + 1),
            Cell::new(""),
            Cell::new(field),
            Cell::new(op),
            Cell::new(value),
            Cell::new(not),
            Cell::new(clause_not),
        ]);
        if let (Some(connective), Some(right)) = (expression.connective(), expression.right()) {
            let [field, op, value, not] = comparison_cells(right);
            table.add_row(vec![
                Cell::new(""),
                Cell::new(connective),
                Cell::new(field),
                Cell::new(op),
                Cell::new(value),
                Cell::new(not),
                Cell::new(""),
            ]);
        }
    }
    table
}

pub fn explain_text(filter: &CompiledFilter, tree: &FilterTree) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", "Compiled filter".bold().bright_blue());
    let _ = writeln!(out, "{filter}");
    if filter.is_negated() {
        let _ = writeln!(out, "{}", "(whole filter negated)".yellow());
    }
    let _ = writeln!(out, "{}", compiled_table(filter));
    let _ = writeln!(out, "\n{}", "Filter tree".bold().bright_blue());
    out.push_str(&tree.outline());
    out
}

pub fn explain_json(text: &str, filter: &CompiledFilter, tree: &FilterTree) -> serde_json::Value {
    json!({
        "filter": text,
        "rendered": filter.to_string(),
        "compiled": filter,
        "tree": tree.to_json(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AspectRegistry;
    use crate::filter::compile_str;
    use crate::tree::to_tree;

    #[test]
    fn test_explain_json_shape() {
        let filter = compile_str("pid > 1000 && name matches gl").unwrap();
        let tree = to_tree(&filter, &AspectRegistry::builtin());
        let value = explain_json("pid > 1000 && name matches gl", &filter, &tree);

        let expression = &value["compiled"]["expressions"][0];
        assert_eq!(expression["connective"], "and");
        assert_eq!(expression["left"]["operator"], "greater_than");
        assert_eq!(value["tree"]["children"][0]["kind"], "And");
    }

    #[test]
    fn test_compiled_table_lists_every_comparison() {
        let filter = compile_str("a == 1 || b == 2 c present").unwrap();
        let rendered = compiled_table(&filter).to_string();
        for needle in ["a", "b", "c", "||", "present"] {
            assert!(rendered.contains(needle), "missing {needle} in\n{rendered}");
        }
    }
}
