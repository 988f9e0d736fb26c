//! Table keywords
//!
//! The step locator addresses the `<table>`. Rows are zero-based positions
//! in `tbody`; `options.column` is either a zero-based position or a header
//! text matched case-insensitively against `thead th`.

use serde_json::{json, Value};
use std::cmp::Ordering;
use testforge_common::value_to_text;

use super::actions::StepContext;
use super::keyword::Keyword;
use crate::assertion::as_number;
use crate::error::{EngineError, EngineResult};

pub async fn execute(keyword: Keyword, ctx: &mut StepContext<'_>) -> EngineResult<Option<Value>> {
    let table = ctx.selector()?;

    match keyword {
        Keyword::TableGetCell => {
            let cell = cell_selector(ctx, &table).await?;
            let text = ctx.session.locator_call(&cell, "innerText", vec![]).await?;
            Ok(Some(text))
        }
        Keyword::TableClickCell => {
            let cell = cell_selector(ctx, &table).await?;
            ctx.session.locator_call(&cell, "click", vec![]).await?;
            Ok(None)
        }
        Keyword::TableAssertCell => {
            let expected = ctx.value()?;
            let cell = cell_selector(ctx, &table).await?;
            let actual = value_to_text(&ctx.session.locator_call(&cell, "innerText", vec![]).await?);
            if actual.trim() == expected.trim() {
                Ok(None)
            } else {
                Err(EngineError::AssertionFailed(format!(
                    "table cell: expected '{}', got '{}'",
                    expected.trim(),
                    actual.trim()
                )))
            }
        }
        Keyword::TableGetRowCount => Ok(Some(json!(row_count(ctx, &table).await?))),
        Keyword::TableAssertRowCount => {
            let expected = ctx
                .step
                .value
                .as_ref()
                .and_then(as_number)
                .ok_or_else(|| EngineError::MissingValue {
                    step: ctx.step.id.clone(),
                })? as u64;
            let actual = row_count(ctx, &table).await?;
            if actual == expected {
                Ok(None)
            } else {
                Err(EngineError::AssertionFailed(format!(
                    "table row count: expected {}, got {}",
                    expected, actual
                )))
            }
        }
        Keyword::TableGetColumn => {
            let column = column_index(ctx, &table).await?;
            let texts = column_texts(ctx, &table, column).await?;
            Ok(Some(json!(texts)))
        }
        Keyword::TableFindRow => {
            let needle = ctx.value()?;
            let column = column_index(ctx, &table).await?;
            let texts = column_texts(ctx, &table, column).await?;
            let row = texts
                .iter()
                .position(|t| t.trim() == needle.trim())
                .ok_or_else(|| EngineError::Table(format!("no row with '{}' in column {}", needle, column)))?;
            Ok(Some(json!(row)))
        }
        Keyword::TableSortBy => {
            let column = column_index(ctx, &table).await?;
            let header = format!("{} >> css=thead th >> nth={}", table, column);
            let clicks = if ctx.option_text("order").as_deref() == Some("desc") { 2 } else { 1 };
            for _ in 0..clicks {
                ctx.session.locator_call(&header, "click", vec![]).await?;
            }
            Ok(None)
        }
        Keyword::TableFilter => {
            let needle = ctx.value()?.to_lowercase();
            let column = column_index(ctx, &table).await?;
            let rows: Vec<usize> = column_texts(ctx, &table, column)
                .await?
                .iter()
                .enumerate()
                .filter(|(_, t)| t.to_lowercase().contains(&needle))
                .map(|(i, _)| i)
                .collect();
            Ok(Some(json!(rows)))
        }
        Keyword::TableAssertSorted => {
            let column = column_index(ctx, &table).await?;
            let texts = column_texts(ctx, &table, column).await?;
            let descending = ctx.option_text("order").as_deref() == Some("desc");
            check_sorted(&texts, descending)?;
            Ok(None)
        }
        other => Err(EngineError::UnknownKeyword(other.name())),
    }
}

async fn row_count(ctx: &mut StepContext<'_>, table: &str) -> EngineResult<u64> {
    let rows = format!("{} >> css=tbody tr", table);
    let count = ctx.session.locator_call(&rows, "count", vec![]).await?;
    as_number(&count)
        .map(|n| n as u64)
        .ok_or_else(|| EngineError::Driver(format!("count returned {}", count)))
}

async fn cell_selector(ctx: &mut StepContext<'_>, table: &str) -> EngineResult<String> {
    let row = ctx
        .option_number("row")
        .ok_or_else(|| EngineError::Table("missing option 'row'".to_string()))? as usize;
    let column = column_index(ctx, table).await?;
    Ok(format!("{} >> css=tbody tr >> nth={} >> css=td >> nth={}", table, row, column))
}

async fn column_index(ctx: &mut StepContext<'_>, table: &str) -> EngineResult<usize> {
    let column = ctx
        .option("column")
        .cloned()
        .ok_or_else(|| EngineError::Table("missing option 'column'".to_string()))?;

    if let Some(n) = column.as_u64() {
        return Ok(n as usize);
    }

    let name = value_to_text(&column);
    let headers = texts(ctx.session.locator_call(&format!("{} >> css=thead th", table), "allInnerTexts", vec![]).await?);
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name.trim()))
        .ok_or_else(|| EngineError::Table(format!("column '{}' not found in headers {:?}", name, headers)))
}

async fn column_texts(ctx: &mut StepContext<'_>, table: &str, column: usize) -> EngineResult<Vec<String>> {
    let cells = format!("{} >> css=tbody tr > td:nth-child({})", table, column + 1);
    Ok(texts(ctx.session.locator_call(&cells, "allInnerTexts", vec![]).await?))
}

fn texts(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().map(value_to_text).collect(),
        _ => Vec::new(),
    }
}

/// Numeric order when every cell parses as a number, otherwise case-insensitive text
fn check_sorted(texts: &[String], descending: bool) -> EngineResult<()> {
    let numbers: Option<Vec<f64>> = texts.iter().map(|t| t.trim().parse::<f64>().ok()).collect();

    for i in 1..texts.len() {
        let ordering = match &numbers {
            Some(n) => n[i - 1].partial_cmp(&n[i]).unwrap_or(Ordering::Equal),
            None => texts[i - 1].trim().to_lowercase().cmp(&texts[i].trim().to_lowercase()),
        };
        let in_order = if descending {
            ordering != Ordering::Less
        } else {
            ordering != Ordering::Greater
        };
        if !in_order {
            return Err(EngineError::AssertionFailed(format!(
                "column not sorted {}: '{}' before '{}' at row {}",
                if descending { "descending" } else { "ascending" },
                texts[i - 1].trim(),
                texts[i].trim(),
                i
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sorted_numeric_and_text() {
        assert!(check_sorted(&strings(&["2", "10", "10", "33"]), false).is_ok());
        assert!(check_sorted(&strings(&["33", "10", "2"]), true).is_ok());
        assert!(check_sorted(&strings(&["apple", "Banana", "cherry"]), false).is_ok());

        let err = check_sorted(&strings(&["b", "a"]), false).unwrap_err();
        assert!(err.to_string().contains("'b' before 'a'"));
    }

    #[test]
    fn test_texts_from_driver_value() {
        assert_eq!(texts(json!(["a", 1])), strings(&["a", "1"]));
        assert!(texts(json!(null)).is_empty());
    }
}
