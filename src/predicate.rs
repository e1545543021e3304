//! Translation of predicate trees into SQL boolean expressions.
//!
//! Every value is bound into the supplied [`Params`]; the returned text only
//! ever contains quoted identifiers, operators and placeholders.

use crate::error::{Result, StorageError};
use crate::query::{Expression, Predicate};
use crate::statement::ident;
use crate::value::{Params, Value};

/// Translate a predicate into a SQL boolean expression.
///
/// Top-level expressions are joined with `AND`. An empty predicate yields an
/// empty string and the caller must omit the `WHERE` clause.
pub fn translate_predicate(predicate: &Predicate, params: &mut Params) -> Result<String> {
    let clauses = predicate
        .expressions()
        .iter()
        .map(|exp| translate_expression(exp, params))
        .collect::<Result<Vec<_>>>()?;
    Ok(clauses.join(" AND "))
}

/// Translate a single expression, recursing into logical groups.
pub fn translate_expression(exp: &Expression, params: &mut Params) -> Result<String> {
    match exp {
        Expression::And(children) => group(children, " AND ", "1", params),
        Expression::Or(children) => group(children, " OR ", "0", params),
        Expression::Equal { field, value } => equality(field, value, false, params),
        Expression::NotEqual { field, value } => equality(field, value, true, params),
        Expression::GreaterThan { field, value } => comparison(field, ">", value, params),
        Expression::GreaterOrEqual { field, value } => comparison(field, ">=", value, params),
        Expression::LowerThan { field, value } => comparison(field, "<", value, params),
        Expression::LowerOrEqual { field, value } => comparison(field, "<=", value, params),
        Expression::In { field, values } => {
            Ok(format!("{} IN ({})", ident(field)?, params.bind_all(values)?))
        }
        Expression::NotIn { field, values } => {
            Ok(format!("{} NOT IN ({})", ident(field)?, params.bind_all(values)?))
        }
        Expression::Exists { field } => Ok(format!("{} IS NOT NULL", ident(field)?)),
        Expression::NotExists { field } => Ok(format!("{} IS NULL", ident(field)?)),
        Expression::Regex { field, .. } => Err(StorageError::not_implemented(format!(
            "unsupported predicate: regex on {}",
            field
        ))),
        Expression::All => Ok("1".to_string()),
    }
}

// An empty group is its identity element: true for AND, false for OR.
fn group(children: &[Expression], sep: &str, empty: &str, params: &mut Params) -> Result<String> {
    if children.is_empty() {
        return Ok(format!("({})", empty));
    }
    let parts = children
        .iter()
        .map(|child| translate_expression(child, params))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("({})", parts.join(sep)))
}

fn equality(field: &str, value: &Value, negated: bool, params: &mut Params) -> Result<String> {
    let column = ident(field)?;
    match value {
        Value::Text(s) if s.contains('*') => {
            let placeholder = params.bind_owned(Value::Text(like_pattern(s)))?;
            let op = if negated { "NOT LIKE" } else { "LIKE" };
            Ok(format!("{} {} {} ESCAPE '\\'", column, op, placeholder))
        }
        _ => {
            let placeholder = params.bind(value)?;
            let op = if negated { "IS NOT" } else { "IS" };
            Ok(format!("{} {} {}", column, op, placeholder))
        }
    }
}

fn comparison(field: &str, op: &str, value: &Value, params: &mut Params) -> Result<String> {
    Ok(format!("{} {} {}", ident(field)?, op, params.bind(value)?))
}

/// Turn a `*` wildcard string into a LIKE pattern using `\` as escape.
pub fn like_pattern(s: &str) -> String {
    let mut pattern = String::with_capacity(s.len() + 4);
    for c in s.chars() {
        match c {
            '\\' => pattern.push_str("\\\\"),
            '%' => pattern.push_str("\\%"),
            '_' => pattern.push_str("\\_"),
            '*' => pattern.push('%'),
            c => pattern.push(c),
        }
    }
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translate(predicate: Predicate) -> (String, Vec<Value>) {
        let mut params = Params::new();
        let sql = translate_predicate(&predicate, &mut params).unwrap();
        (sql, params.values)
    }

    #[test]
    fn test_empty_predicate() {
        assert_eq!(translate(Predicate::new()), (String::new(), vec![]));
    }

    #[test]
    fn test_nesting_keeps_grouping() {
        let a = Expression::equal("a", 1);
        let b = Expression::equal("b", 2);
        let c = Expression::equal("c", 3);

        let (left, _) = translate(
            Expression::or([Expression::and([a.clone(), b.clone()]), c.clone()]).into(),
        );
        assert_eq!(left, r#"(("a" IS ?1 AND "b" IS ?2) OR "c" IS ?3)"#);

        let (right, _) = translate(Expression::and([a, Expression::or([b, c])]).into());
        assert_eq!(right, r#"("a" IS ?1 AND ("b" IS ?2 OR "c" IS ?3))"#);
    }

    #[test]
    fn test_top_level_expressions_are_anded() {
        let (sql, params) = translate(
            Predicate::new()
                .with(Expression::greater_than("age", 18))
                .with(Expression::lower_or_equal("age", 65)),
        );
        assert_eq!(sql, r#""age" > ?1 AND "age" <= ?2"#);
        assert_eq!(params, vec![Value::Integer(18), Value::Integer(65)]);
    }

    #[test]
    fn test_wildcard_string_uses_like() {
        let (sql, params) = translate(Expression::equal("name", "al*_x").into());
        assert_eq!(sql, r#""name" LIKE ?1 ESCAPE '\'"#);
        assert_eq!(params, vec![Value::from("al%\\_x")]);

        let (sql, _) = translate(Expression::not_equal("name", "*bob").into());
        assert_eq!(sql, r#""name" NOT LIKE ?1 ESCAPE '\'"#);
    }

    #[test]
    fn test_plain_equality_uses_is() {
        let (sql, params) = translate(Expression::equal("name", "alice").into());
        assert_eq!(sql, r#""name" IS ?1"#);
        assert_eq!(params, vec![Value::from("alice")]);

        let (sql, _) = translate(Expression::not_equal("public", true).into());
        assert_eq!(sql, r#""public" IS NOT ?1"#);
    }

    #[test]
    fn test_membership() {
        let (sql, params) = translate(Expression::is_in("id", [1, 2, 3]).into());
        assert_eq!(sql, r#""id" IN (?1, ?2, ?3)"#);
        assert_eq!(params.len(), 3);

        let (sql, _) = translate(Expression::not_in("id", ["a"]).into());
        assert_eq!(sql, r#""id" NOT IN (?1)"#);
    }

    #[test]
    fn test_existence_and_empty_groups() {
        let (sql, params) = translate(
            Predicate::new()
                .with(Expression::exists("body"))
                .with(Expression::not_exists("user"))
                .with(Expression::And(vec![]))
                .with(Expression::Or(vec![])),
        );
        assert_eq!(sql, r#""body" IS NOT NULL AND "user" IS NULL AND (1) AND (0)"#);
        assert!(params.is_empty());
    }

    #[test]
    fn test_unsupported_shapes() {
        let mut params = Params::new();
        let err = translate_predicate(
            &Expression::and([Expression::equal("a", 1), Expression::regex("name", "^a")]).into(),
            &mut params,
        )
        .unwrap_err();
        assert!(matches!(err, StorageError::NotImplemented(_)));

        let err = translate_predicate(
            &Expression::equal("a", Value::List(vec![])).into(),
            &mut Params::new(),
        )
        .unwrap_err();
        assert!(matches!(err, StorageError::NotImplemented(_)));

        let err = translate_predicate(
            &Expression::equal("a; DROP TABLE x", 1).into(),
            &mut Params::new(),
        )
        .unwrap_err();
        assert!(matches!(err, StorageError::NotImplemented(_)));
    }

    #[test]
    fn test_like_pattern_escapes() {
        assert_eq!(like_pattern("100%"), "100\\%");
        assert_eq!(like_pattern("a\\b*"), "a\\\\b%");
    }
}
