//! Repository-facing query objects and their PostgreSQL rendering.

use sqlx::{Postgres, QueryBuilder};

use crate::odata::edm::EntityType;
use crate::odata::error::{ODataError, Result};
use crate::odata::filter::{CompareOp, Expr, Literal, MatchFn, Operand};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    fn sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub property: String,
    pub direction: Direction,
}

/// Filter, ordering and paging handed to a repository.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Specification {
    pub filter: Option<Expr>,
    pub order_by: Vec<OrderBy>,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl Specification {
    /// Specification matching every row.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: Option<Expr>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_order_by(mut self, order_by: Vec<OrderBy>) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn with_paging(mut self, skip: u64, limit: Option<u64>) -> Self {
        self.skip = skip;
        self.limit = limit;
        self
    }

    /// Same filter, no ordering nor paging.
    pub fn count_only(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            ..Self::default()
        }
    }

    /// Append ` WHERE ...` when a filter is present.
    pub fn push_where(&self, ty: &EntityType, qb: &mut QueryBuilder<'_, Postgres>) -> Result<()> {
        if let Some(filter) = &self.filter {
            qb.push(" WHERE ");
            push_expr(filter, ty, qb)?;
        }
        Ok(())
    }

    /// Append ` ORDER BY ...`, always ending with the key for stable pages.
    pub fn push_order_by(&self, ty: &EntityType, qb: &mut QueryBuilder<'_, Postgres>) -> Result<()> {
        qb.push(" ORDER BY ");
        for order in &self.order_by {
            let property = ty
                .property(&order.property)
                .ok_or_else(|| ODataError::bad_request(format!("unknown property '{}'", order.property)))?;
            qb.push(quote(property.column))
                .push(" ")
                .push(order.direction.sql())
                .push(", ");
        }
        qb.push(quote(ty.key.column)).push(" ASC");
        Ok(())
    }

    /// Append ` LIMIT ... OFFSET ...`.
    pub fn push_paging(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(limit) = self.limit {
            qb.push(" LIMIT ").push_bind(to_i64(limit));
        }
        if self.skip > 0 {
            qb.push(" OFFSET ").push_bind(to_i64(self.skip));
        }
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Columns come from static metadata only, quoting guards reserved words.
fn quote(column: &str) -> String {
    format!("\"{column}\"")
}

fn push_expr(expr: &Expr, ty: &EntityType, qb: &mut QueryBuilder<'_, Postgres>) -> Result<()> {
    match expr {
        Expr::And(left, right) | Expr::Or(left, right) => {
            let keyword = if matches!(expr, Expr::And(..)) { " AND " } else { " OR " };
            qb.push("(");
            push_expr(left, ty, qb)?;
            qb.push(keyword);
            push_expr(right, ty, qb)?;
            qb.push(")");
        },
        Expr::Not(inner) => {
            qb.push("NOT (");
            push_expr(inner, ty, qb)?;
            qb.push(")");
        },
        Expr::Compare { op, left, right } => push_compare(*op, left, right, ty, qb)?,
        Expr::In { operand, values } => {
            let nullable = is_nullable(operand, ty);
            if nullable {
                qb.push("COALESCE(");
            }
            push_operand(operand, ty, qb)?;
            qb.push(" IN (");
            let mut separated = qb.separated(", ");
            for value in values {
                match value {
                    Literal::Null => {
                        return Err(ODataError::bad_request("'in' list cannot contain null"));
                    },
                    Literal::Boolean(b) => separated.push_bind(*b),
                    Literal::Integer(i) => separated.push_bind(*i),
                    Literal::Decimal(d) => separated.push_bind(*d),
                    Literal::String(s) => separated.push_bind(s.clone()),
                    Literal::DateTime(dt) => separated.push_bind(*dt),
                };
            }
            qb.push(")");
            if nullable {
                qb.push(", FALSE)");
            }
        },
        Expr::Match {
            function,
            operand,
            pattern,
        } => {
            let escaped = escape_like(pattern);
            let pattern = match function {
                MatchFn::Contains => format!("%{escaped}%"),
                MatchFn::StartsWith => format!("{escaped}%"),
                MatchFn::EndsWith => format!("%{escaped}"),
            };
            let nullable = is_nullable(operand, ty);
            if nullable {
                qb.push("COALESCE(");
            }
            push_operand(operand, ty, qb)?;
            qb.push(" LIKE ").push_bind(pattern).push(r" ESCAPE '\'");
            if nullable {
                qb.push(", FALSE)");
            }
        },
    }
    Ok(())
}

fn push_compare(
    op: CompareOp,
    left: &Operand,
    right: &Operand,
    ty: &EntityType,
    qb: &mut QueryBuilder<'_, Postgres>,
) -> Result<()> {
    let is_null = |operand: &Operand| matches!(operand, Operand::Literal(Literal::Null));

    match (is_null(left), is_null(right)) {
        (true, true) => {
            qb.push(if op == CompareOp::Eq { "TRUE" } else { "FALSE" });
        },
        (left_null, right_null) if left_null || right_null => {
            let operand = if left_null { right } else { left };
            push_operand(operand, ty, qb)?;
            qb.push(match op {
                CompareOp::Eq => " IS NULL",
                CompareOp::Ne => " IS NOT NULL",
                _ => return Err(ODataError::bad_request("null only supports 'eq' and 'ne'")),
            });
        },
        _ if !is_nullable(left, ty) && !is_nullable(right, ty) => {
            push_operand(left, ty, qb)?;
            qb.push(" ").push(op.sql()).push(" ");
            push_operand(right, ty, qb)?;
        },
        // A null side makes `eq`/`ne` compare nullness and orderings false.
        _ => match op {
            CompareOp::Eq | CompareOp::Ne => {
                push_operand(left, ty, qb)?;
                qb.push(if op == CompareOp::Eq {
                    " IS NOT DISTINCT FROM "
                } else {
                    " IS DISTINCT FROM "
                });
                push_operand(right, ty, qb)?;
            },
            _ => {
                qb.push("COALESCE(");
                push_operand(left, ty, qb)?;
                qb.push(" ").push(op.sql()).push(" ");
                push_operand(right, ty, qb)?;
                qb.push(", FALSE)");
            },
        },
    }
    Ok(())
}

/// Whether `operand` may evaluate to SQL `NULL` on some row.
fn is_nullable(operand: &Operand, ty: &EntityType) -> bool {
    match operand {
        Operand::Property(name) => ty.property(name).is_some_and(|p| p.nullable),
        Operand::Literal(literal) => *literal == Literal::Null,
        Operand::Call(_, arg) => is_nullable(arg, ty),
    }
}

fn push_operand(operand: &Operand, ty: &EntityType, qb: &mut QueryBuilder<'_, Postgres>) -> Result<()> {
    match operand {
        Operand::Property(name) => {
            let property = ty
                .property(name)
                .ok_or_else(|| ODataError::bad_request(format!("unknown property '{name}'")))?;
            qb.push(quote(property.column));
        },
        Operand::Literal(literal) => match literal {
            Literal::Null => {
                qb.push("NULL");
            },
            Literal::Boolean(b) => {
                qb.push_bind(*b);
            },
            Literal::Integer(i) => {
                qb.push_bind(*i);
            },
            Literal::Decimal(d) => {
                qb.push_bind(*d);
            },
            Literal::String(s) => {
                qb.push_bind(s.clone());
            },
            Literal::DateTime(dt) => {
                qb.push_bind(*dt);
            },
        },
        Operand::Call(function, arg) => {
            qb.push(function.sql()).push("(");
            push_operand(arg, ty, qb)?;
            qb.push(")");
        },
    }
    Ok(())
}

/// Escape `LIKE` wildcards with `\`.
fn escape_like(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shopfloor::order::ORDER_TYPE;

    fn render(spec: &Specification) -> String {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM orders");
        spec.push_where(&ORDER_TYPE, &mut qb).unwrap();
        spec.push_order_by(&ORDER_TYPE, &mut qb).unwrap();
        spec.push_paging(&mut qb);
        qb.sql().to_owned()
    }

    fn filtered(filter: &str) -> Specification {
        Specification::all().with_filter(Some(Expr::parse(filter, &ORDER_TYPE).unwrap()))
    }

    #[test]
    fn test_no_filter() {
        assert_eq!(
            render(&Specification::all()),
            r#"SELECT * FROM orders ORDER BY "id" ASC"#
        );
    }

    #[test]
    fn test_literals_are_bound() {
        assert_eq!(
            render(&filtered("Name eq 'x'' OR 1=1 --' and Id gt 3")),
            r#"SELECT * FROM orders WHERE ("name" = $1 AND "id" > $2) ORDER BY "id" ASC"#
        );
    }

    #[test]
    fn test_null_comparisons() {
        assert_eq!(
            render(&filtered("Description eq null or null ne UpdatedAt")),
            r#"SELECT * FROM orders WHERE ("description" IS NULL OR "updated_at" IS NOT NULL) ORDER BY "id" ASC"#
        );
    }

    #[test]
    fn test_nullable_comparisons() {
        assert_eq!(
            render(&filtered("Description ne 'x'")),
            r#"SELECT * FROM orders WHERE "description" IS DISTINCT FROM $1 ORDER BY "id" ASC"#
        );
        assert_eq!(
            render(&filtered("UpdatedAt eq CreatedAt")),
            r#"SELECT * FROM orders WHERE "updated_at" IS NOT DISTINCT FROM "created_at" ORDER BY "id" ASC"#
        );
        assert_eq!(
            render(&filtered("not (UpdatedAt gt 2024-01-01)")),
            r#"SELECT * FROM orders WHERE NOT (COALESCE("updated_at" > $1, FALSE)) ORDER BY "id" ASC"#
        );
        assert_eq!(
            render(&filtered("not contains(tolower(Description), 'rust')")),
            r#"SELECT * FROM orders WHERE NOT (COALESCE(LOWER("description") LIKE $1 ESCAPE '\', FALSE)) ORDER BY "id" ASC"#
        );
        assert_eq!(
            render(&filtered("Description in ('a', 'b')")),
            r#"SELECT * FROM orders WHERE COALESCE("description" IN ($1, $2), FALSE) ORDER BY "id" ASC"#
        );
    }

    #[test]
    fn test_functions_and_membership() {
        assert_eq!(
            render(&filtered("not startswith(tolower(Title), 'a_b') and Id in (1, 2)")),
            r#"SELECT * FROM orders WHERE (NOT (LOWER("title") LIKE $1 ESCAPE '\') AND "id" IN ($2, $3)) ORDER BY "id" ASC"#
        );
    }

    #[test]
    fn test_order_and_paging() {
        let spec = Specification::all()
            .with_order_by(vec![OrderBy {
                property: "CreatedAt".into(),
                direction: Direction::Desc,
            }])
            .with_paging(20, Some(10));
        assert_eq!(
            render(&spec),
            r#"SELECT * FROM orders ORDER BY "created_at" DESC, "id" ASC LIMIT $1 OFFSET $2"#
        );
    }

    #[test]
    fn test_unknown_order_property() {
        let spec = Specification::all().with_order_by(vec![OrderBy {
            property: "Nope".into(),
            direction: Direction::Asc,
        }]);
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1");
        assert!(spec.push_order_by(&ORDER_TYPE, &mut qb).is_err());
    }

    #[test]
    fn test_count_only_keeps_filter() {
        let spec = filtered("Id gt 1").with_paging(5, Some(5));
        let count = spec.count_only();
        assert_eq!(count.filter, spec.filter);
        assert_eq!(count.skip, 0);
        assert_eq!(count.limit, None);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like(r"50%_off\"), r"50\%\_off\\");
    }
}
