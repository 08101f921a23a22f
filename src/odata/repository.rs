//! Specification-capable repositories.

use std::marker::PhantomData;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Pool, Postgres, QueryBuilder};

use crate::odata::edm::EntityType;
use crate::odata::error::Result;
use crate::odata::specification::Specification;

/// Persisted row type described by an [`EntityType`].
pub trait Entity: for<'r> FromRow<'r, PgRow> + Send + Sync + Unpin + 'static {
    fn entity_type() -> &'static EntityType;
}

/// Port for reading entities through a [`Specification`].
#[async_trait]
pub trait SpecificationRepository<T>: Send + Sync {
    /// Every entity matching `spec`, ordered and paged.
    async fn find_all(&self, spec: &Specification) -> Result<Vec<T>>;

    /// Number of entities matching the filter of `spec`.
    async fn count(&self, spec: &Specification) -> Result<i64>;

    /// Entity identified by `key`.
    async fn find_by_key(&self, key: i64) -> Result<Option<T>>;
}

/// PostgreSQL repository for any [`Entity`].
pub struct PgRepository<T> {
    pool: Pool<Postgres>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for PgRepository<T> {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}

impl<T> PgRepository<T> {
    /// Create a new [`PgRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> PgRepository<T> {
    fn select(ty: &EntityType) -> QueryBuilder<'static, Postgres> {
        let columns = ty
            .properties
            .iter()
            .map(|p| format!("\"{}\"", p.column))
            .collect::<Vec<_>>()
            .join(", ");
        QueryBuilder::new(format!("SELECT {columns} FROM \"{}\"", ty.table))
    }
}

#[async_trait]
impl<T: Entity> SpecificationRepository<T> for PgRepository<T> {
    async fn find_all(&self, spec: &Specification) -> Result<Vec<T>> {
        let ty = T::entity_type();
        let mut qb = Self::select(ty);
        spec.push_where(ty, &mut qb)?;
        spec.push_order_by(ty, &mut qb)?;
        spec.push_paging(&mut qb);

        tracing::debug!(sql = qb.sql(), entity = ty.name, "find_all");
        Ok(qb.build_query_as::<T>().fetch_all(&self.pool).await?)
    }

    async fn count(&self, spec: &Specification) -> Result<i64> {
        let ty = T::entity_type();
        let mut qb = QueryBuilder::new(format!("SELECT COUNT(*) FROM \"{}\"", ty.table));
        spec.push_where(ty, &mut qb)?;

        Ok(qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?)
    }

    async fn find_by_key(&self, key: i64) -> Result<Option<T>> {
        let ty = T::entity_type();
        let mut qb = Self::select(ty);
        qb.push(format!(" WHERE \"{}\" = ", ty.key.column)).push_bind(key);

        Ok(qb.build_query_as::<T>().fetch_optional(&self.pool).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::odata::filter::Expr;
    use crate::odata::specification::{Direction, OrderBy};
    use crate::shopfloor::order::{ORDER_TYPE, Order};

    async fn seed(pool: &Pool<Postgres>) {
        for (number, name) in [("ORD-1", "Gearbox"), ("ORD-2", "Pump"), ("ORD-3", "Gear 50%")] {
            sqlx::query("INSERT INTO orders (order_number, name, title) VALUES ($1, $2, $3)")
                .bind(number)
                .bind(name)
                .bind(format!("Assemble {name}"))
                .execute(pool)
                .await
                .unwrap();
        }
    }

    #[sqlx::test]
    #[ignore = "requires a PostgreSQL instance through DATABASE_URL"]
    async fn test_find_all_with_specification(pool: Pool<Postgres>) {
        seed(&pool).await;
        let repo = PgRepository::<Order>::new(pool);

        let spec = Specification::all()
            .with_filter(Some(Expr::parse("startswith(Name, 'Gear')", &ORDER_TYPE).unwrap()))
            .with_order_by(vec![OrderBy {
                property: "OrderNumber".into(),
                direction: Direction::Desc,
            }]);
        let orders = repo.find_all(&spec).await.unwrap();
        let numbers: Vec<_> = orders.iter().map(|o| o.order_number.as_str()).collect();
        assert_eq!(numbers, ["ORD-3", "ORD-1"]);

        let literal_percent = Specification::all()
            .with_filter(Some(Expr::parse("contains(Name, '50%')", &ORDER_TYPE).unwrap()));
        assert_eq!(repo.count(&literal_percent).await.unwrap(), 1);

        let paged = Specification::all().with_paging(1, Some(1));
        assert_eq!(repo.find_all(&paged).await.unwrap().len(), 1);
        assert_eq!(repo.count(&paged.count_only()).await.unwrap(), 3);
    }

    #[sqlx::test]
    #[ignore = "requires a PostgreSQL instance through DATABASE_URL"]
    async fn test_null_descriptions_match_ne(pool: Pool<Postgres>) {
        seed(&pool).await;
        sqlx::query("UPDATE orders SET description = 'x' WHERE order_number = 'ORD-1'")
            .execute(&pool)
            .await
            .unwrap();
        let repo = PgRepository::<Order>::new(pool);
        let filter = |input: &str| {
            Specification::all().with_filter(Some(Expr::parse(input, &ORDER_TYPE).unwrap()))
        };

        let orders = repo.find_all(&filter("Description ne 'x'")).await.unwrap();
        let numbers: Vec<_> = orders.iter().map(|o| o.order_number.as_str()).collect();
        assert_eq!(numbers, ["ORD-2", "ORD-3"]);

        assert_eq!(repo.count(&filter("not (Description eq 'x')")).await.unwrap(), 2);
        assert_eq!(repo.count(&filter("not contains(Description, 'y')")).await.unwrap(), 3);
        assert_eq!(repo.count(&filter("UpdatedAt eq UpdatedAt")).await.unwrap(), 3);
    }

    #[sqlx::test]
    #[ignore = "requires a PostgreSQL instance through DATABASE_URL"]
    async fn test_find_by_key(pool: Pool<Postgres>) {
        seed(&pool).await;
        let repo = PgRepository::<Order>::new(pool);

        let first = repo.find_all(&Specification::all()).await.unwrap().remove(0);
        let found = repo.find_by_key(first.id).await.unwrap().unwrap();
        assert_eq!(found, first);
        assert!(repo.find_by_key(-1).await.unwrap().is_none());
    }
}
