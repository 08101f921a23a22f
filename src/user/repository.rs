//! Handle user database requests.

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use crate::error::Result;
use crate::user::{Role, RoleName, User};

/// Port for user persistence.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find a user, with its roles, by unique `username`.
    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Insert a user holding `roles`.
    ///
    /// A duplicated username fails with [`crate::error::ServerError::Conflict`].
    async fn insert(&self, user: &User, roles: &[RoleName]) -> Result<User>;

    /// Grant `role` to the user named `username`.
    ///
    /// Returns `false` when no such user exists.
    async fn assign_role(&self, username: &str, role: RoleName) -> Result<bool>;
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: Pool<Postgres>,
}

impl PgUserRepository {
    /// Create a new [`PgUserRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(FIND_BY_USERNAME)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn insert(&self, user: &User, roles: &[RoleName]) -> Result<User> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"INSERT INTO users (username, password) VALUES ($1, $2) RETURNING id"#,
        )
        .bind(&user.username)
        .bind(&user.password)
        .fetch_one(&mut *tx)
        .await?;

        let mut granted = HashSet::with_capacity(roles.len());
        for name in roles {
            let role_id: i64 = sqlx::query_scalar(
                r#"INSERT INTO users_roles (user_id, role_id)
                    SELECT $1, r.id FROM roles r WHERE r.name = $2
                    RETURNING role_id"#,
            )
            .bind(id)
            .bind(name.as_str())
            .fetch_one(&mut *tx)
            .await?;
            granted.insert(Role { id: role_id, name: *name });
        }

        tx.commit().await?;
        tracing::info!(user_id = id, username = %user.username, "user created");

        let mut created = User::new(user.username.clone(), user.password.clone()).with_id(id);
        created.set_roles(granted);
        Ok(created)
    }

    async fn assign_role(&self, username: &str, role: RoleName) -> Result<bool> {
        let result = sqlx::query(
            r#"INSERT INTO users_roles (user_id, role_id)
                SELECT u.id, r.id FROM users u, roles r
                WHERE u.username = $1 AND r.name = $2
                ON CONFLICT DO NOTHING"#,
        )
        .bind(username)
        .bind(role.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            tracing::info!(username, %role, "role granted");
            return Ok(true);
        }

        let exists: bool =
            sqlx::query_scalar(r#"SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)"#)
                .bind(username)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}

const FIND_BY_USERNAME: &str = r#"SELECT
        u.id,
        u.username,
        u.password,
        COALESCE(
            JSONB_AGG(jsonb_build_object('id', r.id, 'name', r.name))
                FILTER (WHERE r.id IS NOT NULL),
            '[]'
        ) AS roles
    FROM users u
    LEFT JOIN users_roles ur ON ur.user_id = u.id
    LEFT JOIN roles r ON r.id = ur.role_id
    WHERE u.username = $1
    GROUP BY u.id, u.username, u.password"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServerError;
    use crate::user::{GrantedAuthority, Principal};

    #[sqlx::test]
    #[ignore = "requires a PostgreSQL instance through DATABASE_URL"]
    async fn test_insert_and_find(pool: Pool<Postgres>) {
        let repo = PgUserRepository::new(pool);
        let created = repo
            .insert(&User::new("operator", "hash"), &[RoleName::Operator, RoleName::Editor])
            .await
            .unwrap();
        assert!(created.id() > 0);

        let found = repo.find_by_username("operator").await.unwrap().unwrap();
        assert_eq!(found.id(), created.id());
        assert_eq!(found.authorities(), created.authorities());
        assert_eq!(found.roles.len(), 2);

        assert!(repo.find_by_username("nobody").await.unwrap().is_none());
    }

    #[sqlx::test]
    #[ignore = "requires a PostgreSQL instance through DATABASE_URL"]
    async fn test_username_is_unique(pool: Pool<Postgres>) {
        let repo = PgUserRepository::new(pool);
        repo.insert(&User::new("twin", "hash"), &[]).await.unwrap();

        let err = repo.insert(&User::new("twin", "other"), &[]).await.unwrap_err();
        assert!(matches!(err, ServerError::Conflict(_)));
    }

    #[sqlx::test]
    #[ignore = "requires a PostgreSQL instance through DATABASE_URL"]
    async fn test_assign_role(pool: Pool<Postgres>) {
        let repo = PgUserRepository::new(pool);
        repo.insert(&User::new("lead", "hash"), &[RoleName::Operator]).await.unwrap();

        assert!(repo.assign_role("lead", RoleName::Editor).await.unwrap());
        // Granting twice is a no-op.
        assert!(repo.assign_role("lead", RoleName::Editor).await.unwrap());
        assert!(!repo.assign_role("ghost", RoleName::Editor).await.unwrap());

        let found = repo.find_by_username("lead").await.unwrap().unwrap();
        assert!(found.has_any_authority(&[GrantedAuthority::from_role(RoleName::Editor)]));
        assert_eq!(found.roles.len(), 2);
    }

    #[sqlx::test]
    #[ignore = "requires a PostgreSQL instance through DATABASE_URL"]
    async fn test_user_without_roles(pool: Pool<Postgres>) {
        let repo = PgUserRepository::new(pool);
        repo.insert(&User::new("lonely", "hash"), &[]).await.unwrap();

        let found = repo.find_by_username("lonely").await.unwrap().unwrap();
        assert!(found.roles.is_empty());
        assert!(found.authorities().is_empty());
    }
}
